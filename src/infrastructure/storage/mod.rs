pub mod local;
pub mod s3;
pub mod traits;

pub use traits::{ByteReader, ObjectStore, StorageError, StorageResult};
