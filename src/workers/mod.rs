pub mod transcoder;
