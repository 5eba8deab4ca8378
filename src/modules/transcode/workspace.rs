//! Per-job scratch directories.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

pub const INPUT_FILE: &str = "input.mp4";
pub const OUTPUT_DIR: &str = "out";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub input: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Deterministic layout for `video_id`: `{root}/{video_id}/input.mp4` and
    /// `{root}/{video_id}/out/`. Ids are validated upstream to be a single
    /// path segment.
    pub fn paths(&self, video_id: &str) -> WorkspacePaths {
        let root = self.root.join(video_id);
        WorkspacePaths {
            input: root.join(INPUT_FILE),
            output_dir: root.join(OUTPUT_DIR),
            root,
        }
    }

    /// Create a fresh workspace. Leftovers from a crashed run for the same id
    /// are removed first so no stale input or segment can leak into this job.
    pub async fn prepare(&self, video_id: &str) -> std::io::Result<Workspace> {
        let paths = self.paths(video_id);

        match fs::remove_dir_all(&paths.root).await {
            Ok(()) => warn!(video_id = %video_id, path = %paths.root.display(), "Removed stale workspace"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        fs::create_dir_all(&paths.output_dir).await?;
        debug!(video_id = %video_id, path = %paths.root.display(), "Workspace ready");

        Ok(Workspace {
            paths,
            removed: false,
        })
    }
}

/// A prepared workspace. The directory is removed by [`Workspace::cleanup`],
/// or on drop if the owner never got that far.
#[derive(Debug)]
pub struct Workspace {
    paths: WorkspacePaths,
    removed: bool,
}

impl Workspace {
    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    pub fn input(&self) -> &Path {
        &self.paths.input
    }

    pub fn output_dir(&self) -> &Path {
        &self.paths.output_dir
    }

    pub async fn cleanup(mut self) {
        match fs::remove_dir_all(&self.paths.root).await {
            Ok(()) => debug!(path = %self.paths.root.display(), "Workspace removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.paths.root.display(), error = %e, "Failed to remove workspace"),
        }
        self.removed = true;
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.removed {
            if let Err(e) = std::fs::remove_dir_all(&self.paths.root) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.paths.root.display(), error = %e, "Failed to remove workspace on drop");
                }
            }
        }
    }
}
