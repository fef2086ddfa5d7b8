//! Scratch copy management for in-place mutation.

use crate::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Workspace for one mosh run.
///
/// The input is copied into a temporary directory and all mutation happens
/// on that copy. The result only reaches its destination through
/// [`Workspace::finalize`]; dropping the workspace discards it.
///
/// # Example
///
/// ```no_run
/// use datamosh::workspace::Workspace;
///
/// let workspace = Workspace::new("/path/to/clip.mp4")?;
/// let copy = workspace.prepare()?;
/// // Mutate `copy` in place, then publish it
/// drop(copy);
/// workspace.finalize("/path/to/clip-iframoshed.mp4")?;
/// # Ok::<(), datamosh::Error>(())
/// ```
pub struct Workspace {
    // Holds the working copy; removed with the workspace.
    _temp_dir: TempDir,
    input_path: PathBuf,
    work_path: PathBuf,
}

impl Workspace {
    /// Create a new workspace for processing a file.
    pub fn new<P: AsRef<Path>>(input: P) -> Result<Self> {
        let input = input.as_ref();
        let temp_dir = TempDir::new().map_err(|e| Error::Workspace(e.to_string()))?;

        let input_path = input.to_path_buf();

        let file_name = input
            .file_name()
            .ok_or_else(|| Error::invalid_input("Invalid input file path"))?;
        let work_path = temp_dir.path().join(file_name);

        Ok(Self {
            _temp_dir: temp_dir,
            input_path,
            work_path,
        })
    }

    /// Get the working copy path.
    pub fn work_file(&self) -> &Path {
        &self.work_path
    }

    /// Copy the input into the workspace and open the copy read/write.
    pub fn prepare(&self) -> Result<File> {
        let copied = fs::copy(&self.input_path, &self.work_path).map_err(|e| {
            Error::Workspace(format!(
                "Failed to copy {:?} into workspace: {}",
                self.input_path, e
            ))
        })?;
        debug!(bytes = copied, path = ?self.work_path, "Prepared working copy");

        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.work_path)?)
    }

    /// Move the working copy to `destination`.
    ///
    /// An existing destination is moved to a uniquely named backup in the
    /// same directory and restored if the move fails. Moves across filesystems fall back to copy and delete.
    pub fn finalize<P: AsRef<Path>>(self, destination: P) -> Result<PathBuf> {
        let dest = destination.as_ref();

        if !self.work_path.exists() {
            return Err(Error::Workspace(format!(
                "Working copy does not exist: {:?}",
                self.work_path
            )));
        }

        if dest.exists() {
            // Unique name next to the destination, deleted on drop.
            let dir = match dest.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let backup = tempfile::Builder::new()
                .prefix(".datamosh-backup-")
                .tempfile_in(dir)
                .map_err(|e| {
                    Error::Workspace(format!("Failed to create backup of {:?}: {}", dest, e))
                })?
                .into_temp_path();
            fs::rename(dest, &backup).map_err(|e| {
                Error::Workspace(format!("Failed to create backup of {:?}: {}", dest, e))
            })?;

            if let Err(e) = move_file(&self.work_path, dest) {
                if let Err(restore) = fs::rename(&backup, dest) {
                    warn!(error = %restore, backup = ?backup, "Could not restore destination, keeping backup");
                    let _ = backup.keep();
                }
                return Err(Error::Workspace(format!(
                    "Failed to move output to destination: {}",
                    e
                )));
            }
        } else {
            move_file(&self.work_path, dest).map_err(|e| {
                Error::Workspace(format!("Failed to move output to destination: {}", e))
            })?;
        }

        Ok(dest.to_path_buf())
    }
}

fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!(error = %e, "Rename failed, copying instead");
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}
