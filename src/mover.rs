//! File mover - relocates a single file without ever overwriting

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Coarse category of a failed move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveFailure {
    /// The source vanished before it could be moved
    SourceNotFound,
    /// The source or destination is not writable
    PermissionDenied,
    /// Anything else: collisions, cross-device trouble, full disks
    Other,
}

/// A move that did not happen
#[derive(Debug, Error)]
pub enum MoveError {
    #[error("source not found: {}", .from.display())]
    SourceNotFound { from: PathBuf },

    #[error("permission denied moving {} to {}: {cause}", .from.display(), .to.display())]
    PermissionDenied {
        from: PathBuf,
        to: PathBuf,
        #[source]
        cause: io::Error,
    },

    #[error("destination already exists: {}", .to.display())]
    DestinationExists { to: PathBuf },

    #[error("destination is a file, not a directory: {}", .to.display())]
    DestinationNotDirectory { to: PathBuf },

    #[error("destination does not exist: {}", .to.display())]
    DestinationMissing { to: PathBuf },

    #[error("source has no file name: {}", .from.display())]
    NoFileName { from: PathBuf },

    #[error("failed to move {} to {}: {cause}", .from.display(), .to.display())]
    Io {
        from: PathBuf,
        to: PathBuf,
        #[source]
        cause: io::Error,
    },
}

impl MoveError {
    /// Category used for reporting
    pub fn failure(&self) -> MoveFailure {
        match self {
            MoveError::SourceNotFound { .. } => MoveFailure::SourceNotFound,
            MoveError::PermissionDenied { .. } => MoveFailure::PermissionDenied,
            _ => MoveFailure::Other,
        }
    }
}

/// Options for [`move_file`]
#[derive(Debug, Clone, Copy)]
pub struct MoveOptions {
    /// Create the destination directory if it does not exist
    pub create_missing_destinations: bool,
}

impl Default for MoveOptions {
    fn default() -> Self {
        Self {
            create_missing_destinations: true,
        }
    }
}

/// Move `from` into the directory `destination`, returning the new path.
///
/// The file keeps its name. An existing file at the target is never replaced.
/// Moves across filesystems are done by copy, rename into place, then removal of
/// the source; if the source cannot be removed the copy is deleted again.
pub fn move_file(from: &Path, destination: &Path, options: MoveOptions) -> Result<PathBuf, MoveError> {
    if let Err(e) = std::fs::symlink_metadata(from) {
        return Err(classify(e, from, destination));
    }

    let target = resolve_target(from, destination, options)?;

    if target.symlink_metadata().is_ok() {
        return Err(MoveError::DestinationExists { to: target });
    }

    info!("Moving {} -> {}", from.display(), target.display());
    match std::fs::rename(from, &target) {
        Ok(()) => Ok(target),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!("Cross-device move, copying {}", from.display());
            copy_then_remove(from, &target)?;
            Ok(target)
        }
        Err(e) => Err(classify(e, from, &target)),
    }
}

/// Work out the final path of the file inside `destination`
fn resolve_target(from: &Path, destination: &Path, options: MoveOptions) -> Result<PathBuf, MoveError> {
    match std::fs::metadata(destination) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(MoveError::DestinationNotDirectory {
                to: destination.to_path_buf(),
            });
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if !options.create_missing_destinations {
                return Err(MoveError::DestinationMissing {
                    to: destination.to_path_buf(),
                });
            }
            std::fs::create_dir_all(destination).map_err(|e| classify(e, from, destination))?;
            debug!("Created destination {}", destination.display());
        }
        Err(e) => return Err(classify(e, from, destination)),
    }

    let name = from.file_name().ok_or_else(|| MoveError::NoFileName {
        from: from.to_path_buf(),
    })?;
    Ok(destination.join(name))
}

fn copy_then_remove(from: &Path, target: &Path) -> Result<(), MoveError> {
    if from.is_dir() {
        return Err(MoveError::Io {
            from: from.to_path_buf(),
            to: target.to_path_buf(),
            cause: io::Error::other("cannot move a directory across filesystems"),
        });
    }

    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = target.with_file_name(format!(".{}.dropsort-partial", name));

    if let Err(e) = std::fs::copy(from, &partial) {
        let _ = std::fs::remove_file(&partial);
        return Err(classify(e, from, target));
    }

    // The target may have appeared while copying
    if target.symlink_metadata().is_ok() {
        let _ = std::fs::remove_file(&partial);
        return Err(MoveError::DestinationExists {
            to: target.to_path_buf(),
        });
    }

    if let Err(e) = std::fs::rename(&partial, target) {
        let _ = std::fs::remove_file(&partial);
        return Err(classify(e, from, target));
    }

    if let Err(e) = std::fs::remove_file(from) {
        let _ = std::fs::remove_file(target);
        return Err(classify(e, from, target));
    }

    Ok(())
}

/// Map an OS error onto the failure taxonomy
fn classify(error: io::Error, from: &Path, to: &Path) -> MoveError {
    match error.kind() {
        io::ErrorKind::NotFound if from.symlink_metadata().is_err() => MoveError::SourceNotFound {
            from: from.to_path_buf(),
        },
        io::ErrorKind::PermissionDenied => MoveError::PermissionDenied {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            cause: error,
        },
        _ => MoveError::Io {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            cause: error,
        },
    }
}
