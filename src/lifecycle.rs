//! Scoped temporary artifacts.
//!
//! Every temp file this crate creates is a [`TempArtifact`]: created inside
//! the policy's temp directory with owner-only permissions (0600 on Unix) from
//! the moment it exists, and removed when the handle is released or dropped.
//! Setting `keep` suppresses removal for diagnostics; permissions are not
//! relaxed.
//!
//! Release is idempotent and a file that is already gone counts as released.
//! [`finish`] couples a primary result with release so a cleanup failure never
//! masks the error that caused the teardown.

use crate::error::{Result, TranscodeError};
use crate::security::{SecurityPolicy, validate_temp_path};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A temp file owned by one call.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    file: Option<File>,
    keep: bool,
    released: bool,
}

/// Create a temp file named `{prefix}{random}{suffix}` in the policy's temp directory.
pub fn acquire_temp(prefix: &str, suffix: &str, policy: &SecurityPolicy) -> Result<TempArtifact> {
    let dir = &policy.allowed_temp_dir;
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix).suffix(suffix);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o600));
    }

    let named = builder.tempfile_in(dir).map_err(|e| {
        TranscodeError::resource(format!("failed to create temp file in {}", dir.display()), e)
    })?;
    // Removal is handled by TempArtifact so it can be idempotent and report failures.
    let (file, path) = named.keep().map_err(|e| {
        TranscodeError::resource("failed to take ownership of temp file", e.error)
    })?;

    let artifact = TempArtifact {
        path,
        file: Some(file),
        keep: false,
        released: false,
    };
    // Dropping the artifact on failure removes the file.
    validate_temp_path(&artifact.path, policy)?;
    log::debug!("acquired temp artifact {}", artifact.path.display());
    Ok(artifact)
}

impl TempArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_kept(&self) -> bool {
        self.keep
    }

    /// Suppress removal on release and drop.
    pub fn set_keep(&mut self, keep: bool) {
        self.keep = keep;
    }

    /// Disarm the artifact and hand its path to the caller, who now owns the file.
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        self.file = None;
        std::mem::take(&mut self.path)
    }

    /// Write `data` and flush it to disk.
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let path = self.path.clone();
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => {
                return Err(TranscodeError::resource(
                    format!("temp file {} is already closed", path.display()),
                    io::Error::from(io::ErrorKind::BrokenPipe),
                ));
            }
        };
        file.write_all(data).map_err(|e| {
            TranscodeError::resource(format!("failed to write temp file {}", path.display()), e)
        })?;
        file.sync_all().map_err(|e| {
            TranscodeError::resource(format!("failed to sync temp file {}", path.display()), e)
        })
    }

    /// Close our handle so an external process can write the file.
    pub fn close(&mut self) {
        self.file = None;
    }

    /// Remove the file unless `keep` is set. Safe to call more than once.
    pub fn release(&mut self) -> Result<()> {
        self.file = None;
        if self.released || self.keep {
            return Ok(());
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(TranscodeError::resource(
                    format!("failed to clean up temp file {}", self.path.display()),
                    e,
                ));
            }
        }
        self.released = true;
        log::debug!("released temp artifact {}", self.path.display());
        Ok(())
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("{e}");
        }
    }
}

/// Release `artifact` after computing `result`.
///
/// On success a release failure becomes the error. After a primary error the
/// release failure is logged and the primary error is returned.
pub fn finish<T>(result: Result<T>, mut artifact: TempArtifact) -> Result<T> {
    let released = artifact.release();
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(cleanup)) => Err(cleanup),
        (Err(primary), Ok(())) => Err(primary),
        (Err(primary), Err(cleanup)) => {
            log::warn!("cleanup after failure also failed: {cleanup}");
            Err(primary)
        }
    }
}
