//! Writing encoded output to disk.

use super::adaptive::{Encoded, encode};
use super::decode::Raster;
use super::params::{EncodingConstraints, OutputFormat};
use crate::error::{Result, TranscodeError};
use crate::lifecycle::{TempArtifact, acquire_temp};
use crate::security::SecurityPolicy;
use std::path::{Path, PathBuf};

/// Prefix for encoder temp artifacts.
pub const TEMP_PREFIX: &str = "processed-";

/// `path` with the format's extension appended unless it already ends in one
/// (compared case-insensitively, `.jpeg` counts for lossy).
pub fn ensure_extension(path: &Path, format: OutputFormat) -> PathBuf {
    let has_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .is_some_and(|e| format.accepted_extensions().contains(&e.as_str()));
    if has_extension {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_os_string();
    name.push(format.extension());
    PathBuf::from(name)
}

/// Encode `raster` and write it to `path`, adding the extension when missing.
///
/// Returns the path actually written.
pub fn encode_to_file(
    raster: &Raster,
    path: &Path,
    constraints: &EncodingConstraints,
) -> Result<(PathBuf, Encoded)> {
    let encoded = encode(raster, constraints)?;
    let target = write_encoded(&encoded, path)?;
    Ok((target, encoded))
}

/// Write already encoded bytes, adding the extension when missing.
pub fn write_encoded(encoded: &Encoded, path: &Path) -> Result<PathBuf> {
    let target = ensure_extension(path, encoded.format);
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            TranscodeError::resource(format!("failed to create {}", parent.display()), e)
        })?;
    }
    std::fs::write(&target, &encoded.bytes).map_err(|e| {
        TranscodeError::resource(format!("failed to write {}", target.display()), e)
    })?;
    log::info!(
        "wrote {} ({}x{}, {} bytes)",
        target.display(),
        encoded.width,
        encoded.height,
        encoded.len()
    );
    Ok(target)
}

/// Encode `raster` into a fresh temp artifact the caller owns.
///
/// The artifact is removed when dropped unless the caller keeps it.
pub fn encode_to_temp_file(
    raster: &Raster,
    constraints: &EncodingConstraints,
    policy: &SecurityPolicy,
) -> Result<(TempArtifact, Encoded)> {
    let encoded = encode(raster, constraints)?;
    let mut artifact = acquire_temp(TEMP_PREFIX, encoded.extension(), policy)?;
    artifact.write_all(&encoded.bytes)?;
    artifact.close();
    Ok((artifact, encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::gradient_image;
    use tempfile::TempDir;

    #[test]
    fn ensure_extension_appends_when_missing() {
        assert_eq!(
            ensure_extension(Path::new("out/photo"), OutputFormat::Lossless),
            PathBuf::from("out/photo.png")
        );
        assert_eq!(
            ensure_extension(Path::new("photo.tiff"), OutputFormat::Lossy),
            PathBuf::from("photo.tiff.jpg")
        );
    }

    #[test]
    fn ensure_extension_is_case_insensitive() {
        assert_eq!(
            ensure_extension(Path::new("photo.PNG"), OutputFormat::Lossless),
            PathBuf::from("photo.PNG")
        );
        assert_eq!(
            ensure_extension(Path::new("photo.JPEG"), OutputFormat::Lossy),
            PathBuf::from("photo.JPEG")
        );
    }

    #[test]
    fn encode_to_file_writes_decodable_output() {
        let tmp = TempDir::new().unwrap();
        let raster = Raster::from(gradient_image(32, 24));
        let constraints = EncodingConstraints::new(OutputFormat::Lossy, 1024 * 1024);

        let (path, encoded) =
            encode_to_file(&raster, &tmp.path().join("nested/result"), &constraints).unwrap();

        assert_eq!(path, tmp.path().join("nested/result.jpg"));
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, encoded.bytes);
        assert_eq!(image::load_from_memory(&written).unwrap().width(), 32);
    }

    #[test]
    fn encode_to_temp_file_is_removed_on_drop() {
        let tmp = TempDir::new().unwrap();
        let policy = SecurityPolicy::default().with_temp_dir(tmp.path());
        let raster = Raster::from(gradient_image(16, 16));

        let (artifact, encoded) =
            encode_to_temp_file(&raster, &EncodingConstraints::default(), &policy).unwrap();
        let path = artifact.path().to_path_buf();

        assert!(path.starts_with(tmp.path()));
        assert!(path.to_string_lossy().ends_with(".png"));
        assert_eq!(std::fs::read(&path).unwrap(), encoded.bytes);

        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn encode_to_temp_file_can_be_kept() {
        let tmp = TempDir::new().unwrap();
        let policy = SecurityPolicy::default().with_temp_dir(tmp.path());
        let raster = Raster::from(gradient_image(16, 16));

        let (artifact, _) =
            encode_to_temp_file(&raster, &EncodingConstraints::default(), &policy).unwrap();
        let path = artifact.keep();
        assert!(path.exists());
    }
}
