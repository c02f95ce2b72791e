//! Directory-tree transcoding.
//!
//! Walks a source directory, transcodes every supported image in parallel
//! and mirrors the tree into an output directory:
//!
//! ```text
//! shoot/                     out/
//! ├── 001-dawn.arw     ──►   ├── 001-dawn.png
//! ├── 002-dusk.jpg     ──►   ├── 002-dusk.png
//! └── extra/                 └── extra/
//!     └── wide.tiff    ──►       └── wide.png
//! ```
//!
//! Each file is an independent [`transcode`] call with its own temp
//! artifacts. One file failing does not stop the others; the failure is
//! recorded in its [`BatchEntry`]. Paths are handed to the pipeline relative
//! to the source directory so they go through the same validation as any
//! other caller input.
//!
//! Progress is reported through an optional channel of [`BatchEvent`]s, which
//! the CLI drains on a printer thread.

use crate::error::{Result, TranscodeError};
use crate::imaging::{Input, write_encoded};
use crate::pipeline::{TranscodeRequest, transcode};
use crate::security::{ALLOWED_EXTENSIONS, SecurityPolicy, dotted_extension};
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use walkdir::WalkDir;

/// What happened to one source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    /// Relative to the source directory.
    pub source: PathBuf,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Written {
        output: PathBuf,
        width: u32,
        height: u32,
        bytes: u64,
        budget_met: bool,
        downscaled: bool,
        /// Hex SHA-256 of the written bytes.
        sha256: String,
    },
    Failed {
        error: String,
    },
}

impl BatchEntry {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Written { .. })
    }
}

/// Summary of a [`transcode_tree`] run, in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| match e.outcome {
                Outcome::Written { bytes, .. } => bytes,
                Outcome::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Progress events emitted while a batch runs.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Started { total: usize },
    Finished(BatchEntry),
}

/// Every supported image under `src`, relative to it, sorted.
///
/// Hidden files and directories are skipped.
pub fn collect_inputs(src: &Path) -> Result<Vec<PathBuf>> {
    if !src.is_dir() {
        return Err(TranscodeError::validation(
            "source_dir",
            src.display(),
            "not a directory",
        ));
    }
    let mut inputs: Vec<PathBuf> = WalkDir::new(src)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::warn!("skipping unreadable entry: {err}");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            dotted_extension(e.path()).is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        })
        .filter_map(|e| e.path().strip_prefix(src).ok().map(Path::to_path_buf))
        .collect();
    inputs.sort();
    Ok(inputs)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

/// Where `relative` lands under `out_dir`: same tree, extension replaced.
pub fn output_path_for(relative: &Path, out_dir: &Path, extension: &str) -> PathBuf {
    out_dir
        .join(relative)
        .with_extension(extension.trim_start_matches('.'))
}

/// Transcode every supported image under `src` into `out_dir`.
///
/// Runs on the global rayon pool. `events`, when given, receives a
/// [`BatchEvent::Started`] and then one [`BatchEvent::Finished`] per file in
/// completion order.
pub fn transcode_tree(
    src: &Path,
    out_dir: &Path,
    request: &TranscodeRequest,
    policy: &SecurityPolicy,
    events: Option<Sender<BatchEvent>>,
) -> Result<BatchReport> {
    request.constraints.validate()?;
    let inputs = collect_inputs(src)?;
    std::fs::create_dir_all(out_dir).map_err(|e| {
        TranscodeError::resource(format!("failed to create {}", out_dir.display()), e)
    })?;

    let policy = policy.clone().with_input_root(src);
    let extension = request.constraints.format.extension();
    let collisions = find_collisions(&inputs, extension);

    if let Some(tx) = &events {
        let _ = tx.send(BatchEvent::Started {
            total: inputs.len(),
        });
    }
    log::info!("transcoding {} files from {}", inputs.len(), src.display());

    let entries = inputs
        .par_iter()
        .map(|relative| {
            let outcome = if collisions.contains(relative) {
                Outcome::Failed {
                    error: format!(
                        "output {} is shared with another source file",
                        output_path_for(relative, Path::new(""), extension).display()
                    ),
                }
            } else {
                let target = output_path_for(relative, out_dir, extension);
                match transcode_one(relative, &target, request, &policy) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        log::warn!("{}: {e}", relative.display());
                        Outcome::Failed {
                            error: e.to_string(),
                        }
                    }
                }
            };
            let entry = BatchEntry {
                source: relative.clone(),
                outcome,
            };
            if let Some(tx) = &events {
                let _ = tx.send(BatchEvent::Finished(entry.clone()));
            }
            entry
        })
        .collect();

    Ok(BatchReport { entries })
}

fn transcode_one(
    relative: &Path,
    target: &Path,
    request: &TranscodeRequest,
    policy: &SecurityPolicy,
) -> Result<Outcome> {
    let transcoded = transcode(Input::Path(relative), request, policy)?;
    let encoded = &transcoded.encoded;
    let written = write_encoded(encoded, target)?;
    Ok(Outcome::Written {
        output: written,
        width: encoded.width,
        height: encoded.height,
        bytes: encoded.len() as u64,
        budget_met: encoded.budget_met,
        downscaled: encoded.is_downscaled(),
        sha256: format!("{:x}", Sha256::digest(&encoded.bytes)),
    })
}

/// Sources whose output path another source also maps to (e.g. `a.jpg` and `a.png`).
fn find_collisions(inputs: &[PathBuf], extension: &str) -> HashSet<PathBuf> {
    let mut seen: std::collections::HashMap<PathBuf, &PathBuf> = Default::default();
    let mut collisions = HashSet::new();
    for input in inputs {
        let key = output_path_for(input, Path::new(""), extension);
        if let Some(first) = seen.insert(key, input) {
            collisions.insert(first.clone());
            collisions.insert(input.clone());
        }
    }
    collisions
}
