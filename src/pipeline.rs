//! End-to-end transcode: input → (RAW conversion) → decode → adaptive encode.
//!
//! ```text
//! Input::Path(*.arw|*.srf|*.sr2) ─► RawConverter ─► PNG bytes ─┐
//! Input::Path(other)             ─► validate + read ───────────┼─► decode ─► encode ─► Transcoded
//! Input::Bytes                   ─► size ceiling ──────────────┘
//! ```
//!
//! Encoding constraints and RAW options are validated before any file is
//! read or any process is spawned.

use crate::cancel::CancelToken;
use crate::error::{Result, TranscodeError};
use crate::imaging::decode::decode_bytes;
use crate::imaging::{EncodingConstraints, Encoded, Input, decode, encode_with_cancel, write_encoded};
use crate::raw::{RawConversionOptions, RawConverter, validate_raw_file};
use crate::security::{SecurityPolicy, dotted_extension, is_raw_extension, validate_input_path};
use std::path::{Path, PathBuf};

/// Everything a transcode needs besides the input and the policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscodeRequest {
    pub constraints: EncodingConstraints,
    /// Used only for RAW inputs.
    pub raw: RawConversionOptions,
    pub converter: RawConverter,
}

impl TranscodeRequest {
    pub fn new(constraints: EncodingConstraints) -> Self {
        Self {
            constraints,
            ..Self::default()
        }
    }

    pub fn with_raw_options(mut self, raw: RawConversionOptions) -> Self {
        self.raw = raw;
        self
    }

    pub fn with_converter(mut self, converter: RawConverter) -> Self {
        self.converter = converter;
        self
    }
}

/// Result of [`transcode`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transcoded {
    pub encoded: Encoded,
    /// Lowercase name of the source format, e.g. `"png"` or `"arw"`.
    pub source_format: String,
    pub from_raw: bool,
}

impl Transcoded {
    pub fn bytes(&self) -> &[u8] {
        &self.encoded.bytes
    }

    pub fn extension(&self) -> &'static str {
        self.encoded.extension()
    }
}

pub fn transcode(
    input: Input<'_>,
    request: &TranscodeRequest,
    policy: &SecurityPolicy,
) -> Result<Transcoded> {
    transcode_with_cancel(input, request, policy, &CancelToken::new())
}

pub fn transcode_with_cancel(
    input: Input<'_>,
    request: &TranscodeRequest,
    policy: &SecurityPolicy,
    cancel: &CancelToken,
) -> Result<Transcoded> {
    request.constraints.validate()?;

    let (raster, source_format, from_raw) = match input {
        Input::Path(path) if is_raw_extension(path) => {
            let png = request
                .converter
                .convert_with_cancel(path, &request.raw, policy, cancel)?;
            let format = dotted_extension(path)
                .map(|e| e.trim_start_matches('.').to_string())
                .unwrap_or_default();
            (decode_bytes(&png)?, format, true)
        }
        other => {
            let raster = decode(other, policy)?;
            let format = raster.format_name().to_string();
            (raster, format, false)
        }
    };
    log::debug!(
        "decoded {source_format} source at {}x{}",
        raster.width(),
        raster.height()
    );

    let encoded = encode_with_cancel(&raster, &request.constraints, cancel)?;
    Ok(Transcoded {
        encoded,
        source_format,
        from_raw,
    })
}

/// [`transcode`] and write the result to `output`, adding the extension when missing.
pub fn transcode_to_file(
    input: Input<'_>,
    output: &Path,
    request: &TranscodeRequest,
    policy: &SecurityPolicy,
) -> Result<(PathBuf, Transcoded)> {
    let transcoded = transcode(input, request, policy)?;
    let written = write_encoded(&transcoded.encoded, output)?;
    Ok((written, transcoded))
}

/// What [`check_input`] found out about a path.
#[derive(Debug, Clone, PartialEq)]
pub struct InputCheck {
    pub resolved: PathBuf,
    pub size: u64,
    pub kind: InputKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputKind {
    /// Passed the header sniff; needs the converter.
    Raw { extension: String },
    /// Decodable header.
    Image {
        format: String,
        width: u32,
        height: u32,
    },
}

/// Run the validation chain on `path` without transcoding.
///
/// RAW files also get the header sniff; other images have their header read
/// for format and dimensions.
pub fn check_input(path: &Path, policy: &SecurityPolicy) -> Result<InputCheck> {
    let (resolved, kind) = if is_raw_extension(path) {
        let resolved = validate_raw_file(path, policy)?;
        let extension = dotted_extension(path)
            .map(|e| e.trim_start_matches('.').to_string())
            .unwrap_or_default();
        (resolved, InputKind::Raw { extension })
    } else {
        let resolved = validate_input_path(path, policy)?;
        let reader = image::ImageReader::open(&resolved)
            .and_then(|r| r.with_guessed_format())
            .map_err(|e| {
                TranscodeError::resource(format!("failed to open {}", resolved.display()), e)
            })?;
        let format = reader
            .format()
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("unknown")
            .to_string();
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| {
                TranscodeError::codec(format!("unreadable header in {}", path.display()), e)
            })?;
        (
            resolved,
            InputKind::Image {
                format,
                width,
                height,
            },
        )
    };
    let size = std::fs::metadata(&resolved)
        .map_err(|e| {
            TranscodeError::resource(format!("failed to stat {}", resolved.display()), e)
        })?
        .len();
    Ok(InputCheck {
        resolved,
        size,
        kind,
    })
}
