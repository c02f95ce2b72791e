//! RAW → PNG conversion through an external converter (darktable-cli by default).
//!
//! A conversion runs in this order, and nothing is spawned until every check
//! before step 4 has passed:
//!
//! 1. Options are range-checked ([`RawConversionOptions::validate`]).
//! 2. The input path goes through the full validation chain and must carry a
//!    RAW extension.
//! 3. The converter name is checked against the allow-list and resolved once
//!    with `which`; that resolved path is what gets spawned.
//! 4. An owner-only temp artifact is created for the output and the fixed
//!    argument vector is built from enumerated option values only.
//! 5. The converter runs under the policy timeout with the temp directory as
//!    its working directory.
//! 6. The output is read, checked for emptiness and the size ceiling, and the
//!    artifact is released unless `keep_temp` is set.
//!
//! ## Argument vector
//!
//! ```text
//! <input> <output> --hq true --upscale false --core
//!   --conf plugins/imageio/format/png/bpp=<8|16>
//!   --conf plugins/imageio/format/png/compression=<0-9>
//!   --conf plugins/lighttable/export/colorspace=<1|2|3>
//!   --conf plugins/lighttable/export/wb=<camera|auto|manual>
//!   --conf plugins/lighttable/export/overwrite=true
//! ```

mod exec;
mod options;

pub use exec::run_with_timeout;
pub use options::{ColorSpace, RawConversionOptions, WhiteBalance};

use crate::cancel::CancelToken;
use crate::error::{ExternalToolError, Result, SecurityErrorKind, TranscodeError};
use crate::lifecycle::{acquire_temp, finish};
use crate::security::{
    DEFAULT_CONVERTER, SecurityPolicy, is_raw_extension, validate_arguments,
    validate_byte_len, validate_command_name, validate_input_path, validate_size,
};
use std::borrow::Cow;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Prefix for converter output artifacts.
pub const TEMP_PREFIX: &str = "arw-output-";

/// How many leading bytes [`validate_raw_file`] inspects.
pub const HEADER_SNIFF_LEN: u64 = 512;

const HEADER_MARKERS: &[&[u8]] = &[b"II*\0", b"MM\0*", b"SONY", b"ARW"];

/// An allow-listed external RAW converter.
#[derive(Debug, Clone, PartialEq)]
pub struct RawConverter {
    program: String,
    search_path: Option<OsString>,
}

impl Default for RawConverter {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERTER)
    }
}

impl RawConverter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            search_path: None,
        }
    }

    /// Look the program up in `path` (a `PATH`-style list) instead of `$PATH`.
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Check the name against the allow-list and resolve it to an executable.
    pub fn probe(&self, policy: &SecurityPolicy) -> Result<PathBuf> {
        validate_command_name(&self.program, policy)?;
        let found = match &self.search_path {
            Some(paths) => which::which_in(&self.program, Some(paths), &policy.allowed_temp_dir),
            None => which::which(&self.program),
        };
        let resolved = found.map_err(|e| {
            log::debug!("probe for {} failed: {e}", self.program);
            ExternalToolError::Unavailable {
                program: self.program.clone(),
            }
        })?;
        log::debug!("{} resolved to {}", self.program, resolved.display());
        Ok(resolved)
    }

    /// The fixed argument vector for one conversion.
    pub fn build_arguments(
        input: &Path,
        output: &Path,
        options: &RawConversionOptions,
    ) -> Result<Vec<String>> {
        options.validate()?;
        let args = vec![
            path_arg("input_path", input)?,
            path_arg("output_path", output)?,
            "--hq".to_string(),
            "true".to_string(),
            "--upscale".to_string(),
            "false".to_string(),
            "--core".to_string(),
            "--conf".to_string(),
            format!("plugins/imageio/format/png/bpp={}", options.bitness),
            "--conf".to_string(),
            format!("plugins/imageio/format/png/compression={}", options.compression),
            "--conf".to_string(),
            format!(
                "plugins/lighttable/export/colorspace={}",
                options.color_space.code()
            ),
            "--conf".to_string(),
            format!("plugins/lighttable/export/wb={}", options.white_balance.token()),
            "--conf".to_string(),
            "plugins/lighttable/export/overwrite=true".to_string(),
        ];
        validate_arguments(&args)?;
        Ok(args)
    }

    pub fn convert(
        &self,
        input: &Path,
        options: &RawConversionOptions,
        policy: &SecurityPolicy,
    ) -> Result<Vec<u8>> {
        self.convert_with_cancel(input, options, policy, &CancelToken::new())
    }

    /// Convert `input` to PNG bytes. `cancel` kills the converter if set while it runs.
    pub fn convert_with_cancel(
        &self,
        input: &Path,
        options: &RawConversionOptions,
        policy: &SecurityPolicy,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        options.validate()?;
        let resolved = validate_input_path(input, policy)?;
        require_raw_extension(input)?;

        let policy: Cow<'_, SecurityPolicy> = match &options.temp_dir {
            Some(dir) => Cow::Owned(policy.clone().with_temp_dir(dir)),
            None => Cow::Borrowed(policy),
        };
        let executable = self.probe(&policy)?;
        cancel.check()?;

        if options.has_adjustments() {
            log::debug!(
                "exposure/contrast/saturation ({}, {}, {}) are not passed to {}",
                options.exposure,
                options.contrast,
                options.saturation,
                self.program
            );
        }

        let mut artifact = acquire_temp(TEMP_PREFIX, ".png", &policy)?;
        artifact.set_keep(options.keep_temp);
        artifact.close();

        let result = (|| -> Result<Vec<u8>> {
            let input_abs = absolute(&resolved)?;
            let output_abs = absolute(artifact.path())?;
            let args = Self::build_arguments(&input_abs, &output_abs, options)?;
            run_with_timeout(
                &self.program,
                &executable,
                &args,
                &policy.allowed_temp_dir,
                policy.command_timeout,
                cancel,
            )?;
            self.read_output(artifact.path(), policy.max_file_size)
        })();

        if options.keep_temp {
            log::info!("keeping converter output {}", artifact.path().display());
        }
        let png = finish(result, artifact)?;
        log::info!("converted {} ({} bytes)", input.display(), png.len());
        Ok(png)
    }

    fn read_output(&self, path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
        // Size first, so an oversize output is never loaded.
        validate_size(path, max_bytes)?;
        let data = std::fs::read(path).map_err(|e| {
            TranscodeError::resource(
                format!("failed to read {} output {}", self.program, path.display()),
                e,
            )
        })?;
        if data.is_empty() {
            return Err(ExternalToolError::EmptyOutput {
                program: self.program.clone(),
                path: path.to_path_buf(),
            }
            .into());
        }
        validate_byte_len(data.len() as u64, max_bytes)?;
        Ok(data)
    }
}

/// Convert with the default converter (`darktable-cli` from `$PATH`).
pub fn convert_raw(
    input: &Path,
    options: &RawConversionOptions,
    policy: &SecurityPolicy,
) -> Result<Vec<u8>> {
    RawConverter::default().convert(input, options, policy)
}

/// True when the header carries a TIFF byte-order mark or a Sony marker.
///
/// A sniff, not a parse: ARW/SRF/SR2 are TIFF containers.
pub fn sniff_raw_header(header: &[u8]) -> bool {
    HEADER_MARKERS
        .iter()
        .any(|marker| header.windows(marker.len()).any(|w| w == *marker))
}

/// Full validation chain plus a non-empty check and a header sniff.
///
/// Returns the resolved path.
pub fn validate_raw_file(path: &Path, policy: &SecurityPolicy) -> Result<PathBuf> {
    let resolved = validate_input_path(path, policy)?;
    require_raw_extension(path)?;

    let file = std::fs::File::open(&resolved).map_err(|e| {
        TranscodeError::resource(format!("failed to open {}", resolved.display()), e)
    })?;
    let mut header = Vec::with_capacity(HEADER_SNIFF_LEN as usize);
    file.take(HEADER_SNIFF_LEN)
        .read_to_end(&mut header)
        .map_err(|e| {
            TranscodeError::resource(format!("failed to read {}", resolved.display()), e)
        })?;

    if header.is_empty() {
        return Err(TranscodeError::validation(
            "input_path",
            path.display(),
            "file is empty",
        ));
    }
    if !sniff_raw_header(&header) {
        return Err(TranscodeError::validation(
            "input_path",
            path.display(),
            "file does not look like a RAW file",
        ));
    }
    Ok(resolved)
}

fn require_raw_extension(path: &Path) -> Result<()> {
    if is_raw_extension(path) {
        Ok(())
    } else {
        Err(TranscodeError::validation(
            "input_path",
            path.display(),
            "expected a .arw, .srf or .sr2 file",
        ))
    }
}

fn path_arg(field: &'static str, path: &Path) -> Result<String> {
    path.to_str().map(str::to_string).ok_or_else(|| {
        TranscodeError::security(
            SecurityErrorKind::DangerousCharacters,
            format!("{field} is not valid UTF-8: {}", path.display()),
        )
    })
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| {
        TranscodeError::resource(format!("failed to resolve {}", path.display()), e)
    })
}
