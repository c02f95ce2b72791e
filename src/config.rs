//! Configuration loading, validation, and merging.
//!
//! A `rawfit.toml` file is optional. Stock defaults are the base layer; the
//! user file is merged on top key by key, and CLI flags override both.
//!
//! ## Configuration Options
//!
//! ```toml
//! # Every key may be omitted; the values below are the defaults
//!
//! [security]
//! allowed_commands = ["darktable-cli"]  # Executables that may be spawned
//! converter = "darktable-cli"           # RAW converter; must be allow-listed
//! # temp_dir = "/var/tmp/rawfit"        # Default: system temp dir
//! max_file_size = 104857600             # Input and converter output ceiling (100 MiB)
//! command_timeout_secs = 30             # Wall-clock limit for the converter
//! validate_inputs = true                # Path shape + extension checks
//!
//! [encoding]
//! format = "lossless"                   # "lossless" (PNG) or "lossy" (JPEG)
//! max_bytes = 7340032                   # Output budget (7 MiB)
//! # max_width = 4096
//! # max_height = 4096
//! quality = 85                          # Lossy only, 1-100
//!
//! [raw]
//! bitness = 16                          # 8 or 16
//! compression = 6                       # 0-9
//! color_space = "sRGB"                  # sRGB, AdobeRGB, ProPhoto
//! white_balance = "camera"              # camera, auto, manual
//! keep_temp = false
//!
//! [batch]
//! # max_processes = 4                   # Omit for auto = CPU cores
//! ```
//!
//! A misspelled key fails the load instead of being ignored.

use crate::imaging::{DEFAULT_MAX_BYTES, EncodingConstraints, OutputFormat, Quality};
use crate::raw::{RawConversionOptions, RawConverter};
use crate::security::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONVERTER, MAX_FILE_SIZE, SecurityPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Full configuration.
///
/// All fields have defaults; a config file only needs the values it overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranscodeConfig {
    pub security: SecurityConfig,
    pub encoding: EncodingConfig,
    pub raw: RawConversionOptions,
    pub batch: BatchConfig,
}

impl TranscodeConfig {
    /// Reject values the pipeline cannot honor: empty command names, an
    /// unlisted converter, zero budgets or timeouts, out-of-range raw options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let security = &self.security;
        if security.allowed_commands.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "security.allowed_commands must not contain empty names".into(),
            ));
        }
        if !security.allowed_commands.contains(&security.converter) {
            return Err(ConfigError::Validation(format!(
                "security.converter '{}' is not in security.allowed_commands",
                security.converter
            )));
        }
        if security.max_file_size == 0 {
            return Err(ConfigError::Validation(
                "security.max_file_size must be greater than zero".into(),
            ));
        }
        if security.command_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "security.command_timeout_secs must be greater than zero".into(),
            ));
        }
        self.to_constraints()
            .validate()
            .map_err(|e| ConfigError::Validation(format!("encoding: {e}")))?;
        self.raw
            .validate()
            .map_err(|e| ConfigError::Validation(format!("raw: {e}")))?;
        if self.batch.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "batch.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn to_policy(&self) -> SecurityPolicy {
        let s = &self.security;
        SecurityPolicy {
            allowed_commands: s.allowed_commands.iter().cloned().collect(),
            allowed_temp_dir: s.temp_dir.clone().unwrap_or_else(std::env::temp_dir),
            input_root: None,
            max_file_size: s.max_file_size,
            command_timeout: Duration::from_secs(s.command_timeout_secs),
            validate_inputs: s.validate_inputs,
        }
    }

    pub fn to_constraints(&self) -> EncodingConstraints {
        let e = &self.encoding;
        EncodingConstraints {
            max_bytes: e.max_bytes,
            max_width: e.max_width,
            max_height: e.max_height,
            quality: e.quality,
            format: e.format,
        }
    }

    pub fn converter(&self) -> RawConverter {
        RawConverter::new(&self.security.converter)
    }
}

/// `[security]`: what may run and what may be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    pub allowed_commands: Vec<String>,
    /// Executable used for RAW conversion. Must appear in `allowed_commands`.
    pub converter: String,
    /// Where temp artifacts go. `None` = system temp dir.
    pub temp_dir: Option<PathBuf>,
    pub max_file_size: u64,
    pub command_timeout_secs: u64,
    pub validate_inputs: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_commands: vec![DEFAULT_CONVERTER.to_string()],
            converter: DEFAULT_CONVERTER.to_string(),
            temp_dir: None,
            max_file_size: MAX_FILE_SIZE,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT.as_secs(),
            validate_inputs: true,
        }
    }
}

/// `[encoding]`: output format and budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    pub format: OutputFormat,
    pub max_bytes: u64,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub quality: u32,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            max_bytes: DEFAULT_MAX_BYTES,
            max_width: None,
            max_height: None,
            quality: Quality::default().value(),
        }
    }
}

/// `[batch]`: parallelism for tree transcodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Maximum parallel workers. `None` = one per core.
    pub max_processes: Option<usize>,
}

/// Resolve the worker count: capped at the number of cores, user can constrain down, not up.
pub fn effective_threads(config: &BatchConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Layering: stock defaults, then the user file
// =============================================================================

/// `TranscodeConfig::default()` serialized to a TOML table, the bottom layer
/// that user files are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(TranscodeConfig::default())?)
}

/// Layer `overlay` over `base`.
///
/// Nested tables combine per key, so `[encoding] quality = 70` leaves the
/// other `[encoding]` defaults alone. Anything that is not a table on both
/// sides (arrays included) is replaced wholesale.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Apply `overlay` (if any), deserialize the result, and run [`TranscodeConfig::validate`].
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<TranscodeConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: TranscodeConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config, merging `path` (when given) over stock defaults.
///
/// An explicitly named file that does not exist is an error.
pub fn load_config(path: Option<&Path>) -> Result<TranscodeConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = path.map(load_raw_config).transpose()?;
    resolve_config(base, overlay)
}

/// Annotated default config printed by `rawfit gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# rawfit Configuration
# =====================
# Every key is optional; delete whatever you want left at its default.
# Values shown below are the defaults. Command-line flags override them.
# A misspelled key is an error, not a silent no-op.

# ---------------------------------------------------------------------------
# Security
# ---------------------------------------------------------------------------
[security]
# Exact executable names that may be spawned. Nothing else ever runs.
allowed_commands = ["darktable-cli"]

# RAW converter to run. Must be one of allowed_commands.
converter = "darktable-cli"

# Directory for temp artifacts and the converter's working directory.
# Defaults to the system temp directory.
# temp_dir = "/var/tmp/rawfit"

# Largest input file or converter output accepted, in bytes (100 MiB).
max_file_size = 104857600

# Seconds before the converter is killed.
command_timeout_secs = 30

# Reject absolute paths, traversal, shell metacharacters and unknown
# extensions in input paths. The size ceiling applies either way.
validate_inputs = true

# ---------------------------------------------------------------------------
# Output encoding
# ---------------------------------------------------------------------------
[encoding]
# "lossless" (PNG) or "lossy" (JPEG).
format = "lossless"

# Byte budget. Images are downscaled until they fit, or until the scale
# would drop below 10% of the original, whichever comes first.
max_bytes = 7340032

# Optional dimension caps, applied when the full-size encode is over budget.
# max_width = 4096
# max_height = 4096

# JPEG quality (1 = worst, 100 = best). Ignored for lossless output.
quality = 85

# ---------------------------------------------------------------------------
# RAW conversion (.arw, .srf, .sr2)
# ---------------------------------------------------------------------------
[raw]
# PNG bit depth: 8 or 16.
bitness = 16

# PNG compression level, 0-9.
compression = 6

# sRGB, AdobeRGB or ProPhoto.
color_space = "sRGB"

# camera, auto or manual.
white_balance = "camera"

# Tone adjustments. Accepted for compatibility; not passed to the converter.
exposure = 0.0
contrast = 0.0
saturation = 0.0

# Leave the converter's output PNG in the temp directory.
keep_temp = false

# Per-conversion temp directory (overrides security.temp_dir).
# temp_dir = "/var/tmp/rawfit-raw"

# ---------------------------------------------------------------------------
# Batch processing
# ---------------------------------------------------------------------------
[batch]
# Maximum parallel workers. Omit for auto (one per CPU core).
# Values above the core count are clamped down.
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::OutputFormat;
    use crate::raw::{ColorSpace, WhiteBalance};
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = TranscodeConfig::default();
        assert_eq!(config.security.allowed_commands, vec!["darktable-cli"]);
        assert_eq!(config.security.max_file_size, 100 * 1024 * 1024);
        assert_eq!(config.security.command_timeout_secs, 30);
        assert_eq!(config.encoding.format, OutputFormat::Lossless);
        assert_eq!(config.encoding.max_bytes, 7 * 1024 * 1024);
        assert_eq!(config.encoding.quality, 85);
        assert_eq!(config.raw.bitness, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[encoding]
format = "jpeg"
max_bytes = 1000000
"#;
        let config: TranscodeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.encoding.format, OutputFormat::Lossy);
        assert_eq!(config.encoding.max_bytes, 1_000_000);
        // Unspecified values are defaults
        assert_eq!(config.encoding.quality, 85);
        assert_eq!(config.raw.color_space, ColorSpace::Srgb);
    }

    #[test]
    fn unknown_keys_rejected() {
        let result: Result<TranscodeConfig, _> = toml::from_str("[encoding]\nformt = \"png\"");
        assert!(result.is_err());
    }

    // =========================================================================
    // Conversion into runtime types
    // =========================================================================

    #[test]
    fn to_policy_maps_security_section() {
        let mut config = TranscodeConfig::default();
        config.security.allowed_commands.push("rawtherapee-cli".into());
        config.security.temp_dir = Some(PathBuf::from("/var/tmp/x"));
        config.security.command_timeout_secs = 5;
        config.security.validate_inputs = false;

        let policy = config.to_policy();
        assert!(policy.allowed_commands.contains("rawtherapee-cli"));
        assert!(policy.allowed_commands.contains("darktable-cli"));
        assert_eq!(policy.allowed_temp_dir, PathBuf::from("/var/tmp/x"));
        assert_eq!(policy.command_timeout, Duration::from_secs(5));
        assert!(!policy.validate_inputs);
    }

    #[test]
    fn to_policy_defaults_to_system_temp() {
        let policy = TranscodeConfig::default().to_policy();
        assert_eq!(policy, SecurityPolicy::default());
    }

    #[test]
    fn to_constraints_maps_encoding_section() {
        let mut config = TranscodeConfig::default();
        config.encoding.max_width = Some(2048);
        config.encoding.quality = 70;

        let c = config.to_constraints();
        assert_eq!(c.max_width, Some(2048));
        assert_eq!(c.max_height, None);
        assert_eq!(c.quality, 70);
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn converter_must_be_allow_listed() {
        let mut config = TranscodeConfig::default();
        config.security.converter = "rawtherapee-cli".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn zero_budget_rejected() {
        let mut config = TranscodeConfig::default();
        config.encoding.max_bytes = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_bytes"));
    }

    #[test]
    fn bad_raw_bitness_rejected() {
        let mut config = TranscodeConfig::default();
        config.raw.bitness = 12;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bitness"));
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = TranscodeConfig::default();
        config.security.command_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_processes_rejected() {
        let mut config = TranscodeConfig::default();
        config.batch.max_processes = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = BatchConfig {
            max_processes: Some(cores + 16),
        };
        assert_eq!(effective_threads(&config), cores);
        assert_eq!(effective_threads(&BatchConfig::default()), cores);
        assert_eq!(
            effective_threads(&BatchConfig {
                max_processes: Some(1)
            }),
            1
        );
    }

    // =========================================================================
    // Loading and merging
    // =========================================================================

    #[test]
    fn load_config_without_file_is_default() {
        let config = load_config(None).unwrap();
        assert_eq!(config, TranscodeConfig::default());
    }

    #[test]
    fn load_config_merges_file_over_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rawfit.toml");
        fs::write(
            &path,
            r#"
[raw]
white_balance = "auto"

[encoding]
max_width = 1920
"#,
        )
        .unwrap();

        let config = load_config(Some(path.as_path())).unwrap();
        assert_eq!(config.raw.white_balance, WhiteBalance::Auto);
        assert_eq!(config.raw.bitness, 16);
        assert_eq!(config.encoding.max_width, Some(1920));
        assert_eq!(config.encoding.max_bytes, DEFAULT_MAX_BYTES);
    }

    #[test]
    fn load_config_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let result = load_config(Some(tmp.path().join("absent.toml").as_path()));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rawfit.toml");
        fs::write(&path, "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(Some(path.as_path())), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_runs_validation() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("rawfit.toml");
        fs::write(&path, "[raw]\ncompression = 12\n").unwrap();
        assert!(matches!(
            load_config(Some(path.as_path())),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn merge_replaces_arrays_and_keeps_siblings() {
        let base: toml::Value =
            toml::from_str("[security]\nallowed_commands = [\"a\"]\nvalidate_inputs = true")
                .unwrap();
        let overlay: toml::Value = toml::from_str("[security]\nallowed_commands = [\"b\"]").unwrap();
        let merged = merge_toml(base, overlay);
        let security = merged.get("security").unwrap();
        assert_eq!(
            security.get("allowed_commands").unwrap().as_array().unwrap().len(),
            1
        );
        assert_eq!(security.get("validate_inputs").unwrap().as_bool(), Some(true));
    }

    #[test]
    fn stock_config_toml_round_trips_to_defaults() {
        let parsed: TranscodeConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(parsed, TranscodeConfig::default());
    }
}
