//! Validation predicates applied to every externally influenced string.
//!
//! Command names, each converter argument, and each filesystem path are
//! checked independently before anything reaches process execution or the
//! filesystem. The checks are composable and fail fast with a specific
//! [`SecurityErrorKind`].
//!
//! | Check | Rejects |
//! |---|---|
//! | [`validate_command_name`] | names outside the allow-list, shell metacharacters |
//! | [`validate_arguments`] | metacharacters, `../` / `..\`, arguments over 4096 chars |
//! | [`validate_path`] | traversal, absolute paths, metacharacters, paths over 260 chars |
//! | [`validate_extension`] | extensions outside [`ALLOWED_EXTENSIONS`] |
//! | [`validate_size`] | files larger than the policy ceiling |
//!
//! There is no global policy. Every call receives a [`SecurityPolicy`] value.

use crate::error::{Result, SecurityErrorKind, TranscodeError};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Wall-clock limit for one external command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest input or converter output accepted (100 MiB).
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Longest accepted path, in characters (Windows `MAX_PATH`).
pub const MAX_PATH_LEN: usize = 260;

/// Longest accepted converter argument, in characters.
pub const MAX_ARG_LEN: usize = 4096;

/// Input extensions accepted anywhere in the pipeline.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".webp", ".tiff", ".bmp", ".arw", ".srf", ".sr2",
];

/// Extensions that must go through the RAW converter before decoding.
pub const RAW_EXTENSIONS: &[&str] = &[".arw", ".srf", ".sr2"];

/// Shell metacharacters never allowed in command names, arguments or paths.
const DANGEROUS_CHARS: &[char] = &[
    ';', '&', '|', '`', '\'', '"', '(', ')', '{', '}', '[', ']', '$', '<', '>',
];

const TRAVERSAL_TOKENS: &[&str] = &["../", "..\\"];

/// The converter every default policy allows.
pub const DEFAULT_CONVERTER: &str = "darktable-cli";

/// Security settings for one call.
///
/// Build one with [`SecurityPolicy::default`] and adjust with the `with_*`
/// methods. The value is read-only for the duration of the call it is passed to.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityPolicy {
    /// Exact executable names that may be spawned.
    pub allowed_commands: BTreeSet<String>,
    /// Directory that temp artifacts are created in and that the converter runs in.
    pub allowed_temp_dir: PathBuf,
    /// Directory relative input paths are resolved against. `None` = working directory.
    pub input_root: Option<PathBuf>,
    pub max_file_size: u64,
    pub command_timeout: Duration,
    /// When false, input paths skip shape and extension checks; the size
    /// ceiling and all command checks still apply.
    pub validate_inputs: bool,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            allowed_commands: BTreeSet::from([DEFAULT_CONVERTER.to_string()]),
            allowed_temp_dir: std::env::temp_dir(),
            input_root: None,
            max_file_size: MAX_FILE_SIZE,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            validate_inputs: true,
        }
    }
}

impl SecurityPolicy {
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.allowed_temp_dir = dir.into();
        self
    }

    pub fn with_input_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.input_root = Some(root.into());
        self
    }

    pub fn with_command(mut self, name: impl Into<String>) -> Self {
        self.allowed_commands.insert(name.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Resolve an already validated relative path against [`input_root`](Self::input_root).
    pub fn resolve_input(&self, path: &Path) -> PathBuf {
        match &self.input_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn find_dangerous(s: &str) -> Option<char> {
    s.chars().find(|c| DANGEROUS_CHARS.contains(c))
}

fn has_traversal_token(s: &str) -> bool {
    TRAVERSAL_TOKENS.iter().any(|t| s.contains(t))
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        TranscodeError::security(
            SecurityErrorKind::DangerousCharacters,
            format!("path is not valid UTF-8: {}", path.display()),
        )
    })
}

/// Check that `name` is allow-listed and free of shell metacharacters.
pub fn validate_command_name(name: &str, policy: &SecurityPolicy) -> Result<()> {
    if let Some(c) = find_dangerous(name) {
        return Err(TranscodeError::security(
            SecurityErrorKind::DangerousCharacters,
            format!("command contains dangerous character {c:?}: {name}"),
        ));
    }
    if !policy.allowed_commands.contains(name) {
        return Err(TranscodeError::security(
            SecurityErrorKind::CommandNotAllowed,
            format!("command not allowed: {name}"),
        ));
    }
    Ok(())
}

/// Check every argument of a converter invocation.
pub fn validate_arguments<S: AsRef<str>>(args: &[S]) -> Result<()> {
    for arg in args {
        let arg = arg.as_ref();
        if let Some(c) = find_dangerous(arg) {
            return Err(TranscodeError::security(
                SecurityErrorKind::DangerousCharacters,
                format!("argument contains dangerous character {c:?}: {arg}"),
            ));
        }
        if has_traversal_token(arg) {
            return Err(TranscodeError::security(
                SecurityErrorKind::PathTraversal,
                format!("argument contains path traversal sequence: {arg}"),
            ));
        }
        let len = arg.chars().count();
        if len > MAX_ARG_LEN {
            return Err(TranscodeError::security(
                SecurityErrorKind::ArgumentTooLong,
                format!("argument is {len} characters (max {MAX_ARG_LEN})"),
            ));
        }
    }
    Ok(())
}

/// Lexically normalize a path: drop `.` components and redundant separators.
///
/// `..` components are kept so the caller can reject them.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        if component != Component::CurDir {
            out.push(component);
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Validate a caller-supplied relative path and return its normalized form.
pub fn validate_path(path: &Path, _policy: &SecurityPolicy) -> Result<PathBuf> {
    let raw = path_str(path)?;
    if raw.is_empty() {
        return Err(TranscodeError::validation("path", "", "path is empty"));
    }

    let normalized = normalize_path(path);
    if has_traversal_token(raw)
        || normalized
            .components()
            .any(|c| c == Component::ParentDir)
    {
        return Err(TranscodeError::security(
            SecurityErrorKind::PathTraversal,
            format!("path traversal detected: {raw}"),
        ));
    }

    if normalized.is_absolute() || normalized.has_root() {
        return Err(TranscodeError::security(
            SecurityErrorKind::AbsolutePath,
            format!("absolute paths not allowed: {raw}"),
        ));
    }

    let clean = path_str(&normalized)?;
    if let Some(c) = find_dangerous(clean) {
        return Err(TranscodeError::security(
            SecurityErrorKind::DangerousCharacters,
            format!("path contains dangerous character {c:?}: {raw}"),
        ));
    }

    let len = clean.chars().count();
    if len > MAX_PATH_LEN {
        return Err(TranscodeError::security(
            SecurityErrorKind::PathTooLong,
            format!("path is {len} characters (max {MAX_PATH_LEN})"),
        ));
    }

    Ok(normalized)
}

/// Lowercased extension with a leading dot, e.g. `".arw"`.
pub fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}

pub fn validate_extension(path: &Path) -> Result<()> {
    match dotted_extension(path) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        Some(ext) => Err(TranscodeError::security(
            SecurityErrorKind::ExtensionNotAllowed,
            format!("file extension not allowed: {ext}"),
        )),
        None => Err(TranscodeError::security(
            SecurityErrorKind::ExtensionNotAllowed,
            format!("file has no extension: {}", path.display()),
        )),
    }
}

pub fn is_raw_extension(path: &Path) -> bool {
    dotted_extension(path).is_some_and(|ext| RAW_EXTENSIONS.contains(&ext.as_str()))
}

/// Reject buffers larger than `max_bytes`.
pub fn validate_byte_len(len: u64, max_bytes: u64) -> Result<()> {
    if len > max_bytes {
        return Err(TranscodeError::security(
            SecurityErrorKind::FileTooLarge,
            format!("{len} bytes exceeds the {max_bytes} byte ceiling"),
        ));
    }
    Ok(())
}

/// Reject files larger than `max_bytes`. Also rejects anything that is not a regular file.
pub fn validate_size(path: &Path, max_bytes: u64) -> Result<()> {
    let meta = std::fs::metadata(path).map_err(|e| {
        TranscodeError::resource(format!("failed to stat {}", path.display()), e)
    })?;
    if !meta.is_file() {
        return Err(TranscodeError::validation(
            "input_path",
            path.display(),
            "not a regular file",
        ));
    }
    validate_byte_len(meta.len(), max_bytes)
}

/// Full chain for path inputs: path shape → extension → size.
///
/// Returns the path resolved against the policy's input root, ready to open.
pub fn validate_input_path(path: &Path, policy: &SecurityPolicy) -> Result<PathBuf> {
    let checked = if policy.validate_inputs {
        let normalized = validate_path(path, policy)?;
        validate_extension(&normalized)?;
        normalized
    } else {
        path.to_path_buf()
    };
    let resolved = policy.resolve_input(&checked);
    validate_size(&resolved, policy.max_file_size)?;
    Ok(resolved)
}

/// Validate a path this crate generated inside the policy's temp directory.
pub fn validate_temp_path(path: &Path, policy: &SecurityPolicy) -> Result<()> {
    let raw = path_str(path)?;
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(TranscodeError::security(
            SecurityErrorKind::PathTraversal,
            format!("path traversal detected: {raw}"),
        ));
    }
    if !path.starts_with(&policy.allowed_temp_dir) {
        return Err(TranscodeError::security(
            SecurityErrorKind::OutsideTempDir,
            format!(
                "{raw} is outside the allowed temp directory {}",
                policy.allowed_temp_dir.display()
            ),
        ));
    }
    if let Some(c) = find_dangerous(raw) {
        return Err(TranscodeError::security(
            SecurityErrorKind::DangerousCharacters,
            format!("path contains dangerous character {c:?}: {raw}"),
        ));
    }
    validate_resolved_temp_parent(path, policy)
}

/// The lexical check above misses symlinks; resolve both sides and compare again.
fn validate_resolved_temp_parent(path: &Path, policy: &SecurityPolicy) -> Result<()> {
    let unresolvable = |what: &Path, e: std::io::Error| {
        TranscodeError::security(
            SecurityErrorKind::OutsideTempDir,
            format!("cannot resolve {}", what.display()),
        )
        .with_cause(e)
    };
    let root = &policy.allowed_temp_dir;
    let root = root.canonicalize().map_err(|e| unresolvable(root, e))?;
    let parent = path.parent().unwrap_or(path);
    let parent = parent.canonicalize().map_err(|e| unresolvable(parent, e))?;
    if !parent.starts_with(&root) {
        return Err(TranscodeError::security(
            SecurityErrorKind::OutsideTempDir,
            format!(
                "{} resolves outside the allowed temp directory {}",
                path.display(),
                root.display()
            ),
        ));
    }
    Ok(())
}
