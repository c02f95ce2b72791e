//! # rawfit
//!
//! Sandboxed RAW conversion and size-budgeted image transcoding.
//!
//! Images come in as paths or bytes, Sony RAW files are developed to PNG by an
//! allow-listed external converter, and everything leaves as a PNG or JPEG that
//! fits a byte budget, downscaled only as far as needed.
//!
//! # Architecture: Gate, Convert, Encode
//!
//! ```text
//! path ─► security gate ─┬─ RAW ─► converter (temp artifact, timeout) ─► PNG bytes ─┐
//!                        └─ image ─► read ──────────────────────────────────────────┼─► decode ─► adaptive encode ─► bytes / file
//! bytes ─► size ceiling ─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every stage returns a [`TranscodeError`]. Nothing is retried internally and
//! nothing is spawned or opened before the checks for it have passed.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`security`] | Policy plus the path, extension, size, command, and argument validators |
//! | [`lifecycle`] | Owner-only temp artifacts that are released exactly once |
//! | [`raw`] | RAW → PNG through darktable-cli: probe, argv, timeout, output checks |
//! | [`imaging`] | Decode, adaptive downscale-until-it-fits encode, file sinks |
//! | [`pipeline`] | One input end to end: gate → (convert) → decode → encode |
//! | [`batch`] | Directory trees in parallel with a serializable report |
//! | [`config`] | `rawfit.toml` loading, merging over stock defaults, validation |
//! | [`output`] | CLI output formatting |
//! | [`cancel`] | Cooperative cancellation shared across threads |
//! | [`error`] | The error taxonomy |
//!
//! # Design Decisions
//!
//! ## One Resolved Executable, Fixed Argument Vector
//!
//! The converter name is checked against an exact allow-list and resolved once
//! with `which`; the resolved path is what gets spawned, never a shell. Its
//! argument vector is built from enumerated option values and re-checked for
//! shell metacharacters before launch, so no caller-supplied string reaches
//! the command line except the validated input path.
//!
//! ## Downscale Only When Needed
//!
//! The encoder first tries the source at full resolution. Only when that
//! misses the budget does it apply the dimension cap and then step the scale
//! down by 20% per attempt, stopping at 10% of the original. If nothing fits,
//! the smallest candidate is returned with `budget_met = false` rather than an
//! error, so callers can decide whether an oversize result is acceptable.
//!
//! ## Pure-Rust Codecs
//!
//! Decoding and encoding use the `image` crate only (Lanczos3 resampling). The
//! single external process is the RAW converter, which has no pure-Rust
//! equivalent for Sony files.

pub mod batch;
pub mod cancel;
pub mod config;
pub mod error;
pub mod imaging;
pub mod lifecycle;
pub mod output;
pub mod pipeline;
pub mod raw;
pub mod security;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use cancel::CancelToken;
pub use error::{ExternalToolError, Result, SecurityErrorKind, TranscodeError};
pub use imaging::{Encoded, EncodingConstraints, Input, OutputFormat, Raster, encode};
pub use pipeline::{TranscodeRequest, Transcoded, transcode};
pub use raw::{RawConversionOptions, RawConverter, convert_raw};
pub use security::SecurityPolicy;
