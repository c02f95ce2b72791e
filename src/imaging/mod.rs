//! Decoding, budget-driven encoding, and output sinks. Pure Rust, built on
//! the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::guess_format`, then ordered `load_from_memory_with_format` attempts |
//! | **Resize** | `DynamicImage::resize_exact` with Lanczos3 |
//! | **Encode → lossy** | `JpegEncoder` with caller quality |
//! | **Encode → lossless** | `PngEncoder`, best compression, adaptive filter |
//!
//! The module is split into:
//! - **Calculations**: pure scale and dimension math (unit testable)
//! - **Parameters**: [`Quality`], [`OutputFormat`], [`EncodingConstraints`]
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Decode**: [`Input`] → [`Raster`]
//! - **Adaptive**: the byte-budget search producing [`Encoded`]
//! - **Sink**: file and temp-artifact writers

pub mod adaptive;
pub mod backend;
pub mod calculations;
pub mod decode;
mod params;
pub mod rust_backend;
pub mod sink;

pub use adaptive::{Encoded, encode, encode_with_backend, encode_with_cancel};
pub use backend::ImageBackend;
pub use decode::{DECODE_CANDIDATES, Input, Raster, decode};
pub use params::{DEFAULT_MAX_BYTES, EncodingConstraints, OutputFormat, Quality};
pub use rust_backend::RustBackend;
pub use sink::{encode_to_file, encode_to_temp_file, ensure_extension, write_encoded};
