//! Property value codec.
//!
//! Property payloads are flat binary buffers laid out by a compact
//! per-field format descriptor (a struct-pack dialect). This module
//! handles both directions:
//! - `format` - Format descriptor grammar and item sizing
//! - `value` - The decoded record/scalar model
//! - `composite` - Well-known composite layouts (color, led)
//! - `unpack` - Buffer -> records, with bounds enforcement
//! - `pack` - Records -> buffer, plus the JSON display round-trip

pub mod composite;
pub mod format;
pub mod pack;
pub mod unpack;
pub mod value;

pub use composite::{layout_for, CompositeField, CompositeLayout};
pub use format::{ByteOrder, FormatCode, FormatField, FormatSpec};
pub use pack::{format_json, pack, unpack_json};
pub use unpack::unpack;
pub use value::{DecodedValue, Record, Scalar};

use thiserror::Error;

/// Why a value failed to encode or decode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("unknown format code {0:?}")]
    UnknownCode(char),
    #[error("format contains no codes")]
    EmptyFormat,
    #[error("repeat count with no code after it")]
    DanglingCount,
    #[error("code {0:?} is only available in native mode")]
    NativeOnly(char),
    #[error("value {value} outside [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
    #[error("field {field:?} value {value} outside [{min}, {max}]")]
    FieldOutOfRange {
        field: &'static str,
        value: f64,
        min: u64,
        max: u64,
    },
    #[error("expected {expected} values per record, got {actual}")]
    IncorrectValueCount { expected: usize, actual: usize },
    #[error("expected {expected}")]
    TypeMismatch { expected: &'static str },
    #[error("{actual} values exceed the registered record count {capacity}")]
    TooManyValues { capacity: u32, actual: usize },
    #[error("value {value} does not fit format code {code:?}")]
    Overflow { code: char, value: String },
    #[error("missing composite field {0:?}")]
    MissingField(&'static str),
    #[error("unexpected composite field {0:?}")]
    UnexpectedField(String),
}
