//! Error types for frame decoding.

/// Error type for frame and field decoding.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Buffer ended before a field could be read.
    #[error("truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// Frame larger than the maximum frame size.
    #[error("frame of {size} bytes exceeds maximum {max}")]
    Oversize { size: usize, max: usize },

    /// Variable trailer is not a whole number of fixed-size elements.
    #[error("trailer of {len} bytes is not a multiple of {unit}")]
    MisalignedTrailer { len: usize, unit: usize },

    /// Fixed-size body followed by extra bytes.
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    /// Message type code not known to this protocol.
    #[error("unknown message type {0}")]
    UnknownType(u16),

    /// Declared size does not match the bytes present.
    #[error("declared length {declared} does not match actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Boolean or enumerated field holding an illegal value.
    #[error("invalid value {value} for {field}")]
    InvalidField { field: &'static str, value: u32 },

    /// IO error while reading or writing a stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
