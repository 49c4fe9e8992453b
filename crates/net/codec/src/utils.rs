//! Bounds-checked field access and wire time helpers.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy_primitives::{B256, B512};

use crate::CodecError;

/// Cursor over a message body that fails instead of panicking on short input.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Consume exactly `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.buf.len() < len {
            return Err(CodecError::Truncated {
                needed: len,
                available: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.read_array().map(u16::from_be_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.read_array().map(u32::from_be_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        self.read_array().map(u64::from_be_bytes)
    }

    /// Read a u32 flag that may only be 0 or 1.
    pub fn read_flag(&mut self, field: &'static str) -> Result<bool, CodecError> {
        match self.read_u32()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(CodecError::InvalidField { field, value }),
        }
    }

    pub fn read_b256(&mut self) -> Result<B256, CodecError> {
        self.read_array().map(B256::new)
    }

    pub fn read_b512(&mut self) -> Result<B512, CodecError> {
        self.read_array().map(B512::new)
    }

    /// Read `count` consecutive 32-byte values.
    pub fn read_b256_list(&mut self, count: usize) -> Result<Vec<B256>, CodecError> {
        let needed = count.checked_mul(32).ok_or(CodecError::Truncated {
            needed: usize::MAX,
            available: self.buf.len(),
        })?;
        let raw = self.take(needed)?;
        Ok(raw.chunks_exact(32).map(B256::from_slice).collect())
    }

    /// Consume the rest of the body as 32-byte values.
    ///
    /// Fails if the remainder is not an exact multiple of 32 bytes.
    pub fn rest_b256_list(&mut self) -> Result<Vec<B256>, CodecError> {
        let len = self.buf.len();
        if len % 32 != 0 {
            return Err(CodecError::MisalignedTrailer { len, unit: 32 });
        }
        self.read_b256_list(len / 32)
    }

    /// Consume everything that is left.
    pub fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    /// Require that the body has been fully consumed.
    pub fn finish(&self) -> Result<(), CodecError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes(self.buf.len()))
        }
    }
}

/// Current wall-clock time as microseconds since the UNIX epoch.
#[inline]
pub fn current_unix_micros() -> u64 {
    system_time_to_micros(SystemTime::now())
}

/// Absolute time as microseconds since the UNIX epoch. Times before the
/// epoch clamp to zero.
#[inline]
pub fn system_time_to_micros(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(duration_to_micros)
        .unwrap_or_default()
}

#[inline]
pub fn micros_to_system_time(micros: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_micros(micros)
}

/// Relative duration in microseconds, saturating at `u64::MAX`.
#[inline]
pub fn duration_to_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
