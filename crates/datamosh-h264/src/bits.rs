//! Bit-level reader over a byte source.
//!
//! Bits are consumed MSB-first from a one-byte buffer that is refilled from
//! the underlying reader whenever all eight bits have been used. Byte-level
//! reads are only allowed while the cursor is byte-aligned.

use crate::{Error, Result};
use std::io::{Read, Seek, SeekFrom};

/// Leading-zero run at which an Exp-Golomb code is considered corrupt.
const MAX_LEADING_ZEROS: u32 = 32;

/// Stateful bit cursor over a byte source.
#[derive(Debug)]
pub struct BitReader<R> {
    inner: R,
    octet: u8,
    // Unread bits left in `octet`; 0 means byte-aligned.
    remaining: u8,
}

impl<R: Read> BitReader<R> {
    /// Wrap a byte source. The cursor starts byte-aligned.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            octet: 0,
            remaining: 0,
        }
    }

    /// Whether the next bit starts a fresh byte.
    pub fn is_aligned(&self) -> bool {
        self.remaining == 0
    }

    /// Number of bits already consumed from the current byte (0..=7).
    pub fn bit_offset(&self) -> u8 {
        (8 - self.remaining) % 8
    }

    /// Read a single bit.
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.remaining == 0 {
            let mut buf = [0u8; 1];
            self.inner.read_exact(&mut buf).map_err(Error::from_read)?;
            self.octet = buf[0];
            self.remaining = 8;
        }

        self.remaining -= 1;
        Ok((self.octet >> self.remaining) & 0x01 != 0)
    }

    /// Read `width` bits, left-packed into `ceil(width / 8)` bytes.
    ///
    /// The low-order bits of the last byte are zero when `width` is not a
    /// multiple of eight.
    pub fn read_bits(&mut self, width: usize) -> Result<Vec<u8>> {
        let mut data = vec![0u8; width.div_ceil(8)];

        for i in 0..width {
            if self.read_bit()? {
                data[i / 8] |= 0x80 >> (i % 8);
            }
        }

        Ok(data)
    }

    /// Read `n` bits (0..=32) as a big-endian unsigned integer.
    pub fn read_uint(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(Error::InvalidWidth(n));
        }

        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | u32::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Read a single-bit flag.
    pub fn read_flag(&mut self) -> Result<bool> {
        self.read_bit()
    }

    /// Read an unsigned Exp-Golomb code, ue(v).
    pub fn read_ue(&mut self) -> Result<u32> {
        let mut leading_zeros = 0u32;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros >= MAX_LEADING_ZEROS {
                return Err(Error::InvalidCode { leading_zeros });
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let suffix = self.read_uint(leading_zeros)?;
        Ok((1u32 << leading_zeros) - 1 + suffix)
    }

    /// Fill `buf` with whole bytes. Fails unless the cursor is byte-aligned.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        if !self.is_aligned() {
            return Err(Error::Alignment {
                bit_offset: self.bit_offset(),
            });
        }
        self.inner.read_exact(buf).map_err(Error::from_read)
    }

    /// Unwrap the underlying reader. Any partially consumed byte is lost.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> BitReader<R> {
    /// Seek the underlying reader and reset the cursor to byte alignment.
    ///
    /// `SeekFrom::Current` is relative to the underlying reader, which is
    /// already past any partially consumed byte.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let position = self.inner.seek(pos)?;
        self.remaining = 0;
        Ok(position)
    }
}
