//! In-place payload nullification.

use crate::nal::NalUnit;
use crate::{Error, Result};
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::trace;

impl NalUnit {
    /// Overwrite the payload with zeros, leaving the header byte and the
    /// target's size untouched.
    ///
    /// The target must support random access: a failed seek is reported as
    /// [`Error::UnsupportedTarget`]. Nullifying an already nullified unit
    /// rewrites the same zeros.
    pub fn nullify<W: Write + Seek + ?Sized>(&self, target: &mut W) -> Result<()> {
        let size = target
            .seek(SeekFrom::End(0))
            .map_err(Error::UnsupportedTarget)?;

        let end = self.offset + self.length as u64;
        if end > size {
            return Err(Error::OutOfBounds {
                offset: self.offset,
                length: self.length,
                size,
            });
        }

        target
            .seek(SeekFrom::Start(self.payload_offset()))
            .map_err(Error::UnsupportedTarget)?;
        let written = io::copy(&mut io::repeat(0).take(self.payload_len() as u64), target)?;
        target.flush()?;

        trace!(offset = self.offset, bytes = written, "Nullified NAL payload");
        Ok(())
    }
}
