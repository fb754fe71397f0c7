// WMA Pro Decoder
//
// Copyright (c) 2007 Baptiste Coudurier, Benjamin Larsson, Ulion
// Copyright (c) 2008 - 2009 Sascha Sommer, Benjamin Larsson
//
// The following code is a derivative work of the code from the FFmpeg project,
// which is licensed LGPL v2.1. This code therefore is also licensed under the terms
// of the GNU Lesser General Public License, verison 2.1.

use crate::bitreader::BitReader;
use crate::Error;

/// Bits of a frame that started in an earlier packet.
#[derive(Debug, Clone, Default)]
pub struct BitReservoir {
    buf: Vec<u8>,
    bit_len: usize,
}

impl BitReservoir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        BitReservoir {
            buf: Vec::with_capacity(bytes),
            bit_len: 0,
        }
    }

    /// Moves the next `len` bits of `reader` onto the end of the stored bits,
    /// packing them without gaps.
    pub fn append(&mut self, reader: &mut BitReader, len: usize) -> Result<(), Error> {
        if len == 0 {
            return Ok(());
        }
        if len > reader.bits_left() {
            return Err(Error::OutOfData);
        }

        let bit_offset = self.bit_len % 8;
        let mut remaining = len;

        self.buf.truncate((self.bit_len + 7) / 8);
        self.buf.reserve((len + 7) / 8 + 1);

        if bit_offset > 0 {
            let missing = (8 - bit_offset).min(remaining);
            let bits = reader.read_bits(missing as u32)? as u8;

            if let Some(last) = self.buf.last_mut() {
                *last |= bits << (8 - bit_offset - missing);
            }
            remaining -= missing;
        }

        while remaining >= 8 {
            self.buf.push(reader.read_bits(8)? as u8);
            remaining -= 8;
        }

        if remaining > 0 {
            let bits = reader.read_bits(remaining as u32)? as u8;
            self.buf.push(bits << (8 - remaining));
        }

        self.bit_len += len;

        Ok(())
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.bit_len = 0;
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn is_empty(&self) -> bool {
        self.bit_len == 0
    }

    /// Reader over exactly the stored bits.
    pub fn reader(&self) -> BitReader<'_> {
        BitReader::new(&self.buf, self.bit_len)
    }
}
