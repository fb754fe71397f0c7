// WMA Pro Decoder
//
// Copyright (c) 2007 Baptiste Coudurier, Benjamin Larsson, Ulion
// Copyright (c) 2008 - 2009 Sascha Sommer, Benjamin Larsson
//
// The following code is a derivative work of the code from the FFmpeg project,
// which is licensed LGPL v2.1. This code therefore is also licensed under the terms
// of the GNU Lesser General Public License, verison 2.1.

//! MSB-first bit reader bounded by a declared bit length.
//!
//! Every component of the decoder reads through this type, so nothing past
//! the declared length is ever handed out: reads that would cross it fail
//! with [`Error::OutOfData`].

use bitstream_io::{BigEndian, BitReader as IoBitReader};

use std::io::Cursor;

use crate::vlc::VlcTable;
use crate::Error;

pub struct BitReader<'a> {
    data: &'a [u8],
    inner: IoBitReader<Cursor<&'a [u8]>, BigEndian>,
    bit_len: usize,
    pos: usize,
}

impl<'a> BitReader<'a> {
    /// Wraps `data`, exposing at most `bit_len` bits of it.
    pub fn new(data: &'a [u8], bit_len: usize) -> BitReader<'a> {
        let bit_len = bit_len.min(data.len() * 8);
        let data = &data[..(bit_len + 7) / 8];

        BitReader {
            data,
            inner: IoBitReader::new(Cursor::new(data)),
            bit_len,
            pos: 0,
        }
    }

    pub fn read_bits(&mut self, n: u32) -> Result<u32, Error> {
        if n > 32 {
            return Err(Error::InvalidBitCount(n));
        }
        if n == 0 {
            return Ok(0);
        }
        self.ensure(n as usize)?;

        let value = self.inner.read::<u32>(n)?;
        self.pos += n as usize;

        Ok(value)
    }

    pub fn read_bit(&mut self) -> Result<bool, Error> {
        self.ensure(1)?;

        let bit = self.inner.read_bit()?;
        self.pos += 1;

        Ok(bit)
    }

    /// Reads `n` bits as a two's complement signed value.
    pub fn read_signed(&mut self, n: u32) -> Result<i32, Error> {
        let value = self.read_bits(n)?;
        if n == 0 || n == 32 {
            return Ok(value as i32);
        }

        let shift = 32 - n;
        Ok(((value << shift) as i32) >> shift)
    }

    /// Returns the next `n` bits without consuming them.
    pub fn peek_bits(&self, n: u32) -> Result<u32, Error> {
        if n > 32 {
            return Err(Error::InvalidBitCount(n));
        }
        if n == 0 {
            return Ok(0);
        }
        self.ensure(n as usize)?;

        let mut lookahead =
            IoBitReader::<_, BigEndian>::new(Cursor::new(&self.data[self.pos / 8..]));
        lookahead.skip((self.pos % 8) as u32)?;

        Ok(lookahead.read::<u32>(n)?)
    }

    pub fn skip_bits(&mut self, n: usize) -> Result<(), Error> {
        self.ensure(n)?;

        let mut remaining = n;
        while remaining > 0 {
            let chunk = remaining.min(u32::max_value() as usize);
            self.inner.skip(chunk as u32)?;
            remaining -= chunk;
        }
        self.pos += n;

        Ok(())
    }

    /// Moves to the absolute bit position `pos`, backwards or forwards.
    pub fn seek(&mut self, pos: usize) -> Result<(), Error> {
        if pos > self.bit_len {
            return Err(Error::OutOfData);
        }

        self.inner = IoBitReader::new(Cursor::new(self.data));
        self.pos = 0;
        self.skip_bits(pos)
    }

    /// Walks `table` one code at a time; the decoded code must end inside
    /// the declared bit length.
    pub fn decode_vlc(&mut self, table: &VlcTable) -> Result<u16, Error> {
        if self.bits_left() == 0 {
            return Err(Error::OutOfData);
        }

        let symbol = match self.inner.read_huffman(table.tree()) {
            Ok(symbol) => symbol,
            Err(e) => {
                self.pos = self.bit_len;
                return Err(e.into());
            }
        };
        let len = table
            .code(symbol)
            .map(|(_, len)| len as usize)
            .ok_or_else(|| Error::InvalidCodebook(format!("no code for symbol {}", symbol)))?;

        if len > table.max_len() as usize || self.pos + len > self.bit_len {
            self.pos = self.bit_len;
            return Err(Error::OutOfData);
        }
        self.pos += len;

        Ok(symbol)
    }

    pub fn bits_consumed(&self) -> usize {
        self.pos
    }

    pub fn bits_left(&self) -> usize {
        self.bit_len - self.pos
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    fn ensure(&self, n: usize) -> Result<(), Error> {
        if n > self.bits_left() {
            Err(Error::OutOfData)
        } else {
            Ok(())
        }
    }
}
