// WMA Pro Decoder
//
// Copyright (c) 2007 Baptiste Coudurier, Benjamin Larsson, Ulion
// Copyright (c) 2008 - 2009 Sascha Sommer, Benjamin Larsson
//
// The following code is a derivative work of the code from the FFmpeg project,
// which is licensed LGPL v2.1. This code therefore is also licensed under the terms
// of the GNU Lesser General Public License, verison 2.1.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    IOError(io::Error),
    #[error("Bitstream exhausted")]
    OutOfData,
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
    #[error("Packet loss detected, expected sequence {expected} but found {found}")]
    PacketLoss { expected: u8, found: u8 },
    #[error("Packet of {len} bytes is shorter than block align {block_align}")]
    PacketTooShort { len: usize, block_align: usize },
    #[error("Unknown extradata size {0}")]
    InvalidExtradata(usize),
    #[error("Unsupported channel count: {0}")]
    UnsupportedChannelCount(u16),
    #[error("Invalid number of subframes: {0}")]
    InvalidSubframeCount(usize),
    #[error("Unsupported frame size: {0}")]
    UnsupportedFrameSize(usize),
    #[error("Block align is not set")]
    InvalidBlockAlign,
    #[error("Can't read {0} bits at once")]
    InvalidBitCount(u32),
    #[error("Invalid codebook: {0}")]
    InvalidCodebook(String),
}

impl Error {
    pub(crate) fn malformed<S: Into<String>>(reason: S) -> Self {
        Error::MalformedFrame(reason.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            Error::OutOfData
        } else {
            Error::IOError(error)
        }
    }
}
