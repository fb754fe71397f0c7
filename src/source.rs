// WMA Pro Decoder
//
// Copyright (c) 2007 Baptiste Coudurier, Benjamin Larsson, Ulion
// Copyright (c) 2008 - 2009 Sascha Sommer, Benjamin Larsson
//
// The following code is a derivative work of the code from the FFmpeg project,
// which is licensed LGPL v2.1. This code therefore is also licensed under the terms
// of the GNU Lesser General Public License, verison 2.1.

use std::collections::VecDeque;

use crate::Decoder;

/// Decodes packets lazily and hands out interleaved samples, so a packet
/// stream can be played through rodio.
pub struct PacketSource<I: Iterator<Item = Vec<u8>>> {
    packets: I,
    decoder: Decoder,
    buffer: VecDeque<i16>,
}

impl<I: Iterator<Item = Vec<u8>>> PacketSource<I> {
    pub fn new(decoder: Decoder, packets: I) -> PacketSource<I> {
        PacketSource {
            packets,
            decoder,
            buffer: VecDeque::new(),
        }
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn into_decoder(self) -> Decoder {
        self.decoder
    }

    fn next_packet(&mut self) -> bool {
        while let Some(packet) = self.packets.next() {
            match self.decoder.decode_packet(&packet) {
                Ok(decoded) => {
                    for e in &decoded.errors {
                        log::debug!("packet error: {}", e);
                    }
                    if !decoded.samples.is_empty() {
                        self.buffer.extend(decoded.samples);
                        return true;
                    }
                }
                Err(e) => log::error!("ERROR packet: {}", e),
            }
        }

        log::info!(
            "END OF STREAM, {} frames processed",
            self.decoder.frames_decoded()
        );
        false
    }
}

impl<I: Iterator<Item = Vec<u8>>> Iterator for PacketSource<I> {
    type Item = i16;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.next_packet() {
            return None;
        }

        self.buffer.pop_front()
    }
}

impl<I: Iterator<Item = Vec<u8>>> rodio::Source for PacketSource<I> {
    #[inline]
    fn current_frame_len(&self) -> Option<usize> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.len())
        }
    }

    #[inline]
    fn channels(&self) -> u16 {
        self.decoder.config().channels() as u16
    }

    #[inline]
    fn sample_rate(&self) -> u32 {
        self.decoder.config().sample_rate()
    }

    #[inline]
    fn total_duration(&self) -> Option<std::time::Duration> {
        None
    }
}
