// WMA Pro Decoder
//
// Copyright (c) 2007 Baptiste Coudurier, Benjamin Larsson, Ulion
// Copyright (c) 2008 - 2009 Sascha Sommer, Benjamin Larsson
//
// The following code is a derivative work of the code from the FFmpeg project,
// which is licensed LGPL v2.1. This code therefore is also licensed under the terms
// of the GNU Lesser General Public License, verison 2.1.

//! Packet level decoder for WMA Pro style transform coded audio.
//!
//! A [`Decoder`] is built from out of band [`CodecParameters`] and then fed
//! one transport packet at a time. Each packet yields zero or more frames of
//! interleaved 16 bit PCM. [`PacketSource`] wraps a decoder and a packet
//! iterator into a `rodio::Source`.

mod bitreader;
pub use bitreader::BitReader;

mod config;
pub use config::{BandLayout, CodecParameters, StreamConfig};

mod coeffs;

mod data;

mod decoder;
use decoder::InverseTransform;

mod error;
pub use error::Error;

mod frame;
pub use frame::FrameInfo;
use frame::{decode_frame, FrameResult};

mod reservoir;
pub use reservoir::BitReservoir;

mod scale;

mod source;
pub use source::PacketSource;

mod state;
use state::DecoderState;

mod tile;
pub use tile::{FrameTiling, Subframe};

mod transform;
pub use transform::{ChannelGroup, ChannelTransform};

mod vlc;
pub use vlc::VlcTable;

#[cfg(test)]
mod tests;

/// Everything one packet produced.
#[derive(Debug, Default)]
pub struct DecodedPacket {
    /// Interleaved samples of every emitted frame, in order.
    pub samples: Vec<i16>,
    pub frames: Vec<FrameInfo>,
    /// The packet's sequence number did not follow the previous packet.
    pub packet_loss: bool,
    /// Recoverable errors met while decoding the packet.
    pub errors: Vec<Error>,
}

pub struct Decoder {
    config: StreamConfig,
    transform: InverseTransform,
    state: DecoderState,
}

impl Decoder {
    pub fn new(params: &CodecParameters) -> Result<Decoder, Error> {
        let config = StreamConfig::new(params)?;
        let transform = InverseTransform::new(&config);
        let state = DecoderState::new(&config);

        Ok(Decoder {
            config,
            transform,
            state,
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Frames emitted since the decoder was created or reset.
    pub fn frames_decoded(&self) -> u64 {
        self.state.frame_count
    }

    /// Drops all history, as after a seek.
    pub fn reset(&mut self) {
        self.state = DecoderState::new(&self.config);
    }

    /// Decodes one transport packet. Only the first `block_align` bytes
    /// take part in decoding.
    ///
    /// Returns `Err` only when the packet is too short. Everything that goes
    /// wrong inside the bitstream is reported through
    /// [`DecodedPacket::errors`] and the decoder stays usable.
    pub fn decode_packet(&mut self, packet: &[u8]) -> Result<DecodedPacket, Error> {
        let block_align = self.config.block_align;
        if packet.len() < block_align {
            return Err(Error::PacketTooShort {
                len: packet.len(),
                block_align,
            });
        }

        let mut decoded = DecodedPacket::default();
        let mut reader = BitReader::new(&packet[..block_align], block_align * 8);

        let expected = self.state.expected_sequence();
        self.state.packet_count += 1;

        let (sequence, bits_prev) = match read_packet_header(&mut reader, &self.config) {
            Ok(header) => header,
            Err(e) => {
                log::warn!("unreadable packet header: {}", e);
                self.state.reservoir.clear();
                decoded.errors.push(e);
                return Ok(decoded);
            }
        };

        log::debug!(
            "packet {} seq {} bits_prev {}",
            self.state.packet_count - 1,
            sequence,
            bits_prev
        );

        if sequence != expected {
            log::warn!("packet loss: expected sequence {} found {}", expected, sequence);
            decoded.packet_loss = true;
            decoded.errors.push(Error::PacketLoss {
                expected,
                found: sequence,
            });
        }

        let mut more_frames = true;

        if bits_prev > reader.bits_left() {
            log::warn!(
                "previous frame needs {} bits, packet holds {}",
                bits_prev,
                reader.bits_left()
            );
            decoded.errors.push(Error::OutOfData);
            self.state.reservoir.clear();
        } else if bits_prev > 0 {
            if decoded.packet_loss || self.state.reservoir.is_empty() {
                log::debug!("dropping {} bits of an incomplete frame", bits_prev);
                self.state.reservoir.clear();
                if let Err(e) = reader.skip_bits(bits_prev) {
                    decoded.errors.push(e);
                    return Ok(decoded);
                }
            } else {
                let mut reservoir = std::mem::take(&mut self.state.reservoir);
                let frame_end = reader.bits_consumed() + bits_prev;

                match reservoir.append(&mut reader, bits_prev) {
                    Ok(()) => {
                        // The trailer of the continued frame does not stop
                        // the frames that start in this packet.
                        let mut frame_reader = reservoir.reader();
                        let result = decode_frame(
                            &mut frame_reader,
                            &self.config,
                            &mut self.transform,
                            &mut self.state.channels,
                            &mut decoded.samples,
                        );
                        self.record(result, &mut decoded);
                    }
                    Err(e) => {
                        log::warn!("could not continue the previous frame: {}", e);
                        decoded.errors.push(e);
                    }
                }

                reservoir.clear();
                self.state.reservoir = reservoir;

                if reader.bits_consumed() != frame_end && reader.seek(frame_end).is_err() {
                    return Ok(decoded);
                }
            }
        } else {
            self.state.reservoir.clear();
        }

        let frame_size_bits = self.config.frame_size_bits();
        let mut synced = true;

        while more_frames && reader.bits_left() > frame_size_bits as usize {
            if self.config.len_prefix {
                match reader.peek_bits(frame_size_bits) {
                    Ok(len) if len > 0 && len as usize <= reader.bits_left() => {}
                    _ => break,
                }
            }

            // Without a length prefix a frame may run past the packet end,
            // it then continues in the next packet through the reservoir.
            let frame_start = reader.bits_consumed();
            let snapshot = if self.config.len_prefix {
                None
            } else {
                Some((self.state.channels.clone(), decoded.samples.len()))
            };

            let result = decode_frame(
                &mut reader,
                &self.config,
                &mut self.transform,
                &mut self.state.channels,
                &mut decoded.samples,
            );

            if let Some((channels, len)) = snapshot {
                if !result.synced && matches!(result.error, None | Some(Error::OutOfData)) {
                    log::debug!(
                        "frame at bit {} continues in the next packet",
                        frame_start
                    );
                    self.state.channels = channels;
                    decoded.samples.truncate(len);

                    if let Err(e) = reader.seek(frame_start) {
                        decoded.errors.push(e);
                        synced = false;
                    }
                    break;
                }
            }

            more_frames = result.more_frames;
            synced = result.synced;
            self.record(result, &mut decoded);

            if !synced {
                break;
            }
        }

        if synced {
            let left = reader.bits_left();
            if let Err(e) = self.state.reservoir.append(&mut reader, left) {
                decoded.errors.push(e);
            }
        } else {
            log::debug!("lost frame boundary, {} bits dropped", reader.bits_left());
            self.state.reservoir.clear();
        }

        Ok(decoded)
    }

    fn record(&mut self, result: FrameResult, decoded: &mut DecodedPacket) {
        if let Some(info) = result.info {
            self.state.frame_count += 1;
            decoded.frames.push(info);
        }
        if let Some(e) = result.error {
            decoded.errors.push(e);
        }
    }
}

/// Sequence number and the bit count of the frame continued from the
/// previous packet.
fn read_packet_header(reader: &mut BitReader, config: &StreamConfig) -> Result<(u8, usize), Error> {
    let sequence = reader.read_bits(4)? as u8;
    reader.skip_bits(2)?;
    let bits_prev = reader.read_bits(config.frame_size_bits())? as usize;

    Ok((sequence, bits_prev))
}
