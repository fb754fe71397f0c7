// WMA Pro Decoder
//
// Copyright (c) 2007 Baptiste Coudurier, Benjamin Larsson, Ulion
// Copyright (c) 2008 - 2009 Sascha Sommer, Benjamin Larsson
//
// The following code is a derivative work of the code from the FFmpeg project,
// which is licensed LGPL v2.1. This code therefore is also licensed under the terms
// of the GNU Lesser General Public License, verison 2.1.

use bitstream_io::{BigEndian, BitWriter};

use crate::data::*;
use crate::vlc::VlcTable;
use crate::{CodecParameters, Decoder, Error};

/// Assembles test bitstreams one field at a time, MSB first.
#[derive(Debug, Clone, Default)]
pub(crate) struct BitBuilder {
    bits: Vec<bool>,
}

impl BitBuilder {
    pub fn new() -> BitBuilder {
        BitBuilder::default()
    }

    pub fn bit(&mut self, bit: bool) -> &mut Self {
        self.bits.push(bit);
        self
    }

    pub fn bits(&mut self, n: u32, value: u32) -> &mut Self {
        for i in (0..n).rev() {
            self.bits.push((value >> i) & 1 == 1);
        }
        self
    }

    pub fn signed(&mut self, n: u32, value: i32) -> &mut Self {
        let mask = if n == 32 { u32::max_value() } else { (1 << n) - 1 };
        self.bits(n, value as u32 & mask)
    }

    pub fn vlc(&mut self, table: &VlcTable, symbol: u16) -> &mut Self {
        let (code, len) = table.code(symbol).unwrap();
        self.bits(len as u32, code)
    }

    pub fn append(&mut self, other: &BitBuilder) -> &mut Self {
        self.bits.extend_from_slice(&other.bits);
        self
    }

    pub fn slice(&self, range: std::ops::Range<usize>) -> BitBuilder {
        BitBuilder {
            bits: self.bits[range].to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Overwrites `n` bits at `pos` with `value`.
    pub fn patch(&mut self, pos: usize, n: u32, value: u32) -> &mut Self {
        for i in 0..n as usize {
            self.bits[pos + i] = (value >> (n as usize - 1 - i)) & 1 == 1;
        }
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::new();
        {
            let mut writer = BitWriter::<_, BigEndian>::new(&mut data);
            for &bit in &self.bits {
                writer.write_bit(bit).unwrap();
            }
            writer.byte_align().unwrap();
        }
        data
    }

    /// Bytes zero padded to `bytes`.
    pub fn padded(&self, bytes: usize) -> Vec<u8> {
        assert!(self.len() <= bytes * 8, "{} bits overflow packet", self.len());
        let mut data = self.to_bytes();
        data.resize(bytes, 0);
        data
    }
}

const BLOCK_ALIGN: u16 = 256;
const FRAME_SIZE_BITS: u32 = 12;
const SAMPLES_PER_FRAME: usize = 2048;

fn params(channels: u16, channel_mask: u32, decode_flags: u16) -> CodecParameters {
    CodecParameters {
        sample_rate: 44100,
        channels,
        block_align: BLOCK_ALIGN,
        channel_mask,
        decode_flags,
        lossless: false,
    }
}

fn num_bands(decoder: &Decoder) -> usize {
    decoder.config().band_layout(SAMPLES_PER_FRAME).num_bands()
}

fn packet_header(sequence: u32, bits_prev: u32) -> BitBuilder {
    let mut bits = BitBuilder::new();
    bits.bits(4, sequence).bits(2, 0).bits(FRAME_SIZE_BITS, bits_prev);
    bits
}

fn flat_scale_factors(bits: &mut BitBuilder, num_bands: usize) {
    bits.bits(2, 0);
    for _ in 0..num_bands {
        bits.vlc(&SCALE_VLC, SCALE_DPCM_OFFSET as u16);
    }
}

/// Coefficient stream of a `len` long subframe with an optional single
/// value at index 0.
fn coefficients(bits: &mut BitBuilder, len: usize, first: Option<bool>) {
    bits.bit(true);
    let mut zeros = if let Some(positive) = first {
        let symbol = SYM_TO_VEC4.iter().position(|&v| v == [1, 0, 0, 0]).unwrap();
        bits.vlc(&VEC4_VLC, symbol as u16).bit(positive);
        3
    } else {
        bits.vlc(&VEC4_VLC, 0);
        4
    };
    // vector mode ends once the zero run exceeds len / 256
    while zeros <= len / 256 {
        bits.vlc(&VEC4_VLC, 0);
        zeros += 4;
    }
    bits.vlc(&COEF_VLC[0], RL_END);
}

/// One mono frame body with a single all zero subframe.
fn mono_frame(num_bands: usize, start_skip: Option<u32>) -> BitBuilder {
    let mut bits = BitBuilder::new();

    match start_skip {
        Some(skip) => bits.bit(true).bit(true).bits(12, skip).bit(false),
        None => bits.bit(false),
    };

    // extension header, reserved bit, transmit coefficients
    bits.bit(false).bit(false).bit(true);
    // no vector count, quant step 0
    bits.bit(false).signed(6, 0);
    flat_scale_factors(&mut bits, num_bands);
    coefficients(&mut bits, SAMPLES_PER_FRAME, None);

    bits
}

/// Wraps a frame body in a length prefix and a trailer bit, padding it to
/// `total_len` bits when given.
fn prefixed_frame(body: &BitBuilder, total_len: Option<usize>, more_frames: bool) -> BitBuilder {
    let mut frame = BitBuilder::new();
    frame.bits(FRAME_SIZE_BITS, 0).append(body);

    let len = total_len.unwrap_or(frame.len() + 1);
    while frame.len() < len - 1 {
        frame.bit(false);
    }
    frame.bit(more_frames);
    frame.patch(0, FRAME_SIZE_BITS, len as u32);

    frame
}

fn mono_packet(sequence: u32, num_bands: usize) -> Vec<u8> {
    let mut bits = packet_header(sequence, 0);
    bits.append(&mono_frame(num_bands, None)).bit(false);
    bits.padded(BLOCK_ALIGN as usize)
}

#[test]
fn mono_zero_stream_decodes_to_silence() {
    let mut decoder = Decoder::new(&params(1, 0x4, 0)).unwrap();
    let packet = mono_packet(0, num_bands(&decoder));

    let decoded = decoder.decode_packet(&packet).unwrap();

    assert!(decoded.errors.is_empty(), "{:?}", decoded.errors);
    assert!(!decoded.packet_loss);
    assert_eq!(decoded.frames, vec![Default::default()]);
    assert_eq!(decoded.samples.len(), SAMPLES_PER_FRAME);
    assert!(decoded.samples.iter().all(|&s| s == 0));
    assert_eq!(decoder.frames_decoded(), 1);
}

#[test]
fn oversized_previous_frame_only_costs_that_frame() {
    let mut decoder = Decoder::new(&params(1, 0x4, 0)).unwrap();
    let num_bands = num_bands(&decoder);

    let mut bits = packet_header(0, (1 << FRAME_SIZE_BITS) - 1);
    bits.append(&mono_frame(num_bands, None)).bit(false);

    let decoded = decoder
        .decode_packet(&bits.padded(BLOCK_ALIGN as usize))
        .unwrap();
    assert_eq!(decoded.errors.len(), 1);
    assert!(matches!(decoded.errors[0], Error::OutOfData));
    assert_eq!(decoded.frames.len(), 1);
    assert!(!decoded.frames[0].lossy);
    assert_eq!(decoded.samples.len(), SAMPLES_PER_FRAME);

    let decoded = decoder.decode_packet(&mono_packet(1, num_bands)).unwrap();
    assert!(decoded.errors.is_empty(), "{:?}", decoded.errors);
    assert_eq!(decoded.frames.len(), 1);
}

#[test]
fn single_sequence_gap_flags_one_packet() {
    let mut decoder = Decoder::new(&params(1, 0x4, 0)).unwrap();
    let num_bands = num_bands(&decoder);

    for i in 0..100u32 {
        let sequence = if i == 50 { (i + 1) % 16 } else { i % 16 };
        let decoded = decoder
            .decode_packet(&mono_packet(sequence, num_bands))
            .unwrap();

        assert_eq!(decoded.packet_loss, i == 50, "packet {}", i);
        if i == 50 {
            assert_eq!(decoded.errors.len(), 1);
            assert!(matches!(
                decoded.errors[0],
                Error::PacketLoss {
                    expected: 2,
                    found: 3
                }
            ));
        } else {
            assert!(decoded.errors.is_empty(), "packet {}: {:?}", i, decoded.errors);
        }
        assert_eq!(decoded.frames.len(), 1);
    }

    assert_eq!(decoder.frames_decoded(), 100);
}

#[test]
fn length_prefixed_frames_share_a_packet() {
    let mut decoder = Decoder::new(&params(1, 0x4, 0x40)).unwrap();
    let num_bands = num_bands(&decoder);

    let mut bits = packet_header(0, 0);
    // trailing junk inside the first frame is skipped by its length
    bits.append(&prefixed_frame(&mono_frame(num_bands, None), Some(400), true))
        .append(&prefixed_frame(&mono_frame(num_bands, Some(100)), None, false));

    let decoded = decoder
        .decode_packet(&bits.padded(BLOCK_ALIGN as usize))
        .unwrap();

    assert!(decoded.errors.is_empty(), "{:?}", decoded.errors);
    assert_eq!(decoded.frames.len(), 2);
    assert_eq!(decoded.frames[0].start_skip, None);
    assert_eq!(decoded.frames[1].start_skip, Some(100));
    assert_eq!(decoded.samples.len(), 2 * SAMPLES_PER_FRAME);
}

#[test]
fn frames_continue_across_packets() {
    let mut decoder = Decoder::new(&params(1, 0x4, 0x40)).unwrap();
    let num_bands = num_bands(&decoder);
    let packet_bits = BLOCK_ALIGN as usize * 8;

    let mut stream = prefixed_frame(&mono_frame(num_bands, None), None, true);
    stream.append(&prefixed_frame(&mono_frame(num_bands, Some(7)), Some(2500), false));

    let split = packet_bits - packet_header(0, 0).len();
    let mut first = packet_header(0, 0);
    first.append(&stream.slice(0..split));

    let mut second = packet_header(1, (stream.len() - split) as u32);
    second.append(&stream.slice(split..stream.len()));

    let decoded = decoder
        .decode_packet(&first.padded(BLOCK_ALIGN as usize))
        .unwrap();
    assert!(decoded.errors.is_empty(), "{:?}", decoded.errors);
    assert_eq!(decoded.frames.len(), 1);

    let decoded = decoder
        .decode_packet(&second.padded(BLOCK_ALIGN as usize))
        .unwrap();
    assert!(decoded.errors.is_empty(), "{:?}", decoded.errors);
    assert_eq!(decoded.frames.len(), 1);
    assert_eq!(decoded.frames[0].start_skip, Some(7));
    assert_eq!(decoded.samples.len(), SAMPLES_PER_FRAME);
}

#[test]
fn lost_packet_drops_the_continued_frame() {
    let mut decoder = Decoder::new(&params(1, 0x4, 0x40)).unwrap();
    let num_bands = num_bands(&decoder);

    let mut stream = prefixed_frame(&mono_frame(num_bands, None), None, true);
    stream.append(&prefixed_frame(&mono_frame(num_bands, None), Some(2500), false));

    let split = BLOCK_ALIGN as usize * 8 - packet_header(0, 0).len();
    let mut first = packet_header(0, 0);
    first.append(&stream.slice(0..split));

    let mut second = packet_header(5, (stream.len() - split) as u32);
    second.append(&stream.slice(split..stream.len()));
    second.append(&prefixed_frame(&mono_frame(num_bands, Some(9)), None, false));

    decoder
        .decode_packet(&first.padded(BLOCK_ALIGN as usize))
        .unwrap();
    let decoded = decoder
        .decode_packet(&second.padded(BLOCK_ALIGN as usize))
        .unwrap();

    assert!(decoded.packet_loss);
    assert_eq!(decoded.frames.len(), 1);
    assert_eq!(decoded.frames[0].start_skip, Some(9));
}

#[test]
fn continued_frame_trailer_does_not_end_the_packet() {
    let mut decoder = Decoder::new(&params(1, 0x4, 0x40)).unwrap();
    let num_bands = num_bands(&decoder);

    let mut stream = prefixed_frame(&mono_frame(num_bands, None), None, true);
    // the continued frame is the last of its packet
    stream.append(&prefixed_frame(&mono_frame(num_bands, Some(7)), Some(2500), false));

    let split = BLOCK_ALIGN as usize * 8 - packet_header(0, 0).len();
    let mut first = packet_header(0, 0);
    first.append(&stream.slice(0..split));

    let mut second = packet_header(1, (stream.len() - split) as u32);
    second.append(&stream.slice(split..stream.len()));
    second.append(&prefixed_frame(&mono_frame(num_bands, Some(9)), None, false));

    decoder
        .decode_packet(&first.padded(BLOCK_ALIGN as usize))
        .unwrap();
    let decoded = decoder
        .decode_packet(&second.padded(BLOCK_ALIGN as usize))
        .unwrap();

    assert!(decoded.errors.is_empty(), "{:?}", decoded.errors);
    let skips = decoded.frames.iter().map(|f| f.start_skip).collect::<Vec<_>>();
    assert_eq!(skips, vec![Some(7), Some(9)]);
    assert_eq!(decoded.samples.len(), 2 * SAMPLES_PER_FRAME);
    assert_eq!(decoder.frames_decoded(), 3);
}

#[test]
fn unprefixed_frame_runs_on_into_the_next_packet() {
    let mut decoder = Decoder::new(&params(1, 0x4, 0)).unwrap();
    let num_bands = num_bands(&decoder);
    let payload = BLOCK_ALIGN as usize * 8 - packet_header(0, 0).len();

    let mut frame = mono_frame(num_bands, None);
    frame.bit(true);

    // whole frames up to the last one, which does not fit
    let count = (payload - FRAME_SIZE_BITS as usize - 1) / frame.len();
    let mut stream = BitBuilder::new();
    for _ in 0..count {
        stream.append(&frame);
    }
    stream.append(&mono_frame(num_bands, Some(7))).bit(false);
    assert!(stream.len() > payload);

    let mut first = packet_header(0, 0);
    first.append(&stream.slice(0..payload));

    let mut second = packet_header(1, (stream.len() - payload) as u32);
    second.append(&stream.slice(payload..stream.len()));
    second.append(&mono_frame(num_bands, Some(9))).bit(false);

    let decoded = decoder
        .decode_packet(&first.padded(BLOCK_ALIGN as usize))
        .unwrap();
    assert!(decoded.errors.is_empty(), "{:?}", decoded.errors);
    assert_eq!(decoded.frames.len(), count);
    assert!(decoded.frames.iter().all(|f| !f.lossy));
    assert_eq!(decoded.samples.len(), count * SAMPLES_PER_FRAME);
    assert_eq!(decoder.frames_decoded(), count as u64);

    let decoded = decoder
        .decode_packet(&second.padded(BLOCK_ALIGN as usize))
        .unwrap();
    assert!(decoded.errors.is_empty(), "{:?}", decoded.errors);
    let skips = decoded.frames.iter().map(|f| f.start_skip).collect::<Vec<_>>();
    assert_eq!(skips, vec![Some(7), Some(9)]);
    assert!(decoded.frames.iter().all(|f| !f.lossy));
    assert_eq!(decoded.samples.len(), 2 * SAMPLES_PER_FRAME);
}

#[test]
fn stereo_frame_with_uneven_subframes() {
    let mut decoder = Decoder::new(&params(2, 0x3, 0x10)).unwrap();
    assert_eq!(decoder.config().max_num_subframes(), 4);
    let bands_1024 = decoder.config().band_layout(1024).num_bands();

    let mut bits = packet_header(0, 0);
    // tiling: right 2048, then left 1024, 512 and an implied 512
    bits.bit(false).bits(2, 0b01).bits(2, 0).bits(2, 1).bits(2, 2);
    // post processing, skip info
    bits.bit(false).bit(false);

    // left 1024: extension, reserved, transform bit, transmit
    bits.bit(false).bit(false).bit(false).bit(true);
    bits.bit(false).signed(6, 0);
    flat_scale_factors(&mut bits, bands_1024);
    coefficients(&mut bits, 1024, Some(true));

    // right 2048: silent
    bits.bit(false).bit(false).bit(false).bit(false);

    // left 512: reuses the resampled scale factors
    bits.bit(false).bit(false).bit(false).bit(true);
    bits.bit(false).signed(6, 0).bit(false);
    coefficients(&mut bits, 512, Some(false));

    // left 512: silent
    bits.bit(false).bit(false).bit(false).bit(false);
    bits.bit(false);

    let decoded = decoder
        .decode_packet(&bits.padded(BLOCK_ALIGN as usize))
        .unwrap();

    assert!(decoded.errors.is_empty(), "{:?}", decoded.errors);
    assert_eq!(decoded.frames.len(), 1);
    assert!(!decoded.frames[0].lossy);
    assert_eq!(decoded.samples.len(), 2 * SAMPLES_PER_FRAME);

    let left = decoded.samples.iter().step_by(2).cloned().collect::<Vec<_>>();
    let right = decoded.samples.iter().skip(1).step_by(2).cloned().collect::<Vec<_>>();
    assert!(right.iter().all(|&s| s == 0));
    assert!(left.iter().any(|&s| s != 0));

    // the next frame flushes the 512 sample subframes of the left channel
    let decoded = decoder.decode_packet(&silent_stereo_packet(1)).unwrap();
    assert!(decoded.errors.is_empty(), "{:?}", decoded.errors);
    assert_eq!(decoded.samples.len(), 2 * SAMPLES_PER_FRAME);

    let left = decoded.samples.iter().step_by(2).cloned().collect::<Vec<_>>();
    assert!(left[..512].iter().any(|&s| s != 0));
    assert!(decoded.samples.iter().skip(1).step_by(2).all(|&s| s == 0));
}

fn silent_stereo_packet(sequence: u32) -> Vec<u8> {
    let mut bits = packet_header(sequence, 0);
    // single tile, post processing, skip info
    bits.bit(true).bits(2, 0).bit(false).bit(false);
    // extension, reserved, transform bit, mid/side on every band
    bits.bit(false).bit(false).bit(false).bit(false).bit(true);
    // neither channel transmits, trailer
    bits.bit(false).bit(false).bit(false);
    bits.padded(BLOCK_ALIGN as usize)
}

#[test]
fn aborted_frame_resyncs_on_its_length() {
    let mut decoder = Decoder::new(&params(1, 0x4, 0x40)).unwrap();
    let num_bands = num_bands(&decoder);

    let mut broken = BitBuilder::new();
    // skip info absent, no extension header, reserved bit set
    broken.bit(false).bit(false).bit(true);

    let mut bits = packet_header(0, 0);
    bits.append(&prefixed_frame(&broken, Some(64), true))
        .append(&prefixed_frame(&mono_frame(num_bands, None), None, false));

    let decoded = decoder
        .decode_packet(&bits.padded(BLOCK_ALIGN as usize))
        .unwrap();

    assert_eq!(decoded.errors.len(), 1);
    assert!(matches!(decoded.errors[0], Error::MalformedFrame(_)));
    assert_eq!(decoded.frames.len(), 2);
    assert!(decoded.frames[0].lossy);
    assert!(!decoded.frames[1].lossy);
    assert!(decoded.samples.iter().all(|&s| s == 0));
}

#[test]
fn mid_side_pair_moves_energy_to_one_channel() {
    let mut decoder = Decoder::new(&params(2, 0x3, 0)).unwrap();
    let num_bands = num_bands(&decoder);

    let mut bits = packet_header(0, 0);
    // post processing, skip info, extension header, reserved bit
    bits.bit(false).bit(false).bit(false).bit(false);
    // channel transform: mid/side on every band
    bits.bit(false).bit(false).bit(true);
    // both channels transmit, no vector count, quant step 0, no modifiers
    bits.bit(true).bit(true).bit(false).signed(6, 0).bits(3, 0).bit(false).bit(false);
    flat_scale_factors(&mut bits, num_bands);
    flat_scale_factors(&mut bits, num_bands);
    coefficients(&mut bits, SAMPLES_PER_FRAME, Some(true));
    coefficients(&mut bits, SAMPLES_PER_FRAME, Some(true));
    bits.bit(false);

    let decoded = decoder
        .decode_packet(&bits.padded(BLOCK_ALIGN as usize))
        .unwrap();

    assert!(decoded.errors.is_empty(), "{:?}", decoded.errors);
    assert_eq!(decoded.samples.len(), 2 * SAMPLES_PER_FRAME);

    let left = decoded.samples.iter().step_by(2);
    let right = decoded.samples.iter().skip(1).step_by(2);
    assert!(left.cloned().all(|s| s == 0));
    assert!(right.cloned().any(|s| s.abs() > 1));
}

#[test]
fn six_channel_output_is_remapped() {
    let mut decoder = Decoder::new(&params(6, 0x3F, 0)).unwrap();
    assert_eq!(decoder.config().lfe_channel(), Some(3));
    let num_bands = num_bands(&decoder);

    let mut bits = packet_header(0, 0);
    bits.bit(false).bit(false).bit(false).bit(false);
    // one group of all six channels without a transform
    bits.bit(false).bits(6, 0b11_1111).bit(false);
    // only channel 2 transmits
    bits.bits(6, 0b00_1000);
    bits.bit(false).signed(6, 0).bits(3, 0).bits(6, 0);
    for _ in 0..6 {
        flat_scale_factors(&mut bits, num_bands);
    }
    coefficients(&mut bits, SAMPLES_PER_FRAME, Some(false));
    bits.bit(false);

    let decoded = decoder
        .decode_packet(&bits.padded(BLOCK_ALIGN as usize))
        .unwrap();

    assert!(decoded.errors.is_empty(), "{:?}", decoded.errors);
    assert_eq!(decoded.samples.len(), 6 * SAMPLES_PER_FRAME);

    for (pos, &sample) in decoded.samples.iter().enumerate() {
        if pos % 6 != SIX_CHANNEL_LAYOUT[2] {
            assert_eq!(sample, 0, "sample {}", pos);
        }
    }
    assert!(decoded
        .samples
        .iter()
        .skip(SIX_CHANNEL_LAYOUT[2])
        .step_by(6)
        .any(|&s| s.abs() > 1));
}

#[test]
fn short_packets_are_rejected() {
    let mut decoder = Decoder::new(&params(1, 0x4, 0)).unwrap();

    assert!(matches!(
        decoder.decode_packet(&[0u8; 16]),
        Err(Error::PacketTooShort {
            len: 16,
            block_align: 256
        })
    ));
    assert_eq!(decoder.frames_decoded(), 0);
}

#[test]
fn reset_restarts_the_sequence() {
    let mut decoder = Decoder::new(&params(1, 0x4, 0)).unwrap();
    let num_bands = num_bands(&decoder);

    decoder.decode_packet(&mono_packet(0, num_bands)).unwrap();
    decoder.reset();

    let decoded = decoder.decode_packet(&mono_packet(0, num_bands)).unwrap();
    assert!(!decoded.packet_loss);
    assert_eq!(decoder.frames_decoded(), 1);
}

#[test]
fn invalid_parameters_are_rejected() {
    assert!(matches!(
        Decoder::new(&params(9, 0, 0)),
        Err(Error::UnsupportedChannelCount(9))
    ));

    let mut no_align = params(1, 0, 0);
    no_align.block_align = 0;
    assert!(matches!(Decoder::new(&no_align), Err(Error::InvalidBlockAlign)));
}
