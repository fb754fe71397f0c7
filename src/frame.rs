// WMA Pro Decoder
//
// Copyright (c) 2007 Baptiste Coudurier, Benjamin Larsson, Ulion
// Copyright (c) 2008 - 2009 Sascha Sommer, Benjamin Larsson
//
// The following code is a derivative work of the code from the FFmpeg project,
// which is licensed LGPL v2.1. This code therefore is also licensed under the terms
// of the GNU Lesser General Public License, verison 2.1.

use crate::bitreader::BitReader;
use crate::coeffs::decode_coeffs;
use crate::config::{log2, StreamConfig};
use crate::data::QUANT_STEP_BASE;
use crate::decoder::{dequantize, write_output, InverseTransform};
use crate::scale::decode_scale_factors;
use crate::state::ChannelState;
use crate::tile::{decode_tile_header, FrameTiling};
use crate::transform::{decode_channel_transform, inverse_channel_transform};
use crate::Error;

/// Side information of one emitted frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Set when decoding aborted and part of the frame is silence.
    pub lossy: bool,
    pub drc_gain: Option<u8>,
    pub start_skip: Option<u32>,
    pub end_skip: Option<u32>,
}

pub(crate) struct FrameResult {
    /// `None` when not even the frame length could be read.
    pub info: Option<FrameInfo>,
    pub more_frames: bool,
    /// The reader stopped on the boundary to the next frame.
    pub synced: bool,
    pub error: Option<Error>,
}

/// Decodes one frame from `reader` and appends its samples. Errors inside
/// the frame leave silence in place of the missing audio.
pub(crate) fn decode_frame(
    reader: &mut BitReader,
    config: &StreamConfig,
    transform: &mut InverseTransform,
    channels: &mut [ChannelState],
    samples: &mut Vec<i16>,
) -> FrameResult {
    let start = reader.bits_consumed();

    let len = if config.len_prefix {
        match reader.read_bits(config.log2_frame_size) {
            Ok(len) => Some(len as usize),
            Err(e) => {
                return FrameResult {
                    info: None,
                    more_frames: false,
                    synced: false,
                    error: Some(e),
                }
            }
        }
    } else {
        None
    };

    log::trace!("decoding frame with len {:?}", len);

    let mut info = FrameInfo::default();
    let mut tiling = None;

    let error = decode_frame_body(reader, config, transform, channels, &mut info, &mut tiling).err();
    if let Some(e) = &error {
        log::warn!("frame aborted: {}", e);
        info.lossy = true;
        zero_fill(channels, tiling.as_ref(), config.samples_per_frame);
    }

    write_output(channels, config.samples_per_frame, samples);

    let trailer = match len {
        Some(len) => match (start + len).checked_sub(1) {
            Some(trailer) if len > 0 && reader.bits_consumed() <= trailer => reader
                .skip_bits(trailer - reader.bits_consumed())
                .and_then(|_| reader.read_bit())
                .ok(),
            _ => None,
        },
        None if error.is_none() => reader.read_bit().ok(),
        None => None,
    };

    FrameResult {
        info: Some(info),
        more_frames: trailer.unwrap_or(false),
        synced: trailer.is_some(),
        error,
    }
}

fn decode_frame_body(
    reader: &mut BitReader,
    config: &StreamConfig,
    transform: &mut InverseTransform,
    channels: &mut [ChannelState],
    info: &mut FrameInfo,
    tiling: &mut Option<FrameTiling>,
) -> Result<(), Error> {
    for channel in channels.iter_mut() {
        channel.start_frame();
    }

    let frame_tiling = tiling.get_or_insert(decode_tile_header(reader, config)?);

    if config.num_channels > 1 && reader.read_bit()? {
        return Err(Error::malformed("unsupported post-processing transform"));
    }

    if config.dynamic_range_compression {
        info.drc_gain = Some(reader.read_bits(8)? as u8);
    }

    if reader.read_bit()? {
        let skip_bits = log2(config.samples_per_frame as u32 * 2);

        if reader.read_bit()? {
            info.start_skip = Some(reader.read_bits(skip_bits)?);
        }
        if reader.read_bit()? {
            info.end_skip = Some(reader.read_bits(skip_bits)?);
        }
    }

    while channels
        .iter()
        .any(|channel| channel.decoded_samples < config.samples_per_frame)
    {
        decode_subframe(reader, config, transform, channels, frame_tiling)?;
    }

    Ok(())
}

fn decode_subframe(
    reader: &mut BitReader,
    config: &StreamConfig,
    transform: &mut InverseTransform,
    channels: &mut [ChannelState],
    tiling: &FrameTiling,
) -> Result<(), Error> {
    let samples_per_frame = config.samples_per_frame;

    // the next block is the pending one of the channel lagging furthest behind
    let mut offset = samples_per_frame;
    let mut subframe_len = samples_per_frame;
    for (c, channel) in channels.iter().enumerate() {
        if channel.decoded_samples < offset {
            offset = channel.decoded_samples;
            subframe_len = tiling
                .channel(c)
                .get(channel.cur_subframe)
                .map(|subframe| subframe.len)
                .ok_or_else(|| Error::malformed("channel ran out of subframes"))?;
        }
    }

    let selected = channels
        .iter()
        .enumerate()
        .filter(|(c, channel)| {
            channel.decoded_samples == offset
                && tiling.channel(*c).get(channel.cur_subframe).map(|s| s.len) == Some(subframe_len)
        })
        .map(|(c, _)| c)
        .collect::<Vec<_>>();

    log::trace!(
        "subframe at offset {} len {} for channels {:?}",
        offset,
        subframe_len,
        selected
    );

    let layout = config.band_layout(subframe_len);
    let num_bands = layout.num_bands();

    for &c in &selected {
        let channel = &mut channels[c];
        channel.decoded_samples += subframe_len;
        if channel.cur_subframe == 0 {
            channel.reset_scale_factors();
        }
        for coeff in &mut channel.coeffs[..subframe_len] {
            *coeff = 0.0;
        }
    }

    if reader.read_bit()? {
        let mut num_fill_bits = reader.read_bits(2)?;
        if num_fill_bits == 0 {
            let width = reader.read_bits(4)?;
            num_fill_bits = reader.read_bits(width)? + 1;
        }
        reader.skip_bits(num_fill_bits as usize)?;
    }

    if reader.read_bit()? {
        return Err(Error::malformed("reserved bit set"));
    }

    let groups = decode_channel_transform(reader, config, channels, &selected, num_bands)?;

    let mut transmit_coeffs = false;
    for &c in &selected {
        channels[c].transmit_coefs = reader.read_bit()?;
        transmit_coeffs |= channels[c].transmit_coefs;
    }

    let mut num_vec_coeffs = vec![None; selected.len()];
    let mut quant_step = QUANT_STEP_BASE;

    if transmit_coeffs {
        if reader.read_bit()? {
            let bits = log2(((subframe_len + 3) / 4) as u32) + 1;
            for count in num_vec_coeffs.iter_mut() {
                let n = (reader.read_bits(bits)? as usize) << 2;
                if n > subframe_len {
                    return Err(Error::malformed(format!("{} vector coefficients", n)));
                }
                *count = Some(n);
            }
        }

        quant_step += read_quant_step(reader)?;
        if quant_step < 0 {
            return Err(Error::malformed("negative quant step"));
        }

        if selected.len() == 1 {
            channels[selected[0]].quant_step_modifier = 0;
        } else {
            let modifier_len = reader.read_bits(3)?;
            for &c in &selected {
                channels[c].quant_step_modifier = if reader.read_bit()? {
                    if modifier_len > 0 {
                        reader.read_bits(modifier_len)? as i32 + 1
                    } else {
                        1
                    }
                } else {
                    0
                };
            }
        }

        decode_scale_factors(reader, config, channels, &selected, subframe_len)?;
    }

    for (&c, &count) in selected.iter().zip(num_vec_coeffs.iter()) {
        if channels[c].transmit_coefs {
            decode_coeffs(reader, &mut channels[c].coeffs[..subframe_len], count)?;
        }
    }

    let dst = samples_per_frame / 2 + offset;

    if transmit_coeffs {
        inverse_channel_transform(config, &groups, channels, layout, subframe_len);

        for &c in &selected {
            let channel = &mut channels[c];

            if config.lfe_channel == Some(c) {
                let cutoff = config.subwoofer_cutoff(subframe_len);
                for coeff in &mut channel.coeffs[cutoff..subframe_len] {
                    *coeff = 0.0;
                }
            }

            dequantize(channel, layout, subframe_len, quant_step);
            transform.imdct(
                &channel.coeffs[..subframe_len],
                &mut channel.out[dst..dst + subframe_len],
            );
        }
    } else {
        for &c in &selected {
            for sample in &mut channels[c].out[dst..dst + subframe_len] {
                *sample = 0.0;
            }
        }
    }

    for &c in &selected {
        let channel = &mut channels[c];
        transform.window(&mut channel.out, offset, channel.prev_block_len, subframe_len);
        channel.prev_block_len = subframe_len;
        channel.cur_subframe += 1;
    }

    Ok(())
}

/// Reads the signed step added to the base quantization step.
fn read_quant_step(reader: &mut BitReader) -> Result<i32, Error> {
    let mut step = reader.read_signed(6)?;

    if step == -32 || step == 31 {
        let sign = step.signum();
        loop {
            let extension = reader.read_bits(5)? as i32;
            step += extension * sign;
            if extension != 31 {
                break;
            }
        }
    }

    Ok(step)
}

/// Silences everything a failed frame did not finish.
fn zero_fill(channels: &mut [ChannelState], tiling: Option<&FrameTiling>, samples_per_frame: usize) {
    for (c, channel) in channels.iter_mut().enumerate() {
        let covered = tiling
            .map(|tiling| tiling.covered(c, channel.cur_subframe))
            .unwrap_or(0);

        for sample in &mut channel.out[samples_per_frame / 2 + covered..] {
            *sample = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodecParameters;
    use crate::tests::BitBuilder;

    #[test]
    fn quant_step_extensions_follow_the_sign() {
        let mut bits = BitBuilder::new();
        bits.signed(6, 5);
        bits.signed(6, 31).bits(5, 31).bits(5, 2);
        bits.signed(6, -32).bits(5, 7);
        bits.signed(6, -3);

        let data = bits.to_bytes();
        let mut reader = BitReader::new(&data, bits.len());

        assert_eq!(read_quant_step(&mut reader).unwrap(), 5);
        assert_eq!(read_quant_step(&mut reader).unwrap(), 64);
        assert_eq!(read_quant_step(&mut reader).unwrap(), -39);
        assert_eq!(read_quant_step(&mut reader).unwrap(), -3);
        assert_eq!(reader.bits_left(), 0);
    }

    #[test]
    fn tiling_short_of_the_frame_is_malformed() {
        let config = StreamConfig::new(&CodecParameters {
            sample_rate: 44100,
            channels: 2,
            block_align: 256,
            channel_mask: 0x3,
            decode_flags: 0x10,
            lossless: false,
        })
        .unwrap();
        let mut transform = InverseTransform::new(&config);
        let mut channels = vec![ChannelState::new(2048), ChannelState::new(2048)];
        let tiling = FrameTiling::uniform(2, 1024);

        let mut bits = BitBuilder::new();
        // extension header, reserved bit, transform bit, identity pair
        bits.bit(false).bit(false).bit(false).bit(true).bit(false);
        // neither channel transmits
        bits.bit(false).bit(false);

        let data = bits.to_bytes();
        let mut reader = BitReader::new(&data, bits.len());

        decode_subframe(&mut reader, &config, &mut transform, &mut channels, &tiling).unwrap();
        assert_eq!(channels[0].decoded_samples, 1024);
        assert_eq!(channels[1].cur_subframe, 1);

        assert!(matches!(
            decode_subframe(&mut reader, &config, &mut transform, &mut channels, &tiling),
            Err(Error::MalformedFrame(_))
        ));
        assert_eq!(reader.bits_left(), 0);
    }
}
