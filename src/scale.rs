// WMA Pro Decoder
//
// Copyright (c) 2007 Baptiste Coudurier, Benjamin Larsson, Ulion
// Copyright (c) 2008 - 2009 Sascha Sommer, Benjamin Larsson
//
// The following code is a derivative work of the code from the FFmpeg project,
// which is licensed LGPL v2.1. This code therefore is also licensed under the terms
// of the GNU Lesser General Public License, verison 2.1.

use crate::bitreader::BitReader;
use crate::config::StreamConfig;
use crate::data::*;
use crate::state::ChannelState;
use crate::Error;

/// Decodes the scale factors of every channel in the subframe.
pub(crate) fn decode_scale_factors(
    reader: &mut BitReader,
    config: &StreamConfig,
    state: &mut [ChannelState],
    channels: &[usize],
    subframe_len: usize,
) -> Result<(), Error> {
    let num_bands = config.band_layout(subframe_len).num_bands();
    let block_idx = config.block_size_index(subframe_len);

    for &c in channels {
        let channel = &mut state[c];

        if channel.reuse_sf {
            let prev_idx = config.block_size_index(channel.scale_factor_block_len);
            resample(channel, &config.sf_offsets[block_idx][prev_idx], num_bands);
        }

        channel.transmit_sf = if channel.cur_subframe > 0 {
            reader.read_bit()?
        } else {
            true
        };

        if !channel.transmit_sf {
            continue;
        }

        if channel.reuse_sf {
            channel.scale_factors[..num_bands]
                .copy_from_slice(&channel.resampled_scale_factors[..num_bands]);
            decode_run_level(reader, &mut channel.scale_factors[..num_bands])?;
        } else {
            channel.scale_factor_step = reader.read_bits(2)? as i32 + 1;
            decode_dpcm(
                reader,
                &mut channel.scale_factors[..num_bands],
                channel.scale_factor_step,
            )?;
        }

        channel.reuse_sf = true;
        channel.max_scale_factor = max_of(&channel.scale_factors[..num_bands]);
        channel.scale_factor_block_len = subframe_len;
    }

    Ok(())
}

/// Maps the stored scale factors onto the current band layout.
fn resample(channel: &mut ChannelState, offsets: &[usize], num_bands: usize) {
    for b in 0..num_bands {
        channel.resampled_scale_factors[b] = channel.scale_factors[offsets[b]];
    }
    channel.max_scale_factor = max_of(&channel.resampled_scale_factors[..num_bands]);
}

fn decode_dpcm(reader: &mut BitReader, scale_factors: &mut [i32], step: i32) -> Result<(), Error> {
    let mut prev = SCALE_BASE / step;

    // the first band is relative to the base value, the rest to their neighbour
    for sf in scale_factors.iter_mut() {
        let delta = reader.decode_vlc(&SCALE_VLC)? as i32 - SCALE_DPCM_OFFSET;
        *sf = prev + delta;
        prev = *sf;
    }

    Ok(())
}

fn decode_run_level(reader: &mut BitReader, scale_factors: &mut [i32]) -> Result<(), Error> {
    let num_bands = scale_factors.len();
    let mut i = 0;

    while i < num_bands {
        let symbol = reader.decode_vlc(&SCALE_RL_VLC)?;

        let (skip, level, sign) = match symbol {
            RL_END => break,
            RL_ESCAPE => {
                let mask = reader.read_bits(14)? as i32;
                (((mask & 0x3F) >> 1) as usize, mask >> 6, (mask & 1) - 1)
            }
            _ => {
                let (skip, level) = SCALE_RUN_LEVEL[(symbol - RL_FIRST_PAIR) as usize];
                (skip as usize, level as i32, reader.read_bit()? as i32 - 1)
            }
        };

        i += skip;
        if i >= num_bands {
            return Err(Error::malformed("scale factor run past last band"));
        }

        scale_factors[i] += (sign ^ level) - sign;
        i += 1;
    }

    Ok(())
}

fn max_of(values: &[i32]) -> i32 {
    values.iter().cloned().max().unwrap_or(0)
}
