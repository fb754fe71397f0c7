// WMA Pro Decoder
//
// Copyright (c) 2007 Baptiste Coudurier, Benjamin Larsson, Ulion
// Copyright (c) 2008 - 2009 Sascha Sommer, Benjamin Larsson
//
// The following code is a derivative work of the code from the FFmpeg project,
// which is licensed LGPL v2.1. This code therefore is also licensed under the terms
// of the GNU Lesser General Public License, verison 2.1.

use crate::bitreader::BitReader;
use crate::config::{log2, StreamConfig};
use crate::data::MAX_SUBFRAMES;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subframe {
    pub offset: usize,
    pub len: usize,
}

/// How every channel of one frame is split into subframes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameTiling {
    channels: Vec<Vec<Subframe>>,
}

impl FrameTiling {
    fn from_lengths(lengths: Vec<Vec<usize>>) -> FrameTiling {
        let channels = lengths
            .into_iter()
            .map(|lengths| {
                let mut offset = 0;
                lengths
                    .into_iter()
                    .map(|len| {
                        let subframe = Subframe { offset, len };
                        offset += len;
                        subframe
                    })
                    .collect()
            })
            .collect();

        FrameTiling { channels }
    }

    pub fn uniform(num_channels: usize, samples_per_frame: usize) -> FrameTiling {
        FrameTiling::from_lengths(vec![vec![samples_per_frame]; num_channels])
    }

    pub fn channel(&self, channel: usize) -> &[Subframe] {
        &self.channels[channel]
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples of `channel` covered by its first `count` subframes.
    pub fn covered(&self, channel: usize, count: usize) -> usize {
        self.channels
            .get(channel)
            .map(|subframes| subframes.iter().take(count).map(|s| s.len).sum())
            .unwrap_or(0)
    }
}

/// Checks a subframe length against the stream's block size bounds.
pub fn validate_subframe_len(config: &StreamConfig, len: usize) -> Result<(), Error> {
    if len < config.min_samples_per_subframe
        || len > config.samples_per_frame
        || !len.is_power_of_two()
    {
        return Err(Error::malformed(format!("subframe length {}", len)));
    }
    Ok(())
}

pub fn decode_tile_header(
    reader: &mut BitReader,
    config: &StreamConfig,
) -> Result<FrameTiling, Error> {
    let num_channels = config.num_channels;
    let samples_per_frame = config.samples_per_frame;
    let max_num_subframes = config.max_num_subframes;

    if max_num_subframes == 1 {
        return Ok(FrameTiling::uniform(num_channels, samples_per_frame));
    }

    let (subframe_len_bits, subframe_len_zero_bit) = if config.lossless {
        (log2(max_num_subframes as u32 - 1) + 1, false)
    } else if max_num_subframes == 16 {
        (3, true)
    } else {
        (log2(log2(max_num_subframes as u32)) + 1, false)
    };

    let mut lengths = vec![Vec::new(); num_channels];
    let mut channel_len = vec![0; num_channels];
    let mut missing_samples = num_channels * samples_per_frame;
    let mut no_tiling = false;
    let mut first = true;

    while missing_samples > 0 {
        let min_channel_len = channel_len
            .iter()
            .cloned()
            .min()
            .unwrap_or(samples_per_frame);

        if first {
            no_tiling = reader.read_bit()?;
            first = false;
        }

        let mut single_subframe = false;
        let num_min_channels = if no_tiling {
            single_subframe = true;
            num_channels
        } else {
            let count = channel_len.iter().filter(|&&l| l == min_channel_len).count();
            if count <= 1 {
                single_subframe = true;
            }
            count
        };

        let mut subframe_len = samples_per_frame / max_num_subframes;
        let evenly_split = subframe_len == missing_samples / num_min_channels;
        if evenly_split {
            single_subframe = true;
        }

        let mut tileinfo = u64::max_value();
        if !single_subframe {
            tileinfo = 0;
            let mut remaining = num_min_channels as u32;
            while remaining > 0 {
                let bits = remaining.min(32);
                tileinfo = (tileinfo << bits) | reader.read_bits(bits)? as u64;
                remaining -= bits;
            }
        }

        if !evenly_split {
            let log2_subframe_len = if subframe_len_zero_bit {
                if reader.read_bit()? {
                    reader.read_bits(subframe_len_bits - 1)? + 1
                } else {
                    0
                }
            } else {
                reader.read_bits(subframe_len_bits)?
            };

            subframe_len = if config.lossless {
                samples_per_frame / max_num_subframes * (log2_subframe_len as usize + 1)
            } else {
                samples_per_frame
                    .checked_shr(log2_subframe_len)
                    .unwrap_or(0)
            };
        }

        validate_subframe_len(config, subframe_len)?;

        let mut remaining_channels = num_min_channels;
        for c in 0..num_channels {
            if channel_len[c] != min_channel_len {
                continue;
            }

            remaining_channels -= 1;
            if tileinfo & (1 << remaining_channels) == 0 {
                continue;
            }

            if lengths[c].len() >= MAX_SUBFRAMES {
                return Err(Error::malformed("too many subframes"));
            }

            lengths[c].push(subframe_len);
            channel_len[c] += subframe_len;

            if channel_len[c] > samples_per_frame || subframe_len > missing_samples {
                return Err(Error::malformed("channel length exceeds frame"));
            }
            missing_samples -= subframe_len;
        }
    }

    let tiling = FrameTiling::from_lengths(lengths);

    for c in 0..num_channels {
        log::trace!("channel {} subframes {:?}", c, tiling.channel(c));
    }

    Ok(tiling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodecParameters;
    use crate::tests::BitBuilder;

    fn config(channels: u16, decode_flags: u16) -> StreamConfig {
        StreamConfig::new(&CodecParameters {
            sample_rate: 44100,
            channels,
            block_align: 4096,
            channel_mask: 0,
            decode_flags,
            lossless: false,
        })
        .unwrap()
    }

    fn lens(tiling: &FrameTiling, channel: usize) -> Vec<usize> {
        tiling.channel(channel).iter().map(|s| s.len).collect()
    }

    #[test]
    fn single_subframe_streams_read_nothing() {
        let config = config(2, 0);
        let data = [0xFF];
        let mut reader = BitReader::new(&data, 8);

        let tiling = decode_tile_header(&mut reader, &config).unwrap();

        assert_eq!(reader.bits_consumed(), 0);
        assert_eq!(tiling.channel(0), &[Subframe { offset: 0, len: 2048 }]);
        assert_eq!(tiling.channel(1), &[Subframe { offset: 0, len: 2048 }]);
    }

    #[test]
    fn uniform_tiling_shares_lengths() {
        let config = config(2, 0x10);
        let data = BitBuilder::new()
            .bit(true)
            .bits(2, 1)
            .bits(2, 2)
            .to_bytes();
        let mut reader = BitReader::new(&data, 5);

        let tiling = decode_tile_header(&mut reader, &config).unwrap();

        assert_eq!(reader.bits_consumed(), 5);
        for c in 0..2 {
            assert_eq!(lens(&tiling, c), vec![1024, 512, 512]);
            let offsets = tiling.channel(c).iter().map(|s| s.offset).collect::<Vec<_>>();
            assert_eq!(offsets, vec![0, 1024, 1536]);
        }
    }

    #[test]
    fn per_channel_tiling_selects_channels() {
        let config = config(2, 0x10);
        let data = BitBuilder::new()
            .bit(false)
            .bits(2, 0b10)
            .bits(2, 0)
            .bits(2, 0)
            .to_bytes();
        let mut reader = BitReader::new(&data, 7);

        let tiling = decode_tile_header(&mut reader, &config).unwrap();

        assert_eq!(lens(&tiling, 0), vec![2048]);
        assert_eq!(lens(&tiling, 1), vec![2048]);
        assert_eq!(reader.bits_consumed(), 7);
        assert_eq!(tiling.covered(0, 1), 2048);
    }

    #[test]
    fn sixteen_subframe_streams_use_a_zero_bit() {
        let config = config(1, 0x20);
        // 0 -> full frame
        let data = BitBuilder::new().bit(true).bit(false).to_bytes();
        let mut reader = BitReader::new(&data, 2);

        let tiling = decode_tile_header(&mut reader, &config).unwrap();
        assert_eq!(lens(&tiling, 0), vec![2048]);
    }

    #[test]
    fn rejects_lengths_below_the_minimum() {
        let config = config(1, 0x10);
        // log2 length 3 gives 256, below 2048 / 4
        let data = BitBuilder::new().bit(true).bits(2, 3).to_bytes();
        let mut reader = BitReader::new(&data, 3);

        assert!(matches!(
            decode_tile_header(&mut reader, &config),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn subframe_length_bounds() {
        let config = config(1, 0x10);

        assert!(validate_subframe_len(&config, 512).is_ok());
        assert!(validate_subframe_len(&config, 2048).is_ok());
        assert!(matches!(
            validate_subframe_len(&config, 511),
            Err(Error::MalformedFrame(_))
        ));
        assert!(matches!(
            validate_subframe_len(&config, 2049),
            Err(Error::MalformedFrame(_))
        ));
        assert!(matches!(
            validate_subframe_len(&config, 768),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn truncated_header_runs_out_of_data() {
        let config = config(2, 0x10);
        let data = [0x00];
        let mut reader = BitReader::new(&data, 2);

        assert!(matches!(
            decode_tile_header(&mut reader, &config),
            Err(Error::OutOfData)
        ));
    }
}
