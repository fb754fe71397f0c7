// WMA Pro Decoder
//
// Copyright (c) 2007 Baptiste Coudurier, Benjamin Larsson, Ulion
// Copyright (c) 2008 - 2009 Sascha Sommer, Benjamin Larsson
//
// The following code is a derivative work of the code from the FFmpeg project,
// which is licensed LGPL v2.1. This code therefore is also licensed under the terms
// of the GNU Lesser General Public License, verison 2.1.

use crate::data::*;
use crate::Error;

const FLAG_FRAME_SCALE: u16 = 0x0006;
const FLAG_SUBFRAMES: u16 = 0x0038;
const FLAG_LEN_PREFIX: u16 = 0x0040;
const FLAG_DRC: u16 = 0x0080;

/// Out of band codec parameters, as a container hands them over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodecParameters {
    pub sample_rate: u32,
    pub channels: u16,
    pub block_align: u16,
    pub channel_mask: u32,
    pub decode_flags: u16,
    pub lossless: bool,
}

impl CodecParameters {
    /// Reads the channel mask and decode flags from a codec extradata block.
    pub fn from_extradata(
        sample_rate: u32,
        channels: u16,
        block_align: u16,
        extradata: &[u8],
    ) -> Result<CodecParameters, Error> {
        if extradata.len() < 18 {
            return Err(Error::InvalidExtradata(extradata.len()));
        }

        let channel_mask =
            u32::from_le_bytes([extradata[2], extradata[3], extradata[4], extradata[5]]);
        let decode_flags = u16::from_le_bytes([extradata[14], extradata[15]]);

        Ok(CodecParameters {
            sample_rate,
            channels,
            block_align,
            channel_mask,
            decode_flags,
            lossless: false,
        })
    }
}

/// Scale factor band edges for one block size.
#[derive(Debug, Clone, PartialEq)]
pub struct BandLayout {
    offsets: Vec<usize>,
}

impl BandLayout {
    fn new(block_len: usize, sample_rate: u32) -> BandLayout {
        let mut offsets = vec![0];

        for &freq in CRITICAL_FREQ.iter() {
            if *offsets.last().unwrap_or(&0) >= block_len {
                break;
            }

            let mut offset =
                ((block_len as u64 * 2 * freq as u64) / sample_rate as u64) as usize + 2;
            offset -= offset % 4;
            if offset > *offsets.last().unwrap_or(&0) {
                offsets.push(offset);
            }
        }

        if let Some(last) = offsets.last_mut() {
            *last = block_len;
        }

        BandLayout { offsets }
    }

    pub fn num_bands(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Coefficient range of `band`, clipped to `len`.
    pub fn band(&self, band: usize, len: usize) -> std::ops::Range<usize> {
        let start = self.offsets[band].min(len);
        let end = self.offsets[band + 1].min(len);
        start..end
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }
}

/// Immutable per-stream parameters and derived tables.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub(crate) sample_rate: u32,
    pub(crate) num_channels: usize,
    pub(crate) block_align: usize,
    pub(crate) samples_per_frame: usize,
    pub(crate) log2_frame_size: u32,
    pub(crate) max_num_subframes: usize,
    pub(crate) min_samples_per_subframe: usize,
    pub(crate) num_block_sizes: usize,
    pub(crate) len_prefix: bool,
    pub(crate) lossless: bool,
    pub(crate) dynamic_range_compression: bool,
    pub(crate) lfe_channel: Option<usize>,
    pub(crate) bands: Vec<BandLayout>,
    pub(crate) sf_offsets: Vec<Vec<Vec<usize>>>,
    pub(crate) subwoofer_cutoffs: Vec<usize>,
    pub(crate) default_matrices: Vec<Vec<f32>>,
}

impl StreamConfig {
    pub fn new(params: &CodecParameters) -> Result<StreamConfig, Error> {
        init_static();

        let num_channels = params.channels as usize;
        if num_channels == 0 || num_channels > MAX_CHANNELS {
            return Err(Error::UnsupportedChannelCount(params.channels));
        }
        if params.block_align == 0 {
            return Err(Error::InvalidBlockAlign);
        }
        if params.sample_rate == 0 {
            return Err(Error::UnsupportedFrameSize(0));
        }

        let block_align = params.block_align as usize;
        let log2_frame_size = log2(block_align as u32 * 8) + 1;

        let samples_per_frame = samples_per_frame(params.sample_rate, params.decode_flags);
        if samples_per_frame > BLOCK_MAX_SIZE {
            return Err(Error::UnsupportedFrameSize(samples_per_frame));
        }

        let max_num_subframes = 1 << ((params.decode_flags & FLAG_SUBFRAMES) >> 3);
        if max_num_subframes > MAX_SUBFRAMES {
            return Err(Error::InvalidSubframeCount(max_num_subframes));
        }

        let min_samples_per_subframe = samples_per_frame / max_num_subframes;
        if min_samples_per_subframe < BLOCK_MIN_SIZE {
            return Err(Error::UnsupportedFrameSize(min_samples_per_subframe));
        }

        let num_block_sizes = log2(max_num_subframes as u32) as usize + 1;

        let bands = (0..num_block_sizes)
            .map(|i| BandLayout::new(samples_per_frame >> i, params.sample_rate))
            .collect::<Vec<_>>();
        if bands.iter().any(|layout| layout.num_bands() == 0) {
            return Err(Error::UnsupportedFrameSize(min_samples_per_subframe));
        }

        let sf_offsets = resample_table(&bands);

        let subwoofer_cutoffs = (0..num_block_sizes)
            .map(|i| {
                let block_len = samples_per_frame >> i;
                let cutoff =
                    (block_len as f64 * 440.0 / params.sample_rate as f64 + 0.5).ceil() as usize;
                cutoff.max(4).min(block_len)
            })
            .collect();

        let default_matrices = (0..=num_channels).map(default_matrix).collect();

        let lfe_channel = if params.channel_mask & 8 > 0 {
            Some((params.channel_mask & 0xF).count_ones() as usize - 1)
        } else {
            None
        };

        let config = StreamConfig {
            sample_rate: params.sample_rate,
            num_channels,
            block_align,
            samples_per_frame,
            log2_frame_size,
            max_num_subframes,
            min_samples_per_subframe,
            num_block_sizes,
            len_prefix: params.decode_flags & FLAG_LEN_PREFIX > 0,
            lossless: params.lossless,
            dynamic_range_compression: params.decode_flags & FLAG_DRC > 0,
            lfe_channel,
            bands,
            sf_offsets,
            subwoofer_cutoffs,
            default_matrices,
        };

        log::debug!(
            "stream: {} channels, {} samples per frame, {} max subframes, len prefix {}",
            config.num_channels,
            config.samples_per_frame,
            config.max_num_subframes,
            config.len_prefix
        );

        Ok(config)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.num_channels
    }

    pub fn block_align(&self) -> usize {
        self.block_align
    }

    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    pub fn max_num_subframes(&self) -> usize {
        self.max_num_subframes
    }

    pub fn min_samples_per_subframe(&self) -> usize {
        self.min_samples_per_subframe
    }

    /// Width of the frame length and previous-frame bit count fields.
    pub fn frame_size_bits(&self) -> u32 {
        self.log2_frame_size
    }

    pub fn lfe_channel(&self) -> Option<usize> {
        self.lfe_channel
    }

    /// Index of the band layout used by blocks of `block_len` samples.
    pub(crate) fn block_size_index(&self, block_len: usize) -> usize {
        log2((self.samples_per_frame / block_len) as u32) as usize
    }

    pub fn band_layout(&self, block_len: usize) -> &BandLayout {
        &self.bands[self.block_size_index(block_len)]
    }

    pub(crate) fn subwoofer_cutoff(&self, block_len: usize) -> usize {
        self.subwoofer_cutoffs[self.block_size_index(block_len)]
    }
}

fn samples_per_frame(sample_rate: u32, decode_flags: u16) -> usize {
    let samples_per_frame = if sample_rate <= 16000 {
        512
    } else if sample_rate <= 22050 {
        1024
    } else if sample_rate <= 48000 {
        2048
    } else if sample_rate <= 96000 {
        4096
    } else {
        8192
    };

    match decode_flags & FLAG_FRAME_SCALE {
        0x2 => samples_per_frame << 1,
        0x4 => samples_per_frame >> 1,
        0x6 => samples_per_frame >> 2,
        _ => samples_per_frame,
    }
}

/// Maps the bands of every block size onto the bands of every other block
/// size, so scale factors can follow a channel through block size changes.
fn resample_table(bands: &[BandLayout]) -> Vec<Vec<Vec<usize>>> {
    bands
        .iter()
        .enumerate()
        .map(|(i, layout)| {
            bands
                .iter()
                .enumerate()
                .map(|(x, other)| {
                    (0..layout.num_bands())
                        .map(|b| {
                            let center =
                                ((layout.offsets[b] + layout.offsets[b + 1] - 1) << i) / 2;
                            let mut v = 0;
                            while v + 1 < other.num_bands()
                                && other.offsets[v + 1] << x < center
                            {
                                v += 1;
                            }
                            v
                        })
                        .collect()
                })
                .collect()
        })
        .collect()
}

/// Row major DCT-II basis rounded to 1/256, used by multichannel groups
/// that select the default transform.
fn default_matrix(size: usize) -> Vec<f32> {
    match size {
        0 => vec![],
        1 => vec![1.0],
        2 => vec![
            MID_SIDE_COEFF,
            -MID_SIDE_COEFF,
            MID_SIDE_COEFF,
            MID_SIDE_COEFF,
        ],
        n => {
            let mut matrix = vec![0.0; n * n];
            for x in 0..n {
                for y in 0..n {
                    let scale = if y == 0 {
                        (1.0 / n as f64).sqrt()
                    } else {
                        (2.0 / n as f64).sqrt()
                    };
                    let basis = scale
                        * (std::f64::consts::PI * (2 * x + 1) as f64 * y as f64
                            / (2 * n) as f64)
                            .cos();
                    matrix[x * n + y] = ((basis * 256.0).round() / 256.0) as f32;
                }
            }
            matrix
        }
    }
}

pub(crate) fn log2(v: u32) -> u32 {
    if v == 0 {
        0
    } else {
        31 - v.leading_zeros()
    }
}
