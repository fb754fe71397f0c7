// WMA Pro Decoder
//
// Copyright (c) 2007 Baptiste Coudurier, Benjamin Larsson, Ulion
// Copyright (c) 2008 - 2009 Sascha Sommer, Benjamin Larsson
//
// The following code is a derivative work of the code from the FFmpeg project,
// which is licensed LGPL v2.1. This code therefore is also licensed under the terms
// of the GNU Lesser General Public License, verison 2.1.

use crate::config::{BandLayout, StreamConfig};
use crate::data::SIX_CHANNEL_LAYOUT;
use crate::state::ChannelState;

use std::f32::consts::PI;

use rustdct::{
    mdct::{window_fn, MDCTViaDCT4, MDCT},
    DCTplanner,
};

/// Keeps per band gains finite.
const MAX_GAIN_EXPONENT: i32 = 600;

// SAFETY: the transform plans are built once and only used through `&mut`
// access from the decoder that owns them.
unsafe impl Send for InverseTransform {}

/// Inverse transforms and cross-fade windows for every block size of a
/// stream.
pub(crate) struct InverseTransform {
    samples_per_frame: usize,
    mdcts: Vec<MDCTViaDCT4<f32>>,
    windows: Vec<Vec<f32>>,
    output: Vec<f32>,
}

impl InverseTransform {
    pub fn new(config: &StreamConfig) -> InverseTransform {
        let mut planner = DCTplanner::new();
        let mut mdcts = Vec::with_capacity(config.num_block_sizes);
        let mut windows = Vec::with_capacity(config.num_block_sizes);

        for i in 0..config.num_block_sizes {
            let block_len = config.samples_per_frame >> i;

            let inner_dct4 = planner.plan_dct4(block_len);
            mdcts.push(MDCTViaDCT4::<f32>::new(inner_dct4, window_fn::one));

            windows.push(sine_window(block_len));
        }

        InverseTransform {
            samples_per_frame: config.samples_per_frame,
            mdcts,
            windows,
            output: vec![0.0; config.samples_per_frame * 2],
        }
    }

    fn index(&self, block_len: usize) -> usize {
        (self.samples_per_frame / block_len).trailing_zeros() as usize
    }

    /// Transforms `coeffs` into `coeffs.len()` samples at `dst`.
    pub fn imdct(&mut self, coeffs: &[f32], dst: &mut [f32]) {
        let len = coeffs.len();
        let output = &mut self.output[..len * 2];
        for sample in output.iter_mut() {
            *sample = 0.0;
        }

        let idx = (self.samples_per_frame / len).trailing_zeros() as usize;
        self.mdcts[idx].process_imdct(coeffs, output);

        let scale = (len / 2) as f32;
        for (dst, &sample) in dst[..len].iter_mut().zip(&output[len / 2..len / 2 + len]) {
            let sample = sample / scale;
            *dst = if sample.is_finite() { sample } else { 0.0 };
        }
    }

    /// Cross-fades the start of a new block with the tail of the previous
    /// one inside a channel's history buffer.
    pub fn window(&self, out: &mut [f32], offset: usize, prev_block_len: usize, block_len: usize) {
        let center = self.samples_per_frame / 2 + offset;
        let mut start = center - prev_block_len / 2;
        let mut end = center + block_len / 2 - 1;

        let (len, winlen) = if block_len <= prev_block_len {
            start += (prev_block_len - block_len) / 2;
            (block_len / 2, block_len)
        } else {
            end -= (block_len - prev_block_len) / 2;
            (prev_block_len / 2, prev_block_len)
        };

        let window = &self.windows[self.index(winlen)];
        for x in 0..len {
            let ts = out[start + x];
            let te = out[end - x];
            let sin = window[x];
            let cos = window[winlen - x - 1];

            out[start + x] = cos * ts - sin * te;
            out[end - x] = cos * te + sin * ts;
        }
    }
}

/// Rising half of a sine window, `sin(pi * (k + 0.5) / (2 * len))`.
fn sine_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|k| (PI * (k as f32 + 0.5) / (2.0 * len as f32)).sin())
        .collect()
}

/// Applies the per band gain
/// `10^((quant_step + modifier - step * (max_sf - sf[b])) / 20)`.
pub(crate) fn dequantize(
    channel: &mut ChannelState,
    layout: &BandLayout,
    len: usize,
    quant_step: i32,
) {
    let scale_factors = if channel.transmit_sf {
        &channel.scale_factors
    } else {
        &channel.resampled_scale_factors
    };

    for b in 0..layout.num_bands() {
        let exponent = (quant_step + channel.quant_step_modifier
            - channel.scale_factor_step * (channel.max_scale_factor - scale_factors[b]))
            .max(-MAX_GAIN_EXPONENT)
            .min(MAX_GAIN_EXPONENT);
        let gain = 10f64.powf(exponent as f64 / 20.0) as f32;

        for coeff in &mut channel.coeffs[layout.band(b, len)] {
            *coeff *= gain;
        }
    }
}

/// Interleaves the finished frame of every channel onto `samples` and
/// shifts the history down by one frame.
pub(crate) fn write_output(
    channels: &mut [ChannelState],
    samples_per_frame: usize,
    samples: &mut Vec<i16>,
) {
    let num_channels = channels.len();
    let base = samples.len();
    samples.resize(base + num_channels * samples_per_frame, 0);

    for (c, channel) in channels.iter_mut().enumerate() {
        let pos = if num_channels == 6 {
            SIX_CHANNEL_LAYOUT[c]
        } else {
            c
        };

        for (x, &sample) in channel.out[..samples_per_frame].iter().enumerate() {
            samples[base + x * num_channels + pos] = to_i16(sample);
        }

        channel.out.copy_within(samples_per_frame.., 0);
    }
}

fn to_i16(sample: f32) -> i16 {
    let sample = sample.round();
    if sample >= i16::max_value() as f32 {
        i16::max_value()
    } else if sample <= i16::min_value() as f32 {
        i16::min_value()
    } else {
        sample as i16
    }
}
