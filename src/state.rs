// WMA Pro Decoder
//
// Copyright (c) 2007 Baptiste Coudurier, Benjamin Larsson, Ulion
// Copyright (c) 2008 - 2009 Sascha Sommer, Benjamin Larsson
//
// The following code is a derivative work of the code from the FFmpeg project,
// which is licensed LGPL v2.1. This code therefore is also licensed under the terms
// of the GNU Lesser General Public License, verison 2.1.

use crate::config::StreamConfig;
use crate::data::MAX_BANDS;
use crate::reservoir::BitReservoir;

/// Per-channel state, part of it carried from frame to frame.
#[derive(Debug, Clone)]
pub(crate) struct ChannelState {
    pub prev_block_len: usize,
    pub decoded_samples: usize,
    pub cur_subframe: usize,
    pub grouped: bool,
    pub transmit_coefs: bool,
    pub transmit_sf: bool,
    pub reuse_sf: bool,
    pub scale_factors: [i32; MAX_BANDS],
    pub resampled_scale_factors: [i32; MAX_BANDS],
    pub scale_factor_block_len: usize,
    pub scale_factor_step: i32,
    pub max_scale_factor: i32,
    pub quant_step_modifier: i32,
    pub coeffs: Vec<f32>,
    /// Transform output and history, two frames long.
    pub out: Vec<f32>,
}

impl ChannelState {
    pub fn new(samples_per_frame: usize) -> ChannelState {
        ChannelState {
            prev_block_len: samples_per_frame,
            decoded_samples: 0,
            cur_subframe: 0,
            grouped: false,
            transmit_coefs: false,
            transmit_sf: false,
            reuse_sf: false,
            scale_factors: [0; MAX_BANDS],
            resampled_scale_factors: [0; MAX_BANDS],
            scale_factor_block_len: samples_per_frame,
            scale_factor_step: 1,
            max_scale_factor: 0,
            quant_step_modifier: 0,
            coeffs: vec![0.0; samples_per_frame],
            out: vec![0.0; samples_per_frame * 2],
        }
    }

    /// Clears what a new frame must not inherit.
    pub fn start_frame(&mut self) {
        self.decoded_samples = 0;
        self.cur_subframe = 0;
        self.reuse_sf = false;
    }

    /// Forgets the scale factors of the previous frame.
    pub fn reset_scale_factors(&mut self) {
        self.scale_factor_step = 1;
        self.max_scale_factor = 0;
        self.scale_factors = [0; MAX_BANDS];
        self.resampled_scale_factors = [0; MAX_BANDS];
    }
}

/// Everything the decoder mutates while consuming packets.
#[derive(Debug, Clone)]
pub(crate) struct DecoderState {
    pub channels: Vec<ChannelState>,
    pub reservoir: BitReservoir,
    pub packet_count: u64,
    pub frame_count: u64,
}

impl DecoderState {
    pub fn new(config: &StreamConfig) -> DecoderState {
        DecoderState {
            channels: (0..config.num_channels)
                .map(|_| ChannelState::new(config.samples_per_frame))
                .collect(),
            reservoir: BitReservoir::with_capacity(config.block_align * 2),
            packet_count: 0,
            frame_count: 0,
        }
    }

    /// Sequence number the next packet has to carry.
    pub fn expected_sequence(&self) -> u8 {
        (self.packet_count % 16) as u8
    }
}
