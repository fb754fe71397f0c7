// WMA Pro Decoder
//
// Copyright (c) 2007 Baptiste Coudurier, Benjamin Larsson, Ulion
// Copyright (c) 2008 - 2009 Sascha Sommer, Benjamin Larsson
//
// The following code is a derivative work of the code from the FFmpeg project,
// which is licensed LGPL v2.1. This code therefore is also licensed under the terms
// of the GNU Lesser General Public License, verison 2.1.

//! Constants and entropy codebooks.
//!
//! The codebook code lengths are produced by a deterministic Huffman
//! construction over rank weights, with canonical code assignment. Measured
//! codebooks can replace them through [`VlcTable::new`] without touching the
//! decoding paths, which only depend on the alphabet layout below.

use lazy_static::lazy_static;

use crate::vlc::VlcTable;

pub const MAX_CHANNELS: usize = 8;
pub const MAX_SUBFRAMES: usize = 32;
pub const MAX_BANDS: usize = 29;

pub const BLOCK_MIN_BITS: u32 = 7;
pub const BLOCK_MAX_BITS: u32 = 13;
pub const BLOCK_MIN_SIZE: usize = 1 << BLOCK_MIN_BITS;
pub const BLOCK_MAX_SIZE: usize = 1 << BLOCK_MAX_BITS;

/// Bark scale band edges in Hz.
pub const CRITICAL_FREQ: [u32; MAX_BANDS - 1] = [
    100, 200, 300, 400, 510, 630, 770, 920, 1080, 1270, 1480, 1720, 2000, 2320, 2700, 3150, 3700,
    4400, 5300, 6400, 7700, 9500, 12000, 15500, 20675, 28575, 41375, 63875,
];

/// Output position of each decoded channel for 6 channel streams.
pub const SIX_CHANNEL_LAYOUT: [usize; 6] = [0, 1, 4, 5, 2, 3];

/// cos(pi/4) as the bitstream defines it.
pub const MID_SIDE_COEFF: f32 = 0.707_031_25;
/// Gain for stereo bands coded without mid/side.
pub const MID_SIDE_OFF_GAIN: f32 = 181.0 / 128.0;

pub const SCALE_DPCM_OFFSET: i32 = 60;
pub const SCALE_BASE: i32 = 45;

pub const SCALE_SIZE: usize = 121;
pub const SCALE_RL_SIZE: usize = 120;
pub const COEF0_SIZE: usize = 272;
pub const COEF1_SIZE: usize = 244;
pub const VEC4_SIZE: usize = 127;
pub const VEC2_SIZE: usize = 137;
pub const VEC1_SIZE: usize = 101;

/// Run/level codebooks: symbol 0 escapes to raw bits, symbol 1 ends the run.
pub const RL_ESCAPE: u16 = 0;
pub const RL_END: u16 = 1;
pub const RL_FIRST_PAIR: u16 = 2;

pub const VEC4_ESCAPE: u16 = 126;
pub const VEC2_ESCAPE: u16 = 136;
pub const VEC1_ESCAPE: u16 = 100;

pub const QUANT_STEP_BASE: i32 = 90;

lazy_static! {
    pub static ref SCALE_VLC: VlcTable = build_codebook(
        &(0..SCALE_SIZE as i32)
            .map(|symbol| {
                let delta = symbol - SCALE_DPCM_OFFSET;
                if delta > 0 {
                    2 * delta as u64 - 1
                } else {
                    2 * (-delta) as u64
                }
            })
            .collect::<Vec<_>>()
    );
    pub static ref SCALE_RL_VLC: VlcTable = build_codebook(&run_level_ranks(SCALE_RL_SIZE, 40, 2));
    pub static ref COEF_VLC: [VlcTable; 2] = [
        build_codebook(&run_level_ranks(COEF0_SIZE, 24, 6)),
        build_codebook(&run_level_ranks(COEF1_SIZE, 24, 6)),
    ];
    pub static ref VEC4_VLC: VlcTable = build_codebook(&vector_ranks(VEC4_SIZE, 16));
    pub static ref VEC2_VLC: VlcTable = build_codebook(&vector_ranks(VEC2_SIZE, 24));
    pub static ref VEC1_VLC: VlcTable = build_codebook(&vector_ranks(VEC1_SIZE, 10));

    /// All 4-tuples with a sum of at most 5.
    pub static ref SYM_TO_VEC4: Vec<[u8; 4]> = {
        let mut vecs = Vec::with_capacity(VEC4_ESCAPE as usize);
        for sum in 0..=5u8 {
            for a in 0..=sum {
                for b in 0..=sum - a {
                    for c in 0..=sum - a - b {
                        vecs.push([a, b, c, sum - a - b - c]);
                    }
                }
            }
        }
        vecs
    };

    /// All pairs with a sum of at most 15.
    pub static ref SYM_TO_VEC2: Vec<[u8; 2]> = {
        let mut vecs = Vec::with_capacity(VEC2_ESCAPE as usize);
        for sum in 0..=15u8 {
            for a in 0..=sum {
                vecs.push([a, sum - a]);
            }
        }
        vecs
    };

    /// (run, level) of every non-special coefficient symbol, per table.
    pub static ref COEF_RUN_LEVEL: [Vec<(u16, u16)>; 2] = [
        run_level_pairs(COEF0_SIZE - RL_FIRST_PAIR as usize),
        run_level_pairs(COEF1_SIZE - RL_FIRST_PAIR as usize),
    ];

    /// (skip, level) of every non-special scale factor run symbol.
    pub static ref SCALE_RUN_LEVEL: Vec<(u16, u16)> =
        run_level_pairs(SCALE_RL_SIZE - RL_FIRST_PAIR as usize);
}

fn rank_weight(rank: u64) -> u64 {
    1 + (1 << 24) / ((rank + 1) * (rank + 1))
}

fn build_codebook(ranks: &[u64]) -> VlcTable {
    let weights = ranks.iter().map(|&rank| rank_weight(rank)).collect::<Vec<_>>();
    VlcTable::from_weights(&weights).expect("static codebook is a complete prefix code")
}

fn run_level_ranks(size: usize, escape_rank: u64, end_rank: u64) -> Vec<u64> {
    (0..size as u64)
        .map(|symbol| match symbol {
            0 => escape_rank,
            1 => end_rank,
            pair => pair - RL_FIRST_PAIR as u64,
        })
        .collect()
}

fn vector_ranks(size: usize, escape_rank: u64) -> Vec<u64> {
    (0..size as u64)
        .map(|symbol| {
            if symbol == size as u64 - 1 {
                escape_rank
            } else {
                symbol
            }
        })
        .collect()
}

/// Enumerates (run, level) pairs along diagonals of `run + 2 * (level - 1)`.
fn run_level_pairs(count: usize) -> Vec<(u16, u16)> {
    let mut pairs = Vec::with_capacity(count);
    let mut diagonal = 0u16;

    while pairs.len() < count {
        let mut level = 1u16;
        while 2 * (level - 1) <= diagonal && pairs.len() < count {
            pairs.push((diagonal - 2 * (level - 1), level));
            level += 1;
        }
        diagonal += 1;
    }

    pairs
}

/// Forces construction of every static table.
pub fn init_static() {
    lazy_static::initialize(&SCALE_VLC);
    lazy_static::initialize(&SCALE_RL_VLC);
    lazy_static::initialize(&COEF_VLC);
    lazy_static::initialize(&VEC4_VLC);
    lazy_static::initialize(&VEC2_VLC);
    lazy_static::initialize(&VEC1_VLC);
    lazy_static::initialize(&SYM_TO_VEC4);
    lazy_static::initialize(&SYM_TO_VEC2);
    lazy_static::initialize(&COEF_RUN_LEVEL);
    lazy_static::initialize(&SCALE_RUN_LEVEL);
}
