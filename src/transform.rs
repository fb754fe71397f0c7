// WMA Pro Decoder
//
// Copyright (c) 2007 Baptiste Coudurier, Benjamin Larsson, Ulion
// Copyright (c) 2008 - 2009 Sascha Sommer, Benjamin Larsson
//
// The following code is a derivative work of the code from the FFmpeg project,
// which is licensed LGPL v2.1. This code therefore is also licensed under the terms
// of the GNU Lesser General Public License, verison 2.1.

//! Inter-channel decorrelation.

use std::borrow::Cow;

use crate::bitreader::BitReader;
use crate::config::{BandLayout, StreamConfig};
use crate::data::{MAX_CHANNELS, MID_SIDE_COEFF, MID_SIDE_OFF_GAIN};
use crate::state::ChannelState;
use crate::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelTransform {
    Identity,
    /// Mid/side coding of a stereo stream.
    MidSide,
    /// 45 degree rotation of a channel pair inside a multichannel stream.
    FixedRotation,
    /// Default matrix for a group of this many channels.
    Default(usize),
    /// Matrix built from transmitted rotation angles and signs.
    Custom {
        angles: Vec<u8>,
        positive: Vec<bool>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelGroup {
    pub channels: Vec<usize>,
    pub transform: ChannelTransform,
    /// Per scale factor band switch for the transform.
    pub transform_bands: Vec<bool>,
}

impl ChannelGroup {
    /// Row major decorrelation matrix, `None` for identity groups.
    pub fn matrix<'a>(&'a self, config: &'a StreamConfig) -> Option<Cow<'a, [f32]>> {
        match &self.transform {
            ChannelTransform::Identity => None,
            ChannelTransform::MidSide | ChannelTransform::FixedRotation => Some(Cow::Owned(vec![
                MID_SIDE_COEFF,
                -MID_SIDE_COEFF,
                MID_SIDE_COEFF,
                MID_SIDE_COEFF,
            ])),
            ChannelTransform::Default(size) => {
                Some(Cow::Borrowed(&config.default_matrices[*size][..]))
            }
            ChannelTransform::Custom { angles, positive } => {
                Some(Cow::Owned(custom_matrix(angles, positive)))
            }
        }
    }
}

/// Reads the channel groups of a subframe. `channels` are the channels
/// taking part in it.
pub(crate) fn decode_channel_transform(
    reader: &mut BitReader,
    config: &StreamConfig,
    state: &mut [ChannelState],
    channels: &[usize],
    num_bands: usize,
) -> Result<Vec<ChannelGroup>, Error> {
    if config.num_channels == 1 {
        return Ok(vec![ChannelGroup {
            channels: channels.to_vec(),
            transform: ChannelTransform::Identity,
            transform_bands: vec![true; num_bands],
        }]);
    }

    if reader.read_bit()? {
        return Err(Error::malformed("unsupported channel transform bit"));
    }

    for &c in channels {
        state[c].grouped = false;
    }

    let mut groups = Vec::new();
    let mut remaining_channels = channels.len();

    while remaining_channels > 0 && groups.len() < channels.len() {
        let mut members = Vec::with_capacity(remaining_channels);

        if remaining_channels > 2 {
            for &c in channels {
                if !state[c].grouped && reader.read_bit()? {
                    state[c].grouped = true;
                    members.push(c);
                }
            }
        } else {
            for &c in channels {
                if !state[c].grouped {
                    state[c].grouped = true;
                    members.push(c);
                }
            }
        }

        if members.is_empty() {
            return Err(Error::malformed("empty channel group"));
        }

        let size = members.len();
        let transform = match size {
            1 => ChannelTransform::Identity,
            2 => {
                if reader.read_bit()? {
                    if reader.read_bit()? {
                        read_rotation(reader, size)?
                    } else {
                        ChannelTransform::Identity
                    }
                } else if config.num_channels == 2 {
                    ChannelTransform::MidSide
                } else {
                    ChannelTransform::FixedRotation
                }
            }
            _ => {
                if reader.read_bit()? {
                    if reader.read_bit()? {
                        read_rotation(reader, size)?
                    } else {
                        ChannelTransform::Default(size)
                    }
                } else {
                    ChannelTransform::Identity
                }
            }
        };

        let transform_bands = if transform == ChannelTransform::Identity || reader.read_bit()? {
            vec![true; num_bands]
        } else {
            let mut bands = Vec::with_capacity(num_bands);
            for _ in 0..num_bands {
                bands.push(reader.read_bit()?);
            }
            bands
        };

        remaining_channels -= size;
        groups.push(ChannelGroup {
            channels: members,
            transform,
            transform_bands,
        });
    }

    Ok(groups)
}

fn read_rotation(reader: &mut BitReader, size: usize) -> Result<ChannelTransform, Error> {
    let mut angles = Vec::with_capacity(size * (size - 1) / 2);
    for _ in 0..size * (size - 1) / 2 {
        angles.push(reader.read_bits(6)? as u8);
    }

    let mut positive = Vec::with_capacity(size);
    for _ in 0..size {
        positive.push(reader.read_bit()?);
    }

    Ok(ChannelTransform::Custom { angles, positive })
}

/// Builds a decorrelation matrix from successive plane rotations of a signed
/// diagonal. Angle codes are in units of pi/64.
pub fn custom_matrix(angles: &[u8], positive: &[bool]) -> Vec<f32> {
    let size = positive.len();
    let mut matrix = vec![0.0f32; size * size];

    for (i, &positive) in positive.iter().enumerate() {
        matrix[i * size + i] = if positive { 1.0 } else { -1.0 };
    }

    let mut offset = 0;
    for i in 1..size {
        for x in 0..i {
            let angle = angles.get(offset + x).cloned().unwrap_or(0) as f64;
            let theta = angle * std::f64::consts::PI / 64.0;
            let sin = theta.sin() as f32;
            let cos = theta.cos() as f32;

            for y in 0..=i {
                let v1 = matrix[x * size + y];
                let v2 = matrix[i * size + y];
                matrix[x * size + y] = v1 * sin - v2 * cos;
                matrix[i * size + y] = v1 * cos + v2 * sin;
            }
        }
        offset += i;
    }

    matrix
}

/// Undoes the decorrelation of every group on the first `len` coefficients.
pub(crate) fn inverse_channel_transform(
    config: &StreamConfig,
    groups: &[ChannelGroup],
    state: &mut [ChannelState],
    layout: &BandLayout,
    len: usize,
) {
    for group in groups {
        let size = group.channels.len();
        if size < 2 {
            continue;
        }

        let matrix = match group.matrix(config) {
            Some(matrix) => matrix,
            None => continue,
        };

        for (band, &enabled) in group.transform_bands.iter().enumerate() {
            let range = layout.band(band, len);

            if !enabled {
                if group.transform == ChannelTransform::MidSide {
                    for &c in &group.channels {
                        for coeff in &mut state[c].coeffs[range.clone()] {
                            *coeff *= MID_SIDE_OFF_GAIN;
                        }
                    }
                }
                continue;
            }

            let mut input = [0.0f32; MAX_CHANNELS];
            for y in range {
                for (m, &c) in group.channels.iter().enumerate() {
                    input[m] = state[c].coeffs[y];
                }

                for (row, &c) in group.channels.iter().enumerate() {
                    state[c].coeffs[y] = matrix[row * size..(row + 1) * size]
                        .iter()
                        .zip(&input[..size])
                        .map(|(m, v)| m * v)
                        .sum();
                }
            }
        }
    }
}
