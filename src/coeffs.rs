// WMA Pro Decoder
//
// Copyright (c) 2007 Baptiste Coudurier, Benjamin Larsson, Ulion
// Copyright (c) 2008 - 2009 Sascha Sommer, Benjamin Larsson
//
// The following code is a derivative work of the code from the FFmpeg project,
// which is licensed LGPL v2.1. This code therefore is also licensed under the terms
// of the GNU Lesser General Public License, verison 2.1.

use crate::bitreader::BitReader;
use crate::config::log2;
use crate::data::*;
use crate::Error;

/// Extra widths of the large value escape, each gated by a presence bit.
const LARGE_VAL_STEPS: [u32; 3] = [8, 8, 7];

/// Decodes the quantized coefficients of one channel into `coeffs`, which
/// must be zeroed and exactly one subframe long.
///
/// `num_vec_coeffs` is the transmitted count of vector coded coefficients.
/// Without it, vector mode lasts until a run of zeros longer than
/// `len / 256` shows up.
pub fn decode_coeffs(
    reader: &mut BitReader,
    coeffs: &mut [f32],
    num_vec_coeffs: Option<usize>,
) -> Result<(), Error> {
    let len = coeffs.len();
    if len == 0 {
        return Ok(());
    }

    let esc_len = log2(len as u32 - 1) + 1;
    let table = if reader.read_bit()? { 0 } else { 1 };
    let vlc = &COEF_VLC[table];
    let run_level = &COEF_RUN_LEVEL[table];

    let vec_limit = num_vec_coeffs.unwrap_or(len).min(len);
    let zero_run_limit = len / 256;

    let mut cur_coeff = 0;
    let mut last_write = 0;
    let mut rl_mode = false;

    while !rl_mode && cur_coeff < vec_limit {
        let vals = read_vec4(reader)?;

        for &val in vals.iter() {
            cur_coeff += 1;
            last_write += 1;

            if val != 0.0 {
                coeffs[cur_coeff - 1] = val;
                last_write = 0;
            }

            if cur_coeff >= len {
                return Ok(());
            }
            if num_vec_coeffs.is_none() && last_write > zero_run_limit {
                rl_mode = true;
            }
        }
    }

    while cur_coeff < len {
        let symbol = reader.decode_vlc(vlc)?;

        let val = match symbol {
            RL_END => return Ok(()),
            RL_ESCAPE => {
                let val = read_large_val(reader)?;
                cur_coeff += read_escape_skip(reader, esc_len)?;
                val
            }
            _ => {
                let (run, level) = run_level[(symbol - RL_FIRST_PAIR) as usize];
                cur_coeff += run as usize;
                level as u32
            }
        };

        let positive = reader.read_bit()?;
        if cur_coeff >= len {
            log::trace!("coefficient cursor {} past subframe end {}", cur_coeff, len);
            break;
        }

        coeffs[cur_coeff] = if positive { val as f32 } else { -(val as f32) };
        cur_coeff += 1;
    }

    Ok(())
}

/// Four signed values of vector mode.
fn read_vec4(reader: &mut BitReader) -> Result<[f32; 4], Error> {
    let mut vals = [0u32; 4];

    let symbol = reader.decode_vlc(&VEC4_VLC)?;
    if symbol == VEC4_ESCAPE {
        for pair in vals.chunks_mut(2) {
            let symbol = reader.decode_vlc(&VEC2_VLC)?;
            if symbol == VEC2_ESCAPE {
                pair[0] = read_vec1(reader)?;
                pair[1] = read_vec1(reader)?;
            } else {
                let vec = SYM_TO_VEC2[symbol as usize];
                pair[0] = vec[0] as u32;
                pair[1] = vec[1] as u32;
            }
        }
    } else {
        let vec = SYM_TO_VEC4[symbol as usize];
        for (val, &v) in vals.iter_mut().zip(vec.iter()) {
            *val = v as u32;
        }
    }

    let mut signed = [0.0f32; 4];
    for (out, &val) in signed.iter_mut().zip(vals.iter()) {
        if val != 0 {
            *out = if reader.read_bit()? {
                val as f32
            } else {
                -(val as f32)
            };
        }
    }

    Ok(signed)
}

fn read_vec1(reader: &mut BitReader) -> Result<u32, Error> {
    let val = reader.decode_vlc(&VEC1_VLC)? as u32;
    if val == VEC1_ESCAPE as u32 {
        Ok(val + read_large_val(reader)?)
    } else {
        Ok(val)
    }
}

/// Reads an 8, 16, 24 or 31 bit magnitude.
pub(crate) fn read_large_val(reader: &mut BitReader) -> Result<u32, Error> {
    let mut bits = 8;
    for &step in LARGE_VAL_STEPS.iter() {
        if !reader.read_bit()? {
            break;
        }
        bits += step;
    }
    reader.read_bits(bits)
}

fn read_escape_skip(reader: &mut BitReader, esc_len: u32) -> Result<usize, Error> {
    if !reader.read_bit()? {
        return Ok(0);
    }
    if !reader.read_bit()? {
        return Ok(reader.read_bits(2)? as usize + 1);
    }
    if reader.read_bit()? {
        return Err(Error::malformed("broken escape sequence"));
    }
    Ok(reader.read_bits(esc_len)? as usize + 4)
}
