// WMA Pro Decoder
//
// Copyright (c) 2007 Baptiste Coudurier, Benjamin Larsson, Ulion
// Copyright (c) 2008 - 2009 Sascha Sommer, Benjamin Larsson
//
// The following code is a derivative work of the code from the FFmpeg project,
// which is licensed LGPL v2.1. This code therefore is also licensed under the terms
// of the GNU Lesser General Public License, verison 2.1.

use bitstream_io::{
    huffman::{compile_read_tree, ReadHuffmanTree},
    BigEndian,
};

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::Error;

/// Longest code any table may contain.
pub const MAX_CODE_LEN: u8 = 32;

/// Prefix code table mapping codes to `u16` symbols.
pub struct VlcTable {
    tree: Box<[ReadHuffmanTree<BigEndian, u16>]>,
    codes: Vec<Option<(u32, u8)>>,
    max_len: u8,
}

impl VlcTable {
    /// Builds a table from `(code, length, symbol)` triples. The codes must
    /// form a complete prefix code.
    pub fn new(entries: &[(u32, u8, u16)]) -> Result<VlcTable, Error> {
        let num_symbols = entries
            .iter()
            .map(|&(_, _, symbol)| symbol as usize + 1)
            .max()
            .unwrap_or(0);

        let mut codes = vec![None; num_symbols];
        let mut max_len = 0;
        let mut values = Vec::with_capacity(entries.len());

        for &(code, len, symbol) in entries {
            if len == 0 || len > MAX_CODE_LEN {
                return Err(Error::InvalidCodebook(format!(
                    "symbol {} has code length {}",
                    symbol, len
                )));
            }
            if codes[symbol as usize].is_some() {
                return Err(Error::InvalidCodebook(format!(
                    "symbol {} appears twice",
                    symbol
                )));
            }

            codes[symbol as usize] = Some((code, len));
            max_len = max_len.max(len);

            let bits = (0..len).rev().map(|i| ((code >> i) & 1) as u8).collect();
            values.push((symbol, bits));
        }

        let tree = compile_read_tree(values)
            .map_err(|e| Error::InvalidCodebook(format!("{:?}", e)))?;

        Ok(VlcTable {
            tree,
            codes,
            max_len,
        })
    }

    /// Builds a canonical code where symbol `i` gets `lengths[i]` bits.
    pub fn from_lengths(lengths: &[u8]) -> Result<VlcTable, Error> {
        let entries = canonical_codes(lengths)?
            .into_iter()
            .enumerate()
            .map(|(symbol, (code, len))| (code, len, symbol as u16))
            .collect::<Vec<_>>();

        VlcTable::new(&entries)
    }

    /// Builds a Huffman code for symbols with the given relative weights.
    pub fn from_weights(weights: &[u64]) -> Result<VlcTable, Error> {
        VlcTable::from_lengths(&huffman_lengths(weights))
    }

    pub(crate) fn tree(&self) -> &[ReadHuffmanTree<BigEndian, u16>] {
        &self.tree
    }

    /// Code and code length assigned to `symbol`.
    pub fn code(&self, symbol: u16) -> Option<(u32, u8)> {
        self.codes.get(symbol as usize).cloned().flatten()
    }

    pub fn max_len(&self) -> u8 {
        self.max_len
    }

    pub fn num_symbols(&self) -> usize {
        self.codes.iter().filter(|code| code.is_some()).count()
    }
}

/// Assigns canonical codes: shorter codes first, ties broken by symbol.
fn canonical_codes(lengths: &[u8]) -> Result<Vec<(u32, u8)>, Error> {
    let mut order = (0..lengths.len()).collect::<Vec<_>>();
    order.sort_by_key(|&symbol| (lengths[symbol], symbol));

    let mut codes = vec![(0u32, 0u8); lengths.len()];
    let mut code = 0u64;
    let mut prev_len = 0u8;

    for symbol in order {
        let len = lengths[symbol];
        if len == 0 || len > MAX_CODE_LEN {
            return Err(Error::InvalidCodebook(format!(
                "symbol {} has code length {}",
                symbol, len
            )));
        }

        code <<= len - prev_len;
        if code >> len != 0 {
            return Err(Error::InvalidCodebook(
                "code lengths oversubscribe the code space".to_string(),
            ));
        }

        codes[symbol] = (code as u32, len);
        code += 1;
        prev_len = len;
    }

    Ok(codes)
}

/// Code lengths of a Huffman code over `weights`. Equal weights are merged
/// in symbol order so the result is deterministic.
pub(crate) fn huffman_lengths(weights: &[u64]) -> Vec<u8> {
    if weights.len() < 2 {
        return vec![1; weights.len()];
    }

    let mut parent = vec![usize::max_value(); weights.len()];
    let mut heap = weights
        .iter()
        .enumerate()
        .map(|(node, &weight)| Reverse((weight.max(1), node)))
        .collect::<BinaryHeap<_>>();

    while heap.len() > 1 {
        let (Reverse((w0, n0)), Reverse((w1, n1))) = match (heap.pop(), heap.pop()) {
            (Some(a), Some(b)) => (a, b),
            _ => break,
        };

        let node = parent.len();
        parent.push(usize::max_value());
        parent[n0] = node;
        parent[n1] = node;
        heap.push(Reverse((w0 + w1, node)));
    }

    (0..weights.len())
        .map(|leaf| {
            let mut depth = 0u8;
            let mut node = leaf;
            while parent[node] != usize::max_value() {
                node = parent[node];
                depth += 1;
            }
            depth
        })
        .collect()
}
