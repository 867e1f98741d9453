//! Bit-level cells, builders and slices.
//!
//! Only ordinary (non-exotic, level 0) cells are modelled. The representation hash follows the
//! standard layout: two descriptor bytes, the data bits padded with a completion tag, the depth
//! of every reference and finally the reference hashes, all fed to SHA-256.

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::language::protocol::{MAX_CELL_BITS, MAX_CELL_REFS};

pub mod exit_codes {
    pub const INTEGER_OVERFLOW: i32 = 4;
    pub const RANGE_CHECK: i32 = 5;
    pub const TYPE_CHECK: i32 = 7;
    pub const CELL_OVERFLOW: i32 = 8;
    pub const CELL_UNDERFLOW: i32 = 9;
    pub const INVALID_PREFIX: i32 = 129;
}

/// Abnormal termination of simulated contract code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmExit {
    pub code: i32,
    pub message: String,
}

impl VmExit {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for VmExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit code {}: {}", self.code, self.message)
    }
}

impl std::error::Error for VmExit {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    // Bits past `bit_len` in the last byte are always zero.
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
}

impl Cell {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VmExit> {
        let mut b = CellBuilder::new();
        b.store_bytes(bytes)?;
        Ok(b.end_cell())
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn bit(&self, index: usize) -> bool {
        (self.data[index / 8] >> (7 - index % 8)) & 1 == 1
    }

    pub fn depth(&self) -> u16 {
        self.refs
            .iter()
            .map(|r| r.depth().saturating_add(1))
            .max()
            .unwrap_or(0)
    }

    pub fn representation(&self) -> Vec<u8> {
        let full = self.bit_len / 8;
        let rem = self.bit_len % 8;
        let mut out = Vec::with_capacity(2 + full + 1 + self.refs.len() * 34);
        out.push(self.refs.len() as u8);
        out.push((self.bit_len.div_ceil(8) + full) as u8);
        out.extend_from_slice(&self.data[..full]);
        if rem != 0 {
            let kept = self.data[full] & (0xffu8 << (8 - rem));
            out.push(kept | (0x80u8 >> rem));
        }
        for r in &self.refs {
            out.extend_from_slice(&r.depth().to_be_bytes());
        }
        for r in &self.refs {
            out.extend_from_slice(&r.hash());
        }
        out
    }

    pub fn hash(&self) -> [u8; 32] {
        Sha256::digest(self.representation()).into()
    }

    pub fn hash_hex(&self) -> String {
        to_hex(&self.hash())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CellBuilder {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
}

impl CellBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self, VmExit> {
        if self.bit_len >= MAX_CELL_BITS {
            return Err(VmExit::new(
                exit_codes::CELL_OVERFLOW,
                format!("cell overflow: more than {MAX_CELL_BITS} bits"),
            ));
        }
        if self.bit_len % 8 == 0 {
            self.data.push(0);
        }
        if bit {
            let last = self.data.len() - 1;
            self.data[last] |= 0x80 >> (self.bit_len % 8);
        }
        self.bit_len += 1;
        Ok(self)
    }

    pub fn store_uint(&mut self, value: u128, bits: usize) -> Result<&mut Self, VmExit> {
        if bits < 128 && value >> bits != 0 {
            return Err(VmExit::new(
                exit_codes::RANGE_CHECK,
                format!("value {value} does not fit uint{bits}"),
            ));
        }
        for i in (0..bits).rev() {
            let bit = i < 128 && (value >> i) & 1 == 1;
            self.store_bit(bit)?;
        }
        Ok(self)
    }

    pub fn store_int(&mut self, value: i128, bits: usize) -> Result<&mut Self, VmExit> {
        let fits = match bits {
            0 => value == 0,
            1..=127 => {
                let bound = 1i128 << (bits - 1);
                value >= -bound && value < bound
            }
            _ => true,
        };
        if !fits {
            return Err(VmExit::new(
                exit_codes::RANGE_CHECK,
                format!("value {value} does not fit int{bits}"),
            ));
        }
        for i in (0..bits).rev() {
            let bit = if i >= 127 {
                value < 0
            } else {
                (value >> i) & 1 == 1
            };
            self.store_bit(bit)?;
        }
        Ok(self)
    }

    pub fn store_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self, VmExit> {
        for b in bytes {
            self.store_uint(u128::from(*b), 8)?;
        }
        Ok(self)
    }

    pub fn store_ref(&mut self, cell: Arc<Cell>) -> Result<&mut Self, VmExit> {
        if self.refs.len() >= MAX_CELL_REFS {
            return Err(VmExit::new(
                exit_codes::CELL_OVERFLOW,
                format!("cell overflow: more than {MAX_CELL_REFS} refs"),
            ));
        }
        self.refs.push(cell);
        Ok(self)
    }

    pub fn store_slice(&mut self, slice: &Slice) -> Result<&mut Self, VmExit> {
        for i in 0..slice.remaining_bits() {
            self.store_bit(slice.cell.bit(slice.bit_pos + i))?;
        }
        for r in &slice.cell.refs {
            self.store_ref(Arc::clone(r))?;
        }
        Ok(self)
    }

    pub fn end_cell(self) -> Cell {
        Cell {
            data: self.data,
            bit_len: self.bit_len,
            refs: self.refs,
        }
    }
}

/// A read cursor over a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    cell: Arc<Cell>,
    bit_pos: usize,
}

impl Slice {
    pub fn new(cell: Arc<Cell>) -> Self {
        Self {
            cell,
            bit_pos: 0,
        }
    }

    pub fn remaining_bits(&self) -> usize {
        self.cell.bit_len - self.bit_pos
    }

    fn ensure_bits(&self, bits: usize) -> Result<(), VmExit> {
        if self.remaining_bits() < bits {
            return Err(VmExit::new(
                exit_codes::CELL_UNDERFLOW,
                format!(
                    "cell underflow: need {bits} bits, {} remaining",
                    self.remaining_bits()
                ),
            ));
        }
        Ok(())
    }

    pub fn preload_uint(&self, bits: usize) -> Result<u128, VmExit> {
        self.ensure_bits(bits)?;
        let mut v: u128 = 0;
        for i in 0..bits {
            let bit = self.cell.bit(self.bit_pos + i);
            if bits - i > 128 {
                if bit {
                    return Err(VmExit::new(
                        exit_codes::INTEGER_OVERFLOW,
                        format!("uint{bits} value exceeds 128 bits"),
                    ));
                }
                continue;
            }
            v = (v << 1) | u128::from(bit);
        }
        Ok(v)
    }

    pub fn load_uint(&mut self, bits: usize) -> Result<u128, VmExit> {
        let v = self.preload_uint(bits)?;
        self.bit_pos += bits;
        Ok(v)
    }

    pub fn preload_int(&self, bits: usize) -> Result<i128, VmExit> {
        if bits == 0 {
            return Ok(0);
        }
        self.ensure_bits(bits)?;
        let sign = self.cell.bit(self.bit_pos);
        let mut v: i128 = if sign { -1 } else { 0 };
        for i in 0..bits {
            let bit = self.cell.bit(self.bit_pos + i);
            if bits - i > 127 {
                if bit != sign {
                    return Err(VmExit::new(
                        exit_codes::INTEGER_OVERFLOW,
                        format!("int{bits} value exceeds 128 bits"),
                    ));
                }
                continue;
            }
            v = (v << 1) | i128::from(bit);
        }
        Ok(v)
    }

    pub fn load_int(&mut self, bits: usize) -> Result<i128, VmExit> {
        let v = self.preload_int(bits)?;
        self.bit_pos += bits;
        Ok(v)
    }

    pub fn load_bit(&mut self) -> Result<bool, VmExit> {
        self.ensure_bits(1)?;
        let bit = self.cell.bit(self.bit_pos);
        self.bit_pos += 1;
        Ok(bit)
    }

    pub fn skip_bits(&mut self, bits: usize) -> Result<(), VmExit> {
        self.ensure_bits(bits)?;
        self.bit_pos += bits;
        Ok(())
    }

    /// The remaining bits and references as a standalone cell.
    pub fn to_cell(&self) -> Cell {
        let bit_len = self.remaining_bits();
        let mut data = vec![0u8; bit_len.div_ceil(8)];
        for i in 0..bit_len {
            if self.cell.bit(self.bit_pos + i) {
                data[i / 8] |= 0x80 >> (i % 8);
            }
        }
        Cell {
            data,
            bit_len,
            refs: self.cell.refs.clone(),
        }
    }

    /// Equivalent of `slice_hash`: the representation hash of the remaining data.
    pub fn hash(&self) -> [u8; 32] {
        self.to_cell().hash()
    }

    pub fn hash_hex(&self) -> String {
        to_hex(&self.hash())
    }

    /// Remaining bits as hex; a trailing partial byte is zero padded.
    pub fn data_hex(&self) -> String {
        to_hex(&self.to_cell().data)
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn parse_hex(src: &str) -> Result<Vec<u8>, String> {
    let src = src.trim();
    let src = src.strip_prefix("0x").unwrap_or(src);
    if !src.is_ascii() {
        return Err("hex string must be ASCII".to_string());
    }
    if src.len() % 2 != 0 {
        return Err(format!("hex string has odd length: {}", src.len()));
    }
    (0..src.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&src[i..i + 2], 16)
                .map_err(|e| format!("invalid hex at offset {i}: {e}"))
        })
        .collect()
}
