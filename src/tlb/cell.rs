//! Cells, builders and slices
//!
//! A cell holds up to 1023 data bits and up to 4 references to child cells.
//! Bits are packed MSB-first; trailing bits of the last byte are always zero
//! so that structural equality of two cells is plain byte equality.

use std::fmt;
use std::sync::Arc;

use super::{CellDeserialize, CellSerialize, CodecError};

/// Maximum number of data bits in a single cell
pub const MAX_CELL_BITS: usize = 1023;

/// Maximum number of child references in a single cell
pub const MAX_CELL_REFS: usize = 4;

/// Immutable cell. Cloning is cheap (shared).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Cell(Arc<CellData>);

#[derive(PartialEq, Eq, Hash)]
struct CellData {
    data: Vec<u8>,
    bit_len: usize,
    references: Vec<Cell>,
}

impl Cell {
    /// Assemble a cell from raw parts, validating the size limits.
    pub fn from_parts(data: Vec<u8>, bit_len: usize, references: Vec<Cell>) -> Result<Self, CodecError> {
        if bit_len > MAX_CELL_BITS || references.len() > MAX_CELL_REFS {
            return Err(CodecError::CellOverflow);
        }
        if data.len() < bit_len.div_ceil(8) {
            return Err(CodecError::MalformedMessage(format!(
                "cell data holds {} bytes, {} bits declared",
                data.len(),
                bit_len
            )));
        }
        let mut data = data;
        data.truncate(bit_len.div_ceil(8));
        clear_trailing_bits(&mut data, bit_len);

        Ok(Self(Arc::new(CellData {
            data,
            bit_len,
            references,
        })))
    }

    /// A cell with no bits and no references
    pub fn empty() -> Self {
        Self(Arc::new(CellData {
            data: Vec::new(),
            bit_len: 0,
            references: Vec::new(),
        }))
    }

    pub fn bit_len(&self) -> usize {
        self.0.bit_len
    }

    /// Packed data bytes (last byte zero-padded)
    pub fn data(&self) -> &[u8] {
        &self.0.data
    }

    pub fn references(&self) -> &[Cell] {
        &self.0.references
    }

    pub fn bit(&self, index: usize) -> Option<bool> {
        if index >= self.0.bit_len {
            return None;
        }
        let byte = self.0.data.get(index / 8)?;
        Some(byte >> (7 - index % 8) & 1 == 1)
    }

    /// Open a read cursor at the start of the cell
    pub fn parse(&self) -> CellSlice {
        CellSlice {
            cell: self.clone(),
            bit_pos: 0,
            ref_pos: 0,
        }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cell{{{}b x{{{}}}", self.bit_len(), hex::encode(self.data()))?;
        for reference in self.references() {
            write!(f, " {:?}", reference)?;
        }
        write!(f, "}}")
    }
}

fn clear_trailing_bits(data: &mut [u8], bit_len: usize) {
    let rem = bit_len % 8;
    if rem != 0 {
        if let Some(last) = data.last_mut() {
            *last &= 0xffu8 << (8 - rem);
        }
    }
}

/// Append-only cell builder.
///
/// All store methods return `&mut Self` so calls chain with `?`.
#[derive(Debug, Clone, Default)]
pub struct CellBuilder {
    data: Vec<u8>,
    bit_len: usize,
    references: Vec<Cell>,
}

impl CellBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn bits_left(&self) -> usize {
        MAX_CELL_BITS - self.bit_len
    }

    pub fn refs_left(&self) -> usize {
        MAX_CELL_REFS - self.references.len()
    }

    fn ensure_bits(&self, bits: usize) -> Result<(), CodecError> {
        if bits > self.bits_left() {
            return Err(CodecError::CellOverflow);
        }
        Ok(())
    }

    fn push_bit(&mut self, bit: bool) {
        if self.bit_len % 8 == 0 {
            self.data.push(0);
        }
        if bit {
            if let Some(last) = self.data.last_mut() {
                *last |= 1 << (7 - self.bit_len % 8);
            }
        }
        self.bit_len += 1;
    }

    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self, CodecError> {
        self.ensure_bits(1)?;
        self.push_bit(bit);
        Ok(self)
    }

    /// Store `value` as an unsigned integer of exactly `bits` bits (at most 64).
    pub fn store_uint(&mut self, value: u64, bits: usize) -> Result<&mut Self, CodecError> {
        if bits > 64 || (bits < 64 && value >> bits != 0) {
            return Err(CodecError::IntegerOverflow { value: value.to_string(), bits });
        }
        self.ensure_bits(bits)?;
        for i in (0..bits).rev() {
            self.push_bit(value >> i & 1 == 1);
        }
        Ok(self)
    }

    /// Store `value` as a two's complement integer of exactly `bits` bits (at most 64).
    pub fn store_int(&mut self, value: i64, bits: usize) -> Result<&mut Self, CodecError> {
        let fits = match bits {
            0 => value == 0,
            1..=63 => {
                let bound = 1i64 << (bits - 1);
                (-bound..bound).contains(&value)
            }
            64 => true,
            _ => false,
        };
        if !fits {
            return Err(CodecError::IntegerOverflow { value: value.to_string(), bits });
        }
        let raw = if bits == 64 {
            value as u64
        } else {
            (value as u64) & ((1u64 << bits) - 1)
        };
        self.store_uint(raw, bits)
    }

    pub fn store_u8(&mut self, value: u8) -> Result<&mut Self, CodecError> {
        self.store_uint(value as u64, 8)
    }

    pub fn store_u32(&mut self, value: u32) -> Result<&mut Self, CodecError> {
        self.store_uint(value as u64, 32)
    }

    pub fn store_u64(&mut self, value: u64) -> Result<&mut Self, CodecError> {
        self.store_uint(value, 64)
    }

    /// Store whole bytes
    pub fn store_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self, CodecError> {
        self.store_bits(bytes, bytes.len() * 8)
    }

    /// Store the first `bits` bits of MSB-first packed `data`
    pub fn store_bits(&mut self, data: &[u8], bits: usize) -> Result<&mut Self, CodecError> {
        if data.len() * 8 < bits {
            return Err(CodecError::MalformedMessage(format!(
                "{} bits requested from {} bytes",
                bits,
                data.len()
            )));
        }
        self.ensure_bits(bits)?;
        for i in 0..bits {
            let byte = data[i / 8];
            self.push_bit(byte >> (7 - i % 8) & 1 == 1);
        }
        Ok(self)
    }

    pub fn store_reference(&mut self, cell: Cell) -> Result<&mut Self, CodecError> {
        if self.refs_left() == 0 {
            return Err(CodecError::CellOverflow);
        }
        self.references.push(cell);
        Ok(self)
    }

    /// Append the remaining bits and references of `slice`
    pub fn store_slice(&mut self, slice: &CellSlice) -> Result<&mut Self, CodecError> {
        let mut slice = slice.clone();
        let bits = slice.bits_left();
        if bits > self.bits_left() || slice.refs_left() > self.refs_left() {
            return Err(CodecError::CellOverflow);
        }
        let data = slice.load_bits(bits)?;
        self.store_bits(&data, bits)?;
        while slice.refs_left() > 0 {
            let reference = slice.load_reference()?;
            self.store_reference(reference)?;
        }
        Ok(self)
    }

    /// Inline the content of `cell` (its bits and its references)
    pub fn store_cell_inline(&mut self, cell: &Cell) -> Result<&mut Self, CodecError> {
        self.store_slice(&cell.parse())
    }

    /// `Maybe ^Cell`: presence bit, then the cell as a reference
    pub fn store_maybe_ref(&mut self, cell: Option<&Cell>) -> Result<&mut Self, CodecError> {
        match cell {
            Some(cell) => {
                self.store_bit(true)?;
                self.store_reference(cell.clone())
            }
            None => self.store_bit(false),
        }
    }

    /// `Maybe X`: presence bit, then the value stored inline
    pub fn store_maybe<T: CellSerialize>(&mut self, value: Option<&T>) -> Result<&mut Self, CodecError> {
        match value {
            Some(value) => {
                self.store_bit(true)?;
                value.store(self)?;
                Ok(self)
            }
            None => self.store_bit(false),
        }
    }

    /// `Either X ^X`: discriminator bit `0` with the content inlined when it
    /// fits in the remaining space, otherwise bit `1` and a reference.
    pub fn store_either(&mut self, cell: &Cell) -> Result<&mut Self, CodecError> {
        let fits_inline =
            self.bits_left() > cell.bit_len() && self.refs_left() >= cell.references().len();
        if fits_inline {
            self.store_bit(false)?;
            self.store_cell_inline(cell)
        } else {
            self.store_bit(true)?;
            self.store_reference(cell.clone())
        }
    }

    pub fn build(&self) -> Result<Cell, CodecError> {
        Cell::from_parts(self.data.clone(), self.bit_len, self.references.clone())
    }
}

/// Read cursor over a cell. Owns a handle to the cell, so it can outlive the
/// value it was opened from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSlice {
    cell: Cell,
    bit_pos: usize,
    ref_pos: usize,
}

impl CellSlice {
    pub fn bits_left(&self) -> usize {
        self.cell.bit_len() - self.bit_pos
    }

    pub fn refs_left(&self) -> usize {
        self.cell.references().len() - self.ref_pos
    }

    pub fn is_empty(&self) -> bool {
        self.bits_left() == 0 && self.refs_left() == 0
    }

    fn ensure_bits(&self, bits: usize) -> Result<(), CodecError> {
        if bits > self.bits_left() {
            return Err(CodecError::MalformedMessage(format!(
                "need {} bits, {} left",
                bits,
                self.bits_left()
            )));
        }
        Ok(())
    }

    fn next_bit(&mut self) -> bool {
        let bit = self.cell.bit(self.bit_pos).unwrap_or(false);
        self.bit_pos += 1;
        bit
    }

    pub fn load_bit(&mut self) -> Result<bool, CodecError> {
        self.ensure_bits(1)?;
        Ok(self.next_bit())
    }

    pub fn load_uint(&mut self, bits: usize) -> Result<u64, CodecError> {
        if bits > 64 {
            return Err(CodecError::MalformedMessage(format!(
                "cannot load {}-bit integer into u64",
                bits
            )));
        }
        self.ensure_bits(bits)?;
        let mut value = 0u64;
        for _ in 0..bits {
            value = value << 1 | self.next_bit() as u64;
        }
        Ok(value)
    }

    pub fn load_int(&mut self, bits: usize) -> Result<i64, CodecError> {
        let raw = self.load_uint(bits)?;
        if bits == 0 || bits == 64 {
            return Ok(raw as i64);
        }
        let shift = 64 - bits;
        Ok(((raw << shift) as i64) >> shift)
    }

    pub fn load_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.load_uint(8)? as u8)
    }

    pub fn load_u32(&mut self) -> Result<u32, CodecError> {
        Ok(self.load_uint(32)? as u32)
    }

    pub fn load_u64(&mut self) -> Result<u64, CodecError> {
        self.load_uint(64)
    }

    /// Read `bits` bits into MSB-first packed bytes
    pub fn load_bits(&mut self, bits: usize) -> Result<Vec<u8>, CodecError> {
        self.ensure_bits(bits)?;
        let mut out = vec![0u8; bits.div_ceil(8)];
        for i in 0..bits {
            if self.next_bit() {
                out[i / 8] |= 1 << (7 - i % 8);
            }
        }
        Ok(out)
    }

    pub fn load_bytes(&mut self, len: usize) -> Result<Vec<u8>, CodecError> {
        self.load_bits(len * 8)
    }

    pub fn skip_bits(&mut self, bits: usize) -> Result<(), CodecError> {
        self.ensure_bits(bits)?;
        self.bit_pos += bits;
        Ok(())
    }

    /// Peek the next `bits` bits as an integer without consuming them
    pub fn preload_uint(&self, bits: usize) -> Result<u64, CodecError> {
        self.clone().load_uint(bits)
    }

    pub fn load_reference(&mut self) -> Result<Cell, CodecError> {
        let reference = self
            .cell
            .references()
            .get(self.ref_pos)
            .cloned()
            .ok_or_else(|| CodecError::MalformedMessage("no references left".into()))?;
        self.ref_pos += 1;
        Ok(reference)
    }

    pub fn load_maybe_ref(&mut self) -> Result<Option<Cell>, CodecError> {
        if self.load_bit()? {
            Ok(Some(self.load_reference()?))
        } else {
            Ok(None)
        }
    }

    /// `Maybe X` read inline from this slice
    pub fn load_maybe<T: CellDeserialize>(&mut self) -> Result<Option<T>, CodecError> {
        if self.load_bit()? {
            Ok(Some(T::load(self)?))
        } else {
            Ok(None)
        }
    }

    /// `Either X ^X`: bit `0` means the rest of this slice is the payload,
    /// bit `1` means the payload sits in the next reference.
    pub fn load_either(&mut self) -> Result<Cell, CodecError> {
        if self.load_bit()? {
            self.load_reference()
        } else {
            let rest = self.to_cell()?;
            self.bit_pos = self.cell.bit_len();
            self.ref_pos = self.cell.references().len();
            Ok(rest)
        }
    }

    /// Materialize the unread remainder as a standalone cell
    pub fn to_cell(&self) -> Result<Cell, CodecError> {
        let mut builder = CellBuilder::new();
        builder.store_slice(self)?;
        builder.build()
    }

    /// Fail unless every bit and reference has been consumed
    pub fn ensure_empty(&self) -> Result<(), CodecError> {
        if !self.is_empty() {
            return Err(CodecError::MalformedMessage(format!(
                "{} bits and {} references left unread",
                self.bits_left(),
                self.refs_left()
            )));
        }
        Ok(())
    }
}
