//! Bag-of-cells serialization
//!
//! Single-root containers in the generic `b5ee9c72` layout. Serialization
//! writes cells in pre-order (every reference points forward) with a CRC32C
//! trailer and no index. Deserialization accepts containers with or without
//! index and CRC.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::{Cell, CodecError};

const BOC_GENERIC_MAGIC: [u8; 4] = [0xb5, 0xee, 0x9c, 0x72];

const FLAG_HAS_INDEX: u8 = 0x80;
const FLAG_HAS_CRC32C: u8 = 0x40;

/// Serialize a cell tree into a bag of cells
pub fn serialize(root: &Cell) -> Result<Vec<u8>, CodecError> {
    let mut cells = Vec::new();
    flatten(root, &mut cells);

    let size_bytes = bytes_needed(cells.len() as u64);
    let mut payload = Vec::new();
    for (cell, refs) in &cells {
        write_cell(&mut payload, cell, refs, size_bytes);
    }
    let off_bytes = bytes_needed(payload.len() as u64);

    let mut out = Vec::with_capacity(payload.len() + 32);
    out.extend_from_slice(&BOC_GENERIC_MAGIC);
    out.push(FLAG_HAS_CRC32C | size_bytes as u8);
    out.push(off_bytes as u8);
    write_uint(&mut out, cells.len() as u64, size_bytes);
    write_uint(&mut out, 1, size_bytes); // roots
    write_uint(&mut out, 0, size_bytes); // absent
    write_uint(&mut out, payload.len() as u64, off_bytes);
    write_uint(&mut out, 0, size_bytes); // root index
    out.extend_from_slice(&payload);

    let crc = crc32c(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(out)
}

/// Deserialize a single-root bag of cells
pub fn deserialize(bytes: &[u8]) -> Result<Cell, CodecError> {
    let mut reader = Reader { bytes, pos: 0 };

    if reader.take(4)? != BOC_GENERIC_MAGIC {
        return Err(CodecError::InvalidBoc("unknown magic".into()));
    }
    let flags = reader.byte()?;
    let has_index = flags & FLAG_HAS_INDEX != 0;
    let has_crc = flags & FLAG_HAS_CRC32C != 0;
    let size_bytes = (flags & 0x07) as usize;
    if size_bytes == 0 || size_bytes > 4 {
        return Err(CodecError::InvalidBoc(format!("invalid ref size {}", size_bytes)));
    }
    let off_bytes = reader.byte()? as usize;
    if off_bytes == 0 || off_bytes > 8 {
        return Err(CodecError::InvalidBoc(format!("invalid offset size {}", off_bytes)));
    }

    if has_crc {
        if bytes.len() < 4 {
            return Err(CodecError::InvalidBoc("truncated".into()));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - 4);
        if crc32c(body).to_le_bytes() != trailer {
            return Err(CodecError::InvalidBoc("crc32c mismatch".into()));
        }
    }

    let cell_count = reader.uint(size_bytes)? as usize;
    let root_count = reader.uint(size_bytes)?;
    let _absent = reader.uint(size_bytes)?;
    let _total_size = reader.uint(off_bytes)?;
    if root_count != 1 {
        return Err(CodecError::InvalidBoc(format!("expected 1 root, found {}", root_count)));
    }
    let root_index = reader.uint(size_bytes)? as usize;
    if has_index {
        reader.take(cell_count * off_bytes)?;
    }

    let mut raw_cells = Vec::with_capacity(cell_count.min(bytes.len()));
    for index in 0..cell_count {
        raw_cells.push(read_cell(&mut reader, index, cell_count, size_bytes)?);
    }

    // references only point forward, so build from the tail
    let mut built: Vec<Option<Cell>> = vec![None; cell_count];
    for (index, raw) in raw_cells.into_iter().enumerate().rev() {
        let references = raw
            .refs
            .iter()
            .map(|r| {
                built
                    .get(*r)
                    .cloned()
                    .flatten()
                    .ok_or_else(|| CodecError::InvalidBoc(format!("dangling reference {}", r)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        built[index] = Some(Cell::from_parts(raw.data, raw.bit_len, references)?);
    }

    built
        .get(root_index)
        .cloned()
        .flatten()
        .ok_or_else(|| CodecError::InvalidBoc(format!("root index {} out of range", root_index)))
}

/// Serialize and base64-encode, the form RPC endpoints exchange
pub fn to_base64(root: &Cell) -> Result<String, CodecError> {
    Ok(STANDARD.encode(serialize(root)?))
}

pub fn from_base64(encoded: &str) -> Result<Cell, CodecError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CodecError::InvalidBoc(format!("base64: {}", e)))?;
    deserialize(&bytes)
}

fn flatten(cell: &Cell, out: &mut Vec<(Cell, Vec<usize>)>) -> usize {
    let index = out.len();
    out.push((cell.clone(), Vec::new()));
    let refs = cell
        .references()
        .iter()
        .map(|child| flatten(child, out))
        .collect();
    out[index].1 = refs;
    index
}

fn write_cell(out: &mut Vec<u8>, cell: &Cell, refs: &[usize], size_bytes: usize) {
    let bits = cell.bit_len();
    let d1 = refs.len() as u8;
    let d2 = (bits / 8 + bits.div_ceil(8)) as u8;
    out.push(d1);
    out.push(d2);

    let mut data = cell.data().to_vec();
    if bits % 8 != 0 {
        // completion tag: a single 1 bit after the data
        if let Some(last) = data.last_mut() {
            *last |= 1 << (7 - bits % 8);
        }
    }
    out.extend_from_slice(&data);
    for r in refs {
        write_uint(out, *r as u64, size_bytes);
    }
}

struct RawCell {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<usize>,
}

fn read_cell(
    reader: &mut Reader<'_>,
    index: usize,
    cell_count: usize,
    size_bytes: usize,
) -> Result<RawCell, CodecError> {
    let d1 = reader.byte()?;
    let d2 = reader.byte()?;
    if d1 & 0x08 != 0 {
        return Err(CodecError::InvalidBoc("exotic cells are not supported".into()));
    }
    let ref_count = (d1 & 0x07) as usize;
    if ref_count > 4 {
        return Err(CodecError::InvalidBoc(format!("cell {} has {} references", index, ref_count)));
    }

    let data_len = (d2 as usize).div_ceil(2);
    let mut data = reader.take(data_len)?.to_vec();
    let bit_len = if d2 % 2 == 0 {
        data_len * 8
    } else {
        let last = data.last().copied().unwrap_or(0);
        if last == 0 {
            return Err(CodecError::InvalidBoc(format!("cell {} lacks completion tag", index)));
        }
        let padding = last.trailing_zeros() as usize + 1;
        if let Some(last) = data.last_mut() {
            *last &= !(1u8 << (padding - 1));
        }
        data_len * 8 - padding
    };

    let mut refs = Vec::with_capacity(ref_count);
    for _ in 0..ref_count {
        let r = reader.uint(size_bytes)? as usize;
        if r <= index || r >= cell_count {
            return Err(CodecError::InvalidBoc(format!(
                "cell {} references {} out of order",
                index, r
            )));
        }
        refs.push(r);
    }

    Ok(RawCell { data, bit_len, refs })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| CodecError::InvalidBoc("truncated".into()))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn byte(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn uint(&mut self, len: usize) -> Result<u64, CodecError> {
        Ok(self
            .take(len)?
            .iter()
            .fold(0u64, |acc, b| acc << 8 | *b as u64))
    }
}

fn bytes_needed(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

fn write_uint(out: &mut Vec<u8>, value: u64, len: usize) {
    out.extend_from_slice(&value.to_be_bytes()[8 - len..]);
}

/// CRC-32C (Castagnoli), reflected
fn crc32c(data: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    for byte in data {
        crc ^= *byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                crc >> 1 ^ 0x82f6_3b78
            } else {
                crc >> 1
            };
        }
    }
    !crc
}
