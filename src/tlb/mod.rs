//! Bit-packed message codec
//!
//! Building blocks for the cell-based wire format used by the network's
//! smart-contract layer:
//! - `Cell` / `CellBuilder` / `CellSlice` for bit-level encoding
//! - `Address` and `Coins` primitives
//! - Bag-of-cells container for transporting cell trees over RPC
//! - `CellSerialize` / `CellDeserialize` / `TlbMessage` traits that message
//!   types implement

pub mod address;
pub mod boc;
pub mod cell;
pub mod coins;

pub use address::Address;
pub use cell::{Cell, CellBuilder, CellSlice};
pub use coins::Coins;

/// Errors raised while encoding or decoding cells and messages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unrecognized message magic 0x{0:08x}")]
    UnrecognizedMessage(u32),

    #[error("Cell overflow: more than 1023 bits or 4 references")]
    CellOverflow,

    #[error("Integer {value} does not fit in {bits} bits")]
    IntegerOverflow { value: String, bits: usize },

    #[error("Amount does not fit in 120 bits")]
    AmountOverflow,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid bag of cells: {0}")]
    InvalidBoc(String),
}

/// Types that can write themselves into a cell builder
pub trait CellSerialize {
    fn store(&self, builder: &mut CellBuilder) -> Result<(), CodecError>;

    /// Encode into a fresh cell
    fn to_cell(&self) -> Result<Cell, CodecError> {
        let mut builder = CellBuilder::new();
        self.store(&mut builder)?;
        builder.build()
    }
}

/// Types that can read themselves from a slice
pub trait CellDeserialize: Sized {
    fn load(slice: &mut CellSlice) -> Result<Self, CodecError>;

    /// Decode a whole cell, rejecting trailing data
    fn from_cell(cell: &Cell) -> Result<Self, CodecError> {
        let mut slice = cell.parse();
        let value = Self::load(&mut slice)?;
        slice.ensure_empty()?;
        Ok(value)
    }
}

/// A top-level message variant, prefixed on the wire by a 32-bit magic
pub trait TlbMessage {
    const MAGIC: u32;
}

/// Consume the 32-bit magic, failing with `UnrecognizedMessage` on mismatch
pub fn expect_magic(slice: &mut CellSlice, magic: u32) -> Result<(), CodecError> {
    let found = slice.load_u32()?;
    if found != magic {
        return Err(CodecError::UnrecognizedMessage(found));
    }
    Ok(())
}
