//! Asset identifiers and their slice encoding
//!
//! Contract get-methods take and return assets as slices:
//! - native: `native$0000`
//! - jetton: `jetton$0001 workchain:int8 address:bits256`

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::tlb::{Address, Cell, CellBuilder, CellSlice, CodecError};

const TAG_NATIVE: u64 = 0;
const TAG_JETTON: u64 = 1;
const TAG_BITS: usize = 4;

/// Native currency or a fungible token identified by its master contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetIdentifier {
    Native,
    FungibleToken { workchain: i8, address: [u8; 32] },
}

impl AssetIdentifier {
    pub fn is_native(&self) -> bool {
        matches!(self, AssetIdentifier::Native)
    }

    /// Jetton master address; `None` for the native asset
    pub fn master_address(&self) -> Option<Address> {
        match self {
            AssetIdentifier::Native => None,
            AssetIdentifier::FungibleToken { workchain, address } => {
                Some(Address::new(*workchain, *address))
            }
        }
    }

    /// Encode into a standalone cell
    pub fn encode(&self) -> Result<Cell, CodecError> {
        let mut builder = CellBuilder::new();
        builder.store_asset(self)?;
        builder.build()
    }

    /// Encode as a slice argument for get-methods
    pub fn to_slice(&self) -> Result<CellSlice, CodecError> {
        Ok(self.encode()?.parse())
    }

    /// Decode an asset slice as returned by pool contracts.
    ///
    /// A slice holding exactly 4 bits is the native asset, whatever those
    /// bits are. Otherwise the tag is skipped and the jetton address read.
    pub fn decode(slice: &mut CellSlice) -> Result<Self, CodecError> {
        if slice.bits_left() == TAG_BITS {
            slice.skip_bits(TAG_BITS)?;
            return Ok(AssetIdentifier::Native);
        }
        slice.skip_bits(TAG_BITS)?;
        let workchain = slice.load_int(8)? as i8;
        let address: [u8; 32] = slice
            .load_bytes(32)?
            .try_into()
            .map_err(|_| CodecError::MalformedMessage("short jetton address".into()))?;
        Ok(AssetIdentifier::FungibleToken { workchain, address })
    }
}

impl From<Address> for AssetIdentifier {
    /// The all-zero address is the reserved native sentinel
    fn from(address: Address) -> Self {
        if address == Address::zero() {
            AssetIdentifier::Native
        } else {
            AssetIdentifier::FungibleToken {
                workchain: address.workchain,
                address: address.hash,
            }
        }
    }
}

impl fmt::Display for AssetIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.master_address() {
            None => f.write_str("native"),
            Some(address) => write!(f, "{}", address),
        }
    }
}

impl FromStr for AssetIdentifier {
    type Err = CodecError;

    /// `native` / `ton` or a jetton master address
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "native" | "ton" => Ok(AssetIdentifier::Native),
            _ => Ok(s.parse::<Address>()?.into()),
        }
    }
}

impl Serialize for AssetIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AssetIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl CellBuilder {
    pub fn store_asset(&mut self, asset: &AssetIdentifier) -> Result<&mut Self, CodecError> {
        match asset {
            AssetIdentifier::Native => self.store_uint(TAG_NATIVE, TAG_BITS),
            AssetIdentifier::FungibleToken { workchain, address } => self
                .store_uint(TAG_JETTON, TAG_BITS)?
                .store_int(*workchain as i64, 8)?
                .store_bytes(address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDT: &str = "EQCxE6mUtQJKFnGfaROTKOt1lZbDiiX1kCixRv7Nw2Id_sDs";

    fn usdt() -> AssetIdentifier {
        USDT.parse().unwrap()
    }

    #[test]
    fn test_native_is_four_zero_bits() {
        let cell = AssetIdentifier::Native.encode().unwrap();
        assert_eq!(cell.bit_len(), 4);
        assert_eq!(cell.parse().load_uint(4).unwrap(), 0);
    }

    #[test]
    fn test_jetton_layout() {
        let token = AssetIdentifier::FungibleToken {
            workchain: 0,
            address: [0xab; 32],
        };
        let cell = token.encode().unwrap();
        assert_eq!(cell.bit_len(), 4 + 8 + 256);

        let mut slice = cell.parse();
        assert_eq!(slice.load_uint(4).unwrap(), 1);
        assert_eq!(slice.load_uint(8).unwrap(), 0);
        assert_eq!(slice.load_bytes(32).unwrap(), vec![0xab; 32]);
    }

    #[test]
    fn test_decode_roundtrip() {
        let edge = |workchain: i8| AssetIdentifier::FungibleToken {
            workchain,
            address: [0x5a; 32],
        };
        for asset in [AssetIdentifier::Native, usdt(), edge(-1), edge(127), edge(-128)] {
            let mut slice = asset.to_slice().unwrap();
            assert_eq!(AssetIdentifier::decode(&mut slice).unwrap(), asset);
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn test_four_bits_decode_as_native_regardless_of_tag() {
        let cell = CellBuilder::new().store_uint(0b1111, 4).unwrap().build().unwrap();
        assert_eq!(
            AssetIdentifier::decode(&mut cell.parse()).unwrap(),
            AssetIdentifier::Native
        );
    }

    #[test]
    fn test_truncated_jetton_is_malformed() {
        let cell = CellBuilder::new()
            .store_uint(1, 4)
            .unwrap()
            .store_u8(0)
            .unwrap()
            .store_bytes(&[1; 10])
            .unwrap()
            .build()
            .unwrap();
        assert!(matches!(
            AssetIdentifier::decode(&mut cell.parse()),
            Err(CodecError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_parse_native_forms() {
        assert_eq!("native".parse::<AssetIdentifier>().unwrap(), AssetIdentifier::Native);
        assert_eq!("TON".parse::<AssetIdentifier>().unwrap(), AssetIdentifier::Native);
        assert_eq!(
            "EQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAM9c"
                .parse::<AssetIdentifier>()
                .unwrap(),
            AssetIdentifier::Native
        );
    }

    #[test]
    fn test_structural_equality_across_address_forms() {
        let raw = format!("0:{}", hex::encode(usdt().master_address().unwrap().hash));
        assert_eq!(raw.parse::<AssetIdentifier>().unwrap(), usdt());
        assert_eq!(usdt().to_string(), USDT);
    }
}
