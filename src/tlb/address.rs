//! Internal account addresses
//!
//! Wire form is `addr_std$10 anycast:(Maybe Anycast) workchain_id:int8 address:bits256`
//! (267 bits). The reserved "none" address is the bare tag `00`.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::{CellBuilder, CellSlice, CodecError};

const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const TAG_TESTNET: u8 = 0x80;

/// Bit length of a standard address on the wire
pub const STD_ADDRESS_BITS: usize = 2 + 1 + 8 + 256;

/// Standard internal address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub workchain: i8,
    pub hash: [u8; 32],
}

impl Address {
    pub const fn new(workchain: i8, hash: [u8; 32]) -> Self {
        Self { workchain, hash }
    }

    /// `0:000...000`
    pub const fn zero() -> Self {
        Self::new(0, [0u8; 32])
    }

    /// Raw `workchain:hex` form
    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash))
    }

    /// User-friendly url-safe base64 form
    pub fn to_friendly(&self, bounceable: bool, testnet: bool) -> String {
        let mut tag = if bounceable { TAG_BOUNCEABLE } else { TAG_NON_BOUNCEABLE };
        if testnet {
            tag |= TAG_TESTNET;
        }
        let mut bytes = Vec::with_capacity(36);
        bytes.push(tag);
        bytes.push(self.workchain as u8);
        bytes.extend_from_slice(&self.hash);
        let crc = crc16(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());
        URL_SAFE.encode(bytes)
    }

    fn parse_raw(s: &str) -> Result<Self, CodecError> {
        let invalid = || CodecError::InvalidAddress(s.to_string());
        let (workchain, hash) = s.split_once(':').ok_or_else(invalid)?;
        let workchain: i8 = workchain.parse().map_err(|_| invalid())?;
        let hash: [u8; 32] = hex::decode(hash)
            .map_err(|_| invalid())?
            .try_into()
            .map_err(|_| invalid())?;
        Ok(Self::new(workchain, hash))
    }

    fn parse_friendly(s: &str) -> Result<Self, CodecError> {
        let invalid = |reason: &str| CodecError::InvalidAddress(format!("{}: {}", s, reason));
        let bytes = if s.contains('-') || s.contains('_') {
            URL_SAFE.decode(s)
        } else {
            STANDARD.decode(s)
        }
        .map_err(|_| invalid("not base64"))?;
        if bytes.len() != 36 {
            return Err(invalid("expected 36 bytes"));
        }

        let (body, crc) = bytes.split_at(34);
        if crc16(body).to_be_bytes() != crc {
            return Err(invalid("checksum mismatch"));
        }
        let tag = body[0] & !TAG_TESTNET;
        if tag != TAG_BOUNCEABLE && tag != TAG_NON_BOUNCEABLE {
            return Err(invalid("unknown flags"));
        }

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&body[2..34]);
        Ok(Self::new(body[1] as i8, hash))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_friendly(true, false))
    }
}

impl FromStr for Address {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.contains(':') {
            Self::parse_raw(s)
        } else if s.len() == 48 {
            Self::parse_friendly(s)
        } else {
            Err(CodecError::InvalidAddress(s.to_string()))
        }
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// CRC16/XMODEM as used by the user-friendly address form
fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0u16;
    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                crc << 1 ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

impl CellBuilder {
    /// Store a standard address, or the `00` none-address for `None`
    pub fn store_address(&mut self, address: Option<&Address>) -> Result<&mut Self, CodecError> {
        match address {
            Some(address) => {
                if self.bits_left() < STD_ADDRESS_BITS {
                    return Err(CodecError::CellOverflow);
                }
                self.store_uint(0b10, 2)?
                    .store_bit(false)?
                    .store_int(address.workchain as i64, 8)?
                    .store_bytes(&address.hash)
            }
            None => self.store_uint(0b00, 2),
        }
    }
}

impl CellSlice {
    /// Load a `MsgAddress` that may be the none-address
    pub fn load_maybe_address(&mut self) -> Result<Option<Address>, CodecError> {
        match self.load_uint(2)? {
            0b00 => Ok(None),
            0b10 => {
                if self.load_bit()? {
                    return Err(CodecError::InvalidAddress("anycast addresses are not supported".into()));
                }
                let workchain = self.load_int(8)? as i8;
                let hash: [u8; 32] = self
                    .load_bytes(32)?
                    .try_into()
                    .map_err(|_| CodecError::MalformedMessage("short address body".into()))?;
                Ok(Some(Address::new(workchain, hash)))
            }
            tag => Err(CodecError::InvalidAddress(format!(
                "unsupported address tag {:02b}",
                tag
            ))),
        }
    }

    /// Load a standard address, rejecting the none-address
    pub fn load_address(&mut self) -> Result<Address, CodecError> {
        self.load_maybe_address()?
            .ok_or_else(|| CodecError::InvalidAddress("unexpected none address".into()))
    }
}
