//! Nano-denominated amounts (`VarUInteger 16`)

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::{CellBuilder, CellSlice, CodecError};

const NANOS_PER_TON: u128 = 1_000_000_000;
const TON_DECIMALS: usize = 9;

/// Largest amount encodable on the wire: 15 bytes
const MAX_COINS_BYTES: usize = 15;

/// Amount in nano units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coins(u128);

impl Coins {
    pub const ZERO: Coins = Coins(0);

    pub const fn from_nano(nano: u128) -> Self {
        Self(nano)
    }

    pub const fn nano(&self) -> u128 {
        self.0
    }

    /// Parse a decimal TON amount such as `"0.5"` into nano units
    pub fn from_ton(amount: &str) -> Result<Self, CodecError> {
        Self::from_decimal(amount, TON_DECIMALS)
    }

    /// Parse a decimal amount with the given number of fractional digits
    pub fn from_decimal(amount: &str, decimals: usize) -> Result<Self, CodecError> {
        let invalid = || CodecError::MalformedMessage(format!("invalid amount: {:?}", amount));
        let amount = amount.trim();
        let (whole, frac) = amount.split_once('.').unwrap_or((amount, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.len() > decimals
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let scale = 10u128
            .checked_pow(decimals as u32)
            .ok_or(CodecError::AmountOverflow)?;
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| CodecError::AmountOverflow)?
        };
        let frac_value: u128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = decimals);
            padded.parse().map_err(|_| invalid())?
        };

        whole
            .checked_mul(scale)
            .and_then(|w| w.checked_add(frac_value))
            .map(Self)
            .ok_or(CodecError::AmountOverflow)
    }

    pub fn checked_add(self, other: Coins) -> Option<Coins> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Human readable TON value, e.g. `0.5`
    pub fn to_ton_string(&self) -> String {
        let whole = self.0 / NANOS_PER_TON;
        let frac = self.0 % NANOS_PER_TON;
        if frac == 0 {
            return whole.to_string();
        }
        let frac = format!("{:09}", frac);
        format!("{}.{}", whole, frac.trim_end_matches('0'))
    }
}

impl From<u64> for Coins {
    fn from(nano: u64) -> Self {
        Self(nano as u128)
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Coins {
    type Err = CodecError;

    /// Integer nano amount
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u128>()
            .map(Self)
            .map_err(|_| CodecError::MalformedMessage(format!("invalid nano amount: {:?}", s)))
    }
}

impl Serialize for Coins {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Coins {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl CellBuilder {
    /// 4-bit byte length followed by the big-endian value; zero is a bare `0000`
    pub fn store_coins(&mut self, coins: Coins) -> Result<&mut Self, CodecError> {
        let len = (128 - coins.0.leading_zeros() as usize).div_ceil(8);
        if len > MAX_COINS_BYTES {
            return Err(CodecError::AmountOverflow);
        }
        self.store_uint(len as u64, 4)?;
        let bytes = coins.0.to_be_bytes();
        self.store_bytes(&bytes[16 - len..])
    }
}

impl CellSlice {
    pub fn load_coins(&mut self) -> Result<Coins, CodecError> {
        let len = self.load_uint(4)? as usize;
        let bytes = self.load_bytes(len)?;
        let value = bytes
            .iter()
            .fold(0u128, |acc, byte| acc << 8 | *byte as u128);
        Ok(Coins(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ton() {
        assert_eq!(Coins::from_ton("0.5").unwrap().nano(), 500_000_000);
        assert_eq!(Coins::from_ton("0.3").unwrap().nano(), 300_000_000);
        assert_eq!(Coins::from_ton("12").unwrap().nano(), 12_000_000_000);
        assert_eq!(Coins::from_ton(".25").unwrap().nano(), 250_000_000);
        assert!(Coins::from_ton("0.0000000001").is_err());
        assert!(Coins::from_ton("-1").is_err());
        assert!(Coins::from_ton("").is_err());
    }

    #[test]
    fn test_from_decimal_jetton() {
        assert_eq!(Coins::from_decimal("1.5", 6).unwrap().nano(), 1_500_000);
    }

    #[test]
    fn test_to_ton_string() {
        assert_eq!(Coins::from_nano(500_000_000).to_ton_string(), "0.5");
        assert_eq!(Coins::from_nano(3_000_000_000).to_ton_string(), "3");
    }

    #[test]
    fn test_zero_is_bare_length_nibble() {
        let cell = CellBuilder::new().store_coins(Coins::ZERO).unwrap().build().unwrap();
        assert_eq!(cell.bit_len(), 4);
        assert_eq!(cell.data(), &[0x00]);
    }

    #[test]
    fn test_coins_wire_layout() {
        // 0.5 TON = 500_000_000 = 0x1dcd6500, 4 bytes
        let cell = CellBuilder::new()
            .store_coins(Coins::from_nano(500_000_000))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(cell.bit_len(), 4 + 32);
        assert_eq!(cell.data(), &[0x41, 0xdc, 0xd6, 0x50, 0x00]);
        assert_eq!(cell.parse().load_coins().unwrap().nano(), 500_000_000);
    }

    #[test]
    fn test_coins_overflow() {
        let mut builder = CellBuilder::new();
        assert!(matches!(
            builder.store_coins(Coins::from_nano(1u128 << 120)),
            Err(CodecError::AmountOverflow)
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Coins::from_nano(42)).unwrap();
        assert_eq!(json, "\"42\"");
        let back: Coins = serde_json::from_str(&json).unwrap();
        assert_eq!(back.nano(), 42);
    }
}
