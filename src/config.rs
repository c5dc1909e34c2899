//! Runtime configuration
//!
//! Everything network-specific is carried in explicit values so a testnet
//! and a mainnet router can be used side by side.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::dex::PoolType;
use crate::node::toncenter::DEFAULT_ENDPOINT;
use crate::tlb::{Address, Coins};

/// DeDust router on mainnet
pub const MAINNET_ROUTER: &str = "EQBfBWT7X2BHg9tXAxzhz2aKiNTU1tpt5NsiK0uSDW_YAJ67";

/// Message values attached to swap submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fee {
    /// Gas attached to the outgoing wallet message
    pub tx_amount: Coins,
    /// Forwarded from the jetton wallet to the vault with the transfer notification
    pub forward_amount: Coins,
}

impl Default for Fee {
    fn default() -> Self {
        Self {
            tx_amount: Coins::from_nano(300_000_000),
            forward_amount: Coins::from_nano(250_000_000),
        }
    }
}

/// Knobs that shape each swap request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapPolicy {
    /// Slippage floor for the swap step, zero disables it
    pub min_output: Coins,
    pub pool_type: PoolType,
    pub deadline_offset: Duration,
    pub monitor_timeout: Duration,
}

impl Default for SwapPolicy {
    fn default() -> Self {
        Self {
            min_output: Coins::ZERO,
            pool_type: PoolType::Volatile,
            deadline_offset: Duration::from_secs(3600),
            monitor_timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexConfig {
    pub router: Address,
    pub fee: Fee,
    pub policy: SwapPolicy,
}

impl DexConfig {
    pub fn new(router: Address) -> Self {
        Self {
            router,
            fee: Fee::default(),
            policy: SwapPolicy::default(),
        }
    }

    /// Mainnet router with default fees and policy
    pub fn mainnet() -> Self {
        // constant is a valid friendly address
        let router = Address::from_str(MAINNET_ROUTER).unwrap_or_else(|_| Address::zero());
        Self::new(router)
    }

    /// Mainnet defaults overridden by `DEDUST_*` / `SWAP_*` variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::mainnet();

        if let Some(router) = env_var("DEDUST_ROUTER") {
            config.router = router
                .parse()
                .with_context(|| format!("DEDUST_ROUTER is not an address: {}", router))?;
        }
        if let Some(fee) = env_var("SWAP_TX_FEE") {
            config.fee.tx_amount = Coins::from_ton(&fee)
                .with_context(|| format!("SWAP_TX_FEE is not a TON amount: {}", fee))?;
        }
        if let Some(fee) = env_var("SWAP_FORWARD_FEE") {
            config.fee.forward_amount = Coins::from_ton(&fee)
                .with_context(|| format!("SWAP_FORWARD_FEE is not a TON amount: {}", fee))?;
        }
        if let Some(secs) = env_var("SWAP_DEADLINE_SECS") {
            config.policy.deadline_offset = parse_secs("SWAP_DEADLINE_SECS", &secs)?;
        }
        if let Some(min) = env_var("SWAP_MIN_OUTPUT") {
            config.policy.min_output = min
                .parse()
                .with_context(|| format!("SWAP_MIN_OUTPUT is not an amount: {}", min))?;
        }
        if let Some(pool_type) = env_var("SWAP_POOL_TYPE") {
            config.policy.pool_type = pool_type
                .parse::<PoolType>()
                .context("SWAP_POOL_TYPE must be volatile or stable")?;
        }
        if let Some(secs) = env_var("SWAP_MONITOR_TIMEOUT_SECS") {
            config.policy.monitor_timeout = parse_secs("SWAP_MONITOR_TIMEOUT_SECS", &secs)?;
        }

        Ok(config)
    }
}

/// Process-level settings for the HTTP service
#[derive(Debug, Clone)]
pub struct Config {
    pub dex: DexConfig,
    pub toncenter_url: String,
    pub toncenter_api_key: Option<String>,
    pub listen_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = env_var("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:3001".to_string());
        Ok(Self {
            dex: DexConfig::from_env()?,
            toncenter_url: env_var("TONCENTER_URL").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            toncenter_api_key: env_var("TONCENTER_API_KEY"),
            listen_addr: listen_addr
                .parse()
                .with_context(|| format!("LISTEN_ADDR is not a socket address: {}", listen_addr))?,
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_secs(name: &str, value: &str) -> Result<Duration> {
    let secs: u64 = value
        .parse()
        .with_context(|| format!("{} is not a number of seconds: {}", name, value))?;
    Ok(Duration::from_secs(secs))
}
