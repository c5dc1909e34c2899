//! DeDust swap engine for TON
//!
//! Builds and submits swaps against the DeDust router: resolves pools and
//! vaults through contract get-methods, encodes swap messages as cells, and
//! watches the router after a native swap is sent.

pub mod api;
pub mod config;
pub mod dex;
pub mod node;
pub mod tlb;
pub mod types;
