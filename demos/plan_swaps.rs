//! Plan a TON -> USDT and a USDT -> TON swap against mainnet
//!
//! Usage: cargo run --example plan_swaps -- <sender-wallet-address>
//!
//! Only reads from the network; prints the unsigned messages a wallet would send.

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dedust_swap::config::Config;
use dedust_swap::dex::{AssetIdentifier, JettonMaster, SwapPlan, SwapPlanner};
use dedust_swap::node::{NodeClient, ToncenterClient};
use dedust_swap::tlb::{boc, Address, Coins};

/// USDT jetton master on mainnet
const USDT_MASTER: &str = "EQCxE6mUtQJKFnGfaROTKOt1lZbDiiX1kCixRv7Nw2Id_sDs";
const USDT_DECIMALS: usize = 6;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    dotenvy::dotenv().ok();

    let sender: Address = std::env::args()
        .nth(1)
        .context("usage: plan_swaps <sender-wallet-address>")?
        .parse()
        .context("sender is not a valid address")?;

    let config = Config::from_env()?;
    let node: Arc<dyn NodeClient> = Arc::new(ToncenterClient::new(
        config.toncenter_url.clone(),
        config.toncenter_api_key.clone(),
    ));
    let planner = SwapPlanner::new(node.clone(), config.dex.clone());
    let usdt_master: Address = USDT_MASTER.parse()?;
    let usdt = AssetIdentifier::from(usdt_master);

    println!("=== TON -> USDT ===");
    let plan = planner
        .plan(&sender, AssetIdentifier::Native, usdt, Coins::from_ton("0.5")?)
        .await?;
    print_plan(&plan)?;

    println!("\n=== USDT -> TON ===");
    let master = JettonMaster::new(node.clone(), usdt_master);
    let balance = master.wallet_of(&sender).await?.balance().await?;
    println!("Sender USDT balance: {}", balance);
    // whole balance when there is one, otherwise a 1 USDT example
    let amount = if balance == Coins::ZERO {
        Coins::from_decimal("1", USDT_DECIMALS)?
    } else {
        balance
    };
    let plan = planner
        .plan(&sender, usdt, AssetIdentifier::Native, amount)
        .await?;
    print_plan(&plan)?;

    Ok(())
}

fn print_plan(plan: &SwapPlan) -> anyhow::Result<()> {
    println!("Direction:   {:?}", plan.direction);
    println!("Pool:        {}", plan.pool.address);
    println!("  {} reserve {}", plan.pool.token0, plan.pool.reserve0);
    println!("  {} reserve {}", plan.pool.token1, plan.pool.reserve1);
    println!("Vault:       {}", plan.vault);
    println!("Send to:     {}", plan.destination);
    println!("Value:       {} TON", plan.value.to_ton_string());
    println!("Query id:    {}", plan.query_id);
    println!("Body (BOC):  {}", boc::to_base64(&plan.body)?);
    Ok(())
}
