//! Command-line surface.
//!
//! `run` drives the supervisor (and/or the dashboard); everything else is an
//! operational tool sharing the same `.env` configuration: allowance and
//! balance checks, manual merges and redemptions, CLOB diagnostics, and
//! receipt/transfer inspection.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use updown_common::{snap_to_tick, OrderSide};
use updown_market::clob::{BalanceAllowanceParams, OpenOrderParams, OrderType};
use updown_market::contracts::{allowance_spenders, USDC_E_ADDRESS, USDC_NATIVE_ADDRESS};
use updown_market::types::SignatureType;
use updown_market::{ChainClient, ClobClient, DataApiClient, Discovery, OrderArgs, UserPosition};

use crate::config::Config;
use crate::dashboard;
use crate::supervisor::Supervisor;

#[derive(Debug, Parser)]
#[command(name = "updown-bot", version)]
#[command(about = "Market-making bot for Polymarket 15-minute BTC up/down markets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the bot, the dashboard, or both.
    Run {
        /// bot | dashboard | both
        #[arg(long, default_value = "both")]
        mode: String,
    },
    /// Validate the configuration and exit.
    CheckConfig,
    /// Probe the Gamma API, CLOB and RPC endpoints.
    TestConnection,
    /// Redeem one resolved market by condition id.
    Redeem {
        #[arg(long)]
        condition_id: String,
    },
    /// Merge matched UP/DOWN share pairs back into USDC.
    Merge {
        #[arg(long)]
        condition_id: String,
        /// Amount in sets (scaled by 1e6 on chain).
        #[arg(long)]
        amount: Decimal,
    },
    /// Check or set exchange allowances.
    Allowances {
        #[command(subcommand)]
        cmd: AllowancesCmd,
    },
    /// Conditional-token (ERC-1155) tools.
    Ctf {
        #[command(subcommand)]
        cmd: CtfCmd,
    },
    /// CLOB diagnostics.
    Clob {
        #[command(subcommand)]
        cmd: ClobCmd,
    },
    /// USDC balance diagnostics.
    Usdc {
        #[command(subcommand)]
        cmd: UsdcCmd,
    },
    /// Transaction receipt tools.
    Tx {
        #[command(subcommand)]
        cmd: TxCmd,
    },
    /// List and redeem every redeemable market.
    RedeemAll {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
        /// Redeem at most this many markets.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Alias of redeem-all.
    ClaimWinnings {
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Data API positions tools.
    Positions {
        #[command(subcommand)]
        cmd: PositionsCmd,
    },
    /// Wallet diagnostics.
    Wallet {
        #[command(subcommand)]
        cmd: WalletCmd,
    },
}

#[derive(Debug, Subcommand)]
pub enum AllowancesCmd {
    /// Check USDC allowance + CTF approval for every exchange spender.
    Check,
    /// Approve USDC and CTF for every exchange spender.
    SetAll {
        /// Approval amount in USDC (default 1,000,000).
        #[arg(long)]
        approve_usdc: Option<Decimal>,
    },
    /// Approve only USDC (no CTF approval) for every exchange spender.
    SetUsdc {
        #[arg(long)]
        approve_usdc: Option<Decimal>,
    },
}

#[derive(Debug, Subcommand)]
pub enum CtfCmd {
    /// Scan recent blocks for conditional tokens received by the wallet.
    Scan {
        #[arg(long, default_value_t = 10_000)]
        blocks: u64,
    },
    /// Balance of one outcome token.
    Balance {
        #[arg(long)]
        token_id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ClobCmd {
    /// List the wallet's open orders.
    OpenOrders {
        #[arg(long)]
        market: Option<String>,
        #[arg(long)]
        asset_id: Option<String>,
    },
    /// Refresh and print the exchange-side balance allowance.
    UpdateL2Balance {
        #[arg(long, default_value = "COLLATERAL")]
        asset_type: String,
        #[arg(long)]
        token_id: Option<String>,
        #[arg(long)]
        signature_type: Option<u8>,
    },
    /// Place a small GTC test order.
    PlaceTest {
        #[arg(long)]
        token_id: String,
        #[arg(long, default_value = "0.5")]
        price: Decimal,
        #[arg(long, default_value = "5")]
        size: Decimal,
        /// buy | sell
        #[arg(long, default_value = "buy")]
        side: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum UsdcCmd {
    /// Compare USDC.e and native USDC balances.
    Check,
}

#[derive(Debug, Subcommand)]
pub enum TxCmd {
    /// Decode conditional-token transfers in a transaction receipt.
    TokenIds {
        #[arg(long)]
        tx: String,
        /// Only transfers into this wallet.
        #[arg(long)]
        only_incoming: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum PositionsCmd {
    /// List positions, optionally only redeemable ones.
    List {
        #[arg(long)]
        redeemable_only: bool,
    },
    /// Dump the raw positions JSON.
    Raw,
}

#[derive(Debug, Subcommand)]
pub enum WalletCmd {
    /// Print address plus POL / USDC / USDC.e balances.
    Summary,
}

pub async fn execute(cli: Cli, cfg: Config) -> Result<()> {
    match cli.command {
        Command::Run { mode } => run(cfg, &mode).await,
        Command::CheckConfig => check_config(&cfg),
        Command::TestConnection => test_connection(&cfg).await,
        Command::Redeem { condition_id } => redeem(&cfg, &condition_id).await,
        Command::Merge { condition_id, amount } => merge(&cfg, &condition_id, amount).await,
        Command::Allowances { cmd } => allowances(&cfg, cmd).await,
        Command::Ctf { cmd } => ctf(&cfg, cmd).await,
        Command::Clob { cmd } => clob(&cfg, cmd).await,
        Command::Usdc { cmd } => match cmd {
            UsdcCmd::Check => usdc_check(&cfg).await,
        },
        Command::Tx { cmd } => match cmd {
            TxCmd::TokenIds { tx, only_incoming } => tx_token_ids(&cfg, &tx, only_incoming).await,
        },
        Command::RedeemAll { yes, limit } | Command::ClaimWinnings { yes, limit } => {
            redeem_all(&cfg, yes, limit).await
        }
        Command::Positions { cmd } => positions(&cfg, cmd).await,
        Command::Wallet { cmd } => match cmd {
            WalletCmd::Summary => wallet_summary(&cfg).await,
        },
    }
}

// ----------------------------------------------------------------------
// run / check-config / test-connection
// ----------------------------------------------------------------------

async fn run(cfg: Config, mode: &str) -> Result<()> {
    let mut supervisor = Supervisor::from_config(cfg.clone()).context("building supervisor")?;
    supervisor.start().await;

    match mode {
        "bot" => {
            supervisor.run().await;
            Ok(())
        }
        "dashboard" | "both" => {
            let state = supervisor.shared_state();
            let wallet = supervisor.wallet_address();
            let bot_task = tokio::spawn(async move {
                supervisor.run().await;
            });
            let result = dashboard::serve(&cfg, state, wallet).await;
            bot_task.abort();
            result.context("dashboard server failed")
        }
        other => bail!("invalid --mode: {other} (bot|dashboard|both)"),
    }
}

fn check_config(cfg: &Config) -> Result<()> {
    println!("\n✓ Configuration is valid!");
    println!("  - Wallet address will be derived from the private key");
    println!("  - Order size: ${} per order", cfg.order_size_usd);
    println!("  - Spread offset: {}", cfg.spread_offset);
    println!("  - Check interval: {}s", cfg.check_interval_seconds);
    println!(
        "  - Placement window: {}-{} min before start",
        cfg.order_placement_min_minutes, cfg.order_placement_max_minutes
    );
    println!("  - Order mode: {}", cfg.order_mode.as_str());
    println!("  - Strategy: {}", cfg.strategy_name);
    println!(
        "  - Dashboard: http://{}:{}",
        cfg.dashboard_host, cfg.dashboard_port
    );
    Ok(())
}

async fn test_connection(cfg: &Config) -> Result<()> {
    let rule = "=".repeat(60);

    println!("\n{rule}\nCONFIGURATION TEST\n{rule}");
    println!("[OK] Configuration loaded");
    println!("  - Chain ID: {}", cfg.chain_id);
    println!("  - Signature type: {}", cfg.signature_type);
    println!("  - Order size: ${}", cfg.order_size_usd);
    println!("  - Check interval: {}s", cfg.check_interval_seconds);

    println!("\n{rule}\nGAMMA API TEST\n{rule}");
    let discovery = Discovery::new(cfg.gamma_api_base_url.clone());
    let markets = discovery.discover(chrono::Utc::now()).await;
    println!("[OK] Gamma API reachable");
    println!("  - Found {} BTC 15m markets", markets.len());
    for market in markets.iter().take(3) {
        println!("    - {}", market.market_slug);
        println!("      Start: {}", market.start_time().to_rfc3339());
    }

    println!("\n{rule}\nCLOB CLIENT TEST\n{rule}");
    let clob = build_clob(cfg)?;
    let address = clob.address().context("wallet address unavailable")?;
    println!("[OK] CLOB signer initialised");
    println!("  - Wallet address: {address}");
    match clob.create_or_derive_api_creds(0).await {
        Ok(creds) if creds.is_complete() => {
            clob.set_creds(creds);
            println!("[OK] CLOB API creds derived");
        }
        Ok(_) => println!("[WARNING] Incomplete CLOB API creds (read-only is fine)"),
        Err(e) => println!("[WARNING] Could not derive CLOB API creds (read-only is fine): {e}"),
    }

    println!("\n{rule}\nRPC TEST\n{rule}");
    let chain = build_chain(cfg)?;
    let balance = chain.usdc_balance().await.context("USDC balance lookup")?;
    println!("[OK] RPC reachable");
    println!("  - USDC balance: ${balance:.2}");
    Ok(())
}

// ----------------------------------------------------------------------
// merge / redeem
// ----------------------------------------------------------------------

async fn redeem(cfg: &Config, condition_id: &str) -> Result<()> {
    if condition_id.trim().is_empty() {
        bail!("--condition-id is required (0x...)");
    }
    let chain = build_chain(cfg)?;
    let tx = chain.redeem_positions(condition_id).await?;
    println!("✓ Redeem tx sent: {tx}");
    Ok(())
}

async fn merge(cfg: &Config, condition_id: &str, amount: Decimal) -> Result<()> {
    if condition_id.trim().is_empty() {
        bail!("--condition-id is required (0x...)");
    }
    if amount <= Decimal::ZERO {
        bail!("--amount must be > 0 (unit: sets / USDC)");
    }
    let chain = build_chain(cfg)?;
    let tx = chain.merge_positions(condition_id, amount).await?;
    println!("✓ Merge tx sent: {tx}");
    Ok(())
}

// ----------------------------------------------------------------------
// allowances
// ----------------------------------------------------------------------

async fn allowances(cfg: &Config, cmd: AllowancesCmd) -> Result<()> {
    let chain = build_chain(cfg)?;
    match cmd {
        AllowancesCmd::Check => {
            println!("Wallet: {}", chain.address());
            let mut all_good = true;
            for (name, spender) in allowance_spenders() {
                let allowance = chain.erc20_allowance(USDC_E_ADDRESS, spender).await?;
                let approved = chain.erc1155_is_approved_for_all(spender).await?;
                let allowance_usdc = updown_common::price::units_from_raw_6dp(
                    u128::try_from(allowance).unwrap_or(u128::MAX).min(i128::MAX as u128) as i128,
                );
                println!("\n{name}:");
                println!("  Address: {spender}");
                let ok = allowance_usdc > Decimal::ZERO;
                println!(
                    "  USDC allowance: ${allowance_usdc:.2} [{}]",
                    if ok { "OK" } else { "NOT SET" }
                );
                println!(
                    "  CTF approved: {approved} [{}]",
                    if approved { "OK" } else { "NOT SET" }
                );
                all_good &= ok && approved;
            }
            println!("\n{}", "=".repeat(60));
            if all_good {
                println!("[OK] All allowances are properly set");
            } else {
                println!("[ERROR] Some allowances are missing - run `allowances set-all`");
            }
            Ok(())
        }
        AllowancesCmd::SetAll { approve_usdc } => {
            let amount = approve_usdc.unwrap_or(dec!(1_000_000));
            println!("Wallet: {}", chain.address());
            for (name, spender) in allowance_spenders() {
                println!("\nProcessing {name} ({spender})");
                match chain.approve_usdc(spender, amount).await {
                    Ok(tx) => println!("  USDC approve tx: {tx}"),
                    Err(e) => println!("  USDC approve ERROR: {e}"),
                }
                match chain.set_ctf_approval_for_all(spender, true).await {
                    Ok(tx) => println!("  CTF approval tx: {tx}"),
                    Err(e) => println!("  CTF approval ERROR: {e}"),
                }
            }
            println!("\nDone.");
            Ok(())
        }
        AllowancesCmd::SetUsdc { approve_usdc } => {
            let amount = approve_usdc.unwrap_or(dec!(1_000_000));
            println!("Wallet: {}", chain.address());
            for (name, spender) in allowance_spenders() {
                println!("\nProcessing {name} ({spender})");
                match chain.approve_usdc(spender, amount).await {
                    Ok(tx) => println!("  USDC approve tx: {tx}"),
                    Err(e) => println!("  USDC approve ERROR: {e}"),
                }
            }
            println!("\nDone.");
            Ok(())
        }
    }
}

// ----------------------------------------------------------------------
// ctf / clob / usdc / tx
// ----------------------------------------------------------------------

async fn ctf(cfg: &Config, cmd: CtfCmd) -> Result<()> {
    let chain = build_chain(cfg)?;
    match cmd {
        CtfCmd::Scan { blocks } => {
            println!("Wallet: {}", chain.address());
            println!("Scanning the last {blocks} blocks...\n");
            let transfers = chain.recent_ctf_transfers_to_wallet(blocks).await?;
            if transfers.is_empty() {
                println!("No recent transfers found.");
                return Ok(());
            }
            let mut token_ids: BTreeMap<String, ()> = BTreeMap::new();
            for transfer in &transfers {
                println!("Token ID: {}", transfer.token_id);
                println!("  Amount received: {:.6} shares", transfer.amount);
                if let Some(block) = transfer.block_number {
                    println!("  Block: {block}");
                }
                println!();
                token_ids.insert(transfer.token_id.clone(), ());
            }
            println!("{}", "=".repeat(60));
            println!("Current balances:");
            for token_id in token_ids.keys() {
                match chain.erc1155_balance_of(token_id).await {
                    Ok(balance) if balance > Decimal::ZERO => {
                        println!("  {token_id}: {balance:.6}");
                    }
                    Ok(_) => {}
                    Err(e) => println!("  {token_id}: balance error: {e}"),
                }
            }
            Ok(())
        }
        CtfCmd::Balance { token_id } => {
            let balance = chain.erc1155_balance_of(&token_id).await?;
            println!("Wallet: {}", chain.address());
            println!("Token: {token_id}");
            println!("Balance: {balance:.6} shares");
            Ok(())
        }
    }
}

async fn clob(cfg: &Config, cmd: ClobCmd) -> Result<()> {
    let client = build_clob(cfg)?;
    let creds = client.create_or_derive_api_creds(0).await.context("deriving API creds")?;
    client.set_creds(creds);

    match cmd {
        ClobCmd::OpenOrders { market, asset_id } => {
            let params = OpenOrderParams { market, asset_id };
            let orders = client.get_orders(&params).await?;
            println!("Wallet: {}\n", client.address().map(|a| a.to_string()).unwrap_or_default());
            if orders.is_empty() {
                println!("No open orders found.");
                return Ok(());
            }
            println!("Found {} open order(s):\n", orders.len());
            for order in orders {
                println!(
                    "  {} | market {} | {} {} @ {} (matched {})",
                    order.id,
                    order.market,
                    order.side,
                    order.original_size_decimal(),
                    order.price_decimal(),
                    order.size_matched_decimal(),
                );
            }
            Ok(())
        }
        ClobCmd::UpdateL2Balance { asset_type, token_id, signature_type } => {
            let params = BalanceAllowanceParams {
                asset_type: asset_type.to_ascii_uppercase(),
                token_id,
                signature_type,
            };
            println!("Updating balance allowance...");
            let updated = client.update_balance_allowance(&params).await?;
            println!("Result: {updated}\n");
            println!("Fetching balance allowance...");
            let current = client.get_balance_allowance(&params).await?;
            println!("Balance info: {current}");
            Ok(())
        }
        ClobCmd::PlaceTest { token_id, price, size, side } => {
            let side = match side.to_ascii_lowercase().as_str() {
                "buy" => OrderSide::Buy,
                "sell" => OrderSide::Sell,
                other => bail!("invalid --side: {other} (buy|sell)"),
            };
            let tick = client.get_tick_size(&token_id).await?;
            let price = snap_to_tick(price, tick);
            let args = OrderArgs::new(token_id, side, price, size);
            let signed = client.create_order(&args).await?;
            println!("Posting {side} {size} @ {price} (salt {})...", signed.salt);
            let response = client.post_order(&signed, OrderType::Gtc).await?;
            match response.order_id {
                Some(order_id) => println!("✓ Order placed: {order_id}"),
                None => println!(
                    "Order response had no id (success={:?}, error={:?})",
                    response.success, response.error_msg
                ),
            }
            Ok(())
        }
    }
}

async fn usdc_check(cfg: &Config) -> Result<()> {
    let chain = build_chain(cfg)?;
    let bridged = chain.erc20_balance(USDC_E_ADDRESS).await?;
    let native = chain.erc20_balance(USDC_NATIVE_ADDRESS).await?;
    println!("Wallet: {}", chain.address());
    println!("USDC.e ({USDC_E_ADDRESS}): {bridged:.6}");
    println!("USDC   ({USDC_NATIVE_ADDRESS}): {native:.6}");
    println!("Total: {:.6}", bridged + native);
    Ok(())
}

async fn tx_token_ids(cfg: &Config, tx: &str, only_incoming: bool) -> Result<()> {
    let chain = build_chain(cfg)?;
    let wallet = chain.address();
    let transfers = chain.ctf_transfers_in_receipt(tx).await?;
    let mut shown = 0usize;
    for transfer in transfers {
        if only_incoming && transfer.to != wallet {
            continue;
        }
        shown += 1;
        println!("Token ID: {}", transfer.token_id);
        println!("  From: {}", transfer.from);
        println!("  To:   {}", transfer.to);
        println!("  Amount: {:.6} shares\n", transfer.amount);
    }
    if shown == 0 {
        println!("No conditional-token transfers found in {tx}");
    }
    Ok(())
}

// ----------------------------------------------------------------------
// redeem-all / positions / wallet
// ----------------------------------------------------------------------

async fn redeem_all(cfg: &Config, assume_yes: bool, limit: Option<usize>) -> Result<()> {
    let chain = build_chain(cfg)?;
    let data = DataApiClient::new(cfg.data_api_base_url.clone());
    let wallet = chain.address().to_string();

    let positions = data.positions(&wallet).await.context("fetching positions")?;
    let mut by_cid: BTreeMap<String, Vec<UserPosition>> = BTreeMap::new();
    for position in positions {
        if position.redeemable && !position.condition_id.is_empty() {
            by_cid.entry(position.condition_id.clone()).or_default().push(position);
        }
    }
    if by_cid.is_empty() {
        println!("No redeemable positions found.");
        return Ok(());
    }

    let mut items: Vec<(String, String, Decimal)> = by_cid
        .into_iter()
        .map(|(cid, group)| {
            let value: Decimal = group.iter().map(UserPosition::current_value_decimal).sum();
            let title = group[0].display_title().to_string();
            (cid, title, value)
        })
        .collect();
    items.sort_by(|a, b| b.2.cmp(&a.2));
    if let Some(limit) = limit {
        items.truncate(limit);
    }

    println!("Redeemable markets ({}):", items.len());
    let total: Decimal = items.iter().map(|(_, _, v)| *v).sum();
    for (cid, title, value) in &items {
        println!("  ${value:.2}  {title}  ({cid})");
    }
    println!("Total: ${total:.2}\n");

    if !assume_yes && !confirm("Redeem all of the above? [y/N] ")? {
        println!("Aborted.");
        return Ok(());
    }

    for (cid, title, _) in items {
        match chain.redeem_positions(&cid).await {
            Ok(tx) => println!("✓ {title}: {tx}"),
            Err(e) => println!("✗ {title}: {e}"),
        }
    }
    Ok(())
}

async fn positions(cfg: &Config, cmd: PositionsCmd) -> Result<()> {
    let chain = build_chain(cfg)?;
    let data = DataApiClient::new(cfg.data_api_base_url.clone());
    let wallet = chain.address().to_string();
    let mut positions = data.positions(&wallet).await.context("fetching positions")?;

    match cmd {
        PositionsCmd::List { redeemable_only } => {
            if redeemable_only {
                positions.retain(|p| p.redeemable);
            }
            positions.sort_by(|a, b| {
                b.current_value_decimal().cmp(&a.current_value_decimal())
            });
            println!("Wallet: {wallet}");
            println!("Positions: {}\n", positions.len());
            for position in positions {
                println!(
                    "  ${:.2}  {} [{}] size {:.4} @ {:.3}{}",
                    position.current_value_decimal(),
                    position.display_title(),
                    position.outcome,
                    position.size,
                    position.cur_price,
                    if position.redeemable { "  (redeemable)" } else { "" },
                );
            }
            Ok(())
        }
        PositionsCmd::Raw => {
            println!("{}", serde_json::to_string_pretty(&positions)?);
            Ok(())
        }
    }
}

async fn wallet_summary(cfg: &Config) -> Result<()> {
    let chain = build_chain(cfg)?;
    let native = chain.native_balance().await?;
    let bridged = chain.erc20_balance(USDC_E_ADDRESS).await?;
    let usdc = chain.erc20_balance(USDC_NATIVE_ADDRESS).await?;
    println!("Wallet: {}", chain.address());
    println!("Chain ID: {}", cfg.chain_id);
    println!("POL: {native:.6}");
    println!("USDC.e: {bridged:.6}");
    println!("USDC: {usdc:.6}");
    Ok(())
}

// ----------------------------------------------------------------------
// helpers
// ----------------------------------------------------------------------

fn build_chain(cfg: &Config) -> Result<ChainClient> {
    ChainClient::new(cfg.rpc_url.clone(), &cfg.private_key, cfg.chain_id)
        .context("building chain client")
}

fn build_clob(cfg: &Config) -> Result<ClobClient> {
    ClobClient::new(
        cfg.clob_api_url.clone(),
        cfg.chain_id,
        Some(&cfg.private_key),
        SignatureType::parse(&cfg.signature_type),
        cfg.funder_address.as_deref(),
    )
    .context("building CLOB client")
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
