// src/main.rs
//! Nexus Wallet command-line entry point.
//! A thin wrapper over the library API: every subcommand maps to one call.
use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use nexus_wallet::blockchain::FeeLevel;
use nexus_wallet::core::coins::AddressFormat;
use nexus_wallet::core::config::{NetworkConfig, SecurityConfig};
use nexus_wallet::core::key_derivation::MnemonicStrength;
use nexus_wallet::WalletManager;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "nexus-wallet")]
#[command(about = "Self-custodial multi-chain wallet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Directory holding wallet files, config and history
    #[arg(long, global = true, default_value = "wallet_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a wallet, or import one from a mnemonic
    Create(CreateArgs),
    /// List wallets in the data directory
    List,
    /// Print a wallet address
    Address(AddressArgs),
    /// Query an address balance
    Balance {
        coin: String,
        address: String,
    },
    /// Spot prices in the configured currency
    Prices {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Estimate a transfer fee
    Fee {
        coin: String,
        amount: String,
        /// low, medium, high, or a number (Gwei for EVM, sat/vB for UTXO)
        #[arg(long, default_value = "medium")]
        tier: String,
    },
    /// Check an address for a coin
    Validate {
        coin: String,
        address: String,
    },
}

#[derive(ClapArgs)]
struct CreateArgs {
    #[arg(long, default_value = "My Wallet")]
    name: String,
    #[arg(long)]
    password: String,
    /// Import this phrase instead of generating one
    #[arg(long)]
    mnemonic: Option<String>,
    /// 12 or 24
    #[arg(long, default_value_t = 24)]
    words: u32,
}

#[derive(ClapArgs)]
struct AddressArgs {
    coin: String,
    /// BIP44, BIP49, BIP84, BIP86 or SINGLE; defaults to the selected format
    #[arg(long)]
    format: Option<String>,
    /// Wallet id; defaults to the active wallet
    #[arg(long)]
    wallet: Option<String>,
    #[arg(long)]
    password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;

    let manager = WalletManager::new(&args.data_dir, SecurityConfig::default(), NetworkConfig::default())
        .with_context(|| format!("opening {}", args.data_dir.display()))?;

    match args.command {
        Commands::Create(create) => {
            let strength = match create.words {
                12 => MnemonicStrength::Bits128,
                24 => MnemonicStrength::Bits256,
                other => bail!("--words must be 12 or 24, got {}", other),
            };
            let created =
                manager.create_wallet(&create.password, &create.name, create.mnemonic.as_deref(), strength)?;
            info!(wallet_id = %created.id, "wallet created");
            println!("id: {}", created.id);
            if create.mnemonic.is_none() {
                println!("mnemonic (write it down, it is not shown again):");
                println!("{}", created.mnemonic.as_str());
            }
        }
        Commands::List => {
            let active = manager.active_wallet_id();
            for wallet in manager.list_wallets()? {
                let marker = if active.as_deref() == Some(wallet.id.as_str()) { "*" } else { " " };
                println!("{} {}  {}  {}", marker, wallet.id, wallet.name, wallet.created_at.to_rfc3339());
            }
        }
        Commands::Address(address) => {
            let id = match address.wallet.or_else(|| manager.active_wallet_id()) {
                Some(id) => id,
                None => bail!("no wallet given and none active"),
            };
            manager.unlock(&id, &address.password)?;
            let format = address.format.as_deref().map(AddressFormat::from_str).transpose()?;
            println!("{}", manager.get_address(&address.coin, format)?);
            manager.lock();
        }
        Commands::Balance { coin, address } => {
            let market = manager.market_data();
            match market.get_balance(&coin, &address).await {
                Some(balance) => println!("{} {}", balance.normalize(), coin.to_ascii_uppercase()),
                None => println!("unknown"),
            }
        }
        Commands::Prices { symbols } => {
            let market = manager.market_data();
            let prices: HashMap<String, Decimal> = market.get_prices(&symbols).await;
            let currency = manager.config().currency;
            for symbol in symbols.iter().map(|s| s.trim().to_ascii_uppercase()) {
                match prices.get(&symbol) {
                    Some(price) => {
                        let change = market
                            .get_24h_change(&symbol)
                            .map(|c| format!(" ({:+.2}%)", c))
                            .unwrap_or_default();
                        println!("{:<6} {} {}{}", symbol, price.normalize(), currency, change);
                    }
                    None => println!("{:<6} n/a", symbol),
                }
            }
        }
        Commands::Fee { coin, amount, tier } => {
            let amount = Decimal::from_str(amount.trim()).with_context(|| format!("invalid amount {:?}", amount))?;
            let level = FeeLevel::from_str(&tier)?;
            let engine = manager.transaction_engine()?;
            let fee = engine.estimate_fee(&coin, amount, &level).await;
            println!("{} {}", fee.value.normalize(), fee.unit);
        }
        Commands::Validate { coin, address } => {
            let engine = manager.transaction_engine()?;
            let check = engine.validate_address(&coin, &address);
            if check.valid {
                println!("valid");
            } else {
                println!("invalid: {}", check.reason);
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,hyper=info,reqwest=info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
