use anyhow::Context;
use log::{debug, info};

use pow_ledger::blockchain::{Chain, ChainConfig, Transaction, Wallet};

const CONFIG_ENV: &str = "POW_LEDGER_CONFIG";

// Fixed key so every run signs with the same address
const DEMO_SECRET_KEY: &str = "25383c99e1017e259881a98a63299693e26b76beac6bb05e84c42da3361b9766";

// Load chain parameters from the file named in the environment, if any
fn load_config() -> anyhow::Result<ChainConfig> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            info!("Loading chain config from {}", path);
            ChainConfig::load(&path).with_context(|| format!("failed to load config from {}", path))
        }
        Err(_) => Ok(ChainConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = load_config()?;
    info!(
        "Starting chain with difficulty {} and mining reward {}",
        config.difficulty, config.mining_reward
    );
    let mut chain = Chain::with_config(config);

    let wallet = Wallet::from_secret_hex(DEMO_SECRET_KEY)?;
    let wallet_address = wallet.address().clone();
    info!("Wallet address: {}", wallet_address);

    let recipient = Wallet::new();

    let mut transfer = Transaction::new(
        Some(wallet_address.clone()),
        recipient.address().clone(),
        10.0,
    );
    transfer.sign(&wallet)?;
    chain.add_transaction(transfer)?;

    chain.mine_pending_transactions(&wallet_address)?;
    debug!("{}", serde_json::to_string_pretty(&chain)?);

    info!("Balance of {}: {}", wallet_address, chain.balance_of(&wallet_address));
    info!("Balance of {}: {}", recipient.address(), chain.balance_of(recipient.address()));
    info!("isValid: {}", chain.is_valid());

    if let Some(block) = chain.tamper_block(1) {
        if let Some(transaction) = block.tamper_transactions().first_mut() {
            transaction.amount = 100.0;
        }
    }
    info!("isValid after tampering: {}", chain.is_valid());

    Ok(())
}
