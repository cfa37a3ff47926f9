use std::{fs, path::PathBuf};

use agent_wallet_encoder::{
    address_of, parse_signing_key, sign_action_request, sign_batch_request, BatchRequest,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use k256::ecdsa::SigningKey;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Encode and sign agent wallet requests with the owner key.
///
/// The output is JSON a relay can submit as-is: the encoded payload, the signature, and the
/// nonce/expiration the signature is bound to.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to a file containing the owner private key.
    #[arg(long, env = "PRIV_KEY_PATH", global = true, conflicts_with = "private_key")]
    private_key_path: Option<PathBuf>,

    /// Owner private key (hex string, 0x...).
    #[arg(long, env = "PKEY", global = true, conflicts_with = "private_key_path")]
    private_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign a batch for `performBatch`.
    SignBatch {
        /// JSON request file (chainId, wallet, nonce, expiration, instructions).
        #[arg(long)]
        file: PathBuf,
    },
    /// Sign a single instruction for `performAction`.
    SignAction {
        /// JSON request file holding exactly one instruction.
        #[arg(long)]
        file: PathBuf,
    },
    /// Print the address of the configured key.
    Address,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let key = load_key(&cli)?;
    info!(signer = %address_of(&key), "loaded signing key");

    match &cli.command {
        Command::SignBatch { file } => {
            let request = read_request(file)?;
            let signed = sign_batch_request(&key, &request)?;
            println!("{}", serde_json::to_string_pretty(&signed.to_json())?);
        }
        Command::SignAction { file } => {
            let request = read_request(file)?;
            let signed = sign_action_request(&key, &request)?;
            println!("{}", serde_json::to_string_pretty(&signed.to_json())?);
        }
        Command::Address => println!("{}", address_of(&key)),
    }
    Ok(())
}

fn load_key(cli: &Cli) -> Result<SigningKey> {
    if let Some(ref path) = cli.private_key_path {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading private key from {}", path.display()))?;
        return parse_signing_key(&raw);
    }
    if let Some(ref raw) = cli.private_key {
        return parse_signing_key(raw);
    }
    bail!("no key given: pass --private-key-path or --private-key (or set PRIV_KEY_PATH / PKEY)")
}

fn read_request(path: &PathBuf) -> Result<BatchRequest> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let request: BatchRequest =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    debug!(
        chain_id = request.chain_id,
        wallet = %request.wallet,
        count = request.instructions.len(),
        "request loaded"
    );
    Ok(request)
}
