//! Room key exchange simulator.
//!
//! Connects a number of users to an in-process relay one at a time, has them
//! take turns sending messages, and checks that every user ends up holding
//! the same room key and reading every message.
//!
//! # Usage
//!
//! ```bash
//! # Three users, ten messages, in-memory key stores
//! roomkey-sim --clients 3 --messages 10
//!
//! # Durable key stores; rerunning with the same directory reloads keys
//! roomkey-sim --store /tmp/roomkey --seed 7
//! ```

use std::{error::Error, fs, path::Path};

use clap::Parser;
use roomkey_client::KeyStore;
use roomkey_core::storage::RedbKeyStore;
use roomkey_harness::SimCluster;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Room key exchange simulator
#[derive(Parser, Debug)]
#[command(name = "roomkey-sim")]
#[command(about = "Deterministic multi-client room key exchange simulation")]
#[command(version)]
struct Args {
    /// Number of simulated users
    #[arg(short, long, default_value = "3")]
    clients: usize,

    /// Messages to send, round-robin across users
    #[arg(short, long, default_value = "10")]
    messages: usize,

    /// RNG seed
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Directory for durable per-user key stores (in-memory if absent)
    #[arg(long)]
    store: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(clients = args.clients, messages = args.messages, seed = args.seed, "starting simulation");

    match &args.store {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let stores = (0..args.clients)
                .map(|i| RedbKeyStore::open(Path::new(dir).join(format!("user-{i}.redb"))))
                .collect::<Result<Vec<_>, _>>()?;
            run(SimCluster::with_stores(args.seed, stores), &args)
        },
        None => run(SimCluster::new(args.seed, args.clients), &args),
    }
}

fn run<S: KeyStore>(mut cluster: SimCluster<S>, args: &Args) -> Result<(), Box<dyn Error>> {
    if cluster.is_empty() {
        return Err("at least one client is required".into());
    }

    for i in 0..cluster.len() {
        cluster.connect(i);
    }

    let mut unsent = 0;
    for n in 0..args.messages {
        let sender = n % cluster.len();
        let text = format!("message {n} from {}", cluster.username(sender));
        if !cluster.send(sender, &text) {
            unsent += 1;
        }
    }

    for i in 0..cluster.len() {
        let observer = cluster.session(i).observer();
        tracing::info!(
            user = cluster.username(i),
            delivered = observer.messages().len(),
            recovered = observer.recovered_messages().len(),
            placeholders = observer.key_pending_count(),
            warnings = observer.warnings().len(),
            "user summary"
        );
    }

    let stats = cluster.relay().stats();
    tracing::info!(
        chats = stats.chats,
        key_shares = stats.key_shares,
        key_requests = stats.key_requests,
        dropped = stats.dropped,
        unsent,
        "relay summary"
    );

    if args.messages > 0 && !cluster.converged() {
        return Err("users did not converge on one room key".into());
    }

    tracing::info!("all users converged on one room key");
    Ok(())
}
