//! privi: operator CLI for the stream core
//!
//! ```text
//! privi keygen
//! privi address      --secret 0x…
//! privi scan-streams --secret 0x… --events streams.json [--role sender|receiver] [--spent nullifiers.json]
//! privi tree-root    --events events.json --kind stream|checkpoint
//! ```
//!
//! Event files are JSON arrays of `{commitment, leafIndex, encryptedDataSender?,
//! encryptedDataReceiver?}` as the ledger emits them. Tree depths and prover
//! settings come from `PRIVI_*` environment variables; `PRIVI_LOG_FORMAT=json`
//! switches logs (on stderr) to JSON lines.

#![forbid(unsafe_code)]

use std::{fs, path::Path};

use anyhow::{anyhow, bail, Context};
use privi_stream::{
    field, filter_unspent,
    ledger::{self, TreeKind},
    Config, FullKeys, Identity, NoteScanner, Role, SpentSet, F,
};
use rand::rngs::OsRng;
use serde_json::json;
use tracing::info;

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn required(args: &[String], key: &str) -> anyhow::Result<String> {
    parse_flag(args, key).ok_or_else(|| anyhow!("missing {key}"))
}

fn read_events(path: &str) -> anyhow::Result<Vec<privi_stream::LeafEvent>> {
    let raw = fs::read_to_string(Path::new(path)).with_context(|| format!("reading {path}"))?;
    Ok(ledger::parse_events(&raw)?)
}

fn usage() -> &'static str {
    "usage: privi <keygen | address | scan-streams | tree-root> [flags]"
}

fn keygen() -> anyhow::Result<()> {
    let keys = FullKeys::random(&mut OsRng)?;
    let out = json!({
        "secret": field::to_fixed_hex(keys.secret()),
        "publicKey": keys.public_key().to_string(),
        "address": keys.address(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn address(args: &[String]) -> anyhow::Result<()> {
    let keys = FullKeys::from_secret_hex(&required(args, "--secret")?)?;
    println!("{}", keys.address());
    Ok(())
}

async fn scan_streams(args: &[String], cfg: &Config) -> anyhow::Result<()> {
    let me = Identity::Full(FullKeys::from_secret_hex(&required(args, "--secret")?)?);
    let role = match parse_flag(args, "--role").as_deref() {
        None | Some("receiver") => Role::Receiver,
        Some("sender") => Role::Sender,
        Some(other) => bail!("unknown role {other:?}"),
    };
    let events = read_events(&required(args, "--events")?)?;

    // Sanity-check the log before trusting any indices from it.
    let tree = ledger::replay_tree(TreeKind::Stream, cfg.stream_tree_levels, &events)?;

    let payloads = ledger::scan_payloads(&events, role);
    let mut streams = NoteScanner::new(&me).recover_streams(&payloads, role)?;
    if let Some(path) = parse_flag(args, "--spent") {
        let raw = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
        let hexes: Vec<String> = serde_json::from_str(&raw)?;
        let spent = hexes
            .iter()
            .map(|h| field::from_hex::<F>(h).map_err(|e| anyhow!("nullifier {h}: {e}")))
            .collect::<anyhow::Result<SpentSet>>()?;
        streams = filter_unspent(streams, &spent).await?;
    }
    info!(found = streams.len(), root = %field::to_fixed_hex(&tree.root()), "scan complete");

    let rows = streams
        .iter()
        .map(|s| -> privi_stream::Result<serde_json::Value> {
            Ok(json!({
                "leafIndex": s.leaf_index(),
                "commitment": field::to_fixed_hex(&s.commitment()?),
                "rate": s.rate().to_string(),
                "startTime": s.start_time(),
                "stopTime": s.stop_time(),
                "amount": s.amount().to_string(),
                "sender": s.sender().public_key().to_string(),
                "receiver": s.receiver().public_key().to_string(),
            }))
        })
        .collect::<privi_stream::Result<Vec<_>>>()?;
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn tree_root(args: &[String], cfg: &Config) -> anyhow::Result<()> {
    let kind: TreeKind = required(args, "--kind")?.parse().map_err(|e: String| anyhow!(e))?;
    let levels = match kind {
        TreeKind::Stream => cfg.stream_tree_levels,
        TreeKind::Checkpoint => cfg.checkpoint_tree_levels,
    };
    let events = read_events(&required(args, "--events")?)?;
    let tree = ledger::replay_tree(kind, levels, &events)?;
    let out = json!({
        "tree": kind.name(),
        "levels": levels,
        "leaves": tree.len(),
        "root": field::to_fixed_hex(&tree.root()),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "privi=info,privi_stream=info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if std::env::var("PRIVI_LOG_FORMAT").as_deref() == Ok("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cfg = Config::from_env()?;

    match args.first().map(String::as_str) {
        Some("keygen") => keygen(),
        Some("address") => address(&args),
        Some("scan-streams") => scan_streams(&args, &cfg).await,
        Some("tree-root") => tree_root(&args, &cfg),
        _ => bail!(usage()),
    }
}
