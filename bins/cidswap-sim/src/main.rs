//! cidswap exchange simulator.
//!
//! Starts an exchange session against in-memory routing, decision engine,
//! and transport, issues a batch of wants, then feeds blocks in at a steady
//! rate. Each arriving block resolves its want, is queued for announcement,
//! and is offered back out to a random peer. Prints the session statistics as
//! JSON on exit.

use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info};

use cidswap_core::constants::{DEFAULT_PROVIDE_WORKER_MAX, DEFAULT_TASK_WORKER_COUNT};
use cidswap_core::traits::{BlockSender, ContentRouting, DecisionEngine};
use cidswap_core::types::{Block, ContentId, Envelope, Message, PeerId, PeerInfo};
use cidswap_exchange::testing::{MemoryEngine, MemoryNetwork, MemoryRouting};
use cidswap_exchange::{ExchangeConfig, ExchangeSession};

#[derive(Parser, Debug)]
#[command(
    name = "cidswap-sim",
    version,
    about = "Run a block-exchange session against simulated peers"
)]
struct Args {
    /// Number of content ids wanted at startup
    #[arg(long, default_value_t = 32)]
    wants: usize,

    /// Number of blocks that arrive over the run (the first `wants` resolve wants)
    #[arg(long, default_value_t = 64)]
    blocks: usize,

    /// Providers advertised for each wanted id
    #[arg(long, default_value_t = 3)]
    providers_per_cid: usize,

    /// Probability in [0, 1] that a provider refuses connections
    #[arg(long, default_value_t = 0.1)]
    connect_failure_rate: f64,

    /// Wall-clock length of the run
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,

    /// Outbound task workers
    #[arg(long, default_value_t = DEFAULT_TASK_WORKER_COUNT)]
    task_workers: usize,

    /// Maximum concurrent announces
    #[arg(long, default_value_t = DEFAULT_PROVIDE_WORKER_MAX)]
    provide_workers: usize,

    /// Seconds between want rebroadcasts
    #[arg(long, default_value_t = 2)]
    rebroadcast_secs: u64,

    /// Seed for the simulated network and the rebroadcast selector
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

/// Shape of the simulated workload.
#[derive(Debug, Clone)]
struct Plan {
    wants: usize,
    blocks: usize,
    providers_per_cid: usize,
    connect_failure_rate: f64,
    duration: Duration,
    seed: u64,
}

impl Args {
    /// Convert CLI args into a session config and a workload plan.
    fn into_config(self) -> anyhow::Result<(ExchangeConfig, Plan)> {
        ensure!(
            (0.0..=1.0).contains(&self.connect_failure_rate),
            "--connect-failure-rate must be within [0, 1], got {}",
            self.connect_failure_rate
        );
        ensure!(self.duration_secs > 0, "--duration-secs must be greater than zero");
        ensure!(self.rebroadcast_secs > 0, "--rebroadcast-secs must be greater than zero");

        let seed = self.seed.unwrap_or_else(rand::random);
        let config = ExchangeConfig {
            task_worker_count: self.task_workers,
            provide_worker_max: self.provide_workers,
            rebroadcast_interval: Duration::from_secs(self.rebroadcast_secs),
            provider_request_timeout: Duration::from_secs(2),
            provide_timeout: Duration::from_secs(2),
            rng_seed: Some(seed),
            ..ExchangeConfig::default()
        };
        config.validate().context("invalid exchange configuration")?;

        let plan = Plan {
            wants: self.wants,
            blocks: self.blocks,
            providers_per_cid: self.providers_per_cid,
            connect_failure_rate: self.connect_failure_rate,
            duration: Duration::from_secs(self.duration_secs),
            seed,
        };
        Ok((config, plan))
    }
}

/// Payload of the `i`th simulated block. Wanted ids are the ids of the first payloads.
fn payload(i: usize) -> Vec<u8> {
    format!("sim-block-{i}").into_bytes()
}

/// Populate the routing table: every wanted id gets its providers, some of them unreachable.
fn seed_routing(routing: &MemoryRouting, plan: &Plan, rng: &mut StdRng) -> usize {
    let mut unreachable = 0;
    for i in 0..plan.wants {
        let cid = ContentId::of(&payload(i));
        for j in 0..plan.providers_per_cid {
            let peer = PeerId::derive(format!("provider-{i}-{j}").as_bytes());
            routing.add_provider(cid, PeerInfo::from(peer));
            if rng.gen_bool(plan.connect_failure_rate) {
                routing.fail_connect(peer);
                unreachable += 1;
            }
        }
    }
    unreachable
}

/// Deliver blocks at a steady rate spread across the run.
async fn feed_blocks(
    session: &ExchangeSession,
    engine: &MemoryEngine,
    plan: &Plan,
    rng: &mut StdRng,
) -> anyhow::Result<()> {
    if plan.blocks == 0 {
        return Ok(());
    }
    let period = plan.duration / (plan.blocks as u32 + 1);
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.tick().await;

    for i in 0..plan.blocks {
        ticker.tick().await;
        let block = Block::new(payload(i));
        let cid = block.cid();
        session.has_block(cid).await.context("session stopped accepting blocks")?;

        let requester = PeerId::derive(format!("requester-{}", rng.gen_range(0..16u32)).as_bytes());
        let message: Message = std::iter::once(block).collect();
        engine.offer(Envelope::new(requester, message));
        debug!(%cid, peer = %requester, "sim: block arrived");
    }
    info!(blocks = plan.blocks, "sim: all blocks delivered");
    Ok(())
}

async fn run(config: ExchangeConfig, plan: Plan) -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(plan.seed);

    let routing = Arc::new(MemoryRouting::new());
    routing.set_search_delay(Duration::from_millis(5));
    routing.set_connect_delay(Duration::from_millis(20));
    routing.set_provide_delay(Duration::from_millis(10));
    let unreachable = seed_routing(&routing, &plan, &mut rng);
    info!(
        wants = plan.wants,
        providers = plan.wants * plan.providers_per_cid,
        unreachable,
        "sim: routing table seeded"
    );

    let engine = Arc::new(MemoryEngine::new());
    let network = Arc::new(MemoryNetwork::new());
    let session = ExchangeSession::start(
        config,
        Arc::clone(&routing) as Arc<dyn ContentRouting>,
        Arc::clone(&engine) as Arc<dyn DecisionEngine>,
        Arc::clone(&network) as Arc<dyn BlockSender>,
    )?;

    for i in 0..plan.wants {
        let priority = rng.gen_range(0..10);
        session.want(ContentId::of(&payload(i)), priority).await?;
    }
    info!(wants = plan.wants, "sim: wants issued");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("received Ctrl+C, shutting down...");
    };

    let workload = async {
        feed_blocks(&session, &engine, &plan, &mut rng).await?;
        tokio::time::sleep(plan.duration / 10).await;
        anyhow::Ok(())
    };

    tokio::select! {
        result = tokio::time::timeout(plan.duration, workload) => match result {
            Ok(Ok(())) => info!("sim: workload finished"),
            Ok(Err(e)) => error!("sim: workload failed: {e:#}"),
            Err(_) => info!("sim: duration elapsed"),
        },
        _ = shutdown_signal => {}
    }

    let stats = session.stats();
    session.shutdown().await;

    info!(
        blocks_sent = stats.blocks_sent,
        data_sent = stats.data_sent,
        unresolved = stats.wantlist.len(),
        connected = routing.connected().len(),
        announced = routing.announced().len(),
        "sim: finished"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    let (config, plan) = match args.into_config() {
        Ok(parsed) => parsed,
        Err(e) => {
            error!("{e:#}");
            process::exit(2);
        }
    };

    info!("cidswap-sim v{}", env!("CARGO_PKG_VERSION"));
    info!(seed = plan.seed, duration = ?plan.duration, "sim: starting");

    if let Err(e) = run(config, plan).await {
        error!("sim failed: {e:#}");
        process::exit(1);
    }
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value defaults
/// to human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
