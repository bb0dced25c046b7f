//! Headless client: drives the local agent over flat terrain while the
//! network session publishes it and mirrors everyone else.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use trundle::{
    init_logging, Agent, AgentHandle, ClientConfig, Heightfield, LocalWorld, Mirror, OfflineLink,
    Pose, Session, Texture, UdpChannel,
};

/// Samples per terrain edge of the headless client's flat ground.
const TERRAIN_SAMPLES: usize = 65;

/// Headless client for the networked vehicle simulation
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Participant id, overriding the configuration
    #[arg(long)]
    id: Option<i32>,
    /// Server address, overriding the configuration
    #[arg(long)]
    server: Option<SocketAddr>,
    /// Local bind address, overriding the configuration
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// Seconds to run before leaving the session
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(id) = args.id {
        config.participant_id = id;
    }
    if let Some(server) = args.server {
        config.server_addr = server;
    }
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn run_deadline(start: Instant, duration_secs: u64) -> Result<Instant> {
    start
        .checked_add(Duration::from_secs(duration_secs))
        .with_context(|| format!("run duration of {duration_secs} seconds is too long"))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let config = load_config(&args)?;

    let spacing = config.terrain_extent / trundle::numeric::index_to_f32(TERRAIN_SAMPLES - 1);
    let terrain = Heightfield::flat(TERRAIN_SAMPLES, TERRAIN_SAMPLES, spacing, spacing, 0.0)
        .context("building terrain")?;
    let (spawn_x, spawn_y) = terrain.spawn_point();
    let spawn = Pose::ground(spawn_x, spawn_y, 0.0);

    let local = AgentHandle::new(Agent::new(
        config.participant_id,
        config.agent,
        spawn,
        Texture::default(),
    ));
    let mirror = Mirror::new(config.capacity);
    let timing = config.loop_timing();
    let channel = UdpChannel::connect(config.bind_addr, config.server_addr, timing.receive_timeout)
        .with_context(|| format!("connecting to {}", config.server_addr))?;
    info!(
        "participant {} talking to {} from {}",
        config.participant_id,
        config.server_addr,
        channel
            .local_addr()
            .map_or_else(|_| "an unknown address".to_owned(), |addr| addr.to_string())
    );

    let session = Session::start(
        Arc::new(channel),
        Arc::new(OfflineLink),
        local.clone(),
        mirror.clone(),
        config.agent,
        timing,
    )
    .context("starting network session")?;

    let world = LocalWorld::new(Arc::new(terrain), local, mirror, spawn);
    let frame = Duration::from_secs_f32(config.frame_step);
    let deadline = run_deadline(Instant::now(), args.duration_secs)?;
    let mut frames: u64 = 0;
    while Instant::now() < deadline {
        let report = world.tick(config.frame_step);
        if world.respawn_if_stranded(&report) {
            warn!("local agent reached the edge of the terrain, respawned");
        }
        frames += 1;
        thread::sleep(frame);
    }

    let summary = session.shutdown();
    info!(
        "ran {frames} frames with {} remote agents; published {}, reconciled {}",
        world.mirror().len(),
        summary.publication.completed,
        summary.reconciliation.completed
    );
    Ok(())
}
