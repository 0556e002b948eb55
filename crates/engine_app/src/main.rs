//! # engine_app: replication demo
//!
//! Drives a source universe with a small system pipeline and mirrors it into
//! a replica universe through the binary delta codec, one delta per tick.
//!
//! ## Components
//!
//! - `Position { x: f32, y: f32 }`
//! - `Velocity { x: f32, y: f32 }` (parsed from its JSON schema)
//! - `Frozen` (tag, excludes an entity from movement)

mod components;
mod tick;

use anyhow::Result;
use clap::Parser;
use engine_ecs::{DEFAULT_CAPACITY, DEFAULT_MAX_BYTES, EcsConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tick::{TickConfig, TickLoop};

#[derive(Parser)]
#[command(name = "engine_app", about = "Bitmask ECS replication demo")]
struct Args {
    /// Initial entity capacity of every world and store
    #[arg(short, long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Entities spawned in the source world
    #[arg(short, long, default_value_t = 1_000)]
    entities: usize,

    /// Ticks to run
    #[arg(short, long, default_value_t = 60)]
    ticks: u64,

    /// Serializer scratch buffer size in bytes
    #[arg(short, long, default_value_t = DEFAULT_MAX_BYTES)]
    max_bytes: usize,

    /// Target ticks per second, 0 to run unthrottled
    #[arg(long, default_value_t = 60.0)]
    tick_rate: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("engine_app=info".parse()?))
        .init();

    let args = Args::parse();
    info!(
        capacity = args.capacity,
        entities = args.entities,
        ticks = args.ticks,
        max_bytes = args.max_bytes,
        "engine demo starting"
    );

    let ecs = EcsConfig::new()
        .with_capacity(args.capacity)
        .with_max_bytes(args.max_bytes);
    let config = TickConfig {
        entities: args.entities,
        ticks: args.ticks,
        tick_rate: args.tick_rate,
        ..TickConfig::default()
    };

    let mut tick_loop = TickLoop::new(config, ecs)?;
    tick_loop.run()?;

    info!("engine demo shut down");
    Ok(())
}
