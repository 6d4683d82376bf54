use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use situated_perception::config::PerceptionConfig;
use situated_perception::metrics::PerceptionMetrics;
use situated_perception::perception::{create_algorithm, PerceptionScene};
use situated_perception::scenario::{Scenario, ScenarioConfig};
use situated_perception::tree::{Binary, Icosep, TreeManipulator, TreeShape, ZoneShape};
use situated_perception::world::ground::FlatGround;

/// Simulation knobs, read from `SIM_*` environment variables
#[derive(Debug, Clone)]
struct SimOptions {
    ticks: usize,
    max_step: f32,
    seed: Option<u64>,
    scenario: ScenarioConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid {} '{}', using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

impl SimOptions {
    fn from_env() -> Self {
        let defaults = ScenarioConfig::default();
        Self {
            ticks: env_or("SIM_TICKS", 20),
            max_step: env_or("SIM_MAX_STEP", 2.0),
            seed: std::env::var("SIM_SEED").ok().and_then(|s| s.parse().ok()),
            scenario: ScenarioConfig {
                world_size: env_or("SIM_WORLD_SIZE", defaults.world_size),
                static_count: env_or("SIM_STATICS", defaults.static_count),
                body_count: env_or("SIM_BODIES", defaults.body_count),
                sensor_range: env_or("SIM_SENSOR_RANGE", defaults.sensor_range),
                ..defaults
            },
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Situated perception simulator v{}", env!("CARGO_PKG_VERSION"));

    let config = PerceptionConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: strategy={}, workers={}, split={}, shape={}",
        config.strategy, config.worker_threads, config.splitting_count, config.tree_shape
    );

    let options = SimOptions::from_env();
    let metrics = Arc::new(PerceptionMetrics::new());

    match config.tree_shape {
        TreeShape::Binary => run::<Binary>(&config, &options, &metrics)?,
        TreeShape::Icosep => run::<Icosep>(&config, &options, &metrics)?,
    }

    println!("{}", serde_json::to_string_pretty(&metrics.snapshot())?);
    Ok(())
}

fn run<Z: ZoneShape>(
    config: &PerceptionConfig,
    options: &SimOptions,
    metrics: &Arc<PerceptionMetrics>,
) -> anyhow::Result<()> {
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut scenario: Scenario<3> = Scenario::generate(options.scenario.clone(), &mut rng);
    let started = Instant::now();
    let static_tree = Arc::new(scenario.static_tree::<Z>(config.splitting_count));
    let mut dynamic_tree = Arc::new(scenario.dynamic_tree::<Z>(config.splitting_count)?);
    info!(
        statics = static_tree.len(),
        bodies = dynamic_tree.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Trees built"
    );
    info!(stats = ?static_tree.stats(), "Static tree");

    let ground = Arc::new(FlatGround::new(0.0));
    let mut algorithm = create_algorithm::<3>(config, metrics.clone());

    for tick in 0..options.ticks {
        if tick > 0 {
            // No scene holds the dynamic tree here, so make_mut does not copy it
            let tree = Arc::make_mut(&mut dynamic_tree);
            for entity in scenario.step(&mut rng, options.max_step) {
                tree.relocate(entity)?;
            }
        }

        let scene = PerceptionScene::new(static_tree.clone(), dynamic_tree.clone()).with_ground(ground.clone());
        let population = scenario.population();
        let tick_started = Instant::now();
        let map = algorithm.compute_perceptions(&population, &scene);

        let statics: usize = map.iter().map(|(_, l)| l.static_count()).sum();
        let dynamics: usize = map.iter().map(|(_, l)| l.dynamic_count()).sum();
        let incomplete = map.incomplete().count();
        info!(
            tick,
            bodies = map.len(),
            statics,
            dynamics,
            incomplete,
            elapsed_us = tick_started.elapsed().as_micros() as u64,
            "Tick perceived"
        );
    }

    info!(stats = ?dynamic_tree.stats(), "Dynamic tree");
    Ok(())
}
