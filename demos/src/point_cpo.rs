//! CPO on the linear point environment.
//!
//! A point mass starts at a random position and is rewarded for approaching
//! the goal at (1, 1). Each step spent inside the hazard disc at (0.5, 0.5)
//! costs 1. The cost budget `delta` bounds the policy's cost surrogate, so the
//! learned path skirts the hazard instead of cutting through it.
//!
//! # Environment: LinearPointEnv
//!
//! - Observation: position (2D)
//! - Action: velocity in [-1.0, 1.0]² (2D continuous)
//! - Reward: -‖x - goal‖
//! - Cost: 1 inside the hazard, 0 outside

use std::path::PathBuf;

use burn::backend::{Autodiff, NdArray};

use constrained_rl::{
    create_value_optimizer, CSVLogger, ConsoleLogger, CpoConfig, LinearPointEnv, MlpPolicyConfig,
    MlpValue, MlpValueConfig, MultiLogger, TrainingLoop,
};

type B = Autodiff<NdArray<f32>>;

const HIDDEN_SIZE: usize = 64;

fn default_config() -> CpoConfig {
    CpoConfig::new()
        .with_n_iterations(100)
        .with_batch_size(2048)
        .with_max_episode_steps(Some(100))
        .with_max_kl(0.01)
        .with_delta(0.0)
        .with_gamma(0.99)
        .with_lam(0.95)
        .with_value_lr(1e-3)
        .with_cost_value_lr(1e-3)
        .with_max_grad_norm(Some(1.0))
        .with_seed(42)
}

/// Run CPO, optionally loading the config from a JSON file.
///
/// Writes `cpo_point_history.json` and `cpo_point.csv` to the working
/// directory.
pub fn run(config_path: Option<PathBuf>) {
    println!("=== CPO (LinearPointEnv) ===");
    println!("Action Space: Continuous [-1.0, 1.0]^2");
    println!();

    let config = match config_path {
        Some(path) => {
            println!("Loading configuration from {}", path.display());
            CpoConfig::from_json_file(&path).expect("Failed to load configuration")
        }
        None => default_config(),
    };

    println!("Configuration:");
    println!("  Iterations: {}", config.n_iterations);
    println!("  Batch size: {} transitions", config.batch_size);
    println!("  Trust region: max_kl = {}", config.max_kl);
    println!("  Cost budget: delta = {}", config.delta);
    println!(
        "  CG: {} iterations, damping {}",
        config.cg_iters, config.damping
    );
    println!(
        "  Line search: {} steps, ratio {}",
        config.line_search_steps, config.backtrack_ratio
    );
    println!();

    let device = Default::default();
    let env = LinearPointEnv::new(config.seed);

    let policy = MlpPolicyConfig::new(LinearPointEnv::OBS_SIZE, LinearPointEnv::ACTION_DIM)
        .with_hidden_size(HIDDEN_SIZE)
        .init::<B>(&device);
    let value_model = MlpValueConfig::new(LinearPointEnv::OBS_SIZE)
        .with_hidden_size(HIDDEN_SIZE)
        .init::<B>(&device);
    let cost_value_model = MlpValueConfig::new(LinearPointEnv::OBS_SIZE)
        .with_hidden_size(HIDDEN_SIZE)
        .init::<B>(&device);

    let mut training = TrainingLoop::new(
        env,
        policy,
        value_model,
        cost_value_model,
        create_value_optimizer::<B, MlpValue<B>>(config.max_grad_norm),
        create_value_optimizer::<B, MlpValue<B>>(config.max_grad_norm),
        config,
        device,
    )
    .expect("Failed to build training loop");

    let mut logger = MultiLogger::new()
        .add(ConsoleLogger::new(5))
        .add(CSVLogger::new("cpo_point.csv").expect("Failed to create CSV log"));

    println!("Starting training...");
    println!();

    let history = training.run(&mut logger).expect("Training failed");

    println!();
    if let Some(last) = history.last() {
        println!(
            "Final: return {:.3}, cost {:.3} per episode",
            last.avg_return, last.avg_cost
        );
    }
    println!(
        "Line search acceptance: {:.1}%",
        100.0 * history.acceptance_rate()
    );

    history
        .save_json("cpo_point_history.json")
        .expect("Failed to save history");
    println!("History written to cpo_point_history.json");
}
