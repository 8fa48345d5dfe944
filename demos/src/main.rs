//! Constrained RL Examples
//!
//! # CPO (Constrained Policy Optimization)
//!
//! ```bash
//! # Point mass with a hazard zone, default configuration
//! cargo run --release -- cpo
//!
//! # Same, with hyperparameters from a JSON file
//! cargo run --release -- cpo config.json
//!
//! # Write the default configuration as JSON
//! cargo run --release -- dump-config config.json
//! ```

use std::path::PathBuf;

use constrained_rl::CpoConfig;

mod point_cpo;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "cpo" => point_cpo::run(args.get(2).map(PathBuf::from)),

            "dump-config" => {
                let path = args.get(2).map_or("cpo_config.json", String::as_str);
                CpoConfig::default()
                    .to_json_file(path)
                    .expect("Failed to write configuration");
                println!("Default configuration written to {}", path);
            }

            _ => {
                println!("Unknown command: {}", args[1]);
                println!();
                print_usage();
            }
        }
    } else {
        print_usage();
    }
}

fn print_usage() {
    println!("Usage: cargo run --release -- <command> [path]");
    println!();
    println!("=============================================================================");
    println!("                   CPO (Trust Region, Cost Constrained)");
    println!("=============================================================================");
    println!();
    println!("  cpo [config.json]                 Gaussian MLP policy, continuous actions");
    println!("                                    Environment: LinearPointEnv");
    println!("                                    Reward: approach goal, Cost: hazard disc");
    println!();
    println!("  dump-config [path]                Write the default CpoConfig as JSON");
    println!();
}
