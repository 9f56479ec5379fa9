/// World Validate: checks a world document against every integrity rule.
///
/// Usage: world_validate <world.json>
///
/// Exit codes: 0 all categories pass, 1 some category failed, 2 the file
/// could not be read or parsed.

use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;
use world_integrity::IntegrityEngine;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: world_validate <world.json>");
        process::exit(0);
    }

    let world_path = Path::new(&args[1]);
    if let Some(extra) = args.get(2) {
        eprintln!("Unknown argument: {}", extra);
        process::exit(2);
    }

    let engine = match IntegrityEngine::builder().build() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(2);
        }
    };

    let report = match engine.validate_file(world_path) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("ERROR: Failed to load {}: {}", world_path.display(), e);
            process::exit(2);
        }
    };

    println!("\n=== World Integrity Report: {} ===\n", world_path.display());
    println!("{}", report);

    if report.is_clean() {
        println!("\nAll checks passed!");
        process::exit(0);
    } else {
        process::exit(1);
    }
}
