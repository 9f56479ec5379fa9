/// World Repair: repairs a world document until every integrity rule
/// passes, then writes the result.
///
/// Usage: world_repair <world.json> [--output <path>] [--seed <n>]
///                     [--canon <canon.ron>] [--fallback-npc <id>] [--stale-only]
///
/// Without --output the repaired document goes to stdout. Nothing is
/// written unless the repaired document validates clean.

use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;
use world_integrity::core::content::ContentRefresh;
use world_integrity::{IntegrityEngine, PipelineError};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        process::exit(0);
    }

    let world_path = &args[1];
    let mut output = None;
    let mut seed: u64 = 42;
    let mut canon = None;
    let mut fallback_npc = None;
    let mut refresh = ContentRefresh::Always;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--output" if i + 1 < args.len() => {
                i += 1;
                output = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = match args[i].parse() {
                    Ok(seed) => seed,
                    Err(_) => {
                        eprintln!("ERROR: --seed expects an integer, got '{}'", args[i]);
                        process::exit(2);
                    }
                };
            }
            "--canon" if i + 1 < args.len() => {
                i += 1;
                canon = Some(args[i].clone());
            }
            "--fallback-npc" if i + 1 < args.len() => {
                i += 1;
                fallback_npc = Some(args[i].clone());
            }
            "--stale-only" => refresh = ContentRefresh::Stale,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(2);
            }
        }
        i += 1;
    }

    let mut builder = IntegrityEngine::builder().seed(seed).content_refresh(refresh);
    if let Some(ref path) = canon {
        builder = builder.canon_path(path);
    }
    if let Some(ref id) = fallback_npc {
        builder = builder.fallback_npc(id);
    }
    let engine = match builder.build() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(2);
        }
    };

    let outcome = match engine.repair_file(Path::new(world_path)) {
        Ok(outcome) => outcome,
        Err(PipelineError::Unresolved { report, log }) => {
            eprintln!("=== Repair Log ===\n{}", log);
            eprintln!("=== Unresolved ===\n{}", report);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("ERROR: Failed to repair {}: {}", world_path, e);
            process::exit(2);
        }
    };

    eprintln!("=== Before Repair ===\n{}\n", outcome.initial);
    eprintln!("=== Repair Log ({} actions) ===\n{}", outcome.log.len(), outcome.log);
    eprintln!("=== After Repair ===\n{}\n", outcome.final_report);

    let json = match outcome.to_json_pretty() {
        Ok(json) => json,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(2);
        }
    };
    match output {
        Some(ref path) => {
            if let Err(e) = std::fs::write(path, json) {
                eprintln!("ERROR: Failed to write {}: {}", path, e);
                process::exit(2);
            }
            eprintln!("Wrote {}", path);
        }
        None => println!("{}", json),
    }
}

fn print_usage() {
    println!("Usage: world_repair <world.json> [options]");
    println!();
    println!("Options:");
    println!("  --output <path>       Write the repaired document here (default: stdout)");
    println!("  --seed <n>            Seed for sampling and generated ids (default: 42)");
    println!("  --canon <canon.ron>   Canonical factions, clocks and relationship table");
    println!("  --fallback-npc <id>   Site owner for settlements without a roster");
    println!("  --stale-only          Regenerate only settlements whose content is broken");
}
