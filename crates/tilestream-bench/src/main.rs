use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use std::sync::Arc;

use tilestream_bench::report;
use tilestream_bench::runner::SoakRunner;
use tilestream_bench::scenes;
use tilestream_core::{StreamingConfig, TileTable};

fn parse_or_exit<T: FromStr>(flag: &str, value: Option<&String>) -> T {
    match value.map(|v| v.parse::<T>()) {
        Some(Ok(parsed)) => parsed,
        _ => {
            eprintln!("invalid or missing value for {}", flag);
            process::exit(1);
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    let mut baseline_path: Option<PathBuf> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut regression_threshold = 10.0f64;
    let mut tick_count = 600u32;
    let mut loader_count = 4u32;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--baseline" => {
                i += 1;
                baseline_path = Some(parse_or_exit::<PathBuf>("--baseline", args.get(i)));
            }
            "--output" => {
                i += 1;
                output_path = Some(parse_or_exit::<PathBuf>("--output", args.get(i)));
            }
            "--config" => {
                i += 1;
                config_path = Some(parse_or_exit::<PathBuf>("--config", args.get(i)));
            }
            "--regression-threshold" => {
                i += 1;
                regression_threshold = parse_or_exit("--regression-threshold", args.get(i));
            }
            "--ticks" => {
                i += 1;
                tick_count = parse_or_exit("--ticks", args.get(i));
            }
            "--loaders" => {
                i += 1;
                loader_count = parse_or_exit("--loaders", args.get(i));
            }
            "--help" | "-h" => {
                eprintln!("Usage: soak-runner [OPTIONS]");
                eprintln!("  --ticks <n>                    Ticks per scene (default: 600)");
                eprintln!("  --loaders <n>                  Concurrent loaders (default: 4)");
                eprintln!("  --config <path>                StreamingConfig RON (default: data/streaming.ron)");
                eprintln!("  --output <path>                Save current results as JSON baseline");
                eprintln!("  --baseline <path>              Load baseline JSON for comparison");
                eprintln!(
                    "  --regression-threshold <pct>   Regression threshold percentage (default: 10)"
                );
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let tiles = match TileTable::from_ron_str(include_str!("../../../data/tiles.ron")) {
        Ok(tiles) => Arc::new(tiles),
        Err(e) => {
            eprintln!("Tile table error: {}", e);
            process::exit(1);
        }
    };

    let config_text = match &config_path {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("Cannot read {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => include_str!("../../../data/streaming.ron").to_string(),
    };
    let config = match StreamingConfig::from_ron_str(&config_text) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            process::exit(1);
        }
    };
    log::info!("Streaming config: {:?}", config);

    let runner = SoakRunner::new(tick_count, loader_count, config, tiles);
    let mut results = Vec::new();
    for scene in &scenes::standard_scenes() {
        match runner.run_scene(scene) {
            Ok(result) => results.push(result),
            Err(e) => {
                log::error!("Scene '{}' failed: {}", scene.name, e);
                process::exit(1);
            }
        }
    }

    println!("\n## Soak Results\n");
    println!("{}", report::format_markdown(&results));

    if let Some(ref path) = output_path {
        let baseline = report::Baseline {
            label: format!("soak-{}t-{}l", tick_count, loader_count),
            results: results.clone(),
        };
        match report::save_baseline(path, &baseline) {
            Ok(()) => log::info!("Saved baseline to {}", path.display()),
            Err(e) => {
                log::error!("Failed to save baseline {}: {}", path.display(), e);
                process::exit(1);
            }
        }
    }

    if let Some(ref path) = baseline_path {
        if let Some(baseline) = report::load_baseline(path) {
            let regressions = report::compare(&results, &baseline, regression_threshold);
            println!(
                "{}",
                report::format_comparison(&regressions, regression_threshold)
            );
            if !regressions.is_empty() {
                eprintln!(
                    "ERROR: {} regressions detected, exiting with code 1",
                    regressions.len()
                );
                process::exit(1);
            }
        } else {
            log::warn!("Baseline file not found: {}", path.display());
        }
    }

    log::info!("Soak run complete.");
}
