//! World fixer binary: remaps legacy block ids in every chunk of a world.
//!
//! Usage: cargo run --release --bin fix_world -- --world <DIR> [OPTIONS]
//!
//! Options:
//!   --world <DIR>      World directory (must contain level.dat and region/)
//!   --config <FILE>    JSON repair config with remap rules (default: built-in defaults)
//!   --height <H>       Override world height from the config
//!
//! Example config:
//!   {
//!     "world_height": 256,
//!     "rules": [
//!       { "from": 95, "to": 20 },
//!       { "from": 35, "from_data": 14, "to": 159, "to_data": 14 }
//!     ]
//!   }

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use worldfix::core::logging;
use worldfix::repair::{RepairConfig, RepairState, RepairTask, WorldRepair};

fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let Some(world) = parse_str_arg(&args, "--world") else {
        eprintln!("Usage: fix_world --world <DIR> [--config <FILE>] [--height <H>]");
        return ExitCode::FAILURE;
    };
    let world_dir = PathBuf::from(world);

    let mut config = match parse_str_arg(&args, "--config") {
        Some(path) => match RepairConfig::load_sync(&PathBuf::from(path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => RepairConfig::default(),
    };
    if let Some(height) = parse_u32_arg(&args, "--height") {
        config.world_height = height;
        if let Err(e) = config.validate() {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    }

    let fixer = config.remap_table();

    println!("=== World Fixer ===");
    println!("World:  {}", world_dir.display());
    println!("Height: {}", config.world_height);
    println!("Rules:  {}", fixer.len());
    println!();

    let repair = WorldRepair::new(&world_dir, fixer).with_config(config);
    let task = match RepairTask::spawn(repair) {
        Ok(task) => task,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut last_percentage = -1;
    while !task.is_finished() {
        let status = task.status();
        if status.state == RepairState::Repairing && status.percentage != last_percentage {
            last_percentage = status.percentage;
            eprintln!("  [{}%] {} chunks, {:.1}s",
                status.percentage, status.chunk_count, status.elapsed_secs);
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    let status = task.join();
    if !status.error.is_empty() {
        println!("{}", status.error);
        return ExitCode::FAILURE;
    }

    println!();
    match status.state {
        RepairState::Cancelled => println!("Cancelled after {} chunks", status.chunk_count),
        _ => println!("Fixed {} chunks in {:.1}s", status.chunk_count, status.elapsed_secs),
    }
    ExitCode::SUCCESS
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
