//! Globe Tour CLI - Command-line interface
//!
//! Runs the presentation scheduler headless against an in-memory map surface
//! and logs every step.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::run::RunArgs;

#[derive(Debug, Parser)]
#[command(name = "globetour", version, about = "Geospatial presentation scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Present the POIs in a JSON file until stopped
    Run {
        /// JSON file containing an array of POI records
        #[arg(long)]
        pois: PathBuf,

        /// INI configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the slide delay in seconds
        #[arg(long)]
        delay_secs: Option<f64>,

        /// Stop automatically after this many seconds
        #[arg(long)]
        for_secs: Option<u64>,

        /// Write logs to this file instead of stderr
        #[arg(long)]
        log_file: Option<PathBuf>,

        /// Log filter (RUST_LOG takes precedence)
        #[arg(long, default_value = "info")]
        log_level: String,
    },

    /// Print the effective configuration
    Config {
        /// INI configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            pois,
            config,
            delay_secs,
            for_secs,
            log_file,
            log_level,
        } => commands::run::run(RunArgs {
            pois,
            config,
            delay_secs,
            for_secs,
            log_file,
            log_level,
        }),
        Commands::Config { config } => commands::config::run(config),
    };

    if let Err(e) = result {
        e.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "globetour",
            "run",
            "--pois",
            "pois.json",
            "--for-secs",
            "30",
        ]);
        match cli.command {
            Commands::Run {
                pois,
                for_secs,
                log_level,
                ..
            } => {
                assert_eq!(pois, PathBuf::from("pois.json"));
                assert_eq!(for_secs, Some(30));
                assert_eq!(log_level, "info");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
