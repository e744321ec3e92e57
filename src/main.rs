mod commands;
mod config;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::commands::Env;
use crate::config::WeditConfig;

#[derive(Parser, Debug)]
#[command(name = "wedit", version, about = "Inspect block patterns and masks, and replay a scripted edit session")]
struct Cli {
    /// Session config file
    #[arg(long, short, default_value = "assets/wedit.toml")]
    config: PathBuf,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a pattern, print its optimized form and sample it.
    Pattern {
        expr: String,
        /// Also print the JSON tree
        #[arg(long)]
        json: bool,
        /// Evaluate this many times and print the distribution
        #[arg(long, default_value_t = 0)]
        samples: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Parse a mask and print its optimized form and bulk filter.
    Mask {
        expr: String,
        #[arg(long)]
        json: bool,
    },
    /// Run a few edits on an in-memory world, then undo and redo them.
    Demo {
        /// Edge of the edited cube
        #[arg(long, default_value_t = 8)]
        size: i32,
        /// Override the configured per-tick block budget
        #[arg(long)]
        blocks_per_tick: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = WeditConfig::load(&cli.config)?;
    let env = Env::load(config)?;
    match cli.command {
        Command::Pattern {
            expr,
            json,
            samples,
            seed,
        } => commands::pattern(&env, &expr, json, samples, seed),
        Command::Mask { expr, json } => commands::mask(&env, &expr, json),
        Command::Demo { size, blocks_per_tick } => commands::demo(&env, size, blocks_per_tick),
    }
}
