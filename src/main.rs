use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use dotenv::dotenv;
use log::{LevelFilter, error, info};
use sportuni_booker::{
    Config,
    app::{self, RunOptions},
};

extern crate env_logger;
extern crate log;

/// Books recurring sportuni slots from a YAML config.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to config YAML file
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,

    /// WebDriver server to drive the browser through (e.g. geckodriver)
    #[arg(
        long,
        env = "SPORTUNI_WEBDRIVER_URL",
        default_value = "http://localhost:4444"
    )]
    webdriver_url: String,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let config = match Config::load(cli.file.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load config: {err}");
            return ExitCode::FAILURE;
        }
    };

    let options = RunOptions {
        webdriver_url: cli.webdriver_url,
        headless: cli.headless,
        ..Default::default()
    };
    match app::run(&config, &options).await {
        Ok(booked) => {
            for entry in &booked {
                info!("Booked {} ({:?})", entry.slot, entry.claim);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("Application error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
