use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::{env, fs, thread};

use anyhow::{Context, Result};
use chrono::Local;
use env_logger::Env;
use log::{error, info};
use structopt::StructOpt;
use toml::Value;

use identity_migrator::common::helpers::print_error_chain;
use identity_migrator::{run_migration_with_options, Config};

use crate::args::Args;

mod args;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match init().await.with_context(|| "Migration failed") {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(errors) => {
            print_error_chain(&errors);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the run was committed.
async fn init() -> Result<bool> {
    let options = Args::from_args();

    initialize_logger(options.verbose, options.quiet);

    let config = load_config(&options.config)
        .with_context(|| format!("Failed to load config file {}", options.config.display()))?;

    let settings = config.settings();
    let report = run_migration_with_options(
        config.source_database(),
        config.target_database(),
        &settings.tables,
        settings.options.clone(),
    )
    .await;

    if report.is_committed() {
        info!("{}", report);
    } else {
        error!("{}", report);
    }

    Ok(report.is_committed())
}

fn initialize_logger(verbose: bool, quiet: bool) {
    // Set the `RUST_LOG` environment variable to control the logging level

    if quiet {
        env::set_var("RUST_LOG", "warn");
    } else {
        env::set_var("RUST_LOG", if verbose { "debug" } else { "info" });
    }

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .filter_module("tiberius", log::LevelFilter::Error)
        .format(|buf, record| {
            let timestamp = Local::now().format("%H:%M:%S");

            writeln!(
                buf,
                "{} {:<5} [{}] - {}",
                timestamp,
                record.level(),
                thread::current().name().unwrap_or("<unnamed>"),
                record.args()
            )
        })
        .init();
}

fn load_config(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    let value = content.parse::<Value>()?;
    let config = Config::from_toml(value)?;
    Ok(config)
}
