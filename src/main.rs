use std::time::Duration;

use clap::Parser;
use cli::Cli;
use color_eyre::eyre::{Result, WrapErr};
use futures::executor;

use crate::config::Config;

mod accounts;
mod action;
mod app;
mod autosave;
mod cli;
mod commands;
mod config;
mod dossier;
mod errors;
mod identity;
mod logging;
mod matching;
mod migration;
mod remote;
mod storage;

fn main() -> Result<()> {
    bootstrap(|| {
        let args = Cli::parse();
        let config = Config::new().wrap_err("loading configuration")?;

        executor::block_on(commands::run(args.command, config))?;

        Ok(())
    })
}

fn bootstrap(fn_do_run: fn() -> Result<()>) -> Result<()> {
    crate::errors::init()?;
    crate::logging::init()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err_with(|| "Failed to start Tokio runtime")?;
    let result = {
        let _guard = runtime.enter();
        fn_do_run()
    };
    runtime.shutdown_timeout(Duration::from_secs(5));

    result
}
