use clap::{Parser, Subcommand};

use crate::{
    config::{get_config_dir, get_data_dir},
    remote::WhiskyId,
};

#[derive(Parser, Debug)]
#[command(author, version = version(), about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record a tasting note, saved automatically as you type
    Taste {
        /// Whisky to take notes on
        #[arg(short, long, value_name = "UUID")]
        whisky: WhiskyId,
    },
    /// Sign in; notes taken as a guest move to the account
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create an account; notes taken as a guest move to it
    Signup {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Logout,
    /// Show who notes are currently saved as
    Whoami,
    /// Find whiskies with a similar flavor profile
    Match {
        #[arg(short, long, value_name = "UUID")]
        whisky: WhiskyId,
        /// How many matches to show, defaults to the configured limit
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

const VERSION_MESSAGE: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "-",
    env!("VERGEN_GIT_DESCRIBE"),
    " (",
    env!("VERGEN_BUILD_DATE"),
    ")"
);

pub fn version() -> String {
    let author = clap::crate_authors!();

    let config_dir_path = get_config_dir().display().to_string();
    let data_dir_path = get_data_dir().display().to_string();

    format!(
        "\
{VERSION_MESSAGE}

Authors: {author}

Config directory: {config_dir_path}
Data directory: {data_dir_path}"
    )
}
