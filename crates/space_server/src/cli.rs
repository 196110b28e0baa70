//! Command-line interface handling for the space server.
//!
//! This module provides command-line argument parsing and CLI interface management
//! using the `clap` crate for robust argument handling.

use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;
use std::time::Duration;

/// Command line arguments parsed from user input.
///
/// Options here override the matching configuration file settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Optional override for this server's id
    pub server_id: Option<u32>,
    /// Stop after this long instead of waiting for a signal
    pub duration: Option<Duration>,
}

impl CliArgs {
    /// Parses the process arguments.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    /// Parses an explicit argument list, first item being the binary name.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("space_server.toml")),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            server_id: matches.get_one::<u32>("server-id").copied(),
            duration: matches
                .get_one::<u64>("duration")
                .map(|secs| Duration::from_secs(*secs)),
        }
    }
}

fn command() -> Command {
    Command::new("Space Server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Space server node with location replication and update distribution")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("space_server.toml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("server-id")
                .short('s')
                .long("server-id")
                .value_name("ID")
                .help("Identifier of this space server")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration")
                .value_name("SECONDS")
                .help("Run for this many seconds, then shut down")
                .value_parser(clap::value_parser!(u64)),
        )
}
