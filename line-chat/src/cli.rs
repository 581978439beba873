use std::{ffi::OsString, process::ExitCode};

use clap::{ArgAction, Parser, ValueEnum};

use crate::protocol::{DEFAULT_HOST, DEFAULT_PORT};

/// Newline-delimited TCP chat. Every flag can also be set through the
/// environment variable named in brackets; flags win.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, disable_help_flag = true)]
pub struct Cli {
    /// Run as either the client or the server.
    #[arg(short = 'u', long = "use", env = "USE", value_enum, default_value_t = Role::Client)]
    pub role: Role,

    /// Host to connect to, or to listen on as the server.
    #[arg(short = 'h', long, env = "HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to connect to, or to listen on as the server.
    #[arg(short = 'p', long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Print help.
    #[arg(long, action = ArgAction::Help)]
    #[allow(dead_code)]
    help: Option<bool>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connect to a hub and chat.
    Client,
    /// Relay every line to every connected client.
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub role: Role,
    pub host: String,
    pub port: u16,
}

impl Config {
    /// `(host, port)` in the form `tokio::net` resolves.
    pub fn addr(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

impl Cli {
    pub fn parse_from_args<I, T>(args: I) -> Result<Config, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args).map(Cli::into_config)
    }

    pub fn into_config(self) -> Config {
        Config {
            role: self.role,
            host: self.host.trim().to_string(),
            port: self.port,
        }
    }
}

/// Prints a parse failure (or help/version) and picks the exit status:
/// 0 for help and version, 1 for everything else.
pub fn report(err: &clap::Error) -> ExitCode {
    let _ = err.print();
    if err.use_stderr() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
