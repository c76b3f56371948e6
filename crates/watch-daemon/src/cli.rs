//! Command-line arguments.

use clap::Parser;
use std::io::Write;
use watch_core::config::{CAPACITY_ENV, DEFAULT_HOST, DEFAULT_PORT, PORT_ENV};
use watch_core::store::DEFAULT_CAPACITY;
use watch_core::{ConfigError, WatchConfig};

pub const USAGE: &str = "Usage: server-watch-mcp <command> [args...]";
pub const EXAMPLE: &str = "Example: server-watch-mcp npm run dev";

/// Run a command and expose its output to MCP clients.
#[derive(Parser, Debug)]
#[command(name = "server-watch-mcp", version)]
pub struct Cli {
    /// Serve MCP over stdin/stdout as well
    #[arg(long)]
    pub stdio: bool,

    /// Disable the HTTP transport
    #[arg(long)]
    pub no_http: bool,

    /// HTTP port
    #[arg(long, env = PORT_ENV, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// HTTP bind address
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Maximum number of log lines kept
    #[arg(long, env = CAPACITY_ENV, default_value_t = DEFAULT_CAPACITY)]
    pub capacity: usize,

    /// Exit with the child's exit code once it terminates
    #[arg(long)]
    pub exit_with_child: bool,

    /// Command to run, followed by its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Cli {
    pub fn into_config(self) -> Result<WatchConfig, ConfigError> {
        let mut config = WatchConfig::from_command_line(self.command)?;
        config.capacity = self.capacity;
        config.host = self.host;
        config.port = self.port;
        config.http = !self.no_http;
        config.stdio = self.stdio;
        config.exit_with_child = self.exit_with_child;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config, or report why not to `err` and return the exit code.
    pub fn resolve(self, err: &mut impl Write) -> Result<WatchConfig, i32> {
        let reported = match self.into_config() {
            Ok(config) => return Ok(config),
            Err(ConfigError::MissingCommand) => writeln!(err, "{USAGE}\n{EXAMPLE}"),
            Err(e) => writeln!(err, "Error: {e}"),
        };
        if let Err(e) = reported {
            log::error!("Failed to write to stderr: {e}");
        }
        Err(1)
    }
}
