//! Runtime configuration for a watch session.
//!
//! The daemon resolves CLI flags and environment variables into a
//! [`WatchConfig`]; everything downstream reads from it.

use thiserror::Error;

use crate::store::DEFAULT_CAPACITY;
use crate::supervisor::{Passthrough, SupervisorConfig};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Environment variable selecting the HTTP port.
pub const PORT_ENV: &str = "SERVER_WATCH_MCP_PORT";
/// Environment variable selecting the log capacity.
pub const CAPACITY_ENV: &str = "SERVER_WATCH_MCP_CAPACITY";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No command given")]
    MissingCommand,

    #[error("Log capacity must be at least 1")]
    ZeroCapacity,

    #[error("At least one transport (HTTP or stdio) must be enabled")]
    NoTransport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub command: String,
    pub args: Vec<String>,
    pub capacity: usize,
    pub host: String,
    pub port: u16,
    pub http: bool,
    pub stdio: bool,
    /// Exit with the child's mapped exit code once it terminates.
    pub exit_with_child: bool,
}

impl WatchConfig {
    /// Build a config from a full command line (`command` followed by args).
    pub fn from_command_line(mut command_line: Vec<String>) -> Result<Self, ConfigError> {
        if command_line.is_empty() || command_line[0].trim().is_empty() {
            return Err(ConfigError::MissingCommand);
        }
        let command = command_line.remove(0);
        Ok(Self {
            command,
            args: command_line,
            capacity: DEFAULT_CAPACITY,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            http: true,
            stdio: false,
            exit_with_child: false,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command.trim().is_empty() {
            return Err(ConfigError::MissingCommand);
        }
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if !self.http && !self.stdio {
            return Err(ConfigError::NoTransport);
        }
        Ok(())
    }

    /// Supervisor settings implied by the enabled transports.
    ///
    /// With stdio enabled the host's stdin/stdout carry the protocol, so the
    /// child gets a null stdin and its output is echoed to stderr only.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        let mut config = SupervisorConfig::new(&self.command, self.args.clone());
        if self.stdio {
            config = config.no_stdin().passthrough(Passthrough::StderrOnly);
        }
        if self.exit_with_child {
            config = config.quiet_on_exit();
        }
        config
    }
}
