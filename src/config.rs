//! Server configuration, read from command-line flags or the environment.

use crate::connection::ConnectionLimits;
use crate::protocol::parser::DEFAULT_MAX_NESTING_DEPTH;
use clap::Parser;

/// Runtime settings for the server binary.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "lazykv", version, about, long_about = None)]
pub struct Config {
    /// Host to bind to
    #[arg(long, env = "LAZYKV_HOST", default_value = crate::DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "LAZYKV_PORT", default_value_t = crate::DEFAULT_PORT)]
    pub port: u16,

    /// Log filter (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "LAZYKV_LOG", default_value = "info")]
    pub log_level: String,

    /// Largest number of unparsed bytes buffered per connection
    #[arg(long, default_value_t = 64 * 1024)]
    pub max_buffer_size: usize,

    /// Deepest array nesting accepted from clients
    #[arg(long, default_value_t = DEFAULT_MAX_NESTING_DEPTH)]
    pub max_nesting_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            log_level: "info".to_string(),
            max_buffer_size: 64 * 1024,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connection_limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            max_buffer_size: self.max_buffer_size,
            max_nesting_depth: self.max_nesting_depth,
        }
    }
}
