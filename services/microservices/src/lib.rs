//! Demo services for the downstream client: `microservice1` calls
//! `microservice2` and reports the outcome as text.

pub mod caller;
pub mod forecast;

use idfed_core::{ConfigError, IdfedConfig};

/// `server.addr`, or `default` when unset.
pub fn listen_addr(config: &IdfedConfig, default: &str) -> Result<String, ConfigError> {
    config.get_or("server.addr", default.to_string())
}
