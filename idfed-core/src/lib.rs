//! Core runtime for idfed services.
//!
//! - [`AppBuilder`] / [`Plugin`]: route and layer assembly
//! - [`boundary`]: path-base and forwarded-header processing ahead of routing
//! - [`config`]: layered YAML / `.env` / environment configuration
//! - [`layers`]: tracing, CORS and panic-recovery layers

pub mod boundary;
pub mod builder;
pub mod config;
pub mod layers;
pub mod plugin;
pub mod plugins;

pub use boundary::{PathBase, RequestOrigin};
pub use builder::{App, AppBuilder};
pub use config::{ConfigError, ConfigSection, IdfedConfig};
pub use plugin::Plugin;
pub use plugins::{Cors, ErrorHandling, Health, Tracing};

pub mod prelude {
    //! Re-exports of the most commonly used types.
    pub use crate::boundary::{PathBase, RequestOrigin};
    pub use crate::builder::{App, AppBuilder};
    pub use crate::config::{ConfigError, ConfigSection, ConfigValue, IdfedConfig};
    pub use crate::plugin::Plugin;
    pub use crate::plugins::{Cors, ErrorHandling, Health, Tracing};
}
