//! Configuration loading for the wagate gateway.
//!
//! Config files are discovered as `wagate.{toml,yaml,yml,json}` in the
//! working directory, then in `~/.config/wagate/`. `${ENV_VAR}` placeholders
//! are expanded before parsing (see [`env_subst`]).

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{data_dir, discover_and_load, load_config, load_from, to_toml},
    schema::{BridgeConfig, ServerConfig, SessionsConfig, WagateConfig, WhatsAppConfig},
};
