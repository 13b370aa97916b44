//! Configuration shared by every service in the workspace.
//!
//! Service crates flatten this into their own config struct and layer their
//! domain settings (upstream URLs, operator credentials) on top via env vars.

use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Port the HTTP listener binds to.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8084
}

impl Config {
    /// Load from an optional `configuration` file, overridden by `APP__`
    /// prefixed env vars. A missing file is fine; the defaults apply.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
