//! Configuration from the environment

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use uuid::Uuid;

use crate::deletion;
use crate::utils::env_var_optional;
use crate::utils::env_var_or_else;
use crate::utils::env_var_parse_or;

const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Service configuration
///
/// Read once at startup, fixed for the lifetime of the process
#[derive(Clone, Debug)]
pub struct Config {
    /// Address to listen on
    pub address: SocketAddr,

    /// Base of every short URL
    pub base_url: String,

    /// Postgres connection string, in-memory storage when not set
    pub database_url: Option<String>,

    /// Secret to sign user identities with
    pub secret_key: String,

    /// Deletion pool setup
    pub deletion: deletion::Config,

    /// How long deletion workers get to finish on shutdown
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Read the configuration from the environment
    ///
    /// # Errors
    ///
    /// Will return `Err` if a set variable can not be parsed
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            address: address()?,
            base_url: env_var_or_else("BASE_URL", || DEFAULT_BASE_URL.to_string()),
            database_url: env_var_optional("DATABASE_URL"),
            secret_key: env_var_or_else("SECRET_KEY", || {
                let secret_key = Uuid::new_v4().simple().to_string();
                tracing::info!("`SECRET_KEY` is not set, generating temporary one: {secret_key}");
                secret_key
            }),
            deletion: deletion::Config {
                workers: env_var_parse_or("NUMBER_OF_WORKERS", deletion::DEFAULT_WORKERS)?,
                queue_capacity: env_var_parse_or(
                    "WORKERS_BUFFER",
                    deletion::DEFAULT_QUEUE_CAPACITY,
                )?,
                chunk_size: env_var_parse_or("DELETE_CHUNK_SIZE", deletion::DEFAULT_CHUNK_SIZE)?,
            },
            shutdown_timeout: Duration::from_secs(env_var_parse_or(
                "SHUTDOWN_TIMEOUT",
                DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            )?),
        })
    }
}

fn address() -> Result<SocketAddr> {
    let mut address = env_var_parse_or("ADDRESS", DEFAULT_ADDRESS.parse::<SocketAddr>()?)?;

    // optional override of just the port
    if let Some(port) = env_var_optional("PORT") {
        address.set_port(port.parse::<u16>()?);
    }

    Ok(address)
}
