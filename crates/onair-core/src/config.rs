// ── Runtime connection configuration ──
//
// Describes *where* to connect and with which password. Never touches
// disk: onair-config (or any other caller) resolves a profile and hands
// a validated `ConnectionConfig` in.

use secrecy::SecretString;

use onair_api::Endpoint;

use crate::error::CoreError;

/// Target and credentials for one supervised connection.
///
/// Immutable once built. The supervisor clones what it needs at the start
/// of a run and reuses it, unchanged, for every reconnect attempt.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    password: SecretString,
}

impl ConnectionConfig {
    /// Build a config, rejecting an empty host, port 0, or a host that
    /// does not form a valid URL.
    pub fn new(host: impl Into<String>, port: u16, password: SecretString) -> Result<Self, CoreError> {
        let host = host.into().trim().to_owned();
        if host.is_empty() {
            return Err(CoreError::Config {
                message: "host must not be empty".into(),
            });
        }
        if port == 0 {
            return Err(CoreError::Config {
                message: "port must be between 1 and 65535".into(),
            });
        }
        Endpoint::new(host.as_str(), port)
            .url()
            .map_err(|e| CoreError::Config {
                message: format!("invalid host {host:?}: {e}"),
            })?;
        Ok(Self {
            host,
            port,
            password,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// The transport endpoint this config points at.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }
}
