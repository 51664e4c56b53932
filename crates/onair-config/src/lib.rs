//! Profile configuration for onair clients.
//!
//! TOML profiles, password resolution (env + keyring + plaintext), and
//! translation to `onair_core::ConnectionConfig`. Nothing here touches a
//! live session: a failed load or save only ever fails that call.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use onair_core::ConnectionConfig;

const KEYRING_SERVICE: &str = "onair";

/// Port the control server listens on unless a profile says otherwise.
pub const DEFAULT_PORT: u16 = 4455;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("no profile named '{name}'")]
    ProfileNotFound { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level contents of `config.toml`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles, sorted by name.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// One saved server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    pub host: String,

    /// Overrides `defaults.port`.
    pub port: Option<u16>,

    /// Password in plaintext. Prefer the keyring or `password_env`.
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "onair", "onair").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("onair");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Loading / saving ────────────────────────────────────────────────

/// Load `path` merged with `ONAIR_`-prefixed environment variables.
///
/// A missing file yields the defaults. Nested keys use a double
/// underscore: `ONAIR_DEFAULTS__PORT=4460`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ONAIR_").split("__"))
        .extract()?;
    Ok(config)
}

/// Serialize `config` to TOML at `path`, creating parent directories.
pub fn save_config_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a profile's password: `password_env`, then the system
/// keyring, then plaintext in the file.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/password")
}

/// Build a `ConnectionConfig` from a profile.
pub fn profile_to_connection_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ConnectionConfig, ConfigError> {
    let password = resolve_password(profile, profile_name)?;
    let port = profile.port.unwrap_or(defaults.port);
    ConnectionConfig::new(profile.host.clone(), port, password).map_err(|e| {
        ConfigError::Validation {
            field: format!("profile '{profile_name}'"),
            reason: e.to_string(),
        }
    })
}

// ── Profile store ───────────────────────────────────────────────────

/// Where `save_profile` puts the password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordStorage {
    /// System keyring; the file records no password.
    Keyring,
    /// Plaintext in `config.toml`.
    Plaintext,
}

/// Named profiles backed by one TOML file.
///
/// Every call re-reads the file, so edits made elsewhere are picked up.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The store at the platform config path.
    pub fn open_default() -> Self {
        Self::new(config_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Config, ConfigError> {
        load_config_from(&self.path)
    }

    /// Profile names in sorted order.
    pub fn list_profile_names(&self) -> Result<Vec<String>, ConfigError> {
        Ok(self.load()?.profiles.into_keys().collect())
    }

    /// The configured default profile, if it exists.
    pub fn default_profile_name(&self) -> Result<Option<String>, ConfigError> {
        let config = self.load()?;
        Ok(config
            .default_profile
            .filter(|name| config.profiles.contains_key(name)))
    }

    pub fn load_profile(&self, name: &str) -> Result<ConnectionConfig, ConfigError> {
        let config = self.load()?;
        let profile = config
            .profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound { name: name.into() })?;
        profile_to_connection_config(profile, name, &config.defaults)
    }

    /// Insert or replace `name`. The first saved profile becomes the
    /// default.
    pub fn save_profile(
        &self,
        name: &str,
        connection: &ConnectionConfig,
        storage: PasswordStorage,
    ) -> Result<(), ConfigError> {
        if name.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "profile name".into(),
                reason: "must not be empty".into(),
            });
        }

        let mut config = self.load()?;
        let password = match storage {
            PasswordStorage::Keyring => {
                keyring::Entry::new(KEYRING_SERVICE, &keyring_user(name))?
                    .set_password(connection.password().expose_secret())?;
                None
            }
            PasswordStorage::Plaintext => Some(connection.password().expose_secret().to_owned()),
        };

        config.profiles.insert(
            name.to_owned(),
            Profile {
                host: connection.host().to_owned(),
                port: Some(connection.port()),
                password,
                password_env: None,
            },
        );
        if config.default_profile.is_none() {
            config.default_profile = Some(name.to_owned());
        }

        save_config_to(&self.path, &config)?;
        debug!(profile = name, path = %self.path.display(), "profile saved");
        Ok(())
    }

    /// Delete `name` and any keyring entry for it. Returns `false` if no
    /// such profile existed.
    pub fn remove_profile(&self, name: &str) -> Result<bool, ConfigError> {
        let mut config = self.load()?;
        if config.profiles.remove(name).is_none() {
            return Ok(false);
        }
        if config.default_profile.as_deref() == Some(name) {
            config.default_profile = None;
        }

        if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(name)) {
            // Nothing stored there is the common case.
            let _ = entry.delete_credential();
        }

        save_config_to(&self.path, &config)?;
        debug!(profile = name, "profile removed");
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn profile(host: &str) -> Profile {
        Profile {
            host: host.into(),
            port: None,
            password: Some("plain".into()),
            password_env: None,
        }
    }

    #[test]
    fn plaintext_password_is_last_resort() {
        let mut p = profile("studio.local");
        p.password_env = Some("ONAIR_TEST_VARIABLE_THAT_IS_NEVER_SET".into());

        let pw = resolve_password(&p, "onair-test-no-keyring-entry").unwrap();

        assert_eq!(pw.expose_secret(), "plain");
    }

    #[test]
    fn missing_password_is_no_credentials() {
        let mut p = profile("studio.local");
        p.password = None;

        let err = resolve_password(&p, "onair-test-no-keyring-entry").unwrap_err();

        assert!(matches!(err, ConfigError::NoCredentials { ref profile } if profile == "onair-test-no-keyring-entry"));
    }

    #[test]
    fn profile_port_defaults() {
        let config =
            profile_to_connection_config(&profile("studio.local"), "onair-test-no-keyring-entry", &Defaults::default())
                .unwrap();
        assert_eq!(config.port(), DEFAULT_PORT);

        let mut p = profile("studio.local");
        p.port = Some(4460);
        let config =
            profile_to_connection_config(&p, "onair-test-no-keyring-entry", &Defaults::default()).unwrap();
        assert_eq!(config.port(), 4460);
    }

    #[test]
    fn invalid_profile_fails_validation() {
        let mut p = profile("studio.local");
        p.port = Some(0);

        let err = profile_to_connection_config(&p, "onair-test-no-keyring-entry", &Defaults::default())
            .unwrap_err();

        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                    default_profile = "studio"

                    [defaults]
                    port = 4455

                    [profiles.studio]
                    host = "studio.local"
                    password_env = "STUDIO_PASSWORD"
                "#,
            )?;
            jail.set_env("ONAIR_DEFAULTS__PORT", "4460");
            jail.set_env("STUDIO_PASSWORD", "from-env");

            let store = ProfileStore::new(jail.directory().join("config.toml"));
            let config = store.load_profile("studio").unwrap();

            assert_eq!(config.port(), 4460);
            assert_eq!(config.password().expose_secret(), "from-env");
            Ok(())
        });
    }
}
