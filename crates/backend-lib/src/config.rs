// ============================
// mafia-backend-lib/src/config.rs
// ============================
//! Configuration management.
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Deployment flavor. Only affects the CORS allow-origin header; core
/// behavior is identical in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    Local,
    Production,
}

impl Deployment {
    /// The origin clients are served from in this deployment.
    pub fn allowed_origin(self) -> &'static str {
        match self {
            Deployment::Local => "http://localhost:8080",
            Deployment::Production => "http://mafia.surge.sh",
        }
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Shared secret for signing and validating auth tokens
    pub auth_secret: String,
    /// Deployment flavor
    pub deployment: Deployment,
    /// Log level
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".parse().unwrap(),
            auth_secret: "dev-secret".to_string(),
            deployment: Deployment::Local,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `config.toml` and `MAFIA_`-prefixed environment
    /// variables, on top of the defaults.
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load settings from an explicit config file path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MAFIA_"))
            .extract()?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.bind_addr.port(), 9090);
        assert_eq!(settings.deployment, Deployment::Local);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_deployment_origin() {
        assert_eq!(
            Deployment::Local.allowed_origin(),
            "http://localhost:8080"
        );
        assert_eq!(
            Deployment::Production.allowed_origin(),
            "http://mafia.surge.sh"
        );
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        figment::Jail::expect_with(|_jail| {
            let settings = Settings::load_from("does-not-exist.toml").unwrap();
            assert_eq!(settings.auth_secret, "dev-secret");
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("MAFIA_AUTH_SECRET", "from-env");
            jail.set_env("MAFIA_DEPLOYMENT", "production");
            let settings = Settings::load_from("does-not-exist.toml").unwrap();
            assert_eq!(settings.auth_secret, "from-env");
            assert_eq!(settings.deployment, Deployment::Production);
            Ok(())
        });
    }
}
