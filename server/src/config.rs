use anyhow::{Context, Result};
use covey_coordinator::SessionConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// On-disk server configuration.
///
/// Every field has a default, so an empty file describes a valid session of
/// ten single-participant rounds on port 50051.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub session: SessionSection,
    pub heartbeat: HeartbeatSection,
    pub server: ListenSection,
    pub storage: StorageSection,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSection {
    /// Total rounds in the session.
    pub num_rounds: u32,
    /// Minimum participants selected per round.
    pub min_in_round: usize,
    /// Fraction of connected participants selected per round, in (0, 1].
    pub fraction: f64,
    /// Local epoch count handed to participants.
    pub epochs: u32,
    /// Starting epoch index handed to participants.
    pub epoch_base: u32,
    /// Optional postcard-encoded initial global weights.
    pub initial_weights: Option<PathBuf>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            num_rounds: 10,
            min_in_round: 1,
            fraction: 1.0,
            epochs: 0,
            epoch_base: 0,
            initial_weights: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeartbeatSection {
    /// Expected interval between heartbeats, in seconds.
    pub period_secs: f64,
    /// Grace beyond one period before eviction, in seconds.
    pub timeout_secs: f64,
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            period_secs: 10.0,
            timeout_secs: 5.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenSection {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for ListenSection {
    fn default() -> Self {
        Self {
            host: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            port: 50051,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    /// Directory for aggregated round weights. Nothing is written when
    /// unset.
    pub dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path:?}"))?;
        let config: ServerConfig =
            toml::from_str(&raw).with_context(|| format!("failed to parse config file {path:?}"))?;
        Ok(config)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            num_rounds: self.session.num_rounds,
            min_in_round: self.session.min_in_round,
            fraction: self.session.fraction,
            epochs: self.session.epochs,
            epoch_base: self.session.epoch_base,
            heartbeat_period: Duration::from_secs_f64(self.heartbeat.period_secs),
            heartbeat_timeout: Duration::from_secs_f64(self.heartbeat.timeout_secs),
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_config_uses_the_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        let session = config.session_config();
        assert_eq!(session.num_rounds, 10);
        assert_eq!(session.min_in_round, 1);
        assert_eq!(session.fraction, 1.0);
        assert_eq!(session.heartbeat_period, Duration::from_secs(10));
        assert_eq!(session.heartbeat_timeout, Duration::from_secs(5));
        assert_eq!(config.listen_addr().port(), 50051);
        assert!(config.storage.dir.is_none());
        assert!(session.check());
    }

    #[test]
    fn full_config_parses() {
        let config: ServerConfig = toml::from_str(
            r#"
            [session]
            num_rounds = 3
            min_in_round = 4
            fraction = 0.5
            epochs = 2
            epoch_base = 7

            [heartbeat]
            period_secs = 1.5
            timeout_secs = 0.5

            [server]
            host = "127.0.0.1"
            port = 9000

            [storage]
            dir = "/tmp/covey-weights"
            "#,
        )
        .unwrap();

        let session = config.session_config();
        assert_eq!(session.num_rounds, 3);
        assert_eq!(session.min_connected(), 8);
        assert_eq!(session.heartbeat_period, Duration::from_millis(1500));
        assert_eq!(config.listen_addr(), "127.0.0.1:9000".parse().unwrap());
        assert_eq!(
            config.storage.dir.as_deref(),
            Some(Path::new("/tmp/covey-weights"))
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<ServerConfig>("[session]\nrounds = 3\n").is_err());
    }
}
