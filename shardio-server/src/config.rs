use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shardio_core::{
    DEFAULT_CLEANUP_INTERVAL, DEFAULT_FANOUT, DEFAULT_READ_WINDOW, DEFAULT_WRITE_BUFFER, Result,
    ShardError,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressConfig {
    pub bind_addr: String,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default = "default_fanout")]
    pub fanout: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_session_buffer")]
    pub session_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub bind_addr: String,
    #[serde(default)]
    pub advertise_addr: Option<String>,
    pub ingress_addr: String,
    pub fragments_dir: PathBuf,
    #[serde(default = "default_read_window_bytes")]
    pub read_window_bytes: usize,
    #[serde(default = "default_registration_interval_secs")]
    pub registration_interval_secs: u64,
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("./data/fragments.json")
}

fn default_fanout() -> u64 {
    DEFAULT_FANOUT
}

fn default_cleanup_interval_secs() -> u64 {
    DEFAULT_CLEANUP_INTERVAL.as_secs()
}

fn default_session_buffer() -> usize {
    DEFAULT_WRITE_BUFFER
}

fn default_read_window_bytes() -> usize {
    DEFAULT_READ_WINDOW
}

fn default_registration_interval_secs() -> u64 {
    20
}

fn load<T: DeserializeOwned>(path: &str) -> Result<T> {
    let settings = ::config::Config::builder()
        .add_source(::config::File::with_name(path))
        .add_source(::config::Environment::with_prefix("SHARDIO"))
        .build()
        .map_err(|e| ShardError::Config(e.to_string()))?;

    settings
        .try_deserialize()
        .map_err(|e| ShardError::Config(e.to_string()))
}

impl IngressConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let config: IngressConfig = load(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.trim().is_empty() {
            return Err(ShardError::Config("bind_addr cannot be empty".to_string()));
        }
        if self.fanout == 0 {
            return Err(ShardError::Config("fanout must be positive".to_string()));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(ShardError::Config(
                "cleanup_interval_secs must be positive".to_string(),
            ));
        }
        if self.session_buffer == 0 {
            return Err(ShardError::Config(
                "session_buffer must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl NodeConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let config: NodeConfig = load(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.trim().is_empty() {
            return Err(ShardError::Config("bind_addr cannot be empty".to_string()));
        }
        if self.ingress_addr.trim().is_empty() {
            return Err(ShardError::Config("ingress_addr cannot be empty".to_string()));
        }
        if self.read_window_bytes == 0 {
            return Err(ShardError::Config(
                "read_window_bytes must be positive".to_string(),
            ));
        }
        if self.registration_interval_secs == 0 {
            return Err(ShardError::Config(
                "registration_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Address other processes use to reach this node.
    pub fn advertise_address(&self) -> &str {
        self.advertise_addr
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(&self.bind_addr)
    }

    pub fn registration_interval(&self) -> Duration {
        Duration::from_secs(self.registration_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_yaml(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_ingress_config_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_yaml(&dir, "ingress.yaml", "bind_addr: \"127.0.0.1:8000\"\n");

        let config = IngressConfig::from_file(&path).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8000");
        assert_eq!(config.snapshot_path, PathBuf::from("./data/fragments.json"));
        assert_eq!(config.fanout, 6);
        assert_eq!(config.cleanup_interval(), Duration::from_secs(10));
        assert_eq!(config.session_buffer, 16);
    }

    #[test]
    fn test_ingress_config_rejects_zero_fanout() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_yaml(
            &dir,
            "ingress.yaml",
            "bind_addr: \"127.0.0.1:8000\"\nfanout: 0\n",
        );

        assert!(matches!(
            IngressConfig::from_file(&path),
            Err(ShardError::Config(_))
        ));
    }

    #[test]
    fn test_node_config_advertise_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_yaml(
            &dir,
            "node.yaml",
            "bind_addr: \"0.0.0.0:9001\"\ningress_addr: \"127.0.0.1:8000\"\nfragments_dir: \"./data/node1\"\n",
        );

        let config = NodeConfig::from_file(&path).unwrap();
        assert_eq!(config.advertise_address(), "0.0.0.0:9001");
        assert_eq!(config.read_window_bytes, 256 * 1024);
        assert_eq!(config.registration_interval(), Duration::from_secs(20));

        let advertised = NodeConfig {
            advertise_addr: Some("10.0.0.5:9001".to_string()),
            ..config
        };
        assert_eq!(advertised.advertise_address(), "10.0.0.5:9001");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(matches!(
            NodeConfig::from_file(&path.to_string_lossy()),
            Err(ShardError::Config(_))
        ));
    }
}
