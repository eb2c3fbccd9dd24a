use std::path::{Path, PathBuf};

use node_core::{UpgradeManifest, DEFAULT_LINK_PATH};
use orchestrator::{CommandSpec, Elevation};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

const CONFIG_DIR: &str = ".pnode-agent";
const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_PORT: u16 = 4000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedicationConfig {
    /// Symlink that publishes the dedicated file
    pub link_path: PathBuf,
}

impl Default for DedicationConfig {
    fn default() -> Self {
        Self {
            link_path: PathBuf::from(DEFAULT_LINK_PATH),
        }
    }
}

/// External tool that measures throughput and prints a JSON report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            program: "fast".to_string(),
            args: vec!["--upload".to_string(), "--json".to_string()],
        }
    }
}

impl NetworkConfig {
    pub fn command(&self) -> CommandSpec {
        CommandSpec {
            args: self.args.clone(),
            ..CommandSpec::new(&self.program)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeypairConfig {
    /// Directory holding the node keypair file, relative to the working directory unless absolute
    pub dir: PathBuf,
}

impl Default for KeypairConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("keypairs"),
        }
    }
}

/// Agent configuration stored in ~/.pnode-agent/config.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub server: ServerConfig,
    /// Wrapper for steps that need root
    pub elevation: Elevation,
    pub dedication: DedicationConfig,
    /// Step lists of the upgrade workflow
    pub upgrade: UpgradeManifest,
    pub network: NetworkConfig,
    pub keypair: KeypairConfig,
}

impl AgentConfig {
    /// `~/.pnode-agent/config.toml`, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Read config from `path`, falling back to defaults.
    pub async fn read(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "Config file does not exist, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path).await {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    debug!(path = %path.display(), "Config loaded successfully");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                Self::default()
            }
        }
    }

    /// Load from an explicit path or the default location.
    pub async fn load(path: Option<&Path>) -> Self {
        match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => Self::read(&path).await,
            None => {
                warn!("No home directory, using default config");
                Self::default()
            }
        }
    }

    pub async fn write(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir).await?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(path, content).await?;
        debug!(path = %path.display(), "Config saved successfully");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_default() {
        let config = AgentConfig::default();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.elevation.program, "sudo");
        assert_eq!(config.dedication.link_path, PathBuf::from("/run/xandeum-pod"));
        assert_eq!(config.upgrade, UpgradeManifest::default());
        assert_eq!(config.keypair.dir, PathBuf::from("keypairs"));

        let network = config.network.command();
        assert_eq!(network.program, "fast");
        assert_eq!(network.args, vec!["--upload", "--json"]);
    }

    #[tokio::test]
    async fn test_config_read_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let config = AgentConfig::read(&temp_dir.path().join(CONFIG_FILE)).await;
        assert_eq!(config, AgentConfig::default());
    }

    #[tokio::test]
    async fn test_config_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"
[server]
port = 5050

[elevation]
program = ""

[dedication]
link_path = "/tmp/pod-link"

[network]
program = "speedtest"
"#,
        )
        .unwrap();

        let config = AgentConfig::read(&path).await;
        assert_eq!(config.server.port, 5050);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(!config.elevation.is_enabled());
        assert_eq!(config.dedication.link_path, PathBuf::from("/tmp/pod-link"));
        assert_eq!(config.upgrade, UpgradeManifest::default());
        assert_eq!(config.network.program, "speedtest");
        assert_eq!(config.network.args, vec!["--upload", "--json"]);
    }

    #[tokio::test]
    async fn test_config_invalid_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "server = [not toml").unwrap();

        assert_eq!(AgentConfig::read(&path).await, AgentConfig::default());
    }

    #[tokio::test]
    async fn test_config_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_DIR).join(CONFIG_FILE);

        let mut config = AgentConfig::default();
        config.server.port = 4100;
        config.upgrade.restart.clear();
        config.write(&path).await.unwrap();

        let loaded = AgentConfig::read(&path).await;
        assert_eq!(loaded, config);
    }
}
