use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub jail: JailConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// PID file written by `rfmd serve`
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            pid_file: default_pid_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the listener to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JailConfig {
    /// Real directory exposed to clients as `/`
    #[serde(default = "default_jail_root")]
    pub root: PathBuf,
}

impl Default for JailConfig {
    fn default() -> Self {
        Self {
            root: default_jail_root(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Prefix every frame with an `OK <len>` / `ERR <len>` status line
    #[serde(default = "default_true")]
    pub envelope: bool,
    /// Longest accepted request line, newline included
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    /// Largest response body before the response is dropped
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Maximum tokens per request line, command name included
    #[serde(default = "default_max_args")]
    pub max_args: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            envelope: default_true(),
            max_line_bytes: default_max_line_bytes(),
            max_frame_bytes: default_max_frame_bytes(),
            max_args: default_max_args(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum length of a client path after joining with the cwd
    #[serde(default = "default_max_path_len")]
    pub max_path_len: usize,
    /// Maximum number of path segments after normalization
    #[serde(default = "default_max_path_depth")]
    pub max_path_depth: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_path_len: default_max_path_len(),
            max_path_depth: default_max_path_depth(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_pid_file() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("rfmd")
        .join("rfmd.pid")
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_jail_root() -> PathBuf {
    PathBuf::from("/tmp/test")
}

fn default_true() -> bool {
    true
}

fn default_max_line_bytes() -> usize {
    8192
}

fn default_max_frame_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_max_args() -> usize {
    64
}

fn default_max_path_len() -> usize {
    4096
}

fn default_max_path_depth() -> usize {
    256
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from the default location or return defaults
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit file; a missing file yields defaults
    pub fn load_from(config_path: &Path) -> crate::Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save_to(&self, config_path: &Path) -> crate::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = self.to_toml()?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    pub fn to_toml(&self) -> crate::Result<String> {
        toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Get the configuration file path
    /// Always uses ~/.config/rfmd/config.toml on all platforms
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("rfmd")
            .join("config.toml")
    }

    /// Get the jail root (with tilde expansion)
    pub fn jail_root(&self) -> PathBuf {
        expand_tilde(&self.jail.root)
    }

    /// Get the PID file path (with tilde expansion)
    pub fn pid_file(&self) -> PathBuf {
        expand_tilde(&self.general.pid_file)
    }

    /// Socket address the daemon listens on
    pub fn listen_addr(&self) -> crate::Result<SocketAddr> {
        format!("{}:{}", self.server.bind, self.server.port)
            .parse()
            .map_err(|e| crate::Error::Config(format!("invalid listen address: {}", e)))
    }
}
