//! Share configuration.
//!
//! Read from TOML: the file named by `--config`, else `webshare.toml` in
//! the working directory when present, else built-in defaults.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use webshare_server::{DEFAULT_MAX_CHUNK_BYTES, ServerConfig};

/// Config file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "webshare.toml";

/// Share configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// First port to try.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Last port to try.
    #[serde(default = "default_port_range_end")]
    pub port_range_end: u16,

    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Where uploads land.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Web page assets.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Largest accepted `/upload-chunk` body.
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,

    /// Largest accepted `/upload` body; unlimited when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_upload_bytes: Option<usize>,
}

fn default_port() -> u16 {
    8000
}

fn default_port_range_end() -> u16 {
    60000
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("statics")
}

fn default_log_level() -> String {
    "info".into()
}

fn default_max_chunk_bytes() -> usize {
    DEFAULT_MAX_CHUNK_BYTES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            port_range_end: default_port_range_end(),
            bind_address: default_bind_address(),
            upload_dir: default_upload_dir(),
            static_dir: default_static_dir(),
            log_level: default_log_level(),
            max_chunk_bytes: default_max_chunk_bytes(),
            max_upload_bytes: None,
        }
    }
}

impl Config {
    /// Loads the configuration.
    ///
    /// An explicit `path` must exist; the implicit `webshare.toml` is
    /// optional.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let implicit = Path::new(DEFAULT_CONFIG_FILE);
                if implicit.is_file() {
                    Self::from_file(implicit)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parses a TOML config file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Server settings derived from this configuration.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_address: self.bind_address,
            port: self.port,
            port_range_end: self.port_range_end,
            upload_dir: self.upload_dir.clone(),
            static_dir: Some(self.static_dir.clone()),
            max_chunk_bytes: self.max_chunk_bytes,
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}
