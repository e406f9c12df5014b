use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const SETTINGS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub version: u32,
    #[serde(default)]
    pub clusters: Vec<ClusterEndpoint>,
    #[serde(default)]
    pub poll: Poll,
}

/// One connection record: a cluster the console can reach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEndpoint {
    pub id: String,
    pub base_url: String,
    pub node: String,
    pub token_id: String,
    #[serde(default)]
    pub token_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub interval_secs: u64,
}

impl Default for Poll {
    fn default() -> Self {
        Self { interval_secs: 2 }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_SCHEMA_VERSION,
            clusters: Vec::new(),
            poll: Poll::default(),
        }
    }
}

pub fn config_path(config_dir: &Path) -> PathBuf {
    config_dir.join("config.toml")
}

pub fn load_settings(config_dir: &Path) -> Result<Settings> {
    let path = config_path(config_dir);
    if !path.exists() {
        return Ok(Settings::default());
    }

    let text = std::fs::read_to_string(&path).map_err(|e| Error::InvalidConfig {
        message: format!("config read failed: {e}"),
    })?;

    parse_settings(&text).map_err(|e| Error::InvalidConfig {
        message: format!("config invalid: {e}"),
    })
}

pub fn parse_settings(text: &str) -> std::result::Result<Settings, toml::de::Error> {
    let raw: toml::Value = toml::from_str(text)?;
    let version = raw
        .get("version")
        .and_then(|v| v.as_integer())
        .and_then(|v| u32::try_from(v).ok());

    match version {
        Some(SETTINGS_SCHEMA_VERSION) => toml::from_str::<Settings>(text),
        Some(other) => Err(toml::de::Error::custom(format!(
            "unsupported settings schema version: {other} (expected {SETTINGS_SCHEMA_VERSION})"
        ))),
        None => Err(toml::de::Error::custom("missing settings version")),
    }
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.version != SETTINGS_SCHEMA_VERSION {
        return Err(Error::InvalidConfig {
            message: format!(
                "settings.version must be {SETTINGS_SCHEMA_VERSION} (got {})",
                settings.version
            ),
        });
    }

    let mut cluster_ids = HashSet::<String>::new();
    for cluster in &settings.clusters {
        if cluster.id.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "clusters[].id must not be empty".to_string(),
            });
        }
        if !cluster_ids.insert(cluster.id.clone()) {
            return Err(Error::InvalidConfig {
                message: format!("duplicate cluster id: {}", cluster.id),
            });
        }
        if cluster.base_url.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: format!("clusters[].base_url must not be empty (cluster_id={})", cluster.id),
            });
        }
        if cluster.node.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: format!("clusters[].node must not be empty (cluster_id={})", cluster.id),
            });
        }
        if cluster.token_id.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: format!("clusters[].token_id must not be empty (cluster_id={})", cluster.id),
            });
        }
    }

    if settings.poll.interval_secs < 1 {
        return Err(Error::InvalidConfig {
            message: "poll.interval_secs must be >= 1".to_string(),
        });
    }

    Ok(())
}

pub fn to_toml(settings: &Settings) -> Result<String> {
    validate_settings(settings)?;
    toml::to_string(settings).map_err(|e| Error::InvalidConfig {
        message: format!("config encode failed: {e}"),
    })
}

pub fn save_settings(config_dir: &Path, settings: &Settings) -> Result<()> {
    let text = to_toml(settings)?;

    let path = config_path(config_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::InvalidConfig {
            message: format!("config dir create failed: {e}"),
        })?;
    }

    atomic_write(&path, text.as_bytes()).map_err(|e| Error::InvalidConfig {
        message: format!("config write failed: {e}"),
    })?;
    Ok(())
}

fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(tmp, path)?;
    Ok(())
}
