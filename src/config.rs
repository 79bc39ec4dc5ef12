use crate::richtext::ReviewFormat;
use crate::upload::DEFAULT_MAX_UPLOAD_BYTES;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use thiserror::Error;

const QUALIFIER: &str = "net.reviewdoc";
const ORGANIZATION: &str = "Reviewdoc";
const APPLICATION: &str = "reviewdoc";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "REVIEWDOC_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where uploaded images are stored
    pub upload_dir: PathBuf,
    /// Url prefix under which `upload_dir` is served
    pub public_base_url: String,
    pub max_upload_bytes: u64,
    /// Where saved reviews are written
    pub review_dir: PathBuf,
    /// Format new reviews are saved in
    pub format: ReviewFormat,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
            .map(|dirs| dirs.data_local_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".reviewdoc"));
        Config {
            upload_dir: data_dir.join("uploads"),
            public_base_url: "http://localhost:5000/uploads".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            review_dir: data_dir.join("reviews"),
            format: ReviewFormat::default(),
        }
    }
}

impl Config {
    /// Load from `$REVIEWDOC_CONFIG`, else the user config dir, else defaults.
    ///
    /// A missing file means defaults; an unreadable or malformed one is an error.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Config::default()),
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Config::default()),
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    message: err.to_string(),
                });
            }
        };
        toml::from_str(&contents).map_err(|err| ConfigError::Parse {
            path: path.display().to_string(),
            message: err.to_string(),
        })
    }
}
