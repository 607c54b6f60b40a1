use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

/// Application configuration loaded from a JSON file.
///
/// Each key under `users` is a screen name, each key under `lists` a list
/// id; the values are per-source option bags with every field optional.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub users: BTreeMap<String, SourceOptions>,
    #[serde(default)]
    pub lists: BTreeMap<String, SourceOptions>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    pub bearer_token: String,
}

/// Per-source options, with defaults resolved once at load time so use
/// sites never consult fallbacks.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceOptions {
    /// Ask the API to include retweets in the timeline.
    pub retweets: bool,
    /// Keep replies in user timelines.
    pub replies: bool,
    /// Refetch from the beginning of the timeline, ignoring the stored
    /// watermark.
    pub ignore_latest_tweet_id: bool,
    /// Write zero-byte placeholders instead of downloading.
    pub dry_run: bool,
    /// Record saved repost media in the repost directory's log file.
    pub log_retweets: bool,
    pub media_types: MediaTypes,
    pub paths: PathOverrides,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            retweets: true,
            replies: true,
            ignore_latest_tweet_id: false,
            dry_run: false,
            log_retweets: false,
            media_types: MediaTypes::default(),
            paths: PathOverrides::default(),
        }
    }
}

/// Which attachment types get archived. All enabled unless configured off.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaTypes {
    pub photo: bool,
    pub video: bool,
    pub animated_gif: bool,
}

impl Default for MediaTypes {
    fn default() -> Self {
        Self {
            photo: true,
            video: true,
            animated_gif: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathOverrides {
    /// Base output directory; default is `./out/{display name}`.
    pub output: Option<PathBuf>,
    /// Repost directory; default is `{output}/retweets`.
    pub retweets: Option<PathBuf>,
}

impl Config {
    /// Load and parse the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read(path).await.map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if required values are missing or empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.bearer_token.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "auth.bearerToken".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Write a template configuration for the operator to fill in.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be
    /// written.
    pub async fn write_template(path: &Path) -> Result<(), ConfigError> {
        let template = serde_json::json!({
            "auth": {
                "bearerToken": "App-only bearer token"
            },
            "users": {
                "USER_NAME": { "retweets": true }
            },
            "lists": {
                "LIST_ID": { "retweets": true }
            }
        });
        let body = serde_json::to_string_pretty(&template).expect("static template serializes");

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(path, body)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Location of the configuration file (`CONFIG_PATH` override).
pub fn config_path() -> PathBuf {
    PathBuf::from(env_or_default("CONFIG_PATH", "./config/config.json"))
}

/// Location of the metadata store (`METADATA_PATH` override).
pub fn metadata_path() -> PathBuf {
    PathBuf::from(env_or_default("METADATA_PATH", "./config/metadata.json"))
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_options_defaults() {
        let options: SourceOptions = serde_json::from_str("{}").unwrap();
        assert!(options.retweets);
        assert!(options.replies);
        assert!(!options.ignore_latest_tweet_id);
        assert!(!options.dry_run);
        assert!(!options.log_retweets);
        assert!(options.media_types.photo);
        assert!(options.media_types.video);
        assert!(options.media_types.animated_gif);
        assert!(options.paths.output.is_none());
        assert!(options.paths.retweets.is_none());
    }

    #[test]
    fn test_source_options_camel_case_fields() {
        let options: SourceOptions = serde_json::from_str(
            r#"{
                "retweets": false,
                "ignoreLatestTweetId": true,
                "dryRun": true,
                "logRetweets": true,
                "mediaTypes": { "video": false },
                "paths": { "output": "/archive/alice", "retweets": "/archive/alice-rts" }
            }"#,
        )
        .unwrap();
        assert!(!options.retweets);
        assert!(options.ignore_latest_tweet_id);
        assert!(options.dry_run);
        assert!(options.log_retweets);
        assert!(options.media_types.photo);
        assert!(!options.media_types.video);
        assert_eq!(
            options.paths.output.as_deref(),
            Some(Path::new("/archive/alice"))
        );
    }

    #[test]
    fn test_config_parses_sources() {
        let config: Config = serde_json::from_str(
            r#"{
                "auth": { "bearerToken": "token" },
                "users": { "alice": {}, "bob": { "retweets": false } },
                "lists": { "42": { "logRetweets": true } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.users.len(), 2);
        assert_eq!(config.lists.len(), 1);
        assert!(!config.users["bob"].retweets);
        assert!(config.lists["42"].log_retweets);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_empty_bearer_token() {
        let config: Config =
            serde_json::from_str(r#"{ "auth": { "bearerToken": "  " } }"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_write_template_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config/config.json");

        Config::write_template(&path).await.unwrap();

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.users.len(), 1);
        assert_eq!(config.lists.len(), 1);
        assert!(config.users.contains_key("USER_NAME"));
    }
}
