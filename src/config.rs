//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\music-mirror\config.toml
//! - macOS: ~/Library/Application Support/music-mirror/config.toml
//! - Linux: ~/.config/music-mirror/config.toml
//!
//! The config is loaded once by the CLI and turned into explicit
//! planner/executor settings; nothing reads it globally.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::index::MatchMode;
use crate::model::Quality;
use crate::planner::ResumeScope;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog session credentials
    pub credentials: Credentials,

    /// Download behaviour
    pub download: DownloadConfig,

    /// Network settings
    pub network: NetworkConfig,

    /// Library index settings
    pub library: LibraryConfig,
}

/// Catalog session credentials.
///
/// These are produced by an external login flow and only read here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    /// Bearer token for catalog requests
    pub access_token: Option<String>,
    /// Account id (favorites live under it)
    pub user_id: Option<String>,
    /// Two-letter country code required by the catalog
    pub country_code: Option<String>,
}

/// Download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Root directory for downloaded files
    pub path: PathBuf,

    /// Requested audio quality
    pub quality: Quality,

    /// Step down to lower qualities when the requested one is unavailable
    pub quality_fallback: bool,

    /// Track path template relative to `path`
    pub track_path_format: String,

    /// Playlist file template relative to `path`
    pub playlist_path_format: String,

    /// Expand favorite tracks to their whole album
    pub full_albums_for_favorites: bool,

    /// Include EPs and singles in artist catalogs
    pub include_eps_and_singles: bool,

    /// Write an M3U file for playlist requests
    pub create_m3u_playlists: bool,

    /// Which partially downloaded albums are resumed first
    pub resume_scope: ResumeScope,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            path: default_download_dir(),
            quality: Quality::High,
            quality_fallback: true,
            track_path_format: "{artist_name}/{album_name}/{track_number} - {track_title}"
                .to_string(),
            playlist_path_format: "Playlists/{playlist_name}".to_string(),
            full_albums_for_favorites: false,
            include_eps_and_singles: false,
            create_m3u_playlists: true,
            resume_scope: ResumeScope::Relevant,
        }
    }
}

/// Network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Catalog API base URL
    pub api_base_url: String,

    /// Seconds allowed to establish a connection
    pub connect_timeout_secs: u64,

    /// Seconds without data before a read is considered stalled
    pub read_timeout_secs: u64,

    /// Retries for transient transfer errors
    pub retry_attempts: u32,

    /// Base delay between retries (doubles each attempt)
    pub retry_delay_secs: u64,

    /// Parallel metadata fetches while planning
    pub metadata_concurrency: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.tidalhifi.com/v1".to_string(),
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
            retry_attempts: 3,
            retry_delay_secs: 5,
            metadata_concurrency: 4,
        }
    }
}

/// Library index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// SQLite file holding the library index
    pub index_path: PathBuf,

    /// How tracks are matched against the index
    pub match_mode: MatchMode,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            index_path: data_dir()
                .map(|d| d.join("library.db"))
                .unwrap_or_else(|| PathBuf::from("library.db")),
            match_mode: MatchMode::Id,
        }
    }
}

/// `<config dir>/music-mirror`
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-mirror"))
}

/// `<config dir>/music-mirror/config.toml`
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Where the library index lives by default.
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("music-mirror"))
}

fn default_download_dir() -> PathBuf {
    dirs::audio_dir()
        .map(|d| d.join("music-mirror"))
        .unwrap_or_else(|| PathBuf::from("Downloads"))
}

/// Load the config file, or defaults when there is none.
///
/// Never fails: an unreadable or invalid file is logged and replaced by
/// defaults so the CLI can still report what it would do.
pub fn load() -> Config {
    match config_path() {
        Some(path) => load_from(&path),
        None => {
            tracing::warn!("No config directory on this platform, using defaults");
            Config::default()
        }
    }
}

/// Load from an explicit path, falling back to defaults.
pub fn load_from(path: &Path) -> Config {
    match read_config(path) {
        Ok(Some(config)) => {
            tracing::info!(path = %path.display(), "Loaded config");
            config
        }
        Ok(None) => {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            Config::default()
        }
        Err(reason) => {
            tracing::error!(path = %path.display(), %reason, "Ignoring config file, using defaults");
            Config::default()
        }
    }
}

fn read_config(path: &Path) -> Result<Option<Config>, String> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.to_string()),
    };
    toml::from_str(&contents).map(Some).map_err(|e| e.to_string())
}

/// Save to the default location.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

/// Save to `path` through a sibling temp file and a rename.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    let staged = path.with_extension("toml.tmp");
    std::fs::write(&staged, contents).map_err(|e| ConfigError::Write(staged.clone(), e))?;
    if let Err(e) = std::fs::rename(&staged, path) {
        let _ = std::fs::remove_file(&staged);
        return Err(ConfigError::Rename(staged, path.to_path_buf(), e));
    }

    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No config directory on this platform")]
    NoConfigDir,

    #[error("Cannot create {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Cannot serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Cannot write {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Cannot move {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),

    #[error("Missing setting `{0}` in config file")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[credentials]"));
        assert!(toml.contains("[download]"));
        assert!(toml.contains("[network]"));
        assert!(toml.contains("[library]"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.credentials.access_token = Some("token-123".to_string());
        config.download.quality = Quality::Lossless;
        config.download.resume_scope = ResumeScope::All;
        config.library.match_mode = MatchMode::IdOrIsrc;

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed.credentials.access_token.as_deref(), Some("token-123"));
        assert_eq!(parsed.download.quality, Quality::Lossless);
        assert_eq!(parsed.download.resume_scope, ResumeScope::All);
        assert_eq!(parsed.library.match_mode, MatchMode::IdOrIsrc);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[download]
quality = "hi_res"
include_eps_and_singles = true

[library]
match_mode = "id_or_metadata"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.download.quality, Quality::HiRes);
        assert_eq!(config.library.match_mode, MatchMode::IdOrMetadata);
        assert!(config.download.include_eps_and_singles);

        // Other fields use defaults
        assert!(config.download.quality_fallback);
        assert_eq!(config.network.retry_attempts, 3);
        assert_eq!(config.network.metadata_concurrency, 4);
        assert!(config.library.index_path.ends_with("library.db"));
    }

    #[test]
    fn test_save_and_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.network.retry_delay_secs = 9;
        save_to(&config, &path).unwrap();

        let loaded = load_from(&path);
        assert_eq!(loaded.network.retry_delay_secs, 9);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_unparseable_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();

        let loaded = load_from(&path);
        assert_eq!(loaded.download.quality, Quality::High);
    }
}
