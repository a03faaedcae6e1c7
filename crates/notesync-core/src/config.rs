//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/notesync/config.toml)
//! 3. Environment variables (NOTESYNC_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::CollectionType;

/// Environment variable prefix
const ENV_PREFIX: &str = "NOTESYNC";

/// Profile used when none is configured
pub const DEFAULT_PROFILE: &str = "notes-db";

/// Branch every remote commit goes to
pub const DEFAULT_BRANCH: &str = "master";

/// Fastest polling interval
pub const DEFAULT_INTERVAL_MIN_MS: u64 = 2_000;

/// Slowest polling interval
pub const DEFAULT_INTERVAL_MAX_MS: u64 = 15_000;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for local collections and the remote index cache
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Namespace isolating one user's data set, locally and remotely
    #[serde(default = "default_profile")]
    pub profile: String,

    /// GitLab server URL, e.g. https://gitlab.com
    #[serde(default)]
    pub server_url: Option<String>,

    /// GitLab project id or `namespace/project` path
    #[serde(default)]
    pub project_id: Option<String>,

    /// GitLab private access token
    #[serde(default)]
    pub api_key: Option<String>,

    /// Branch all records are committed to
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Lower bound of the adaptive polling interval
    #[serde(default = "default_interval_min_ms")]
    pub interval_min_ms: u64,

    /// Upper bound of the adaptive polling interval
    #[serde(default = "default_interval_max_ms")]
    pub interval_max_ms: u64,

    /// Collection types synced by a pass, in order
    #[serde(default = "default_collections")]
    pub collections: Vec<CollectionType>,

    /// Payload fields stripped from encrypted records before upload
    #[serde(default)]
    pub redact_fields: Vec<String>,

    /// Log to this file instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            profile: default_profile(),
            server_url: None,
            project_id: None,
            api_key: None,
            branch: default_branch(),
            interval_min_ms: DEFAULT_INTERVAL_MIN_MS,
            interval_max_ms: DEFAULT_INTERVAL_MAX_MS,
            collections: default_collections(),
            redact_fields: Vec::new(),
            log_file: None,
        }
    }
}

/// Connection settings for the GitLab adapter, present only when complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitlabSettings {
    pub server_url: String,
    pub project_id: String,
    pub api_key: String,
    pub branch: String,
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (NOTESYNC_SERVER_URL, NOTESYNC_API_KEY, ...)
    /// 2. Config file (~/.config/notesync/config.toml or NOTESYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load from an explicit path if given, otherwise the default location
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_PROFILE", ENV_PREFIX)) {
            if !val.is_empty() {
                self.profile = val;
            }
        }

        // Empty string clears these
        if let Ok(val) = std::env::var(format!("{}_SERVER_URL", ENV_PREFIX)) {
            self.server_url = non_empty(val);
        }
        if let Ok(val) = std::env::var(format!("{}_PROJECT_ID", ENV_PREFIX)) {
            self.project_id = non_empty(val);
        }
        if let Ok(val) = std::env::var(format!("{}_API_KEY", ENV_PREFIX)) {
            self.api_key = non_empty(val);
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Check the settings a sync engine needs
    pub fn validate(&self) -> Result<()> {
        if self.profile.trim().is_empty() || self.profile.contains('/') {
            bail!("Invalid profile '{}': must be non-empty and contain no '/'", self.profile);
        }
        if self.interval_min_ms == 0 {
            bail!("interval_min_ms must be greater than zero");
        }
        if self.interval_min_ms > self.interval_max_ms {
            bail!(
                "interval_min_ms ({}) must not exceed interval_max_ms ({})",
                self.interval_min_ms,
                self.interval_max_ms
            );
        }
        if self.collections.is_empty() {
            bail!("At least one collection type must be configured");
        }
        Ok(())
    }

    /// GitLab connection settings
    ///
    /// Fails when the server URL, project or token is missing.
    pub fn gitlab(&self) -> Result<GitlabSettings> {
        match (&self.server_url, &self.project_id, &self.api_key) {
            (Some(server_url), Some(project_id), Some(api_key)) => Ok(GitlabSettings {
                server_url: server_url.trim_end_matches('/').to_string(),
                project_id: project_id.clone(),
                api_key: api_key.clone(),
                branch: self.branch.clone(),
            }),
            _ => bail!(
                "Missing config for GitLab sync. Set it with:\n  \
                 notesync config set server_url https://gitlab.example.com\n  \
                 notesync config set project_id <id or namespace/project>\n  \
                 notesync config set api_key <private token>"
            ),
        }
    }

    pub fn interval_min(&self) -> Duration {
        Duration::from_millis(self.interval_min_ms)
    }

    pub fn interval_max(&self) -> Duration {
        Duration::from_millis(self.interval_max_ms)
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with NOTESYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("notesync")
            .join("config.toml")
    }

    /// Directory holding everything that belongs to the active profile
    pub fn profile_dir(&self) -> PathBuf {
        self.data_dir.join(&self.profile)
    }

    /// Path of the local JSON file backing a collection
    pub fn collection_path(&self, collection: CollectionType) -> PathBuf {
        self.profile_dir().join(format!("{}.json", collection))
    }

    /// Path of the remote index cache
    pub fn index_cache_path(&self) -> PathBuf {
        self.profile_dir().join("index_cache.json")
    }
}

fn non_empty(val: String) -> Option<String> {
    if val.is_empty() {
        None
    } else {
        Some(val)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notesync")
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_interval_min_ms() -> u64 {
    DEFAULT_INTERVAL_MIN_MS
}

fn default_interval_max_ms() -> u64 {
    DEFAULT_INTERVAL_MAX_MS
}

fn default_collections() -> Vec<CollectionType> {
    CollectionType::ALL.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "NOTESYNC_DATA_DIR",
        "NOTESYNC_PROFILE",
        "NOTESYNC_SERVER_URL",
        "NOTESYNC_PROJECT_ID",
        "NOTESYNC_API_KEY",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.profile, "notes-db");
        assert_eq!(config.branch, "master");
        assert_eq!(config.interval_min(), Duration::from_secs(2));
        assert_eq!(config.interval_max(), Duration::from_secs(15));
        assert_eq!(config.collections, CollectionType::ALL.to_vec());
        assert!(config.server_url.is_none());
        assert!(config.data_dir.ends_with("notesync"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_paths() {
        let config = Config {
            data_dir: PathBuf::from("/data"),
            ..Config::default()
        };

        assert_eq!(
            config.collection_path(CollectionType::Notebooks),
            PathBuf::from("/data/notes-db/notebooks.json")
        );
        assert_eq!(
            config.index_cache_path(),
            PathBuf::from("/data/notes-db/index_cache.json")
        );
    }

    #[test]
    fn test_gitlab_settings_require_all_fields() {
        let mut config = Config {
            server_url: Some("https://gitlab.example.com/".into()),
            project_id: Some("42".into()),
            ..Config::default()
        };
        let err = config.gitlab().unwrap_err();
        assert!(err.to_string().contains("Missing config"));

        config.api_key = Some("token".into());
        let settings = config.gitlab().unwrap();
        assert_eq!(settings.server_url, "https://gitlab.example.com");
        assert_eq!(settings.branch, "master");
    }

    #[test]
    fn test_validate_interval_bounds() {
        let config = Config {
            interval_min_ms: 20_000,
            interval_max_ms: 10_000,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            profile: "a/b".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_credentials() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("NOTESYNC_SERVER_URL", "https://gitlab.com");
        env::set_var("NOTESYNC_API_KEY", "secret");
        env::set_var("NOTESYNC_PROFILE", "work");
        config.apply_env_overrides();

        assert_eq!(config.server_url.as_deref(), Some("https://gitlab.com"));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.profile, "work");

        // Empty string clears it
        env::set_var("NOTESYNC_API_KEY", "");
        config.apply_env_overrides();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            profile = "laptop"
            server_url = "https://gitlab.example.com"
            project_id = "me/notes"
            api_key = "abc"
            interval_min_ms = 1000
            interval_max_ms = 60000
            collections = ["tags", "notes"]
            redact_fields = ["title", "content"]
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.profile, "laptop");
        assert_eq!(
            config.collections,
            vec![CollectionType::Tags, CollectionType::Notes]
        );
        assert_eq!(config.redact_fields, vec!["title", "content"]);
        assert_eq!(config.interval_max(), Duration::from_secs(60));
        assert_eq!(config.gitlab().unwrap().project_id, "me/notes");
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config {
            data_dir: dir.path().join("data"),
            server_url: Some("https://gitlab.example.com".into()),
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.server_url, config.server_url);
        assert_eq!(loaded.data_dir, config.data_dir);
        assert!(loaded.data_dir.exists());
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let dir = tempfile::tempdir().unwrap();
        env::set_var("NOTESYNC_DATA_DIR", dir.path().join("data"));

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert!(config.server_url.is_none());
        assert_eq!(config.profile, DEFAULT_PROFILE);
    }
}
