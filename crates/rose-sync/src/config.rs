//! Settings
//!
//! Loaded from TOML; every key is optional. `ROSE_CONFIG` names the file
//! when no path is given, and `ROSE_SERVER_URL` overrides the server URL.
//!
//! ```toml
//! [server]
//! api_url = "http://localhost:6001"
//!
//! [sync]
//! excluded_names = [".git", "node_modules", "target"]
//! ```

use crate::error::SyncError;
use rose_folder::{MarkerStore, DEFAULT_MARKER_FILENAME};
use rose_remote::DEFAULT_SYSTEM_FIELDS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the settings file
pub const CONFIG_ENV: &str = "ROSE_CONFIG";

/// Environment variable overriding the server URL
pub const SERVER_URL_ENV: &str = "ROSE_SERVER_URL";

/// Server location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub api_url: String,
    pub api_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            api_url: "https://rose-studio.cfapps.us10.hana.ondemand.com".to_string(),
            api_path: "/api/v1".to_string(),
        }
    }
}

/// OAuth client used for token refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub token_endpoint: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
        }
    }
}

/// Per-folder file names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderSettings {
    pub marker_filename: String,
    pub install_hook_filename: String,
}

impl Default for FolderSettings {
    fn default() -> Self {
        Self {
            marker_filename: DEFAULT_MARKER_FILENAME.to_string(),
            install_hook_filename: ".rose_install".to_string(),
        }
    }
}

/// Transfer filters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Names never packed (at any depth)
    pub excluded_names: Vec<String>,
    /// Names a wipe never deletes, besides the marker
    pub protected_names: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            excluded_names: vec![".git".to_string(), "node_modules".to_string()],
            protected_names: vec![".git".to_string()],
        }
    }
}

/// All settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub folder: FolderSettings,
    pub sync: SyncSettings,
    /// Fields not copied from a class into a new instance
    pub system_fields: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            auth: AuthSettings::default(),
            folder: FolderSettings::default(),
            sync: SyncSettings::default(),
            system_fields: DEFAULT_SYSTEM_FIELDS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl Settings {
    /// Create default settings
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, SyncError> {
        toml::from_str(text).map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Load settings from `path`, or from `ROSE_CONFIG`, then apply
    /// environment overrides
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, SyncError> {
        let path: Option<PathBuf> = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let settings = match path {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "loading settings");
                let text = std::fs::read_to_string(&path).map_err(|e| SyncError::io_error(&path, e))?;
                Self::from_toml_str(&text)?
            }
            _ => Self::default(),
        };
        Ok(settings.apply_env(|key| std::env::var(key).ok()))
    }

    /// Apply environment overrides from a lookup function
    #[must_use]
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(SERVER_URL_ENV).filter(|u| !u.is_empty()) {
            self.server.api_url = url;
        }
        self
    }

    /// With server URL
    #[inline]
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.server.api_url = url.into();
        self
    }

    /// With marker file name
    #[inline]
    #[must_use]
    pub fn with_marker_filename(mut self, name: impl Into<String>) -> Self {
        self.folder.marker_filename = name.into();
        self
    }

    /// With names excluded from packing
    #[must_use]
    pub fn with_excluded_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sync.excluded_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Marker store for the configured file name
    #[must_use]
    pub fn marker_store(&self) -> MarkerStore {
        MarkerStore::new(&self.folder.marker_filename)
    }

    /// Full API root, e.g. `https://host/api/v1`
    #[must_use]
    pub fn api_root(&self) -> String {
        format!(
            "{}{}",
            self.server.api_url.trim_end_matches('/'),
            self.server.api_path
        )
    }
}
