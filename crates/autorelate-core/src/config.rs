use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::LibraryId;

/// Root application configuration, loaded from `~/.config/autorelate/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub core: CoreConfig,
    pub openalex: OpenAlexConfig,
    pub relate: RelateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// JSON library file used by the CLI.
    pub library_path: String,
    pub library_id: LibraryId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAlexConfig {
    /// Contact address for the OpenAlex polite pool. Empty means anonymous.
    pub polite_pool_email: String,
    pub base_url: String,
    /// Pause after every request actually sent.
    pub api_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// Referenced works consulted per document.
    pub max_references: usize,
    pub per_page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelateConfig {
    /// Quiet period after the last add-event before a batch is cut.
    pub batch_window_ms: u64,
    /// Wait after a batch is cut, for metadata to finish populating.
    pub settle_delay_ms: u64,
    pub index_ttl_ms: u64,
    pub progress_close_ms: u64,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for CoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("autorelate");

        Self {
            library_path: data_dir.join("library.json").to_string_lossy().to_string(),
            library_id: LibraryId::default(),
        }
    }
}

impl Default for OpenAlexConfig {
    fn default() -> Self {
        Self {
            polite_pool_email: String::new(),
            base_url: "https://api.openalex.org".to_string(),
            api_delay_ms: 500,
            request_timeout_secs: 30,
            max_references: 100,
            per_page: 100,
        }
    }
}

impl Default for RelateConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: 3000,
            settle_delay_ms: 5000,
            index_ttl_ms: 60_000,
            progress_close_ms: 4000,
        }
    }
}

impl OpenAlexConfig {
    /// The configured contact address, if any.
    pub fn contact_email(&self) -> Option<&str> {
        let email = self.polite_pool_email.trim();
        (!email.is_empty()).then_some(email)
    }

    pub fn api_delay(&self) -> Duration {
        Duration::from_millis(self.api_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RelateConfig {
    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn index_ttl(&self) -> Duration {
        Duration::from_millis(self.index_ttl_ms)
    }

    pub fn progress_close(&self) -> Duration {
        Duration::from_millis(self.progress_close_ms)
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/autorelate/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("AUTORELATE_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("autorelate")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    /// `AUTORELATE_EMAIL` overrides the polite pool address.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut config = Self::load_from(&path)?;
        if let Ok(email) = std::env::var("AUTORELATE_EMAIL") {
            config.openalex.polite_pool_email = email;
        }
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to the standard path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn library_path(&self) -> PathBuf {
        PathBuf::from(&self.core.library_path)
    }
}
