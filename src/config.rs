//! Configuration file parser for ~/.config/feedcast/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`
//! (no feeds). Unknown keys are ignored by serde, though we log a warning
//! when the file contains potential typos.
//!
//! ```toml
//! delay = 5                                       # minutes between cycles
//! directory = "~/.local/share/feedcast"           # storage root
//! fmt = "[{feed.name}] {entry.title} {entry.link}"
//! max_workers = 5
//! channels = ["#news"]
//!
//! [hook]
//! kind = "exclude"
//! words = ["something bad"]
//!
//! [feeds."github/irc3"]
//! url = "https://github.com/gawel/irc3/commits/master.atom"
//! channels = ["irc3"]
//! fmt = "[{feed.name}] New commit: {entry.title} - {entry.link}"
//! ```
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{FeedRegistry, FeedSource, DEFAULT_MAX_WORKERS, DEFAULT_USER_AGENT};
use crate::notify::{
    ExcludeHook, Hook, IdentityHook, MaxPerCycleHook, Template, TemplateError, DEFAULT_FORMAT,
};
use crate::scheduler::Settings;
use crate::util::{as_channel, expand_home, validate_url, UrlValidationError};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Feed '{feed}': {source}")]
    Url {
        feed: String,
        #[source]
        source: UrlValidationError,
    },

    #[error("Feed '{0}' has no URL")]
    NoUrl(String),

    #[error("Format template of {owner}: {source}")]
    Template {
        owner: String,
        #[source]
        source: TemplateError,
    },

    #[error("max_workers must be at least 1")]
    NoWorkers,
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Which [`Store`](crate::storage::Store) backend holds feed content and
/// watermarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// One file per key under `directory`
    #[default]
    Files,
    /// `feedcast.db` under `directory`
    Sqlite,
}

/// Built-in candidate hooks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HookConfig {
    #[default]
    Identity,
    Exclude {
        words: Vec<String>,
    },
    MaxPerCycle {
        limit: usize,
    },
}

impl HookConfig {
    pub fn build(&self) -> Box<dyn Hook> {
        match self {
            HookConfig::Identity => Box::new(IdentityHook),
            HookConfig::Exclude { words } => Box::new(ExcludeHook::new(words)),
            HookConfig::MaxPerCycle { limit } => Box::new(MaxPerCycleHook::new(*limit)),
        }
    }
}

/// `url = "..."` or `urls = ["...", "..."]`; both may be given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: Option<String>,
    pub urls: Vec<String>,
    pub channels: Option<Vec<String>>,
    pub fmt: Option<String>,
    /// Minutes between fetches of this feed
    pub delay: Option<u64>,
}

impl FeedConfig {
    fn all_urls(&self) -> Vec<String> {
        self.url.iter().chain(&self.urls).cloned().collect()
    }
}

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minutes between update cycles; also the default per-feed fetch delay.
    pub delay: u64,

    /// Storage root. `~` is expanded.
    pub directory: String,

    /// Default message template.
    pub fmt: String,

    /// Maximum concurrent feed fetches.
    pub max_workers: usize,

    /// Default destination channels.
    pub channels: Vec<String>,

    /// Seconds to wait after startup before the first cycle.
    pub initial_delay_secs: u64,

    /// Hard ceiling on a single HTTP fetch.
    pub request_timeout_secs: u64,

    pub user_agent: String,

    pub storage: StorageKind,

    pub hook: HookConfig,

    pub feeds: BTreeMap<String, FeedConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delay: 5,
            directory: "~/.local/share/feedcast".to_string(),
            fmt: DEFAULT_FORMAT.to_string(),
            max_workers: DEFAULT_MAX_WORKERS,
            channels: Vec::new(),
            initial_delay_secs: 10,
            request_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            storage: StorageKind::default(),
            hook: HookConfig::default(),
            feeds: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 11] = [
        "delay",
        "directory",
        "fmt",
        "max_workers",
        "channels",
        "initial_delay_secs",
        "request_timeout_secs",
        "user_agent",
        "storage",
        "hook",
        "feeds",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to avoid loading a huge file
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), feeds = config.feeds.len(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration text. Blank text gives the defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        Ok(toml::from_str(content)?)
    }

    /// Storage root with `~` expanded.
    pub fn directory(&self) -> PathBuf {
        expand_home(&self.directory)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn settings(&self) -> Result<Settings, ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(Settings {
            delay: minutes(self.delay),
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            max_workers: self.max_workers,
        })
    }

    /// Validate every feed and build the registry.
    ///
    /// Per-feed `fmt`, `channels` and `delay` override the globals.
    pub fn registry(&self) -> Result<FeedRegistry, ConfigError> {
        let default_fmt = Template::parse(&self.fmt).map_err(|source| ConfigError::Template {
            owner: "the global fmt".to_string(),
            source,
        })?;

        let mut registry = FeedRegistry::new();
        for (name, feed) in &self.feeds {
            let urls = feed
                .all_urls()
                .iter()
                .map(|u| {
                    validate_url(u)
                        .map(|url| url.to_string())
                        .map_err(|source| ConfigError::Url {
                            feed: name.clone(),
                            source,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            if urls.is_empty() {
                return Err(ConfigError::NoUrl(name.clone()));
            }

            let fmt = match &feed.fmt {
                Some(raw) => Template::parse(raw).map_err(|source| ConfigError::Template {
                    owner: format!("feed '{name}'"),
                    source,
                })?,
                None => default_fmt.clone(),
            };

            let channels: Vec<String> = feed
                .channels
                .as_ref()
                .unwrap_or(&self.channels)
                .iter()
                .filter(|c| !c.trim().is_empty())
                .map(|c| as_channel(c))
                .collect();
            if channels.is_empty() {
                tracing::warn!(feed = %name, "Feed has no channels, its entries will not be announced");
            }

            let delay = minutes(feed.delay.unwrap_or(self.delay));
            registry.insert(FeedSource::new(name.clone(), urls, channels, fmt, delay));
        }
        Ok(registry)
    }
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.delay, 5);
        assert_eq!(config.max_workers, 5);
        assert_eq!(config.fmt, "[{feed.name}] {entry.title} {entry.link}");
        assert_eq!(config.storage, StorageKind::Files);
        assert_eq!(config.hook, HookConfig::Identity);
        assert!(config.feeds.is_empty());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedcast_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_whitespace_only_returns_default() {
        assert_eq!(Config::from_toml("   \n  \n  ").unwrap(), Config::default());
    }

    #[test]
    fn test_full_config() {
        let content = r##"
delay = 10
directory = "/var/lib/feedcast"
max_workers = 3
channels = ["news"]
storage = "sqlite"

[hook]
kind = "exclude"
words = ["Sponsored"]

[feeds."github/irc3"]
url = "https://github.com/gawel/irc3/commits/master.atom"
channels = ["irc3", "#dev"]
fmt = "[{feed.name}] New commit: {entry.title} - {entry.link}"

[feeds.blog]
urls = ["https://blog.example.com/rss", "https://blog.example.com/comments/rss"]
delay = 60
"##;
        let config = Config::from_toml(content).unwrap();
        assert_eq!(config.storage, StorageKind::Sqlite);
        assert_eq!(
            config.hook,
            HookConfig::Exclude {
                words: vec!["Sponsored".to_string()]
            }
        );
        assert_eq!(config.directory(), PathBuf::from("/var/lib/feedcast"));

        let settings = config.settings().unwrap();
        assert_eq!(settings.delay, Duration::from_secs(600));
        assert_eq!(settings.max_workers, 3);

        let registry = config.registry().unwrap();
        assert_eq!(registry.len(), 2);

        let irc3 = registry.get("github/irc3").unwrap();
        assert_eq!(irc3.channels, vec!["#irc3", "#dev"]);
        assert_eq!(irc3.locations, vec!["github_irc3.0.feed"]);
        assert_eq!(irc3.delay, Duration::from_secs(600));
        assert_eq!(
            irc3.fmt.as_str(),
            "[{feed.name}] New commit: {entry.title} - {entry.link}"
        );

        let blog = registry.get("blog").unwrap();
        assert_eq!(blog.channels, vec!["#news"]);
        assert_eq!(blog.locations, vec!["blog.0.feed", "blog.1.feed"]);
        assert_eq!(blog.delay, Duration::from_secs(3600));
        assert_eq!(blog.fmt, Template::default());
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::from_toml("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let config = Config::from_toml("delay = 2\ntotally_fake_key = 1\n").unwrap();
        assert_eq!(config.delay, 2);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(Config::from_toml("delay = \"soon\"\n").is_err());
    }

    #[test]
    fn test_bad_url_rejected() {
        let config = Config::from_toml("[feeds.x]\nurl = \"ftp://example.com/feed\"\n").unwrap();
        assert!(matches!(config.registry(), Err(ConfigError::Url { .. })));
    }

    #[test]
    fn test_feed_without_url_rejected() {
        let config = Config::from_toml("[feeds.x]\nchannels = [\"a\"]\n").unwrap();
        assert!(matches!(config.registry(), Err(ConfigError::NoUrl(_))));
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let config = Config::from_toml(
            "[feeds.x]\nurl = \"https://example.com/rss\"\nfmt = \"{entry.body}\"\n",
        )
        .unwrap();
        assert!(matches!(config.registry(), Err(ConfigError::Template { .. })));
    }

    #[test]
    fn test_dot_named_feed_gets_visible_locations() {
        let config = Config::from_toml(
            "[feeds.\".net-weekly\"]\nurl = \"https://example.com/net.rss\"\n",
        )
        .unwrap();
        let registry = config.registry().unwrap();
        let feed = registry.get(".net-weekly").unwrap();
        assert_eq!(feed.locations, vec!["_net-weekly.0.feed"]);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = Config::from_toml("max_workers = 0\n").unwrap();
        assert!(matches!(config.settings(), Err(ConfigError::NoWorkers)));
    }

    #[test]
    fn test_hook_variants() {
        let config = Config::from_toml("[hook]\nkind = \"max_per_cycle\"\nlimit = 3\n").unwrap();
        assert_eq!(config.hook, HookConfig::MaxPerCycle { limit: 3 });
        let config = Config::from_toml("[hook]\nkind = \"identity\"\n").unwrap();
        assert_eq!(config.hook, HookConfig::Identity);
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("feedcast_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join("feedcast_config_test_load");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "delay = 1\n[feeds.a]\nurl = \"https://a.example/rss\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.delay, 1);
        assert_eq!(config.registry().unwrap().len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
