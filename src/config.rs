//! Configuration management for analytics synchronization
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (analytics-sync.toml)
//! - Environment variables (ANALYTICS_SYNC__*)
//!
//! ## Example config file (analytics-sync.toml):
//! ```toml
//! [capability]
//! qualified_name = "CognosServer"
//! source = "cognos"
//!
//! [resolver]
//! page_size = 200
//!
//! [build]
//! user = "sync-bot"
//! strict_links = false
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::builder::BuildOptions;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Owning capability settings
    #[serde(default)]
    pub capability: CapabilityConfig,

    /// Cross-asset resolution settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Graph build settings
    #[serde(default)]
    pub build: BuildConfig,
}

/// Owning capability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// Namespace root for qualified names
    #[serde(default = "default_capability_name")]
    pub qualified_name: String,

    /// Source tag recorded on published assets
    #[serde(default = "default_source")]
    pub source: String,
}

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Page size for schema attribute searches
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// Build configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// User id for repository calls
    #[serde(default = "default_user")]
    pub user: String,

    /// Abort on failed reference/link edges
    #[serde(default)]
    pub strict_links: bool,
}

// Default value functions
fn default_capability_name() -> String {
    "AnalyticsServer".to_string()
}

fn default_source() -> String {
    "analytics-sync".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_user() -> String {
    "analytics-sync".to_string()
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            qualified_name: default_capability_name(),
            source: default_source(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            strict_links: false,
        }
    }
}

impl SyncConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "analytics-sync.toml",
            ".analytics-sync.toml",
            "config/analytics-sync.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "analytics-sync") {
            let xdg_config = config_dir.config_dir().join("analytics-sync.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("ANALYTICS_SYNC")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Builder options derived from this configuration
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            user: self.build.user.clone(),
            page_size: self.resolver.page_size.max(1),
            strict_links: self.build.strict_links,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.capability.qualified_name, "AnalyticsServer");
        assert_eq!(config.resolver.page_size, 100);
        assert!(!config.build.strict_links);
    }

    #[test]
    fn test_serialize_config() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[capability]"));
        assert!(toml_str.contains("[resolver]"));
        assert!(toml_str.contains("[build]"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.toml");
        let mut config = SyncConfig::default();
        config.capability.qualified_name = "CognosServer".to_string();
        config.resolver.page_size = 7;
        config.build.strict_links = true;
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = SyncConfig::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(loaded.capability.qualified_name, "CognosServer");
        assert_eq!(loaded.resolver.page_size, 7);
        assert!(loaded.build.strict_links);
    }

    #[test]
    fn test_build_options() {
        let mut config = SyncConfig::default();
        config.resolver.page_size = 0;
        let options = config.build_options();
        assert_eq!(options.page_size, 1);
        assert_eq!(options.user, "analytics-sync");
    }
}
