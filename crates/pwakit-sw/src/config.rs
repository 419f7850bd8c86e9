//! Agent configuration

use std::path::Path;

use pwakit_common::{PwaKitError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Offline agent configuration.
///
/// Every deployment-specific value lives here; the agent holds no global
/// constants. Bump `version` whenever `shell_resources` changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Application identifier, the prefix of every cache name
    pub app_id: String,

    /// Cache generation tag
    pub version: String,

    /// Origin the relative paths below are resolved against
    pub origin: Url,

    /// App-shell resources cached at install, in order
    pub shell_resources: Vec<String>,

    /// Document served to navigations that fail with no cached copy
    pub offline_page: String,

    /// Background sync tag that drains the deferred write queue
    pub sync_tag: String,

    /// Path segment identifying replayable write requests
    pub submission_path: String,

    /// Push notification surface
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub title: String,
    pub default_body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub explore_title: String,
    pub explore_icon: String,
    pub close_title: String,
    pub close_icon: String,

    /// Route opened by the "explore" action
    pub explore_route: String,

    /// Route opened by a click outside any action
    pub root_route: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            app_id: "ftc-pwa".to_string(),
            version: "1.0.0".to_string(),
            origin: Url::parse("http://localhost:8000/").expect("static origin is valid"),
            shell_resources: [
                "/",
                "/assets/css/mobile-responsive.css",
                "/assets/css/style.css",
                "/assets/js/main.js",
                "/assets/img/logo.png",
                "/products",
                "/users",
                "/offline.html",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            offline_page: "/offline.html".to_string(),
            sync_tag: "order-submission".to_string(),
            submission_path: "/orders/submit".to_string(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "FTC Marketplace".to_string(),
            default_body: "New update from FTC!".to_string(),
            icon: "/assets/img/icon-192x192.png".to_string(),
            badge: "/assets/img/badge-72x72.png".to_string(),
            vibrate: vec![100, 50, 100],
            explore_title: "View Details".to_string(),
            explore_icon: "/assets/img/checkmark.png".to_string(),
            close_title: "Close".to_string(),
            close_icon: "/assets/img/xmark.png".to_string(),
            explore_route: "/products".to_string(),
            root_route: "/".to_string(),
        }
    }
}

impl AgentConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Replace the origin.
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = origin;
        self
    }

    /// Replace the cache generation tag.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Name of the app-shell cache: `{app_id}-v{version}`.
    pub fn shell_cache_name(&self) -> String {
        format!("{}-v{}", self.app_id, self.version)
    }

    /// Name of the deferred write cache: `{app_id}-v{version}-data`.
    pub fn data_cache_name(&self) -> String {
        format!("{}-data", self.shell_cache_name())
    }

    /// Resolve a path against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.origin
            .join(path)
            .map_err(|e| PwaKitError::config_with_source(format!("cannot resolve {path}"), e))
    }

    /// Absolute URLs of the app-shell resources, in order.
    pub fn shell_urls(&self) -> Result<Vec<Url>> {
        self.shell_resources.iter().map(|p| self.resolve(p)).collect()
    }

    /// Absolute URL of the offline fallback document.
    pub fn offline_url(&self) -> Result<Url> {
        self.resolve(&self.offline_page)
    }

    /// Check the configuration for values the agent cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(PwaKitError::config("app_id must not be empty"));
        }
        if self.version.trim().is_empty() {
            return Err(PwaKitError::config("version must not be empty"));
        }
        if self.sync_tag.is_empty() {
            return Err(PwaKitError::config("sync_tag must not be empty"));
        }
        if self.submission_path.is_empty() {
            return Err(PwaKitError::config("submission_path must not be empty"));
        }
        if !self.shell_resources.contains(&self.offline_page) {
            return Err(PwaKitError::config(format!(
                "offline page {} is not part of the shell resources",
                self.offline_page
            )));
        }
        self.shell_urls()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_names() {
        let config = AgentConfig::default();
        assert_eq!(config.shell_cache_name(), "ftc-pwa-v1.0.0");
        assert_eq!(config.data_cache_name(), "ftc-pwa-v1.0.0-data");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_version_bump_changes_names() {
        let config = AgentConfig::default().with_version("1.1.0");
        assert_eq!(config.shell_cache_name(), "ftc-pwa-v1.1.0");
        assert_eq!(config.data_cache_name(), "ftc-pwa-v1.1.0-data");
    }

    #[test]
    fn test_shell_urls_resolve_against_origin() {
        let config =
            AgentConfig::default().with_origin(Url::parse("https://shop.test/").unwrap());
        let urls = config.shell_urls().unwrap();
        assert_eq!(urls.len(), 8);
        assert_eq!(urls[0].as_str(), "https://shop.test/");
        assert_eq!(urls[3].as_str(), "https://shop.test/assets/js/main.js");
        assert_eq!(
            config.offline_url().unwrap().as_str(),
            "https://shop.test/offline.html"
        );
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AgentConfig::from_json_str(
            r#"{ "version": "2.0.0", "origin": "https://shop.test/" }"#,
        )
        .unwrap();
        assert_eq!(config.shell_cache_name(), "ftc-pwa-v2.0.0");
        assert_eq!(config.sync_tag, "order-submission");
        assert_eq!(config.notifications.title, "FTC Marketplace");
    }

    #[test]
    fn test_offline_page_must_be_in_shell() {
        let config = AgentConfig {
            offline_page: "/missing.html".to_string(),
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().category(), "config");
    }

    #[test]
    fn test_empty_version_rejected() {
        let result = AgentConfig::from_json_str(r#"{ "version": "" }"#);
        assert!(matches!(result, Err(PwaKitError::Config { .. })));
    }
}
