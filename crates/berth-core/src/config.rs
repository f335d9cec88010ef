//! Editor hosting configuration.
//!
//! Configuration can be built in code with the `with_*` builders or loaded
//! from a TOML file. Every field is optional in TOML; missing fields keep
//! their defaults.
//!
//! # Example
//!
//! ```ignore
//! use berth_core::{EditorConfig, EditorSize};
//!
//! pub static CONFIG: EditorConfig = EditorConfig::new()
//!     .with_default_size(EditorSize::new(640, 480))
//!     .with_idle_rate_hz(50);
//! ```
//!
//! ```toml
//! default_title = "My Host"
//! idle_rate_hz = 50
//!
//! [default_size]
//! width = 640
//! height = 480
//! ```

use std::borrow::Cow;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::EditorSize;

/// Highest idle rate accepted. Faster rates are clamped.
pub const MAX_IDLE_RATE_HZ: u32 = 1000;

/// Configuration for hosting plugin editors.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EditorConfig {
    /// Window size used when the plugin reports no preferred size.
    pub default_size: EditorSize,
    /// Title used when neither a title nor a plugin name is available.
    pub default_title: Cow<'static, str>,
    /// Idle callback rate.
    pub idle_rate_hz: u32,
    /// How long teardown waits for the idle thread to exit.
    pub idle_shutdown_timeout_ms: u64,
    /// How long teardown waits for a dedicated window thread to exit.
    pub window_thread_timeout_ms: u64,
    /// How long `open` waits for a dedicated window thread to construct its window.
    pub window_startup_timeout_ms: u64,
    /// Prefix for the Win32 window class name.
    pub window_class_prefix: Cow<'static, str>,
}

impl EditorConfig {
    /// Create a configuration with default values.
    pub const fn new() -> Self {
        Self {
            default_size: EditorSize::new(800, 600),
            default_title: Cow::Borrowed("Plugin Editor"),
            idle_rate_hz: 60,
            idle_shutdown_timeout_ms: 1000,
            window_thread_timeout_ms: 1000,
            window_startup_timeout_ms: 5000,
            window_class_prefix: Cow::Borrowed("BerthEditorWindow"),
        }
    }

    /// Set the fallback window size.
    pub const fn with_default_size(mut self, size: EditorSize) -> Self {
        self.default_size = size;
        self
    }

    /// Set the idle callback rate in Hz.
    pub const fn with_idle_rate_hz(mut self, hz: u32) -> Self {
        self.idle_rate_hz = hz;
        self
    }

    /// Set the idle thread shutdown timeout.
    pub const fn with_idle_shutdown_timeout_ms(mut self, ms: u64) -> Self {
        self.idle_shutdown_timeout_ms = ms;
        self
    }

    /// Set the window thread shutdown timeout.
    pub const fn with_window_thread_timeout_ms(mut self, ms: u64) -> Self {
        self.window_thread_timeout_ms = ms;
        self
    }

    /// Set the window construction timeout.
    pub const fn with_window_startup_timeout_ms(mut self, ms: u64) -> Self {
        self.window_startup_timeout_ms = ms;
        self
    }

    /// Set the fallback window title.
    pub fn with_default_title(mut self, title: impl Into<Cow<'static, str>>) -> Self {
        self.default_title = title.into();
        self
    }

    /// Set the Win32 window class prefix.
    pub fn with_window_class_prefix(mut self, prefix: impl Into<Cow<'static, str>>) -> Self {
        self.window_class_prefix = prefix.into();
        self
    }

    // =====================================================================
    // Derived values
    // =====================================================================

    /// Interval between idle ticks, with the rate clamped to `1..=MAX_IDLE_RATE_HZ`.
    pub fn idle_interval(&self) -> Duration {
        let hz = self.idle_rate_hz.clamp(1, MAX_IDLE_RATE_HZ);
        Duration::from_micros(1_000_000 / u64::from(hz))
    }

    pub fn idle_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_shutdown_timeout_ms)
    }

    pub fn window_thread_timeout(&self) -> Duration {
        Duration::from_millis(self.window_thread_timeout_ms)
    }

    pub fn window_startup_timeout(&self) -> Duration {
        Duration::from_millis(self.window_startup_timeout_ms)
    }

    /// Pick the window title for an editor session.
    ///
    /// An explicit title wins, then `"<plugin name> - Editor"`, then the
    /// configured default.
    pub fn editor_title(&self, explicit: Option<&str>, plugin_name: Option<&str>) -> String {
        if let Some(title) = explicit.filter(|t| !t.trim().is_empty()) {
            return title.to_string();
        }
        match plugin_name.filter(|n| !n.trim().is_empty()) {
            Some(name) => format!("{name} - Editor"),
            None => self.default_title.to_string(),
        }
    }

    // =====================================================================
    // Loading
    // =====================================================================

    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::debug!("Loaded editor config from {}", path.display());
        Ok(config)
    }

    /// Reject values the hosting layer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_size.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "default_size must be non-zero, got {}",
                self.default_size
            )));
        }
        if self.idle_rate_hz == 0 {
            return Err(ConfigError::Invalid("idle_rate_hz must be non-zero".into()));
        }
        let timeouts = [
            ("idle_shutdown_timeout_ms", self.idle_shutdown_timeout_ms),
            ("window_thread_timeout_ms", self.window_thread_timeout_ms),
            ("window_startup_timeout_ms", self.window_startup_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
        }
        if self.window_class_prefix.is_empty() {
            return Err(ConfigError::Invalid("window_class_prefix must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EditorConfig::default();
        assert_eq!(config.default_size, EditorSize::new(800, 600));
        assert_eq!(config.idle_rate_hz, 60);
        assert_eq!(config.idle_shutdown_timeout(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_const_builders() {
        const CONFIG: EditorConfig = EditorConfig::new()
            .with_default_size(EditorSize::new(640, 480))
            .with_idle_rate_hz(50);
        assert_eq!(CONFIG.default_size, EditorSize::new(640, 480));
        assert_eq!(CONFIG.idle_interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_idle_interval_clamped() {
        let fast = EditorConfig::new().with_idle_rate_hz(1_000_000);
        assert_eq!(fast.idle_interval(), Duration::from_millis(1));
        let zero = EditorConfig::new().with_idle_rate_hz(0);
        assert_eq!(zero.idle_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_from_toml_partial() {
        let config = EditorConfig::from_toml_str(
            r#"
            default_title = "Host"
            idle_rate_hz = 50

            [default_size]
            width = 640
            height = 480
            "#,
        )
        .unwrap();
        assert_eq!(config.default_title, "Host");
        assert_eq!(config.idle_rate_hz, 50);
        assert_eq!(config.default_size, EditorSize::new(640, 480));
        assert_eq!(config.window_thread_timeout_ms, 1000);
    }

    #[test]
    fn test_from_toml_rejects_unknown_field() {
        let err = EditorConfig::from_toml_str("idle_rate = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let err = EditorConfig::from_toml_str("idle_shutdown_timeout_ms = 0").unwrap_err();
        assert!(err.to_string().contains("idle_shutdown_timeout_ms"));

        let zero_size = EditorConfig::new().with_default_size(EditorSize::new(0, 10));
        assert!(zero_size.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = EditorConfig::load("/nonexistent/berth/editor.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_editor_title() {
        let config = EditorConfig::new();
        assert_eq!(config.editor_title(Some("Mine"), Some("Synth")), "Mine");
        assert_eq!(config.editor_title(None, Some("Synth")), "Synth - Editor");
        assert_eq!(config.editor_title(Some("  "), None), "Plugin Editor");
    }
}
