//! Configuration management for Tessera
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files. It combines settings for the screen, workspaces,
//! the per-window protocol servers, and the default decorator.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::geometry::Rgba;
use crate::workspace::MAX_WORKSPACES;

/// Main configuration struct containing all Tessera settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TesseraConfig {
    /// Screen geometry the desktops composite onto
    #[serde(default)]
    pub screen: ScreenConfig,

    /// Virtual desktop settings
    #[serde(default)]
    pub workspaces: WorkspaceConfig,

    /// Per-connection protocol server limits
    #[serde(default)]
    pub server: ServerConfig,

    /// Default window decorator theme
    #[serde(default)]
    pub decorator: DecoratorConfig,

    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
}

/// Screen mode the server starts with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenConfig {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Bits per pixel of the frame buffer
    pub bits_per_pixel: u32,
}

/// Workspace configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceConfig {
    /// Number of workspaces (1-32)
    pub count: u32,

    /// Workspace shown after login
    #[serde(default)]
    pub initial: u32,

    /// Background colors (hex: #RRGGBB), cycled when shorter than `count`
    #[serde(default = "WorkspaceConfig::default_colors")]
    pub colors: Vec<String>,
}

/// Protocol server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Opcodes processed per structural lock acquisition
    pub batch_size: usize,

    /// How long the server waits for a direct window client to
    /// acknowledge a buffer hand-off (milliseconds)
    pub direct_handoff_timeout_ms: u64,

    /// Windows a single desktop may own
    pub max_windows_per_desktop: usize,

    /// Views a single window may own
    pub max_views_per_window: usize,

    /// Pictures a session may keep recorded
    #[serde(default = "ServerConfig::default_max_pictures")]
    pub max_pictures: usize,
}

/// Decorator theme configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecoratorConfig {
    /// Height of the title tab above the window frame (pixels)
    pub tab_height: u32,

    /// Border around the window frame (pixels)
    pub border_width: u32,

    /// Tab color of the focused window
    pub focused_tab_color: String,

    /// Tab color of unfocused windows
    pub unfocused_tab_color: String,

    /// Frame border color
    pub border_color: String,
}

/// General server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Enable debug logging
    pub debug: bool,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            bits_per_pixel: 32,
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            count: 4,
            initial: 0,
            colors: Self::default_colors(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            batch_size: 70,
            direct_handoff_timeout_ms: 500,
            max_windows_per_desktop: 512,
            max_views_per_window: 4096,
            max_pictures: Self::default_max_pictures(),
        }
    }
}

impl Default for DecoratorConfig {
    fn default() -> Self {
        Self {
            tab_height: 21,
            border_width: 5,
            focused_tab_color: "#FFD800".to_string(),
            unfocused_tab_color: "#E8E8E8".to_string(),
            border_color: "#D8D8D8".to_string(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { debug: false }
    }
}

impl WorkspaceConfig {
    fn default_colors() -> Vec<String> {
        vec!["#336698".to_string()]
    }

    /// Background color of workspace `index`.
    pub fn color(&self, index: usize) -> Rgba {
        if self.colors.is_empty() {
            return Rgba::new(0x33, 0x66, 0x98, 255);
        }
        let text = &self.colors[index % self.colors.len()];
        Rgba::from_hex(text).unwrap_or(Rgba::new(0x33, 0x66, 0x98, 255))
    }
}

impl ServerConfig {
    fn default_max_pictures() -> usize {
        1024
    }

    pub fn direct_handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.direct_handoff_timeout_ms)
    }
}

impl TesseraConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = if path.to_string_lossy().starts_with('~') {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            let relative = path.strip_prefix("~").unwrap_or(path);
            Path::new(&home).join(relative)
        } else {
            path.to_path_buf()
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: TesseraConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.screen.width == 0 || self.screen.height == 0 {
            anyhow::bail!("Invalid screen size: {}x{}", self.screen.width, self.screen.height);
        }
        if self.screen.width > 16384 || self.screen.height > 16384 {
            anyhow::bail!("Invalid screen size: dimensions must not exceed 16384");
        }
        if ![8, 15, 16, 24, 32].contains(&self.screen.bits_per_pixel) {
            anyhow::bail!("Invalid bits_per_pixel: {}", self.screen.bits_per_pixel);
        }

        if self.workspaces.count == 0 || self.workspaces.count as usize > MAX_WORKSPACES {
            anyhow::bail!("Invalid workspace count: must be between 1 and {}", MAX_WORKSPACES);
        }
        if self.workspaces.initial >= self.workspaces.count {
            anyhow::bail!(
                "Invalid initial workspace {}: only {} workspaces configured",
                self.workspaces.initial,
                self.workspaces.count
            );
        }
        for color in &self.workspaces.colors {
            if Rgba::from_hex(color).is_none() {
                anyhow::bail!("Invalid workspace color: {}", color);
            }
        }

        if self.server.batch_size == 0 {
            anyhow::bail!("Invalid batch_size: must be at least 1");
        }
        if self.server.direct_handoff_timeout_ms == 0 || self.server.direct_handoff_timeout_ms > 10_000 {
            anyhow::bail!("Invalid direct_handoff_timeout_ms: must be between 1 and 10000");
        }
        if self.server.max_windows_per_desktop == 0 || self.server.max_views_per_window == 0 {
            anyhow::bail!("Invalid window/view limits: must be at least 1");
        }

        for color in [
            &self.decorator.focused_tab_color,
            &self.decorator.unfocused_tab_color,
            &self.decorator.border_color,
        ] {
            if Rgba::from_hex(color).is_none() {
                anyhow::bail!("Invalid decorator color: {}", color);
            }
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }

    /// Merge a partial configuration into this one
    /// Non-default sections from the partial config override this config
    pub fn merge_partial(mut self, partial: TesseraConfig) -> Self {
        let default_config = TesseraConfig::default();

        if partial.screen != default_config.screen {
            self.screen = partial.screen;
        }
        if partial.workspaces != default_config.workspaces {
            self.workspaces = partial.workspaces;
        }
        if partial.server != default_config.server {
            self.server = partial.server;
        }
        if partial.decorator != default_config.decorator {
            self.decorator = partial.decorator;
        }
        if partial.general != default_config.general {
            self.general = partial.general;
        }

        self
    }
}


#[cfg(test)]
mod property_tests;
