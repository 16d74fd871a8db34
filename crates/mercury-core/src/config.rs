// SPDX-License-Identifier: CEPL-1.0
//! Engine configuration, read from `mercury.toml`.
//!
//! Every field has a default so a partial (or absent) file is valid.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "mercury.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct EngineConfig {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WindowCfg {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub fullscreen: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderCfg {
    #[serde(default = "default_debug_tooling")]
    pub enable_validation: bool,
    #[serde(default = "default_debug_tooling")]
    pub enable_debug_utils_label: bool,
    #[serde(default = "default_frames_in_flight")]
    pub frames_in_flight: usize,
    #[serde(default)]
    pub present_mode: PresentModeCfg,
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default = "default_fence_wait_warn_ms")]
    pub fence_wait_warn_ms: u64,
    #[serde(default = "default_shader_dir")]
    pub shader_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    Fifo,
    #[default]
    Mailbox,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            width: default_width(),
            height: default_height(),
            title: default_title(),
            fullscreen: false,
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            enable_validation: default_debug_tooling(),
            enable_debug_utils_label: default_debug_tooling(),
            frames_in_flight: default_frames_in_flight(),
            present_mode: PresentModeCfg::Mailbox,
            clear_color: default_clear(),
            fence_wait_warn_ms: default_fence_wait_warn_ms(),
            shader_dir: default_shader_dir(),
        }
    }
}

fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}
fn default_title() -> String {
    "Mercury".to_string()
}
fn default_debug_tooling() -> bool {
    cfg!(debug_assertions)
}
fn default_frames_in_flight() -> usize {
    3
}
fn default_clear() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}
fn default_fence_wait_warn_ms() -> u64 {
    2000
}
fn default_shader_dir() -> PathBuf {
    PathBuf::from("shaders")
}

impl EngineConfig {
    /// Loads `path`. A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no config at {} → defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        let mut cfg: EngineConfig = toml::from_str(text)?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn sanitize(&mut self) {
        if self.render.frames_in_flight < 2 {
            warn!(
                "frames_in_flight = {} is below 2; using 2",
                self.render.frames_in_flight
            );
            self.render.frames_in_flight = 2;
        }
        self.window.width = self.window.width.max(1);
        self.window.height = self.window.height.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.window.width, 1280);
        assert_eq!(cfg.window.height, 720);
        assert_eq!(cfg.window.title, "Mercury");
        assert_eq!(cfg.render.frames_in_flight, 3);
        assert_eq!(cfg.render.present_mode, PresentModeCfg::Mailbox);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = EngineConfig::from_toml_str(
            r#"
            [window]
            title = "demo"

            [render]
            present_mode = "fifo"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.title, "demo");
        assert_eq!(cfg.window.width, 1280);
        assert_eq!(cfg.render.present_mode, PresentModeCfg::Fifo);
        assert_eq!(cfg.render.fence_wait_warn_ms, 2000);
    }

    #[test]
    fn frames_in_flight_is_clamped_to_double_buffering() {
        let cfg = EngineConfig::from_toml_str("[render]\nframes_in_flight = 1\n").unwrap();
        assert_eq!(cfg.render.frames_in_flight, 2);
    }

    #[test]
    fn unknown_present_mode_is_rejected() {
        assert!(EngineConfig::from_toml_str("[render]\npresent_mode = \"immediate\"\n").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = EngineConfig::load(Path::new("definitely/not/here/mercury.toml")).unwrap();
        assert_eq!(cfg.render.shader_dir, PathBuf::from("shaders"));
    }
}
