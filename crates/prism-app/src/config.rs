// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use prism_platform::WindowConfig;
use prism_render::{RenderSettings, VsyncMode};
use serde::Deserialize;

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        Self {
            title: "prism".to_owned(),
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub vsync_mode: VsyncModeCfg,
    /// Unset means "on in debug builds".
    pub validation: Option<bool>,
    /// Directory with precompiled `triangle.{vert,frag}.spv`. Embedded
    /// shaders are used when unset.
    pub shader_dir: Option<PathBuf>,
    pub log: String,
}

impl Default for RenderCfg {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vsync_mode: VsyncModeCfg::Mailbox,
            validation: None,
            shader_dir: None,
            log: "info".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum VsyncModeCfg {
    Fifo,
    #[default]
    Mailbox,
}

impl From<VsyncModeCfg> for VsyncMode {
    fn from(m: VsyncModeCfg) -> Self {
        match m {
            VsyncModeCfg::Fifo => VsyncMode::Fifo,
            VsyncModeCfg::Mailbox => VsyncMode::Mailbox,
        }
    }
}

/// Command-line values that win over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub vsync_mode: Option<VsyncModeCfg>,
    pub validation: Option<bool>,
    pub shader_dir: Option<PathBuf>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl AppCfg {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn apply(&mut self, o: &Overrides) {
        if let Some(m) = o.vsync_mode {
            self.render.vsync_mode = m;
        }
        if let Some(v) = o.validation {
            self.render.validation = Some(v);
        }
        if let Some(dir) = &o.shader_dir {
            self.render.shader_dir = Some(dir.clone());
        }
        if let Some(w) = o.width {
            self.window.width = w;
        }
        if let Some(h) = o.height {
            self.window.height = h;
        }
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            title: self.window.title.clone(),
            width: self.window.width,
            height: self.window.height,
        }
    }

    pub fn render_settings(&self) -> RenderSettings {
        let defaults = RenderSettings::default();
        RenderSettings {
            app_name: self.window.title.clone(),
            clear_color: self.render.clear_color,
            vsync_mode: self.render.vsync_mode.into(),
            validation: self.render.validation.unwrap_or(defaults.validation),
        }
    }
}

/// A missing file is not an error, it just means defaults.
pub fn load_cfg(path: &Path) -> Result<AppCfg> {
    let text = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(AppCfg::default()),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    AppCfg::parse(&text).with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_file() {
        let cfg = AppCfg::parse(
            r#"
            [window]
            title = "tri"
            width = 1024
            height = 768

            [render]
            clear_color = [0.1, 0.2, 0.3, 1.0]
            vsync_mode = "fifo"
            validation = true
            shader_dir = "shaders"
            log = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.window.title, "tri");
        assert_eq!((cfg.window.width, cfg.window.height), (1024, 768));
        assert_eq!(cfg.render.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(cfg.render.vsync_mode, VsyncModeCfg::Fifo);
        assert_eq!(cfg.render.validation, Some(true));
        assert_eq!(cfg.render.shader_dir, Some(PathBuf::from("shaders")));
        assert_eq!(cfg.render.log, "debug");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = AppCfg::parse("[render]\nvsync_mode = \"fifo\"\n").unwrap();
        assert_eq!(cfg.window, WindowCfg::default());
        assert_eq!(cfg.render.vsync_mode, VsyncModeCfg::Fifo);
        assert_eq!(cfg.render.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(cfg.render.validation, None);

        assert_eq!(AppCfg::parse("").unwrap(), AppCfg::default());
    }

    #[test]
    fn unknown_vsync_mode_is_rejected() {
        assert!(AppCfg::parse("[render]\nvsync_mode = \"immediate\"\n").is_err());
    }

    #[test]
    fn overrides_win() {
        let mut cfg = AppCfg::parse("[window]\nwidth = 1024\n[render]\nvalidation = true\n").unwrap();
        cfg.apply(&Overrides {
            vsync_mode: Some(VsyncModeCfg::Fifo),
            validation: Some(false),
            width: Some(640),
            ..Default::default()
        });
        assert_eq!(cfg.window.width, 640);
        assert_eq!(cfg.window.height, 600);
        assert_eq!(cfg.render.vsync_mode, VsyncModeCfg::Fifo);

        let settings = cfg.render_settings();
        assert!(!settings.validation);
        assert_eq!(settings.vsync_mode, VsyncMode::Fifo);
        assert_eq!(settings.app_name, "prism");
    }

    #[test]
    fn validation_defaults_to_build_profile() {
        let settings = AppCfg::default().render_settings();
        assert_eq!(settings.validation, cfg!(debug_assertions));
        assert_eq!(settings.vsync_mode, VsyncMode::Mailbox);
    }

    #[test]
    fn missing_file_means_defaults() {
        let path = std::env::temp_dir().join("prism-config-that-does-not-exist.toml");
        assert_eq!(load_cfg(&path).unwrap(), AppCfg::default());
    }

    #[test]
    fn broken_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("prism-broken-{}.toml", std::process::id()));
        fs::write(&path, "[window\nwidth = ").unwrap();
        let err = load_cfg(&path).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(format!("{err:#}").contains("parse"), "{err:#}");
    }
}
