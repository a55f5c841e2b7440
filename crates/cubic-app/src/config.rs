// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "Triangle".to_owned(),
            width: 500,
            height: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub depth: bool,
    /// Directory with `vert.spv` / `frag.spv`. Unset means the backend default.
    pub shader_dir: Option<PathBuf>,
    /// Image decoded into the quad texture. Unset means a generated checkerboard.
    pub texture: Option<PathBuf>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            depth: true,
            shader_dir: None,
            texture: None,
        }
    }
}

fn default_clear() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
}

pub fn parse_cfg(text: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str::<AppCfg>(text)
}

/// Missing file: defaults. Malformed file: defaults plus a warning.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match parse_cfg(&s) {
            Ok(cfg) => {
                info!("config loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("ignoring malformed {}: {e}", path.display());
                AppCfg::default()
            }
        },
        Err(_) => AppCfg::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppCfg::default();
        assert_eq!(cfg.window.title, "Triangle");
        assert_eq!((cfg.window.width, cfg.window.height), (500, 500));
        assert_eq!(cfg.render.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert!(cfg.render.depth);
        assert!(cfg.render.texture.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let cfg = parse_cfg(
            r#"
            [render]
            clear_color = [0.1, 0.2, 0.3, 1.0]
            depth = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.render.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert!(!cfg.render.depth);
        assert_eq!(cfg.window, WindowCfg::default());
    }

    #[test]
    fn test_paths() {
        let cfg = parse_cfg(
            r#"
            [window]
            width = 800
            [render]
            shader_dir = "build/shaders"
            texture = "assets/texture.png"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.width, 800);
        assert_eq!(cfg.window.height, 500);
        assert_eq!(cfg.render.shader_dir, Some(PathBuf::from("build/shaders")));
        assert_eq!(cfg.render.texture, Some(PathBuf::from("assets/texture.png")));
    }

    #[test]
    fn test_malformed_is_an_error() {
        assert!(parse_cfg("[render]\ndepth = \"yes\"").is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let cfg = load_cfg(Path::new("definitely/not/here/cubic.toml"));
        assert_eq!(cfg, AppCfg::default());
    }
}
