// ============================================================================
// ENGINE SETTINGS — key=value config file with per-key defaults
// ============================================================================

use std::path::{Path, PathBuf};

use crate::coords::Size;
use crate::ops::{Interpolation, TransformOptions};

const SETTINGS_FILE: &str = "cutoutfe_settings.cfg";

#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    /// Patch history depth per image.
    pub max_undo_steps: usize,
    /// Patch history memory cap per image, in megabytes. 0 disables the cap.
    pub max_history_mb: usize,
    /// Box the working buffer is fit into when an image is registered.
    pub display_width: u32,
    pub display_height: u32,
    pub resize_filter: Interpolation,
    /// Transparent margin kept around the object after finalize.
    pub crop_padding: u32,
    /// Relative size difference that triggers an auto-size preset.
    pub auto_size_threshold: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_undo_steps: 50,
            max_history_mb: 100,
            display_width: 512,
            display_height: 512,
            resize_filter: Interpolation::Lanczos3,
            crop_padding: 3,
            auto_size_threshold: 0.15,
        }
    }
}

impl EngineSettings {
    pub fn display_size(&self) -> Size {
        Size::new(self.display_width, self.display_height)
    }

    pub fn max_history_bytes(&self) -> Option<usize> {
        (self.max_history_mb > 0).then(|| self.max_history_mb * 1024 * 1024)
    }

    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            filter: self.resize_filter,
            auto_size_threshold: self.auto_size_threshold,
        }
    }

    /// Platform config location; the directory is created on demand.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            let config_dir = PathBuf::from(appdata).join("CutoutFE");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("CutoutFE");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?
                .join("cutoutfe");
            let _ = std::fs::create_dir_all(&config_dir);
            Some(config_dir.join(SETTINGS_FILE))
        }
    }

    /// Load from the platform location. Missing or unreadable files yield
    /// the defaults.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else { return Self::default() };
        Self::parse(&content)
    }

    /// Unknown keys and bad values are ignored; each key falls back to its
    /// default on its own.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        let d = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "max_undo_steps" => {
                    s.max_undo_steps = val.parse().ok().filter(|n| *n > 0).unwrap_or(d.max_undo_steps);
                }
                "max_history_mb" => {
                    s.max_history_mb = val.parse().unwrap_or(d.max_history_mb);
                }
                "display_width" => {
                    s.display_width = val.parse().ok().filter(|n| *n > 0).unwrap_or(d.display_width);
                }
                "display_height" => {
                    s.display_height = val.parse().ok().filter(|n| *n > 0).unwrap_or(d.display_height);
                }
                "resize_filter" => {
                    s.resize_filter = val.parse().unwrap_or(d.resize_filter);
                }
                "crop_padding" => {
                    s.crop_padding = val.parse().unwrap_or(d.crop_padding);
                }
                "auto_size_threshold" => {
                    s.auto_size_threshold = val
                        .parse::<f32>()
                        .ok()
                        .filter(|t| t.is_finite() && *t >= 0.0)
                        .unwrap_or(d.auto_size_threshold);
                }
                other => log::debug!("ignoring unknown setting '{}'", other),
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "max_undo_steps={}\n\
             max_history_mb={}\n\
             display_width={}\n\
             display_height={}\n\
             resize_filter={}\n\
             crop_padding={}\n\
             auto_size_threshold={}\n",
            self.max_undo_steps,
            self.max_history_mb,
            self.display_width,
            self.display_height,
            self.resize_filter.label(),
            self.crop_padding,
            self.auto_size_threshold,
        )
    }

    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            log::warn!("could not save settings to {}: {}", path.display(), e);
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_config_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        let settings = EngineSettings {
            max_undo_steps: 12,
            max_history_mb: 0,
            display_width: 640,
            display_height: 480,
            resize_filter: Interpolation::Bicubic,
            crop_padding: 0,
            auto_size_threshold: 0.25,
        };
        settings.save_to(&path).unwrap();
        assert_eq!(EngineSettings::load_from(&path), settings);
        assert_eq!(settings.max_history_bytes(), None);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            EngineSettings::load_from(&dir.path().join("nope.cfg")),
            EngineSettings::default()
        );
    }

    #[test]
    fn bad_values_fall_back_per_key() {
        let s = EngineSettings::parse(
            "# comment\nmax_undo_steps=0\ndisplay_width=abc\ncrop_padding=7\nresize_filter=sinc\nfoo=bar\n",
        );
        assert_eq!(s.max_undo_steps, 50);
        assert_eq!(s.display_width, 512);
        assert_eq!(s.crop_padding, 7);
        assert_eq!(s.resize_filter, Interpolation::Lanczos3);
    }
}
