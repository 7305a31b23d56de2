// ============================================================================
// ENGINE SETTINGS: persisted `key=value` configuration
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::ops::adjustments::MAX_BLUR_RADIUS;
use crate::ops::scheduler::Scheduler;

const SETTINGS_FILE: &str = "rasterlab_settings.cfg";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    /// Committed states kept for undo.
    pub max_undo_steps: usize,
    /// History memory cap in MiB; 0 disables the cap.
    pub max_history_mb: usize,
    /// Stripe workers per operation; 0 = one per hardware thread.
    pub worker_threads: usize,
    pub join_timeout_secs: u64,
    pub edge_blur_radius: u32,
    pub stego_bits: u8,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_undo_steps: 50,
            max_history_mb: 512,
            worker_threads: 0,
            join_timeout_secs: 600,
            edge_blur_radius: 4,
            stego_bits: 4,
        }
    }
}

impl EngineSettings {
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.worker_threads, Duration::from_secs(self.join_timeout_secs))
    }

    pub fn max_history_bytes(&self) -> Option<usize> {
        (self.max_history_mb > 0).then(|| self.max_history_mb * 1024 * 1024)
    }

    pub(crate) fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("rasterlab");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            let config_dir = PathBuf::from(appdata).join("RasterLab");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("RasterLab");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// Load from the platform config dir, falling back to defaults.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else { return Self::default() };
        Self::parse(&content)
    }

    /// Unknown keys are ignored; unparsable values keep their default.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "max_undo_steps" => {
                    if let Ok(v) = val.parse::<usize>()
                        && v > 0
                    {
                        s.max_undo_steps = v;
                    }
                }
                "max_history_mb" => {
                    if let Ok(v) = val.parse() {
                        s.max_history_mb = v;
                    }
                }
                "worker_threads" => {
                    if let Ok(v) = val.parse() {
                        s.worker_threads = v;
                    }
                }
                "join_timeout_secs" => {
                    if let Ok(v) = val.parse::<u64>()
                        && v > 0
                    {
                        s.join_timeout_secs = v;
                    }
                }
                "edge_blur_radius" => {
                    if let Ok(v) = val.parse::<u32>()
                        && v <= MAX_BLUR_RADIUS
                    {
                        s.edge_blur_radius = v;
                    }
                }
                "stego_bits" => {
                    if let Ok(v) = val.parse::<u8>()
                        && (1..=4).contains(&v)
                    {
                        s.stego_bits = v;
                    }
                }
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "max_undo_steps={}\n\
             max_history_mb={}\n\
             worker_threads={}\n\
             join_timeout_secs={}\n\
             edge_blur_radius={}\n\
             stego_bits={}\n",
            self.max_undo_steps,
            self.max_history_mb,
            self.worker_threads,
            self.join_timeout_secs,
            self.edge_blur_radius,
            self.stego_bits,
        )
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }

    /// Persist to the platform config dir. Failures are logged, not returned.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            tracing::warn!(path = %path.display(), error = %e, "could not save settings");
        }
    }
}
