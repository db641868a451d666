//! Pipeline configuration, loaded from TOML.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{NocturneError, Result};
use crate::keywords::Telescope;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub cal: CalConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// Per-telescope raw-frame directory layout, keyed by telescope tag.
    #[serde(default)]
    pub telescopes: BTreeMap<String, TelescopePaths>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Root of the raw-frame tree.
    pub path: PathBuf,
    /// Name of the per-night output subdirectory.
    pub reduced_dir: String,
    /// Keep per-pixel uncertainty planes on synthesized masters.
    pub save_uncertainty: bool,
    /// Overwrite existing reduced frames.
    pub overwrite: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data"),
            reduced_dir: "reduced".into(),
            save_uncertainty: false,
            overwrite: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalConfig {
    /// Root of the calibration archive (one subdirectory per telescope).
    pub path: PathBuf,
    /// Bound on the day-shifted fallback search window.
    pub max_day_shift: u32,
    /// Cap on raw frames per master; unset means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_num_frames: Option<usize>,
    /// Rebuild masters that already exist in the archive.
    pub overwrite: bool,
}

impl Default for CalConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("calibration"),
            max_day_shift: 5,
            max_num_frames: None,
            overwrite: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default log filter when RUST_LOG is unset (error, warn, info, debug).
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TelescopePaths {
    /// Subdirectory of `general.path` holding this telescope's nights.
    pub path: String,
    /// Suffix appended to the YYYYMMDD night folder name.
    #[serde(default)]
    pub dir_suffix: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| NocturneError::Config(format!("{}: {e}", path.display())))
    }

    /// A ready-to-edit configuration with the Wise Observatory telescopes.
    pub fn example() -> Self {
        let mut telescopes = BTreeMap::new();
        telescopes.insert(
            "C28".to_string(),
            TelescopePaths {
                path: "c28".into(),
                dir_suffix: String::new(),
            },
        );
        telescopes.insert(
            "C18".to_string(),
            TelescopePaths {
                path: "c18".into(),
                dir_suffix: String::new(),
            },
        );
        telescopes.insert(
            "1m".to_string(),
            TelescopePaths {
                path: "1m".into(),
                dir_suffix: String::new(),
            },
        );
        Self {
            telescopes,
            ..Default::default()
        }
    }

    fn telescope_paths(&self, telescope: Telescope) -> Result<&TelescopePaths> {
        self.telescopes.get(&telescope.to_string()).ok_or_else(|| {
            NocturneError::Config(format!(
                "no [telescopes.{telescope}] section in configuration"
            ))
        })
    }

    /// Directory holding one night's raw frames:
    /// `{general.path}/{telescope.path}/{YYYYMMDD}{dir_suffix}`.
    pub fn night_dir(&self, telescope: Telescope, date: NaiveDate) -> Result<PathBuf> {
        let tp = self.telescope_paths(telescope)?;
        let night = format!("{}{}", date.format("%Y%m%d"), tp.dir_suffix);
        Ok(self.general.path.join(&tp.path).join(night))
    }

    /// Output directory for a night's reduced frames.
    pub fn reduced_dir(&self, night_dir: &Path) -> PathBuf {
        night_dir.join(&self.general.reduced_dir)
    }
}
