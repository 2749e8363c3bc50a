use crate::error::ConfigError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Folder layout of one installation.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Paths {
    pub work: PathBuf,
    pub l1: PathBuf,
    pub l2: PathBuf,
    pub dtm: PathBuf,
    pub processor: PathBuf,
    pub cams: Option<PathBuf>,
    pub gipp: Option<PathBuf>,
    pub userconf: Option<PathBuf>,
}

/// A century, the longest duration the `[scheduling]` keys accept.
const MAX_HOURS: i64 = 100 * 366 * 24;
const MAX_DAYS: i64 = 100 * 366;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Scheduling {
    pub max_backward_count: usize,
    pub product_date_tolerance_hours: i64,
    pub max_reference_age_days: i64,
    pub cams_window_hours: i64,
    pub abort_on_staging_error: bool,
}

impl Default for Scheduling {
    fn default() -> Self {
        Self {
            max_backward_count: 8,
            product_date_tolerance_hours: 12,
            max_reference_age_days: 30,
            cams_window_hours: 12,
            abort_on_staging_error: false,
        }
    }
}

// Durations are clamped to the validated range.
impl Scheduling {
    pub fn product_date_tolerance(&self) -> Duration {
        Duration::hours(self.product_date_tolerance_hours.clamp(0, MAX_HOURS))
    }

    pub fn max_reference_age(&self) -> Duration {
        Duration::days(self.max_reference_age_days.clamp(0, MAX_DAYS))
    }

    pub fn cams_window(&self) -> Duration {
        Duration::hours(self.cams_window_hours.clamp(0, MAX_HOURS))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    pub paths: Paths,
    #[serde(default)]
    pub scheduling: Scheduling,
}

impl Config {
    /// Parse and validate a folders file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let paths = &self.paths;
        for (key, dir) in [
            ("work", &paths.work),
            ("l1", &paths.l1),
            ("l2", &paths.l2),
            ("dtm", &paths.dtm),
        ] {
            require_dir(key, dir)?;
        }
        if !paths.processor.is_file() {
            return Err(ConfigError::MissingPath {
                key: "processor",
                path: paths.processor.clone(),
            });
        }
        match &paths.cams {
            Some(cams) => require_dir("cams", cams)?,
            None => warn!("No CAMS folder configured, running without aerosol data"),
        }
        if let Some(gipp) = &paths.gipp {
            require_dir("gipp", gipp)?;
        }
        if let Some(userconf) = &paths.userconf {
            require_dir("userconf", userconf)?;
        }

        let scheduling = &self.scheduling;
        if scheduling.max_backward_count == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_backward_count",
                reason: "must be at least 1".to_string(),
            });
        }
        for (key, value, max) in [
            ("product_date_tolerance_hours", scheduling.product_date_tolerance_hours, MAX_HOURS),
            ("max_reference_age_days", scheduling.max_reference_age_days, MAX_DAYS),
            ("cams_window_hours", scheduling.cams_window_hours, MAX_HOURS),
        ] {
            if value < 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: format!("{value} is negative"),
                });
            }
            if value > max {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: format!("{value} exceeds {max}"),
                });
            }
        }
        Ok(())
    }
}

fn require_dir(key: &'static str, dir: &Path) -> Result<(), ConfigError> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(ConfigError::MissingPath {
            key,
            path: dir.to_path_buf(),
        })
    }
}
