//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use tutor_core::{FailurePolicy, ScheduleError, parse_timezone};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// What conflict checks report when their data cannot be read.
    #[serde(default)]
    pub conflict_policy: FailurePolicy,
    /// Zone used when a command gets no `--timezone`.
    #[serde(default)]
    pub default_timezone: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("conflict_policy", &self.conflict_policy)
            .field("default_timezone", &self.default_timezone)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("tutor.db"),
            conflict_policy: FailurePolicy::default(),
            default_timezone: None,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // TUTOR_DATABASE_PATH, TUTOR_CONFLICT_POLICY, TUTOR_DEFAULT_TIMEZONE
        figment = figment.merge(Env::prefixed("TUTOR_"));

        figment.extract()
    }

    /// The zone to use when none is given on the command line.
    ///
    /// Falls back to the system zone, then to UTC.
    pub fn timezone(&self) -> Result<Tz, ScheduleError> {
        if let Some(name) = &self.default_timezone {
            return parse_timezone(name);
        }
        match iana_time_zone::get_timezone() {
            Ok(name) => parse_timezone(&name).or_else(|err| {
                tracing::warn!(error = %err, "system timezone not recognized; using UTC");
                Ok(chrono_tz::UTC)
            }),
            Err(err) => {
                tracing::warn!(error = %err, "could not determine system timezone; using UTC");
                Ok(chrono_tz::UTC)
            }
        }
    }
}

/// Returns the platform-specific config directory for tutor.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tutor"))
}

/// Returns the platform-specific data directory for tutor.
///
/// On Linux: `~/.local/share/tutor`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("tutor"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("tutor.db"));
        assert_eq!(config.conflict_policy, FailurePolicy::Open);
    }

    #[test]
    fn dirs_data_path_ends_with_tutor() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "tutor");
    }

    #[test]
    fn config_file_overrides_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "database_path = \"/tmp/tutor-test.db\"\nconflict_policy = \"closed\"\ndefault_timezone = \"Asia/Tokyo\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/tutor-test.db"));
        assert_eq!(config.conflict_policy, FailurePolicy::Closed);
        assert_eq!(config.timezone().unwrap(), chrono_tz::Asia::Tokyo);
    }

    #[test]
    fn unknown_default_timezone_is_an_error() {
        let config = Config {
            default_timezone: Some("Mars/Olympus".to_string()),
            ..Config::default()
        };
        assert!(config.timezone().is_err());
    }
}
