//! Per-user configuration file.
//!
//! The file lives at `~/.lostphotosfound/config` unless the CLI is given
//! another path (`--config` or `$LOSTPHOTOSFOUND_CONFIG`).
//!
//! On first run a template is written and the program stops so the operator
//! can fill in their credentials.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LostPhotosError, Result};

/// Name of the per-user configuration directory inside `$HOME`.
pub const CONFIG_DIR_NAME: &str = ".lostphotosfound";

/// Name of the configuration file inside [`CONFIG_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "config";

/// Section holding the IMAP account settings.
pub const GMAIL_SECTION: &str = "gmail";

/// Process exit code used after writing the template (sysexits `EX_CONFIG`).
pub const EXIT_CONFIG_NOT_READY: i32 = 78;

/// Credentials and host for the Gmail account.
#[derive(Debug, Clone, Serialize)]
pub struct GmailConfig {
    /// IMAP server address.
    pub host: String,
    /// Account name, also used as the output directory name.
    pub username: String,
    /// Account (or app-specific) password.
    pub password: String,
}

/// Optional runtime settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Directory under which the per-account folder is created.
    pub output_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            output_dir: None,
        }
    }
}

/// The template written on first run.
#[derive(Serialize)]
struct Template {
    gmail: GmailConfig,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            gmail: GmailConfig {
                host: "imap.gmail.com".to_string(),
                username: "username@gmail.com".to_string(),
                password: "password".to_string(),
            },
        }
    }
}

/// Result of opening the configuration.
#[derive(Debug)]
pub enum ConfigState {
    /// The file existed and was parsed.
    Ready(ConfigStore),
    /// No file was found; a template was written at this path and must be
    /// edited before the next run.
    Created(PathBuf),
}

/// Section/option lookup over the parsed configuration file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    table: toml::Table,
}

impl ConfigStore {
    /// Open the configuration at `path`, writing a template if it is missing.
    pub fn open(path: impl AsRef<Path>) -> Result<ConfigState> {
        let path = path.as_ref().to_path_buf();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        if !dir.is_dir() {
            create_private_dir(dir)?;
            write_template(&path)?;
            return Ok(ConfigState::Created(path));
        }
        if !path.is_file() {
            write_template(&path)?;
            return Ok(ConfigState::Created(path));
        }

        let contents =
            std::fs::read_to_string(&path).map_err(|e| LostPhotosError::io(&path, e))?;
        let store = Self::parse(path, &contents)?;
        tracing::info!(path = %store.path.display(), "Loaded config");
        Ok(ConfigState::Ready(store))
    }

    /// Parse configuration text that was read from `path`.
    pub fn parse(path: impl Into<PathBuf>, contents: &str) -> Result<Self> {
        let path = path.into();
        let table = contents
            .parse::<toml::Table>()
            .map_err(|e| LostPhotosError::config(&path, e.to_string()))?;
        Ok(Self { path, table })
    }

    /// Look up `option` in `[section]` as a string.
    pub fn get(&self, section: &str, option: &str) -> Result<String> {
        let value = self
            .table
            .get(section)
            .and_then(toml::Value::as_table)
            .ok_or_else(|| {
                LostPhotosError::config(&self.path, format!("no section: '{section}'"))
            })?
            .get(option)
            .ok_or_else(|| {
                LostPhotosError::config(
                    &self.path,
                    format!("no option '{option}' in section: '{section}'"),
                )
            })?;

        match value {
            toml::Value::String(s) => Ok(s.clone()),
            other => Ok(other.to_string()),
        }
    }

    /// The `[gmail]` section.
    pub fn gmail(&self) -> Result<GmailConfig> {
        Ok(GmailConfig {
            host: self.get(GMAIL_SECTION, "host")?,
            username: self.get(GMAIL_SECTION, "username")?,
            password: self.get(GMAIL_SECTION, "password")?,
        })
    }

    /// The optional `[general]` section; defaults when absent or invalid.
    pub fn general(&self) -> GeneralConfig {
        match self.table.get("general") {
            Some(value) => value.clone().try_into().unwrap_or_else(|e| {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to parse [general], using defaults"
                );
                GeneralConfig::default()
            }),
            None => GeneralConfig::default(),
        }
    }

    /// Path the configuration was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Default config file path inside the user's home directory.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::home_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn write_template(path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(&Template::default())
        .map_err(|e| LostPhotosError::config(path, e.to_string()))?;
    std::fs::write(path, contents).map_err(|e| LostPhotosError::io(path, e))?;
    tracing::info!(path = %path.display(), "Wrote config template");
    Ok(())
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(|e| LostPhotosError::io(dir, e))
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| LostPhotosError::io(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_run_creates_dir_and_template() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);

        let state = ConfigStore::open(&path).unwrap();
        assert!(matches!(state, ConfigState::Created(ref p) if p == &path));
        assert!(path.is_file());

        // Second open reads the template back
        let ConfigState::Ready(store) = ConfigStore::open(&path).unwrap() else {
            panic!("expected the template to load");
        };
        let gmail = store.gmail().unwrap();
        assert_eq!(gmail.host, "imap.gmail.com");
        assert_eq!(gmail.username, "username@gmail.com");
        assert_eq!(gmail.password, "password");
    }

    #[cfg(unix)]
    #[test]
    fn test_config_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join(CONFIG_DIR_NAME);
        ConfigStore::open(dir.join(CONFIG_FILE_NAME)).unwrap();
        let mode = std::fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn test_existing_dir_without_file_writes_template() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        let state = ConfigStore::open(&path).unwrap();
        assert!(matches!(state, ConfigState::Created(_)));
        assert!(path.is_file());
    }

    #[test]
    fn test_get_missing_option() {
        let store = ConfigStore::parse("cfg", "[gmail]\nhost = \"imap.gmail.com\"\n").unwrap();
        assert_eq!(store.get("gmail", "host").unwrap(), "imap.gmail.com");
        let err = store.get("gmail", "username").unwrap_err();
        assert!(err.to_string().contains("username"));
        assert!(store.get("other", "host").is_err());
        assert!(store.gmail().is_err());
    }

    #[test]
    fn test_general_defaults_and_overrides() {
        let store = ConfigStore::parse("cfg", "[gmail]\nhost = \"h\"\n").unwrap();
        let general = store.general();
        assert_eq!(general.log_level, "warn");
        assert!(general.output_dir.is_none());

        let store = ConfigStore::parse(
            "cfg",
            "[general]\nlog_level = \"debug\"\noutput_dir = \"/srv/photos\"\n",
        )
        .unwrap();
        let general = store.general();
        assert_eq!(general.log_level, "debug");
        assert_eq!(general.output_dir, Some(PathBuf::from("/srv/photos")));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ConfigStore::parse("cfg", "[gmail\nhost = ").unwrap_err();
        assert!(matches!(err, LostPhotosError::Config { .. }));
    }
}
