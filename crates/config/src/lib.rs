//! Layered configuration for modindex.
//!
//! Layers, later ones overriding earlier ones:
//!
//! 1. Built-in defaults.
//! 2. A TOML file: the one passed on the command line, otherwise
//!    `config.toml` in the platform configuration directory if it exists.
//! 3. Environment variables prefixed with `MODINDEX_`. Nested keys are
//!    separated by a double underscore, so `MODINDEX_FEED__LIMIT=500` sets
//!    `feed.limit`.
//!
//! ```toml
//! database = "/var/lib/modindex/index.db"
//!
//! [feed]
//! url = "https://index.golang.org/index"
//! limit = 2000
//! timeout = 60
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "MODINDEX_";
const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "index.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database holding the mirror.
    pub database: PathBuf,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    /// Records requested per poll.
    pub limit: u32,
    /// Per-request timeout, in seconds.
    pub timeout: u64,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        let database = project_dirs()
            .map(|dirs| dirs.data_dir().join(DATABASE_FILE))
            .unwrap_or_else(|| PathBuf::from(DATABASE_FILE));
        Self { database, feed: FeedConfig::default() }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: modindex_feed::DEFAULT_URL.to_string(),
            limit: modindex_feed::DEFAULT_LIMIT,
            timeout: 60,
            user_agent: concat!("modindex/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "modindex")
}

/// Location of the configuration file used when none is given explicitly.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Assemble the configuration layers without extracting them.
pub fn figment(file: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if let Some(file) = file {
        figment = figment.merge(Toml::file(file));
    }
    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate the configuration.
///
/// An explicit `file` must exist. Without one, the default location is used
/// only when there is a file there.
pub fn load(file: Option<&Path>) -> Result<Config> {
    let file = match file {
        Some(file) if !file.is_file() => exn::bail!(ErrorKind::NotFound(file.to_path_buf())),
        Some(file) => Some(file.to_path_buf()),
        None => default_config_path().filter(|path| path.is_file()),
    };
    if let Some(file) = &file {
        tracing::debug!(path = %file.display(), "loading configuration file");
    }
    from_figment(&figment(file.as_deref()))
}

/// Extract and validate a configuration from any set of layers.
pub fn from_figment(figment: &Figment) -> Result<Config> {
    let config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.database.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("database path is empty".to_string()));
        }
        if !self.feed.url.starts_with("https://") {
            exn::bail!(ErrorKind::Invalid(format!("feed.url must be an https URL, got {:?}", self.feed.url)));
        }
        if self.feed.limit == 0 {
            exn::bail!(ErrorKind::Invalid("feed.limit must be greater than zero".to_string()));
        }
        if self.feed.timeout == 0 {
            exn::bail!(ErrorKind::Invalid("feed.timeout must be greater than zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.feed.url, "https://index.golang.org/index");
        assert_eq!(config.feed.limit, 2000);
        assert_eq!(config.feed.timeout(), Duration::from_secs(60));
        assert!(config.database.ends_with("index.db"));
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database = \"/tmp/mirror.db\"\n\n[feed]\nlimit = 500").unwrap();
        let config = from_figment(&Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(file.path())))
            .unwrap();
        assert_eq!(config.database, PathBuf::from("/tmp/mirror.db"));
        assert_eq!(config.feed.limit, 500);
        assert_eq!(config.feed.timeout, 60, "unset keys keep their default");
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("modindex.toml", "[feed]\nlimit = 500\ntimeout = 5")?;
            jail.set_env("MODINDEX_FEED__LIMIT", "100");
            jail.set_env("MODINDEX_DATABASE", "env.db");
            let config = load(Some(Path::new("modindex.toml"))).unwrap();
            assert_eq!(config.feed.limit, 100);
            assert_eq!(config.feed.timeout, 5);
            assert_eq!(config.database, PathBuf::from("env.db"));
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = load(Some(&path)).unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound(path));
    }

    #[test]
    fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[feed]\nlimit = \"lots\"").unwrap();
        let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(file.path()));
        let err = from_figment(&figment).unwrap_err();
        assert_eq!(*err, ErrorKind::Load);
    }

    #[rstest]
    #[case("[feed]\nlimit = 0", "feed.limit")]
    #[case("[feed]\ntimeout = 0", "feed.timeout")]
    #[case("[feed]\nurl = \"http://index.golang.org/index\"", "feed.url")]
    #[case("database = \"\"", "database")]
    fn test_invalid_values(#[case] toml: &str, #[case] key: &str) {
        let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml));
        let err = from_figment(&figment).unwrap_err();
        match &*err {
            ErrorKind::Invalid(message) => assert!(message.contains(key), "{message}"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }
}
