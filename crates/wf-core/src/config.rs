use crate::error::ConfigError;
use crate::types::enums::BuildMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const CONFIG_DIR: &str = ".webforge";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_PORT: u16 = 4830;

/// How the execution mode of a new build is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModePolicy {
    /// Client mode when the project already has files, server mode otherwise.
    #[default]
    Auto,
    Client,
    Server,
}

impl ModePolicy {
    pub fn select(self, has_files: bool) -> BuildMode {
        match self {
            Self::Auto if has_files => BuildMode::Client,
            Self::Auto => BuildMode::Server,
            Self::Client => BuildMode::Client,
            Self::Server => BuildMode::Server,
        }
    }
}

impl FromStr for ModePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "client" => Ok(Self::Client),
            "server" => Ok(Self::Server),
            other => Err(ConfigError::Invalid {
                message: format!("unknown mode: {other}"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    #[default]
    En,
    Es,
}

impl FromStr for Locale {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        match tag.split(['-', '_']).next().unwrap_or_default() {
            "en" => Ok(Self::En),
            "es" => Ok(Self::Es),
            _ => Err(ConfigError::Invalid {
                message: format!("unsupported locale: {s}"),
            }),
        }
    }
}

/// External command backing one collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: String,
    pub timeout_secs: Option<u64>,
}

impl CommandSpec {
    pub fn argv(&self) -> Result<Vec<String>, ConfigError> {
        let argv = shell_words::split(&self.command).map_err(|err| ConfigError::Invalid {
            message: err.to_string(),
        })?;
        if argv.is_empty() {
            return Err(ConfigError::Invalid {
                message: "command empty".to_string(),
            });
        }
        Ok(argv)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub max_fix_attempts: u32,
    pub stale_after_secs: u64,
    pub auto_apply_window_secs: u64,
    pub poll_interval_secs: u64,
    pub mode: ModePolicy,
    pub review: bool,
    pub locale: Locale,
    pub generator: Option<CommandSpec>,
    pub reviewer: Option<CommandSpec>,
    pub worker: Option<CommandSpec>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            db_path: Path::new(CONFIG_DIR).join("forge.db"),
            port: DEFAULT_PORT,
            max_fix_attempts: 2,
            stale_after_secs: 300,
            auto_apply_window_secs: 300,
            poll_interval_secs: 15,
            mode: ModePolicy::Auto,
            review: true,
            locale: Locale::En,
            generator: None,
            reviewer: None,
            worker: None,
        }
    }
}

impl ForgeConfig {
    /// Reads `.webforge/config.toml` under `root` and applies `WEBFORGE_*` overrides.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(&root.join(CONFIG_DIR).join(CONFIG_FILE))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    message: err.to_string(),
                });
            }
        };
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Invalid {
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("WEBFORGE_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(port) = lookup("WEBFORGE_PORT") {
            self.port = parse_env("WEBFORGE_PORT", &port)?;
        }
        if let Some(max) = lookup("WEBFORGE_MAX_FIX_ATTEMPTS") {
            self.max_fix_attempts = parse_env("WEBFORGE_MAX_FIX_ATTEMPTS", &max)?;
        }
        if let Some(mode) = lookup("WEBFORGE_MODE") {
            self.mode = mode.parse()?;
        }
        if let Some(locale) = lookup("WEBFORGE_LOCALE") {
            self.locale = locale.parse()?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.stale_after_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "stale_after_secs must be positive".to_string(),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "poll_interval_secs must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.stale_after_secs).unwrap_or(i64::MAX))
    }

    pub fn auto_apply_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.auto_apply_window_secs).unwrap_or(i64::MAX))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn db_path_string(&self) -> String {
        self.db_path.to_string_lossy().to_string()
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        message: format!("{key} has invalid value: {value}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_apply_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = ForgeConfig::from_file(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, ForgeConfig::default());
        assert_eq!(config.max_fix_attempts, 2);
        assert_eq!(config.stale_after(), chrono::Duration::minutes(5));
    }

    #[test]
    fn parses_tables_and_keys() {
        let config = ForgeConfig::parse(
            r#"
max_fix_attempts = 3
mode = "server"
locale = "es"
review = false

[reviewer]
command = "node review.js --strict"
timeout_secs = 30
"#,
        )
        .unwrap();
        assert_eq!(config.max_fix_attempts, 3);
        assert_eq!(config.mode, ModePolicy::Server);
        assert_eq!(config.locale, Locale::Es);
        assert!(!config.review);
        let reviewer = config.reviewer.unwrap();
        assert_eq!(reviewer.argv().unwrap(), vec!["node", "review.js", "--strict"]);
        assert_eq!(reviewer.timeout(), Some(Duration::from_secs(30)));
        assert!(config.generator.is_none());
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("WEBFORGE_PORT", "9000"),
            ("WEBFORGE_MODE", "client"),
            ("WEBFORGE_LOCALE", "es-MX"),
            ("WEBFORGE_DB_PATH", "/tmp/forge.db"),
        ]
        .into_iter()
        .collect();
        let mut config = ForgeConfig::default();
        config
            .apply_env(|key| env.get(key).map(ToString::to_string))
            .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.mode, ModePolicy::Client);
        assert_eq!(config.locale, Locale::Es);
        assert_eq!(config.db_path, PathBuf::from("/tmp/forge.db"));
    }

    #[test]
    fn invalid_env_values_are_rejected() {
        let mut config = ForgeConfig::default();
        let err = config
            .apply_env(|key| (key == "WEBFORGE_MAX_FIX_ATTEMPTS").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn auto_mode_follows_file_presence() {
        assert_eq!(ModePolicy::Auto.select(true), BuildMode::Client);
        assert_eq!(ModePolicy::Auto.select(false), BuildMode::Server);
        assert_eq!(ModePolicy::Server.select(true), BuildMode::Server);
    }

    #[test]
    fn empty_command_is_invalid() {
        let spec = CommandSpec {
            command: "   ".to_string(),
            timeout_secs: None,
        };
        assert!(spec.argv().is_err());
    }
}
