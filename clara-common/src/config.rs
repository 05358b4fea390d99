//! Bootstrap configuration file resolution and loading
//!
//! Configuration file location follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User configuration directory (`<config_dir>/claramente/config.toml`)
//! 4. System-wide file on Linux (`/etc/claramente/config.toml`)
//! 5. None: compiled defaults are used

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory name used under the platform configuration directory
pub const APP_DIR_NAME: &str = "claramente";

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Locate the bootstrap configuration file
///
/// Explicit locations (CLI argument, environment variable) are returned even
/// if the file does not exist, so that the caller can warn about it.
/// Implicit locations are only returned when the file exists.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User configuration directory
    if let Some(path) = dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME)) {
        if path.exists() {
            return Some(path);
        }
    }

    // Priority 4: System-wide configuration
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR_NAME).join(CONFIG_FILE_NAME);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load a TOML configuration file into `T`
///
/// A missing file is not an error: a warning is logged and `T::default()` is
/// returned. A file that exists but cannot be read or parsed is an error.
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        debug!("No configuration file found, using defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Configuration file {} not found, using defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let config = toml::from_str::<T>(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Resolve a single string setting
///
/// Priority: command-line value, then environment variable, then the value
/// from the configuration file. Blank values are treated as absent.
pub fn resolve_setting(
    cli_value: Option<&str>,
    env_var_name: &str,
    file_value: Option<&str>,
) -> Option<String> {
    let non_blank = |s: &str| {
        let trimmed = s.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };

    cli_value
        .and_then(non_blank)
        .or_else(|| std::env::var(env_var_name).ok().as_deref().and_then(non_blank))
        .or_else(|| file_value.and_then(non_blank))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serial_test::serial;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        port: u16,
        name: String,
    }

    #[test]
    #[serial]
    fn test_cli_path_wins_over_env() {
        std::env::set_var("CLARA_TEST_CONFIG_A", "/from/env.toml");
        let path = resolve_config_path(Some(Path::new("/from/cli.toml")), "CLARA_TEST_CONFIG_A");
        assert_eq!(path, Some(PathBuf::from("/from/cli.toml")));
        std::env::remove_var("CLARA_TEST_CONFIG_A");
    }

    #[test]
    #[serial]
    fn test_env_path_used_without_cli() {
        std::env::set_var("CLARA_TEST_CONFIG_B", "/from/env.toml");
        let path = resolve_config_path(None, "CLARA_TEST_CONFIG_B");
        assert_eq!(path, Some(PathBuf::from("/from/env.toml")));
        std::env::remove_var("CLARA_TEST_CONFIG_B");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config: Sample =
            load_toml_config(Some(Path::new("/nonexistent/claramente/config.toml"))).unwrap();
        assert_eq!(config, Sample::default());

        let config: Sample = load_toml_config(None).unwrap();
        assert_eq!(config, Sample::default());
    }

    #[test]
    fn test_load_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 5810\nname = \"lector\"").unwrap();

        let config: Sample = load_toml_config(Some(file.path())).unwrap();
        assert_eq!(config.port, 5810);
        assert_eq!(config.name, "lector");
    }

    #[test]
    fn test_unparsable_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number").unwrap();

        let result: Result<Sample> = load_toml_config(Some(file.path()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_resolve_setting_priority() {
        std::env::set_var("CLARA_TEST_KEY", "env-key");
        assert_eq!(
            resolve_setting(Some("cli-key"), "CLARA_TEST_KEY", Some("file-key")).as_deref(),
            Some("cli-key")
        );
        assert_eq!(
            resolve_setting(None, "CLARA_TEST_KEY", Some("file-key")).as_deref(),
            Some("env-key")
        );
        std::env::remove_var("CLARA_TEST_KEY");
        assert_eq!(
            resolve_setting(Some("  "), "CLARA_TEST_KEY", Some("file-key")).as_deref(),
            Some("file-key")
        );
        assert_eq!(resolve_setting(None, "CLARA_TEST_KEY", None), None);
    }
}
