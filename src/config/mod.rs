//! TOML configuration loading.
//!
//! The configuration types live in `cf_core::config`; this module finds and
//! parses the file and applies the hard checks.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use cf_core::config::*;

/// Locations searched when no path is given, in order.
pub const DEFAULT_PATHS: [&str; 2] = ["./convertforge.toml", "~/.config/convertforge/config.toml"];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content)
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    Ok(config)
}

/// Parse and check TOML content.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse TOML")?;
    config.check()?;
    Ok(config)
}

/// The first default location that exists.
pub fn find_default_config() -> Option<PathBuf> {
    DEFAULT_PATHS.iter().find_map(|path_str| {
        let path = PathBuf::from(shellexpand::tilde(path_str).as_ref());
        path.exists().then_some(path)
    })
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    match find_default_config() {
        Some(path) => {
            tracing::debug!("Using config file {:?}", path);
            load_config(&path)
        }
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.queue.concurrency, 2);
        assert_eq!(config.engine.exec_timeout_secs, 300);
        assert_eq!(config.image.max_dimension, 4096);
        assert_eq!(config.packaging.archive_name, "converted_files");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = parse_config(
            r#"
[queue]
concurrency = 3

[engine]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
"#,
        )
        .unwrap();
        assert_eq!(config.queue.concurrency, 3);
        assert!(config.queue.release_engine_when_idle);
        assert_eq!(
            config.engine.ffmpeg_path.as_deref(),
            Some(Path::new("/opt/ffmpeg/bin/ffmpeg"))
        );
        assert_eq!(config.engine.exec_retries, 1);
    }

    #[test]
    fn hard_errors_are_rejected() {
        assert!(parse_config("[queue]\nconcurrency = 0\n").is_err());
        assert!(parse_config("[packaging]\ncompression_level = 10\n").is_err());
        assert!(parse_config("[queue]\nconcurrency = \"two\"\n").is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[image]\nmax_dimension = 1024").unwrap();
        let config = load_config_or_default(Some(file.path())).unwrap();
        assert_eq!(config.image.max_dimension, 1024);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
