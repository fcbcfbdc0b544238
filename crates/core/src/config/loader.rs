use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides
///
/// Overrides use `FRAMEFLOW_<SECTION>__<KEY>`, e.g.
/// `FRAMEFLOW_ENGINE__WORKER_LIMIT=8`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("FRAMEFLOW_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::AcceleratorKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[engine]
worker_limit = 8
backpressure_pause_seconds = 0.5

[memory]
threshold_high = 0.9
accelerator = "nvidia_smi"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.engine.worker_limit, 8);
        assert_eq!(config.engine.batch_hint, 5);
        assert_eq!(config.engine.backpressure_pause_seconds, 0.5);
        assert_eq!(config.memory.threshold_high, 0.9);
        assert_eq!(config.memory.threshold_normal, 0.70);
        assert_eq!(config.memory.accelerator, AcceleratorKind::NvidiaSmi);
    }

    #[test]
    fn test_load_config_from_str_empty_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.engine.worker_limit, 4);
        assert!(config.memory.aggressive_cleanup_on_high_pressure);
        assert_eq!(config.progress.log_interval_secs, 10);
        assert!(config.assets.download);
    }

    #[test]
    fn test_load_config_from_str_wrong_type() {
        let toml = r#"
[engine]
worker_limit = "many"
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[engine]
batch_hint = 12

[assets]
models_dir = "/opt/models"
download = false
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.engine.batch_hint, 12);
        assert_eq!(config.assets.models_dir.to_str(), Some("/opt/models"));
        assert!(!config.assets.download);
    }
}
