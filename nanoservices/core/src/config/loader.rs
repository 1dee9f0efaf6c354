use std::path::Path;
use crate::config::types::RelayConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Load a relay config from a YAML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<RelayConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse a relay config from a YAML string.
pub fn parse_config(yaml: &str) -> Result<RelayConfig, ConfigError> {
    let config: RelayConfig = serde_yaml::from_str(yaml)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::SchedulerKind;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn parse_full_config() {
        let yaml = r#"
planner:
  scheduler: polling
  threads: 4
  refresh_interval: 200ms
  ignore_exceptions: true
  shutdown_at_exit: true

links:
  weather:
    interval: 5m
    tags: [weather, hourly]
    immediate_transfer: false

  heartbeat:
    interval: 1.5
    tags: beat
"#;

        let config = parse_config(yaml).unwrap();
        assert_eq!(config.planner.scheduler, SchedulerKind::Polling);
        assert_eq!(config.planner.threads, 4);
        assert_eq!(config.planner.refresh_interval.get(), Duration::from_millis(200));
        assert!(config.planner.ignore_exceptions);
        assert!(config.planner.immediate_transfer);

        assert_eq!(config.links.len(), 2);
        let weather = &config.links["weather"];
        assert_eq!(weather.interval.get(), Duration::from_secs(300));
        assert_eq!(
            weather.tags.clone().unwrap().into_vec(),
            vec!["weather", "hourly"]
        );
        assert_eq!(weather.immediate_transfer, Some(false));

        let heartbeat = &config.links["heartbeat"];
        assert_eq!(heartbeat.interval.get(), Duration::from_millis(1500));
        assert_eq!(heartbeat.tags.clone().unwrap().into_vec(), vec!["beat"]);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config.planner.scheduler, SchedulerKind::Interval);
        assert_eq!(config.planner.threads, 30);
        assert_eq!(config.planner.refresh_interval.get(), Duration::from_secs(1));
        assert!(!config.planner.shutdown_at_exit);
        assert!(config.links.is_empty());
    }

    #[test]
    fn bad_interval_is_a_parse_error() {
        let yaml = "links:\n  broken:\n    interval: whenever\n";
        assert!(matches!(parse_config(yaml), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "links:\n  a:\n    interval: 2s").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.links["a"].interval.get(), Duration::from_secs(2));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
