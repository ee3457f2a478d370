//! Configuration validation.

use super::Config;
use crate::drivers::SslMode;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }
    if !matches!(config.source.r#type.as_str(), "mysql" | "mariadb") {
        return Err(MigrateError::Config(format!(
            "source.type must be 'mysql' or 'mariadb', got '{}'",
            config.source.r#type
        )));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if config.target.schema.is_empty() {
        return Err(MigrateError::Config("target.schema is required".into()));
    }
    if config.target.r#type != "postgres" {
        return Err(MigrateError::Config(format!(
            "target.type must be 'postgres', got '{}'",
            config.target.r#type
        )));
    }
    SslMode::parse(&config.target.ssl_mode)?;

    // Export / import validation
    if config.export.dir.as_os_str().is_empty() {
        return Err(MigrateError::Config("export.dir is required".into()));
    }
    if config.export.workers == 0 {
        return Err(MigrateError::Config(
            "export.workers must be at least 1".into(),
        ));
    }
    if config.export.chunk_size == 0 {
        return Err(MigrateError::Config(
            "export.chunk_size must be at least 1".into(),
        ));
    }
    if config.import.batch_size == 0 {
        return Err(MigrateError::Config(
            "import.batch_size must be at least 1".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExportConfig, ImportConfig, SourceConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                r#type: "mysql".to_string(),
                host: "localhost".to_string(),
                port: 3306,
                database: "shop".to_string(),
                user: "root".to_string(),
                password: "password".to_string(),
            },
            target: TargetConfig {
                r#type: "postgres".to_string(),
                host: "localhost".to_string(),
                port: 5432,
                database: "shop".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                schema: "public".to_string(),
                ssl_mode: "disable".to_string(),
            },
            export: ExportConfig::default(),
            import: ImportConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_wrong_source_type() {
        let mut config = valid_config();
        config.source.r#type = "mssql".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_mariadb_source_accepted() {
        let mut config = valid_config();
        config.source.r#type = "mariadb".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_wrong_target_type() {
        let mut config = valid_config();
        config.target.r#type = "mysql".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_ssl_mode() {
        let mut config = valid_config();
        config.target.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = valid_config();
        config.import.batch_size = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("import.batch_size"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = valid_config();
        config.export.workers = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_123"));
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_456"));
    }
}
