//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl SourceConfig {
    /// Build a connection URL for sqlx (password omitted).
    pub fn display_url(&self) -> String {
        format!(
            "mysql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

impl TargetConfig {
    /// Build a connection string for tokio-postgres (password omitted).
    pub fn display_url(&self) -> String {
        format!(
            "postgres://{}@{}:{}/{}?sslmode={}",
            self.user, self.host, self.port, self.database, self.ssl_mode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactFormat;

    const MINIMAL: &str = r#"
source:
  host: mysql.local
  database: shop
  user: root
  password: secret
target:
  host: pg.local
  database: shop
  user: postgres
  password: secret
"#;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.source.port, 3306);
        assert_eq!(config.target.port, 5432);
        assert_eq!(config.target.schema, "public");
        assert_eq!(config.target.ssl_mode, "disable");
        assert_eq!(config.export.format, ArtifactFormat::Json);
        assert_eq!(config.export.workers, 4);
        assert_eq!(config.import.batch_size, 1000);
        assert!(config.import.ignore_tables.is_empty());
    }

    #[test]
    fn test_from_yaml_reads_import_section() {
        let yaml = format!(
            "{}\nexport:\n  dir: /tmp/dump\n  format: csv\nimport:\n  batch_size: 250\n  ignore_tables: [audit_log]\n",
            MINIMAL
        );
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.export.format, ArtifactFormat::Csv);
        assert_eq!(config.export.dir, std::path::PathBuf::from("/tmp/dump"));
        assert_eq!(config.import.batch_size, 250);
        assert!(config.import.is_ignored("audit_log"));
        assert!(!config.import.is_ignored("Audit_Log"));
    }

    #[test]
    fn test_from_yaml_rejects_missing_target() {
        let yaml = "source:\n  host: a\n  database: b\n  user: c\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_display_url_omits_password() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.source.display_url(), "mysql://root@mysql.local:3306/shop");
        assert!(!config.target.display_url().contains("secret"));
    }
}
