use crate::core::ConfigProvider;
use crate::utils::error::{ProjectError, Result};
use crate::utils::validation::{validate_one_of, validate_positive_number, validate_url, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["compact", "json"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub store: StoreConfig,
    pub logging: Option<LoggingConfig>,
    pub submission: Option<SubmissionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub base_url: String,
    pub timeout_seconds: Option<u64>,
    pub headers: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    pub ordered: Option<bool>,
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ProjectError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Parses the configuration after replacing `${VAR}` with environment
    /// values. Unset variables are left as written.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ProjectError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ProjectError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn log_level(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .unwrap_or("info")
    }

    pub fn json_logging(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.format.as_deref())
            .map(|format| format == "json")
            .unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    fn base_url(&self) -> &str {
        &self.store.base_url
    }

    fn timeout_seconds(&self) -> Option<u64> {
        self.store.timeout_seconds
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.store
            .headers
            .iter()
            .flatten()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    fn ordered_submissions(&self) -> bool {
        self.submission
            .as_ref()
            .and_then(|s| s.ordered)
            .unwrap_or(false)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        validate_url("store.base_url", &self.store.base_url)?;

        if let Some(timeout) = self.store.timeout_seconds {
            validate_positive_number("store.timeout_seconds", timeout, 1)?;
        }

        if let Some(logging) = &self.logging {
            if let Some(level) = &logging.level {
                validate_one_of("logging.level", level, &LOG_LEVELS)?;
            }
            if let Some(format) = &logging.format {
                validate_one_of("logging.format", format, &LOG_FORMATS)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_basic_toml_config() {
        let toml_content = r#"
[store]
base_url = "https://tissuemaps.example.org"
timeout_seconds = 30

[store.headers]
Authorization = "Bearer abc"

[logging]
level = "debug"
format = "json"

[submission]
ordered = true
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.base_url(), "https://tissuemaps.example.org");
        assert_eq!(config.timeout_seconds(), Some(30));
        assert_eq!(
            config.headers(),
            vec![("Authorization".to_string(), "Bearer abc".to_string())]
        );
        assert_eq!(config.log_level(), "debug");
        assert!(config.json_logging());
        assert!(config.ordered_submissions());
    }

    #[test]
    fn test_defaults() {
        let config =
            TomlConfig::from_toml_str("[store]\nbase_url = \"http://localhost:5002\"\n").unwrap();

        assert!(config.headers().is_empty());
        assert_eq!(config.log_level(), "info");
        assert!(!config.json_logging());
        assert!(!config.ordered_submissions());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("JTPROJECT_TEST_TOKEN", "t0k3n");

        let toml_content = r#"
[store]
base_url = "http://localhost:5002"

[store.headers]
Authorization = "Bearer ${JTPROJECT_TEST_TOKEN}"
X-Unset = "${JTPROJECT_SURELY_UNSET}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        let headers: BTreeMap<String, String> = config.headers().into_iter().collect();
        assert_eq!(headers["Authorization"], "Bearer t0k3n");
        assert_eq!(headers["X-Unset"], "${JTPROJECT_SURELY_UNSET}");

        std::env::remove_var("JTPROJECT_TEST_TOKEN");
    }

    #[test]
    fn test_config_validation() {
        let bad_url = TomlConfig::from_toml_str("[store]\nbase_url = \"invalid-url\"\n").unwrap();
        assert!(bad_url.validate().is_err());

        let bad_format = TomlConfig::from_toml_str(
            "[store]\nbase_url = \"http://localhost\"\n[logging]\nformat = \"xml\"\n",
        )
        .unwrap();
        assert!(bad_format.validate().is_err());
    }

    #[test]
    fn test_missing_store_is_a_parse_error() {
        let err = TomlConfig::from_toml_str("[logging]\nlevel = \"info\"\n").unwrap_err();
        assert!(matches!(err, ProjectError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[store]\nbase_url = \"https://store.example.org\"\n")
            .unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.base_url(), "https://store.example.org");
    }
}
