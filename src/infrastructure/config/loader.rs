use std::path::Path;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;

use crate::domain::errors::ConfigError;
use crate::domain::models::NeonTestingOptions;
use crate::services::options_resolver;

/// Project-local configuration file picked up by [`ConfigLoader::load`].
pub const CONFIG_FILE: &str = "neon-testing.yaml";

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load base options with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. `neon-testing.yaml` in the working directory (optional)
    /// 3. `NEON_TESTING_*` environment variables (nested with `__`)
    /// 4. `NEON_API_KEY` / `NEON_PROJECT_ID`
    pub fn load() -> Result<NeonTestingOptions, ConfigError> {
        Self::extract(Self::figment().merge(Yaml::file(CONFIG_FILE)))
    }

    /// Load base options from a specific file over the defaults
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<NeonTestingOptions, ConfigError> {
        let path = path.as_ref();
        let options: NeonTestingOptions = Figment::new()
            .merge(Serialized::defaults(NeonTestingOptions::default()))
            .merge(Yaml::file(path))
            .extract()
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;

        options_resolver::validate_base(&options)?;
        Ok(options)
    }

    fn figment() -> Figment {
        Figment::new().merge(Serialized::defaults(NeonTestingOptions::default()))
    }

    fn extract(figment: Figment) -> Result<NeonTestingOptions, ConfigError> {
        let options: NeonTestingOptions = figment
            .merge(Env::prefixed("NEON_TESTING_").split("__"))
            .merge(Env::raw().filter_map(|key| {
                if key.as_str().eq_ignore_ascii_case("NEON_API_KEY") {
                    Some("api_key".into())
                } else if key.as_str().eq_ignore_ascii_case("NEON_PROJECT_ID") {
                    Some("project_id".into())
                } else {
                    None
                }
            }))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        options_resolver::validate_base(&options)?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{BranchInit, EndpointKind, Expiry};
    use std::io::Write;

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
api_key: napi_test
project_id: proj-123
branch_init: schema-only
endpoint: direct
delete_branch: false
expires_in: null
retry:
  max_attempts: 3
";

        let options: NeonTestingOptions = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(options.project_id, "proj-123");
        assert_eq!(options.branch_init, BranchInit::SchemaOnly);
        assert_eq!(options.endpoint, EndpointKind::Direct);
        assert!(!options.delete_branch);
        assert_eq!(options.expires_in, Expiry::Disabled);
        assert_eq!(options.retry.max_attempts, 3);
        assert_eq!(options.retry.base_delay_ms, 1_000);
        options_resolver::validate_base(&options).expect("Parsed options should be valid");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_key: napi_file\nproject_id: proj-file\nexpires_in: 1200").unwrap();

        let options = ConfigLoader::load_from_file(file.path()).unwrap();

        assert_eq!(options.api_key, "napi_file");
        assert_eq!(options.project_id, "proj-file");
        assert_eq!(options.expires_in, Expiry::Seconds(1200.0));
        assert!(options.delete_branch);
    }

    #[test]
    fn test_load_from_file_rejects_invalid_expiry() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_key: k\nproject_id: p\nexpires_in: 2592001").unwrap();

        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ExpiryTooLong(_)));
    }

    #[test]
    fn test_load_reads_conventional_env_vars() {
        temp_env::with_vars(
            [
                ("NEON_API_KEY", Some("napi_env")),
                ("NEON_PROJECT_ID", Some("proj-env")),
                ("NEON_TESTING_AUTO_CLOSE_WEBSOCKETS", Some("true")),
                ("NEON_TESTING_RETRY__MAX_ATTEMPTS", Some("7")),
            ],
            || {
                let options = ConfigLoader::load().unwrap();
                assert_eq!(options.api_key, "napi_env");
                assert_eq!(options.project_id, "proj-env");
                assert!(options.auto_close_websockets);
                assert_eq!(options.retry.max_attempts, 7);
            },
        );
    }

    #[test]
    fn test_load_without_credentials_fails() {
        temp_env::with_vars(
            [
                ("NEON_API_KEY", None::<&str>),
                ("NEON_PROJECT_ID", None),
                ("NEON_TESTING_API_KEY", None),
                ("NEON_TESTING_PROJECT_ID", None),
            ],
            || {
                let err = ConfigLoader::load().unwrap_err();
                assert_eq!(err, ConfigError::MissingField("api_key"));
            },
        );
    }
}
