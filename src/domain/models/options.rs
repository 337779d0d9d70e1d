use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::branch::{BranchInit, EndpointKind};

/// Environment variable database drivers read the connection string from.
pub const DEFAULT_DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Base URL of the Neon control-plane API.
pub const DEFAULT_API_BASE_URL: &str = "https://console.neon.tech/api/v2";

/// Branch expiry as supplied by the user, before validation.
///
/// Serialized as a number of seconds, or `null` for no expiry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expiry {
    /// The branch never expires on its own.
    Disabled,
    /// Expire this many seconds after creation.
    Seconds(f64),
}

impl Expiry {
    pub fn seconds(secs: u32) -> Self {
        Self::Seconds(f64::from(secs))
    }
}

impl Default for Expiry {
    fn default() -> Self {
        Self::Seconds(600.0)
    }
}

impl Serialize for Expiry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Disabled => serializer.serialize_none(),
            Self::Seconds(secs) => serializer.serialize_some(secs),
        }
    }
}

impl<'de> Deserialize<'de> for Expiry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.map_or(Self::Disabled, Self::Seconds))
    }
}

/// Retry settings for calls that may hit a locked branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_base_delay_ms() -> u64 {
    1_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// Factory-level options shared by every suite activation.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NeonTestingOptions {
    /// Neon API key (bearer credential).
    #[serde(default)]
    pub api_key: String,

    /// Project the branches are created in.
    #[serde(default)]
    pub project_id: String,

    /// Parent branch; the project's default branch when unset.
    #[serde(default)]
    pub parent_branch_id: Option<String>,

    #[serde(default)]
    pub branch_init: BranchInit,

    #[serde(default)]
    pub endpoint: EndpointKind,

    /// Delete the branch when the suite finishes.
    #[serde(default = "default_true")]
    pub delete_branch: bool,

    /// Track WebSocket connections to the branch and close them at teardown.
    #[serde(default)]
    pub auto_close_websockets: bool,

    #[serde(default)]
    pub expires_in: Expiry,

    #[serde(default)]
    pub role_name: Option<String>,

    #[serde(default)]
    pub database_name: Option<String>,

    #[serde(default = "default_database_url_env")]
    pub database_url_env: String,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

const fn default_true() -> bool {
    true
}

fn default_database_url_env() -> String {
    DEFAULT_DATABASE_URL_ENV.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

impl NeonTestingOptions {
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            ..Self::default()
        }
    }
}

impl Default for NeonTestingOptions {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            project_id: String::new(),
            parent_branch_id: None,
            branch_init: BranchInit::default(),
            endpoint: EndpointKind::default(),
            delete_branch: true,
            auto_close_websockets: false,
            expires_in: Expiry::default(),
            role_name: None,
            database_name: None,
            database_url_env: default_database_url_env(),
            retry: RetryConfig::default(),
            api_base_url: default_api_base_url(),
        }
    }
}

// Hand-written so the API key never ends up in logs.
impl std::fmt::Debug for NeonTestingOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeonTestingOptions")
            .field("api_key", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("parent_branch_id", &self.parent_branch_id)
            .field("branch_init", &self.branch_init)
            .field("endpoint", &self.endpoint)
            .field("delete_branch", &self.delete_branch)
            .field("auto_close_websockets", &self.auto_close_websockets)
            .field("expires_in", &self.expires_in)
            .field("role_name", &self.role_name)
            .field("database_name", &self.database_name)
            .field("database_url_env", &self.database_url_env)
            .field("retry", &self.retry)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

/// Per-suite overrides. Every field left `None` keeps the base value.
///
/// The credential and the API base URL cannot be overridden.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SuiteOverrides {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub parent_branch_id: Option<String>,
    #[serde(default)]
    pub branch_init: Option<BranchInit>,
    #[serde(default)]
    pub endpoint: Option<EndpointKind>,
    #[serde(default)]
    pub delete_branch: Option<bool>,
    #[serde(default)]
    pub auto_close_websockets: Option<bool>,
    /// A present `null` disables expiry; an absent field keeps the base value.
    #[serde(default, deserialize_with = "deserialize_expiry_override")]
    pub expires_in: Option<Expiry>,
    #[serde(default)]
    pub role_name: Option<String>,
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub database_url_env: Option<String>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn deserialize_expiry_override<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Expiry>, D::Error> {
    Expiry::deserialize(deserializer).map(Some)
}

/// Merged and validated options for one suite activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveOptions {
    pub project_id: String,
    pub parent_branch_id: Option<String>,
    pub branch_init: BranchInit,
    pub endpoint: EndpointKind,
    pub delete_branch: bool,
    pub auto_close_websockets: bool,
    /// Whole seconds until expiry, `None` when expiry is disabled.
    pub expires_in_seconds: Option<u32>,
    pub role_name: Option<String>,
    pub database_name: Option<String>,
    pub database_url_env: String,
    pub retry: RetryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = NeonTestingOptions::new("key", "proj");
        assert_eq!(options.branch_init, BranchInit::ParentData);
        assert_eq!(options.endpoint, EndpointKind::Pooler);
        assert!(options.delete_branch);
        assert!(!options.auto_close_websockets);
        assert_eq!(options.expires_in, Expiry::Seconds(600.0));
        assert_eq!(options.database_url_env, "DATABASE_URL");
    }

    #[test]
    fn test_expiry_null_deserializes_to_disabled() {
        let overrides: SuiteOverrides = serde_json::from_str(r#"{"expires_in": null}"#).unwrap();
        assert_eq!(overrides.expires_in, Some(Expiry::Disabled));

        let overrides: SuiteOverrides = serde_json::from_str("{}").unwrap();
        assert_eq!(overrides.expires_in, None);

        let expiry: Expiry = serde_json::from_str("null").unwrap();
        assert_eq!(expiry, Expiry::Disabled);

        let expiry: Expiry = serde_json::from_str("1.5").unwrap();
        assert_eq!(expiry, Expiry::Seconds(1.5));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let options = NeonTestingOptions::new("napi_secret", "proj");
        let rendered = format!("{options:?}");
        assert!(!rendered.contains("napi_secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
