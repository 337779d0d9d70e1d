//! Merges base options with per-suite overrides and validates the result.
//!
//! Pure: no I/O, no network. Every check here runs before the first call
//! to the branching service.

use crate::domain::errors::{ConfigError, MAX_EXPIRY_SECONDS};
use crate::domain::models::{EffectiveOptions, Expiry, NeonTestingOptions, SuiteOverrides};
use crate::infrastructure::retry::RetryPolicy;

/// Validate an expiry, yielding whole seconds or `None` when disabled.
pub fn validate_expiry(expiry: Expiry) -> Result<Option<u32>, ConfigError> {
    let Expiry::Seconds(secs) = expiry else {
        return Ok(None);
    };

    if !secs.is_finite() || secs.fract() != 0.0 {
        return Err(ConfigError::ExpiryNotInteger(secs));
    }
    if secs <= 0.0 {
        return Err(ConfigError::ExpiryNotPositive(secs));
    }
    if secs > f64::from(MAX_EXPIRY_SECONDS) {
        return Err(ConfigError::ExpiryTooLong(secs));
    }

    // integral and within (0, MAX_EXPIRY_SECONDS], so the cast is exact
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let whole = secs as u32;
    Ok(Some(whole))
}

/// Checks that apply to factory-level options on their own.
pub fn validate_base(options: &NeonTestingOptions) -> Result<(), ConfigError> {
    if options.api_key.trim().is_empty() {
        return Err(ConfigError::MissingField("api_key"));
    }
    if options.project_id.trim().is_empty() {
        return Err(ConfigError::MissingField("project_id"));
    }
    if options.database_url_env.trim().is_empty() {
        return Err(ConfigError::MissingField("database_url_env"));
    }
    validate_expiry(options.expires_in)?;
    RetryPolicy::from_config(&options.retry)?;
    Ok(())
}

/// Merge `overrides` over `base`, field by field, and validate.
pub fn resolve(
    base: &NeonTestingOptions,
    overrides: Option<&SuiteOverrides>,
) -> Result<EffectiveOptions, ConfigError> {
    let default_overrides = SuiteOverrides::default();
    let overrides = overrides.unwrap_or(&default_overrides);

    if base.api_key.trim().is_empty() {
        return Err(ConfigError::MissingField("api_key"));
    }

    let project_id = overrides
        .project_id
        .clone()
        .unwrap_or_else(|| base.project_id.clone());
    if project_id.trim().is_empty() {
        return Err(ConfigError::MissingField("project_id"));
    }

    let database_url_env = overrides
        .database_url_env
        .clone()
        .unwrap_or_else(|| base.database_url_env.clone());
    if database_url_env.trim().is_empty() {
        return Err(ConfigError::MissingField("database_url_env"));
    }

    let retry = overrides.retry.unwrap_or(base.retry);
    RetryPolicy::from_config(&retry)?;

    Ok(EffectiveOptions {
        project_id,
        parent_branch_id: overrides
            .parent_branch_id
            .clone()
            .or_else(|| base.parent_branch_id.clone()),
        branch_init: overrides.branch_init.unwrap_or(base.branch_init),
        endpoint: overrides.endpoint.unwrap_or(base.endpoint),
        delete_branch: overrides.delete_branch.unwrap_or(base.delete_branch),
        auto_close_websockets: overrides
            .auto_close_websockets
            .unwrap_or(base.auto_close_websockets),
        expires_in_seconds: validate_expiry(overrides.expires_in.unwrap_or(base.expires_in))?,
        role_name: overrides.role_name.clone().or_else(|| base.role_name.clone()),
        database_name: overrides
            .database_name
            .clone()
            .or_else(|| base.database_name.clone()),
        database_url_env,
        retry,
    })
}
