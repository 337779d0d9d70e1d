use chrono::{Duration, TimeZone, Utc};
use neon_testing::domain::models::{BranchInit, BranchSpec};
use neon_testing::services::options_resolver::{resolve, validate_expiry};
use neon_testing::{ConfigError, EndpointKind, Expiry, NeonTestingOptions, SuiteOverrides};
use proptest::prelude::*;
use std::collections::HashSet;

fn base() -> NeonTestingOptions {
    NeonTestingOptions::new("napi_key", "proj-base")
}

proptest! {
    /// Property: Any whole number of seconds in (0, 30 days] is accepted as-is
    #[test]
    fn prop_valid_expiry_round_trips(secs in 1u32..=2_592_000) {
        prop_assert_eq!(validate_expiry(Expiry::Seconds(f64::from(secs))), Ok(Some(secs)));
    }

    /// Property: Non-positive expiry is always rejected as not positive
    #[test]
    fn prop_non_positive_expiry_rejected(secs in -1_000_000i32..=0) {
        let result = validate_expiry(Expiry::Seconds(f64::from(secs)));
        prop_assert!(matches!(result, Err(ConfigError::ExpiryNotPositive(_))));
    }

    /// Property: Anything past 30 days is rejected as too long
    #[test]
    fn prop_too_long_expiry_rejected(secs in 2_592_001u32..=u32::MAX) {
        let result = validate_expiry(Expiry::Seconds(f64::from(secs)));
        prop_assert!(matches!(result, Err(ConfigError::ExpiryTooLong(_))));
    }

    /// Property: Fractional expiry is rejected as not an integer
    #[test]
    fn prop_fractional_expiry_rejected(whole in 0u32..2_592_000, frac in 0.01f64..0.99) {
        let result = validate_expiry(Expiry::Seconds(f64::from(whole) + frac));
        prop_assert!(matches!(result, Err(ConfigError::ExpiryNotInteger(_))));
    }

    /// Property: A suite override always wins over the factory value
    ///
    /// For every overridable field, the effective value equals the override
    /// when present and the base value otherwise.
    #[test]
    fn prop_override_precedence(
        base_role in proptest::option::of("[a-z]{3,8}"),
        suite_role in proptest::option::of("[a-z]{3,8}"),
        base_delete in any::<bool>(),
        suite_delete in proptest::option::of(any::<bool>()),
        suite_direct in proptest::option::of(any::<bool>()),
        suite_expiry in proptest::option::of(1u32..=2_592_000),
        suite_project in proptest::option::of("proj-[a-z0-9]{4}"),
    ) {
        let mut options = base();
        options.role_name = base_role.clone();
        options.delete_branch = base_delete;

        let overrides = SuiteOverrides {
            role_name: suite_role.clone(),
            delete_branch: suite_delete,
            endpoint: suite_direct.map(|d| if d { EndpointKind::Direct } else { EndpointKind::Pooler }),
            expires_in: suite_expiry.map(Expiry::seconds),
            project_id: suite_project.clone(),
            ..SuiteOverrides::default()
        };

        let effective = resolve(&options, Some(&overrides)).unwrap();

        prop_assert_eq!(effective.role_name, suite_role.or(base_role));
        prop_assert_eq!(effective.delete_branch, suite_delete.unwrap_or(base_delete));
        prop_assert_eq!(
            effective.endpoint,
            overrides.endpoint.unwrap_or(EndpointKind::Pooler)
        );
        prop_assert_eq!(effective.expires_in_seconds, Some(suite_expiry.unwrap_or(600)));
        prop_assert_eq!(effective.project_id, suite_project.unwrap_or_else(|| "proj-base".to_string()));
    }

    /// Property: Generated branch specs never collide and expire at now + E
    #[test]
    fn prop_generated_specs_unique_with_exact_expiry(
        count in 2usize..50,
        expires_in in 1u32..=2_592_000,
        offset in 0i64..1_000_000_000,
    ) {
        let now = Utc.timestamp_opt(offset, 0).unwrap();
        let specs: Vec<BranchSpec> = (0..count)
            .map(|_| BranchSpec::generate(None, BranchInit::ParentData, Some(expires_in), now))
            .collect();

        let names: HashSet<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        prop_assert_eq!(names.len(), count);
        for spec in &specs {
            prop_assert_eq!(spec.expires_at, Some(now + Duration::seconds(i64::from(expires_in))));
        }
    }
}
