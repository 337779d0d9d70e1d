//! Domain models: branch requests and handles, and suite options.

pub mod branch;
pub mod options;

pub use branch::{
    Branch, BranchInit, BranchListing, BranchRecord, BranchSpec, ConnectionDescriptor,
    ConnectionUriRequest, CreatedBranch, EndpointKind, BRANCH_NAME_PREFIX, CONVENTIONAL_DATABASE,
    CONVENTIONAL_ROLE, MARKER_ANNOTATION_KEY, MARKER_ANNOTATION_VALUE,
};
pub use options::{
    EffectiveOptions, Expiry, NeonTestingOptions, RetryConfig, SuiteOverrides,
    DEFAULT_API_BASE_URL, DEFAULT_DATABASE_URL_ENV,
};
