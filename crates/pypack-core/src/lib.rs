//! Core logic for pypack, independent of the task layer and the front end:
//! - Dotted version comparison.
//! - Registry lookups and package metadata normalization.
//! - Runtime release discovery from the documentation index.
//! - The runtime self-update pipeline.

pub mod auto_update;
mod feed;
mod metadata;
mod registry;
mod version;

/// Self-update pipeline types.
pub use auto_update::{
    LaunchReport, UpdateError, UpdateProgress, UpdateRequest, UpdateTaskState,
    download_and_launch,
};
/// Release index parsing and runtime update check.
pub use feed::{
    DEFAULT_FEED_URL, FeedEntry, FeedError, RuntimeUpdate, check_for_update, latest_in_series,
    parse_feed, update_from_feed,
};
/// Canonical package records and the normalizer that builds them.
pub use metadata::{NO_VERSIONS, PackageRecord, UNKNOWN, normalize};
/// Registry client, the lookup seam, and raw document types.
pub use registry::{
    DEFAULT_REGISTRY_URL, PackageRegistry, RawInfo, RawPackage, RawReleaseFile, RegistryClient,
    RegistryError, decode_package,
};
/// Version comparison helpers.
pub use version::{
    VersionError, compare, is_newer_version, max_version, release_order, release_series,
};
