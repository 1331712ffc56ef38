//! Domain logic - pure release rules independent of git and process I/O

pub mod branch;
pub mod commit;
pub mod secret;
pub mod tag;
pub mod version;

pub use branch::Trigger;
pub use commit::{CommitInfo, CommitMarkers};
pub use secret::Secret;
pub use tag::TagPattern;
pub use version::{Version, VersionBump};
