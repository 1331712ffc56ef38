pub mod analyzer;
pub mod boundary;
pub mod config;
pub mod domain;
pub mod error;
pub mod git;
pub mod manifest;
pub mod pipeline;
pub mod stages;
pub mod telemetry;
pub mod ui;

pub use error::{ReleaseError, Result};
