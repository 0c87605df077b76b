//! GitLab integration for gitlab-ls
//!
//! This crate provides:
//! - The tracked data model (projects, issues, merge requests)
//! - The `ItemSource` seam the refresh cycles fetch through
//! - `GitLabClient`, a paginated REST v4 implementation of that seam

pub mod client;
pub mod errors;
pub mod models;

pub use client::{GitLabClient, ItemSource, PAGE_SIZE};
pub use errors::{FetchError, GitLabError, Result};
pub use models::{ItemKey, ItemKind, ItemState, ProjectPath, TrackedItem};
