//! In-memory indexing of GitLab issues and merge requests
//!
//! # Architecture
//!
//! 1. **Project Index**: one per configured project, holding the items of its
//!    latest completed fetch. Replaced whole, never patched.
//! 2. **Completion Index**: an immutable merged view of every project, keyed by
//!    trigger prefix, rebuilt after each replace.
//! 3. **Catalog**: owns both and serializes publication so a rebuild never
//!    overwrites a newer one.
//! 4. **Refresh Scheduler**: one independent task per project that fetches,
//!    publishes, sleeps and retries with backoff.
//! 5. **Index Cache**: optional on-disk copy of every generation, used to
//!    answer completions before the first fetch returns.
//!
//! Readers only ever clone `Arc`s out of short-lived locks, so a completion
//! query never waits on network I/O.

pub mod cache;
pub mod catalog;
pub mod completion;
pub mod error;
pub mod project;
pub mod refresh;

pub use cache::{CachedProject, IndexCache};
pub use catalog::Catalog;
pub use completion::{CompletionIndex, CompletionView};
pub use error::{IndexError, IndexResult};
pub use project::{Generation, ProjectIndex, ProjectStatus, RefreshState};
pub use refresh::{fetch_generation, InitialFetch, RefreshScheduler, RefreshSettings, DEFAULT_REFRESH_INTERVAL};
