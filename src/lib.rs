//! # namedex - Prefix-searchable name index
//!
//! Local autocomplete index for a package registry's name/description pairs,
//! kept fresh by scheduled reconciliation against the remote feed.
//!
//! ## Features
//!
//! - **Ordered store**: SQLite-backed key-value index with prefix-range search
//! - **Minimal-diff refresh**: each cycle writes only what actually changed
//! - **Resilient fetch**: the feed download runs in a short-lived `curl`/`wget`
//!   child (with an in-process fallback), so large payloads never accumulate
//!   in a long-lived HTTP client
//! - **Offline fallback**: a snapshot of the last good payload serves stale
//!   results when the remote is unreachable
//!
//! ## Quick Start
//!
//! ```no_run
//! use namedex::{FeedReader, Fetcher, Store};
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = Store::open(std::path::Path::new("names.db"))?;
//! let fetcher = Fetcher::new(None)?;
//! let feed = FeedReader::new("https://example.com/allpackages.json".into(), fetcher, None);
//!
//! namedex::refresh::run_cycle(&store, &feed)?;
//! for entry in store.find("prim", Some(10))? {
//!     println!("{}: {}", entry.name, entry.description.unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod feed;
pub mod fetch;
pub mod refresh;
pub mod store;

pub use config::Config;
pub use feed::{FeedError, FeedReader, RemoteRecord};
pub use fetch::{FetchError, Fetcher, Strategy};
pub use refresh::{compute_diff, run_cycle, CycleReport, Refresher};
pub use store::{DiffOp, Entry, Store, StoreError};
