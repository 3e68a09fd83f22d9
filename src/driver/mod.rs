//! Browser capabilities the booking flow needs, independent of the engine
//! that provides them.

mod query;
pub mod webdriver;

#[cfg(test)]
pub mod fake;

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

pub use query::{Query, TextMatch};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("no element matches {0}")]
    NotFound(String),
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },
    #[error("webdriver request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webdriver returned {error}: {message}")]
    Protocol { error: String, message: String },
    #[error("unexpected webdriver response: {0}")]
    Malformed(String),
    #[error("storage state {path}: {source}")]
    StorageState {
        path: String,
        source: std::io::Error,
    },
    #[error("storage state is not valid json: {0}")]
    StorageFormat(#[from] serde_json::Error),
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Opens pages, optionally seeded with a persisted storage state.
#[async_trait]
pub trait Browser: Send + Sync {
    type Page: Page;

    /// Opens a page in a new browsing context. When `storage_state` is given the
    /// context starts with the cookies recorded in that artifact.
    async fn open_page(&self, storage_state: Option<&Path>) -> DriverResult<Self::Page>;
}

#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str) -> DriverResult<()>;

    async fn click(&self, query: &Query) -> DriverResult<()>;

    async fn fill(&self, query: &Query, text: &str) -> DriverResult<()>;

    /// Picks the option of a `<select>` whose visible label is `label`.
    async fn select_option(&self, query: &Query, label: &str) -> DriverResult<()>;

    /// Returns whether a matching element showed up before `timeout` elapsed.
    async fn wait_for(&self, query: &Query, timeout: Duration) -> DriverResult<bool>;

    /// Waits for the document to finish loading. Errors with
    /// [`DriverError::Timeout`] when it doesn't within `timeout`.
    async fn wait_until_settled(&self, timeout: Duration) -> DriverResult<()>;

    async fn text_content(&self, query: &Query) -> DriverResult<String>;

    /// Text of every matching element, in document order.
    async fn all_text_contents(&self, query: &Query) -> DriverResult<Vec<String>>;

    /// Writes the context's storage state to `path`, replacing any previous file.
    async fn save_storage_state(&self, path: &Path) -> DriverResult<()>;

    async fn close(&self) -> DriverResult<()>;
}
