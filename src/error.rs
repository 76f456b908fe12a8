//! Crawl error taxonomy.
//!
//! Fetchers and the resolver return [`CrawlError`]; only the check layer
//! ([`crate::check`]) turns these into persisted mutations.
//!
//! | Variant | Meaning | Check layer reaction |
//! |---------|---------|----------------------|
//! | `InvalidRemotePath` | path fails structural rules | propagate (search instead) |
//! | `NoServiceMatch` | no static backend claims the path | internal, triggers discovery |
//! | `NotModified` | upstream revision equals saved etag | touch `created` only |
//! | `NotFound` | upstream says the resource is gone | delete record |
//! | `NoGoFiles` | directory holds nothing documentable | delete record |
//! | `MetaNotFound` | discovery page has no `go-import` meta | delete record |
//! | `FetchTimeout` | crawl exceeded the fetch timeout | propagate (try again) |
//! | `Vendor` | vendored import path | propagate |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid package remote path")]
    InvalidRemotePath,

    #[error("package remote path does not match any service")]
    NoServiceMatch,

    #[error("package has not been modified")]
    NotModified,

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("package does not contain Go files")]
    NoGoFiles,

    #[error("<meta> not found")]
    MetaNotFound,

    #[error("fetch package timeout")]
    FetchTimeout,

    #[error("import path looks like a vendor directory")]
    Vendor,

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrawlError {
    /// True when the package no longer exists upstream and its record
    /// should be dropped.
    pub fn is_gone(&self) -> bool {
        matches!(
            self,
            CrawlError::NotFound(_) | CrawlError::NoGoFiles | CrawlError::MetaNotFound
        )
    }

    pub fn other(msg: impl std::fmt::Display) -> Self {
        CrawlError::Other(anyhow::anyhow!("{}", msg))
    }
}

impl From<reqwest::Error> for CrawlError {
    fn from(e: reqwest::Error) -> Self {
        CrawlError::Other(e.into())
    }
}

impl From<sqlx::Error> for CrawlError {
    fn from(e: sqlx::Error) -> Self {
        CrawlError::Other(e.into())
    }
}

impl From<std::io::Error> for CrawlError {
    fn from(e: std::io::Error) -> Self {
        CrawlError::Other(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gone_classification() {
        assert!(CrawlError::NotFound("x".into()).is_gone());
        assert!(CrawlError::NoGoFiles.is_gone());
        assert!(CrawlError::MetaNotFound.is_gone());
        assert!(!CrawlError::FetchTimeout.is_gone());
        assert!(!CrawlError::InvalidRemotePath.is_gone());
        assert!(!CrawlError::other("boom").is_gone());
    }

    #[test]
    fn test_messages() {
        assert_eq!(CrawlError::MetaNotFound.to_string(), "<meta> not found");
        assert_eq!(
            CrawlError::NotFound("https://x/y".into()).to_string(),
            "resource not found: https://x/y"
        );
    }
}
