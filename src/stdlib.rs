//! Standard-library backend: the GitHub protocol against the `golang/go`
//! mirror at `master`, directory `src/<path>`.

use docwalker_core::builder::GITHUB_LINE_FMT;
use docwalker_core::models::PackageRecord;

use crate::error::CrawlError;
use crate::fetch::Fetched;
use crate::github::GitHubClient;

const OWNER: &str = "golang";
const REPO: &str = "go";
const BRANCH: &str = "master";

/// Browse path prefix of std-lib packages; requests that carry it are
/// stripped back to the plain import path.
pub const VIEW_PREFIX: &str = "github.com/golang/go/tree/master/src/";

impl GitHubClient {
    pub async fn fetch_std(&self, import_path: &str, saved_etag: &str) -> Result<Fetched, CrawlError> {
        let dir = format!("src/{}", import_path);
        let listing = self.list_dir(OWNER, REPO, BRANCH, &dir, saved_etag).await?;

        let mut record = PackageRecord::new(import_path);
        record.project_path = "github.com/golang/go".to_string();
        record.view_dir_path = format!("{}{}", VIEW_PREFIX, import_path);
        record.etag = listing.sha;
        record.is_std = true;
        record.subdirs = listing.subdirs;

        Ok(Fetched {
            record,
            sources: listing.sources,
            line_fmt: GITHUB_LINE_FMT.to_string(),
        })
    }
}

/// Strip the std-lib browse prefix, if present.
pub fn strip_view_prefix(import_path: &str) -> &str {
    import_path.strip_prefix(VIEW_PREFIX).unwrap_or(import_path)
}
