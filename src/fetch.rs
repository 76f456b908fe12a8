//! Shared fetch helpers: tree partitioning and the concurrent file fetch.
//!
//! Every backend lists a directory, keeps the documentable files directly
//! inside it, and downloads them concurrently. The first failed download
//! fails the whole fetch; downloads still in flight are abandoned.

use reqwest::Client;
use tokio::sync::mpsc;
use tracing::debug;

use docwalker_core::models::{PackageRecord, Source};
use docwalker_core::path::{filter_dir_name, is_doc_file};

use crate::error::CrawlError;

/// Result of a successful backend fetch, ready for the builder.
#[derive(Debug)]
pub struct Fetched {
    /// Facets decided by the backend: project path, etag, flags, subdirs.
    pub record: PackageRecord,
    pub sources: Vec<Source>,
    /// Line fragment appended to browse URLs (`#L{line}`), empty if none.
    pub line_fmt: String,
}

/// Split tree entry paths into documentable files directly under
/// `dir_prefix` and the sorted, de-duplicated set of direct
/// subdirectories holding documentable files.
///
/// `dir_prefix` is empty for the repository root, otherwise it ends in `/`.
pub fn partition_tree<'a>(
    paths: impl IntoIterator<Item = &'a str>,
    dir_prefix: &str,
) -> (Vec<String>, Vec<String>) {
    let mut files = Vec::new();
    let mut subdirs: Vec<String> = Vec::new();

    for path in paths {
        let Some(rest) = path.strip_prefix(dir_prefix) else {
            continue;
        };
        match rest.rsplit_once('/') {
            None => {
                if is_doc_file(rest) {
                    files.push(rest.to_string());
                }
            }
            Some((sub, name)) => {
                if sub.contains('/') || !is_doc_file(name) || !filter_dir_name(sub) {
                    continue;
                }
                if !subdirs.iter().any(|s| s == sub) {
                    subdirs.push(sub.to_string());
                }
            }
        }
    }
    subdirs.sort();
    (files, subdirs)
}

/// Download every source's `raw_url`, preserving input order.
pub async fn fetch_files(client: &Client, sources: Vec<Source>) -> Result<Vec<Source>, CrawlError> {
    let total = sources.len();
    if total == 0 {
        return Ok(sources);
    }
    let (tx, mut rx) = mpsc::channel::<(usize, Result<Vec<u8>, CrawlError>)>(total);

    for (i, src) in sources.iter().enumerate() {
        let tx = tx.clone();
        let client = client.clone();
        let url = src.raw_url.clone();
        tokio::spawn(async move {
            let result = crate::http::get_bytes(&client, &url).await;
            // The receiver is gone once another download failed.
            let _ = tx.send((i, result)).await;
        });
    }
    drop(tx);

    let mut sources = sources;
    let mut received = 0;
    while let Some((i, result)) = rx.recv().await {
        sources[i].data = result?;
        received += 1;
        if received == total {
            break;
        }
    }
    if received != total {
        return Err(CrawlError::other("file fetch ended early"));
    }
    debug!(files = total, "fetched sources");
    Ok(sources)
}
