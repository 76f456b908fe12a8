//! One crawl: resolve, fetch, build, cross-reference, render readmes.
//!
//! The crawler is stateless between calls and never touches the database;
//! persisting the result is the job of [`crate::check`].

use std::sync::Arc;
use tracing::{info, warn};

use docwalker_core::builder::build_package;
use docwalker_core::extract::DeclExtractor;
use docwalker_core::models::Package;
use docwalker_core::xref;

use crate::error::CrawlError;
use crate::fetch::Fetched;
use crate::github::GitHubClient;
use crate::resolver::{FetchPlan, Resolver};
use crate::vcs::GitFetcher;

pub struct Crawler {
    resolver: Resolver,
    github: GitHubClient,
    git: GitFetcher,
    extractor: Arc<dyn DeclExtractor>,
}

impl Crawler {
    pub fn new(
        resolver: Resolver,
        github: GitHubClient,
        git: GitFetcher,
        extractor: Arc<dyn DeclExtractor>,
    ) -> Self {
        Self {
            resolver,
            github,
            git,
            extractor,
        }
    }

    /// Crawl `import_path`. `etag` is the saved revision, empty to force
    /// a rebuild.
    pub async fn crawl(&self, import_path: &str, etag: &str) -> Result<Package, CrawlError> {
        let plan = self.resolver.resolve(import_path).await?;
        let fetched = match &plan {
            FetchPlan::GitHub(m) => self.github.fetch(m, etag).await?,
            FetchPlan::Std { import_path } => self.github.fetch_std(import_path, etag).await?,
            FetchPlan::Vcs(m) => self.git.fetch(m, etag).await?,
        };
        let mut pkg = self.build(fetched);
        self.render_readmes(&mut pkg).await;
        Ok(pkg)
    }

    /// Render readmes as markdown. A locale that fails to render is
    /// written as plain text later.
    async fn render_readmes(&self, pkg: &mut Package) {
        for (lang, data) in &pkg.readmes {
            match self.github.render_markdown(&String::from_utf8_lossy(data)).await {
                Ok(html) => {
                    pkg.readme_html.insert(lang.clone(), html);
                }
                Err(e) => {
                    warn!(import_path = %pkg.record.import_path, lang = %lang, error = %e, "readme rendering failed")
                }
            }
        }
    }

    fn build(&self, fetched: Fetched) -> Package {
        let Fetched {
            record,
            sources,
            line_fmt,
        } = fetched;
        let built = build_package(record, &sources, &line_fmt, self.extractor.as_ref());
        if let Some(e) = &built.extract_error {
            warn!(import_path = %built.package.import_path(), error = %e, "no buildable declarations");
        }

        let mut pkg = built.package;
        xref::annotate(&mut pkg);
        info!(
            import_path = %pkg.import_path(),
            etag = %pkg.record.etag,
            files = pkg.files.len(),
            "crawled"
        );
        pkg
    }
}
