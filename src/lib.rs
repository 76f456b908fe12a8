//! # docwalker
//!
//! Resolve Go import paths to their hosting backends, fetch the package
//! sources, build documentation with cross-references and highlighted
//! code, and manage the generated static artifacts through their
//! lifecycle.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────────┐   ┌──────────┐
//! │ Resolver │──▶│ Fetchers │──▶│  Doc build  │──▶│ Artifacts│
//! │ static / │   │ GitHub / │   │ extract +   │   │ chunks + │
//! │ <meta>   │   │ std / git│   │ xref + html │   │  SQLite  │
//! └──────────┘   └──────────┘   └─────────────┘   └────┬─────┘
//!                                                      │
//!                               ┌──────────────────────┤
//!                               ▼                      ▼
//!                          ┌──────────┐         ┌────────────┐
//!                          │  Check   │         │ Lifecycle  │
//!                          │ CLI/HTTP │         │ distribute │
//!                          └──────────┘         │  recycle   │
//!                                               └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docwalker init
//! docwalker get github.com/gorilla/mux
//! docwalker serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`app`] | Component wiring |
//! | [`artifacts`] | Local chunk files and artifact rows |
//! | [`check`] | Staleness decision, timed crawl, persistence |
//! | [`config`] | TOML configuration parsing |
//! | [`crawl`] | Resolve, fetch and build one package |
//! | [`db`] | Database connection |
//! | [`error`] | Crawl error taxonomy |
//! | [`fetch`] | Tree partitioning and concurrent file fetches |
//! | [`github`] | GitHub backend |
//! | [`http`] | HTTP client helpers |
//! | [`lifecycle`] | Distribute and recycle passes |
//! | [`logging`] | Tracing subscriber setup |
//! | [`migrate`] | Schema migrations |
//! | [`object_store`] | S3-compatible object storage |
//! | [`packages`] | Package records and reference graph |
//! | [`render`] | HTML templates |
//! | [`resolver`] | Import path to backend resolution |
//! | [`server`] | HTTP server |
//! | [`stats`] | Catalog statistics |
//! | [`stdlib`] | Standard library fetches |
//! | [`vcs`] | Generic git fetcher |

pub mod app;
pub mod artifacts;
pub mod check;
pub mod config;
pub mod crawl;
pub mod db;
pub mod error;
pub mod fetch;
pub mod github;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod migrate;
pub mod object_store;
pub mod packages;
pub mod render;
pub mod resolver;
pub mod server;
pub mod stats;
pub mod stdlib;
pub mod vcs;
