//! Core data models used throughout docwalker.
//!
//! [`Source`] is a fetched file, [`Package`] is the transient documentation
//! model produced by a crawl, and [`PackageRecord`] / [`ArtifactRecord`]
//! are the persisted rows that survive between requests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structural version of the documentation model.
///
/// Records written with an older version are rebuilt on their next view.
pub const PACKAGE_VERSION: i64 = 1;

/// Maximum stored synopsis length in bytes.
pub const MAX_SYNOPSIS_LEN: usize = 255;

/// Static ranking bonus for standard-library packages.
pub const PRIORITY_STD: i64 = 99;
/// Static ranking bonus for `golang.org/x` subrepositories.
pub const PRIORITY_SUBREPO: i64 = 80;

/// A fetched file.
#[derive(Debug, Clone, Default)]
pub struct Source {
    pub name: String,
    pub browse_url: String,
    pub raw_url: String,
    pub data: Vec<u8>,
}

impl Source {
    pub fn new(name: impl Into<String>, browse_url: impl Into<String>, raw_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            browse_url: browse_url.into(),
            raw_url: raw_url.into(),
            data: Vec::new(),
        }
    }
}

/// A const or var declaration group.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Value {
    pub names: Vec<String>,
    pub doc: String,
    pub decl: String,
    pub fmt_decl: String,
    pub url: String,
    pub file: String,
    pub line: usize,
}

/// A function or method.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Func {
    pub name: String,
    /// Receiver type name for methods, empty for plain functions.
    pub recv: String,
    pub doc: String,
    pub decl: String,
    pub fmt_decl: String,
    pub code: String,
    pub url: String,
    pub file: String,
    pub line: usize,
    pub examples: Vec<Example>,
}

/// A named type with everything the documentation groups under it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Type {
    pub name: String,
    pub doc: String,
    pub decl: String,
    pub fmt_decl: String,
    pub url: String,
    pub file: String,
    pub line: usize,
    pub consts: Vec<Value>,
    pub vars: Vec<Value>,
    /// Constructors: functions returning this type.
    pub funcs: Vec<Func>,
    pub methods: Vec<Func>,
    pub examples: Vec<Example>,
}

/// A runnable example taken from a test file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Example {
    /// Name with the `Example` prefix removed (`""`, `"Foo"`, `"T_M"`).
    pub name: String,
    pub doc: String,
    pub code: String,
    pub output: String,
}

/// Persisted per-package metadata.
///
/// The import path is unique and never changes once the record exists.
/// `etag` only changes through a successful fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PackageRecord {
    pub id: i64,
    pub import_path: String,
    pub project_path: String,
    pub view_dir_path: String,
    pub synopsis: String,
    pub etag: String,
    pub is_cmd: bool,
    pub is_std: bool,
    pub is_subrepo: bool,
    pub is_cgo: bool,
    pub pkg_ver: i64,
    pub priority: i64,
    pub views: i64,
    pub stars: i64,
    pub created: i64,
    pub last_viewed: i64,
    pub import_paths: Vec<String>,
    pub import_ids: Vec<i64>,
    pub ref_ids: Vec<i64>,
    pub subdirs: Vec<String>,
}

impl PackageRecord {
    pub fn new(import_path: impl Into<String>) -> Self {
        Self {
            import_path: import_path.into(),
            pkg_ver: PACKAGE_VERSION,
            ..Default::default()
        }
    }

    /// Static ranking bonus derived from the package facets.
    pub fn static_priority(&self) -> i64 {
        if self.is_std {
            PRIORITY_STD
        } else if self.is_subrepo {
            PRIORITY_SUBREPO
        } else {
            0
        }
    }

    /// Number of known importers.
    pub fn ref_num(&self) -> usize {
        self.ref_ids.len()
    }

    /// Add an importer id, keeping each id at most once.
    pub fn add_ref(&mut self, id: i64) -> bool {
        if self.ref_ids.contains(&id) {
            return false;
        }
        self.ref_ids.push(id);
        true
    }

    pub fn remove_ref(&mut self, id: i64) -> bool {
        let before = self.ref_ids.len();
        self.ref_ids.retain(|r| *r != id);
        before != self.ref_ids.len()
    }
}

/// Lifecycle state of a generated artifact.
///
/// Transitions only move forward: `None → Generated → Distributed →
/// Recycled`, or `Generated → Recycled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    None = 0,
    Generated = 1,
    Distributed = 2,
    Recycled = 3,
}

impl ArtifactStatus {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => ArtifactStatus::Generated,
            2 => ArtifactStatus::Distributed,
            3 => ArtifactStatus::Recycled,
            _ => ArtifactStatus::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactStatus::None => "none",
            ArtifactStatus::Generated => "generated",
            ArtifactStatus::Distributed => "distributed",
            ArtifactStatus::Recycled => "recycled",
        }
    }
}

/// Persisted record of one generated artifact set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: i64,
    pub pkg_id: i64,
    pub etag: String,
    pub status: ArtifactStatus,
    pub num_extra_files: i64,
}

/// The documentation model of one package at one revision.
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub record: PackageRecord,
    pub name: String,
    /// Package comment rendered as HTML.
    pub doc: String,
    pub consts: Vec<Value>,
    pub vars: Vec<Value>,
    pub funcs: Vec<Func>,
    pub types: Vec<Type>,
    /// Examples not attached to any func or type.
    pub examples: Vec<Example>,
    /// Accepted source files, in source order.
    pub files: Vec<String>,
    pub test_files: Vec<String>,
    pub imports: Vec<String>,
    pub test_imports: Vec<String>,
    /// Raw readme bytes keyed by locale (`"en"`, `"zh"`).
    pub readmes: BTreeMap<String, Vec<u8>>,
    /// Rendered readme HTML, for the locales the renderer accepted.
    pub readme_html: BTreeMap<String, String>,
}

impl Package {
    pub fn import_path(&self) -> &str {
        &self.record.import_path
    }

    /// True when the extractor found anything worth documenting.
    pub fn has_decls(&self) -> bool {
        !self.name.is_empty()
    }
}
