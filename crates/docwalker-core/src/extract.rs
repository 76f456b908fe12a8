//! Declaration extractor boundary.
//!
//! The documentation builder hands a set of named source buffers to a
//! [`DeclExtractor`] and maps whatever comes back onto the package model.
//! The extractor is the only language-aware piece of the pipeline; the
//! rest of the system treats it as a black box.
//!
//! [`crate::gosrc::GoSourceExtractor`] is the built-in implementation.

use thiserror::Error;

use crate::models::{Example, Func, Type, Value};

/// One named source buffer.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// Input to an extraction run.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub import_path: String,
    /// Buildable source files, in source order. Readmes are never included.
    pub files: Vec<SourceFile>,
    /// Target operating system (`"linux"`, `"darwin"`, ...).
    pub goos: String,
    /// Target architecture (`"amd64"`, `"arm64"`, ...).
    pub goarch: String,
    /// Include unexported and undocumented declarations.
    pub all_decls: bool,
}

impl ExtractRequest {
    /// Request targeting the running host.
    pub fn for_host(import_path: impl Into<String>, files: Vec<SourceFile>) -> Self {
        let import_path = import_path.into();
        let all_decls = import_path == "builtin";
        Self {
            import_path,
            files,
            goos: host_goos().to_string(),
            goarch: host_goarch().to_string(),
            all_decls,
        }
    }
}

/// Everything an extractor reports about one package.
///
/// Declarations carry `file`/`line` positions; URLs and formatted
/// declarations are filled in later.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPackage {
    pub name: String,
    /// Package comment as plain text.
    pub doc: String,
    pub consts: Vec<Value>,
    pub vars: Vec<Value>,
    pub funcs: Vec<Func>,
    pub types: Vec<Type>,
    pub examples: Vec<Example>,
    pub imports: Vec<String>,
    pub test_imports: Vec<String>,
    /// Accepted non-test files, in source order.
    pub files: Vec<String>,
    pub test_files: Vec<String>,
    pub is_cgo: bool,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The directory holds no buildable source for the target platform.
    #[error("no buildable Go source files in {0}")]
    NoBuildable(String),

    #[error("found packages {first} and {second} in {import_path}")]
    MultiplePackages {
        import_path: String,
        first: String,
        second: String,
    },

    #[error("{file}: {message}")]
    Parse { file: String, message: String },
}

/// Black-box declaration extractor.
pub trait DeclExtractor: Send + Sync {
    fn extract(&self, req: &ExtractRequest) -> Result<ExtractedPackage, ExtractError>;
}

/// `GOOS` name of the running host.
pub fn host_goos() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// `GOARCH` name of the running host.
pub fn host_goarch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        other => other,
    }
}
