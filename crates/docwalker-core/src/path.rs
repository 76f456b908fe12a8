//! Import path rules.
//!
//! | Function | Purpose |
//! |----------|---------|
//! | [`is_valid_remote_path`] | structural check for a `go get`-able path |
//! | [`is_std_path`] | path lives in the standard library |
//! | [`is_valid_path`] | either of the above |
//! | [`is_doc_file`] | file is Go source or a readme |
//! | [`readme_locale`] | readme file name to locale tag |
//!
//! All checks are purely syntactic and never touch the network.

use regex::Regex;
use std::sync::LazyLock;

static VALID_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-a-z0-9]+(?:\.[-a-z0-9]+)+$").unwrap());

static VALID_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-A-Za-z0-9~+][-A-Za-z0-9_.]*$").unwrap());

/// Top-level directories of the standard library source tree.
const STD_ROOTS: &[&str] = &[
    "archive", "bufio", "builtin", "bytes", "cmp", "compress", "container", "context", "crypto",
    "database", "debug", "embed", "encoding", "errors", "expvar", "flag", "fmt", "go", "hash",
    "html", "image", "index", "io", "iter", "log", "maps", "math", "mime", "net", "os", "path",
    "plugin", "reflect", "regexp", "runtime", "slices", "sort", "strconv", "strings", "sync",
    "syscall", "testing", "text", "time", "unicode", "unique", "unsafe", "cmd",
];

/// Recognized top-level domains for the host segment.
const VALID_TLDS: &[&str] = &[
    ".ac", ".ai", ".app", ".at", ".be", ".biz", ".br", ".ca", ".cc", ".ch", ".cloud", ".cn",
    ".co", ".com", ".cz", ".de", ".dev", ".dk", ".edu", ".es", ".eu", ".fi", ".fm", ".fr",
    ".gov", ".gr", ".hk", ".id", ".ie", ".il", ".in", ".info", ".int", ".io", ".is", ".it",
    ".jp", ".kr", ".la", ".li", ".lt", ".lu", ".ly", ".me", ".mil", ".mobi", ".name", ".net",
    ".nl", ".no", ".nu", ".nz", ".org", ".page", ".pl", ".pro", ".pt", ".pw", ".re", ".ro",
    ".rs", ".ru", ".se", ".sg", ".sh", ".si", ".site", ".sk", ".so", ".space", ".su", ".tech",
    ".tk", ".to", ".tv", ".tw", ".ua", ".uk", ".us", ".vc", ".vn", ".ws", ".xyz", ".zone",
];

/// Directory names that never hold documentable Go code.
const FILTERED_DIRS: &[&str] = &["static", "docs", "views", "js", "assets", "public", "img", "css"];

fn is_valid_element(s: &str) -> bool {
    VALID_ELEMENT.is_match(s) && s != "testdata"
}

/// Extension of the host segment, including the dot (`"github.com"` → `".com"`).
fn host_ext(host: &str) -> &str {
    match host.rfind('.') {
        Some(i) => &host[i..],
        None => "",
    }
}

/// Returns true if `import_path` is structurally valid for a remote fetch.
///
/// The first segment must be a lower-case host whose extension is a known
/// TLD, there must be at least one `/`, and every later segment must be a
/// valid path element other than `testdata`.
pub fn is_valid_remote_path(import_path: &str) -> bool {
    let parts: Vec<&str> = import_path.split('/').collect();
    if parts.len() <= 1 {
        return false;
    }
    if !VALID_TLDS.contains(&host_ext(parts[0])) {
        return false;
    }
    if !VALID_HOST.is_match(parts[0]) {
        return false;
    }
    parts[1..].iter().all(|p| is_valid_element(p))
}

/// Returns true if `import_path` names a standard-library package.
pub fn is_std_path(import_path: &str) -> bool {
    let root = import_path.split('/').next().unwrap_or_default();
    if root.contains('.') || !STD_ROOTS.contains(&root) {
        return false;
    }
    import_path.split('/').all(is_valid_element)
}

/// Returns true if `import_path` is a std-lib path or a valid remote path.
pub fn is_valid_path(import_path: &str) -> bool {
    is_std_path(import_path) || is_valid_remote_path(import_path)
}

/// Returns true for a Go source file name (not `_`/`.`-prefixed) or a readme.
pub fn is_doc_file(name: &str) -> bool {
    is_go_file(name) || is_readme(name)
}

/// Returns true for a Go source file that takes part in the build.
pub fn is_go_file(name: &str) -> bool {
    name.ends_with(".go") && !name.starts_with('_') && !name.starts_with('.')
}

pub fn is_readme(name: &str) -> bool {
    name.to_lowercase().starts_with("readme")
}

/// Locale tag for a readme file name, or `None` if it is not a readme.
///
/// `README_ZH.md` and `readme_cn.txt` map to `"zh"`, any other readme to
/// `"en"`.
pub fn readme_locale(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    if !lower.starts_with("readme") {
        return None;
    }
    if lower.starts_with("readme_zh") || lower.starts_with("readme_cn") {
        Some("zh")
    } else {
        Some("en")
    }
}

/// Returns false when the path passes through a directory that only holds
/// static assets.
pub fn filter_dir_name(path: &str) -> bool {
    let lower = format!("/{}/", path.trim_matches('/').to_lowercase());
    !FILTERED_DIRS
        .iter()
        .any(|d| lower.contains(&format!("/{}/", d)))
}

/// Returns true for vendored import paths, which are never documented.
pub fn is_vendor_path(import_path: &str) -> bool {
    import_path.starts_with("vendor/") || import_path.contains("/vendor/")
}

/// Last path segment.
pub fn base_name(import_path: &str) -> &str {
    import_path.rsplit('/').next().unwrap_or(import_path)
}
