//! Documentation builder.
//!
//! Turns fetched [`Source`] files into a [`Package`]: readmes are set
//! aside by locale, Go files are handed to a [`DeclExtractor`], and every
//! returned declaration gets a normalized declaration string and a browse
//! URL pointing at its line in the hosting backend.
//!
//! The builder is a pure transform. It never performs I/O, and an
//! extractor failure is reported alongside a package that still carries
//! its readmes and file lists.

use std::collections::HashMap;

use crate::comment::{html_escape, synopsis, to_html, truncate_bytes};
use crate::extract::{DeclExtractor, ExtractError, ExtractRequest, ExtractedPackage, SourceFile};
use crate::models::{Func, Package, PackageRecord, Source, Type, Value, MAX_SYNOPSIS_LEN};
use crate::path::{is_go_file, readme_locale};

/// GitHub-style line anchor.
pub const GITHUB_LINE_FMT: &str = "#L{line}";

/// Builder output.
#[derive(Debug)]
pub struct Built {
    pub package: Package,
    /// Set when the extractor could not produce declarations.
    pub extract_error: Option<ExtractError>,
}

/// Virtual directory over exactly the fetched files.
pub struct VirtualDir<'a> {
    files: Vec<&'a Source>,
}

impl<'a> VirtualDir<'a> {
    pub fn new(sources: &'a [Source]) -> Self {
        Self {
            files: sources.iter().collect(),
        }
    }

    pub fn open(&self, name: &str) -> Option<&'a Source> {
        self.files.iter().copied().find(|s| s.name == name)
    }

    /// Readme files, in directory order.
    pub fn readmes(&self) -> impl Iterator<Item = (&'static str, &'a Source)> + '_ {
        self.files
            .iter()
            .filter_map(|s| readme_locale(&s.name).map(|loc| (loc, *s)))
    }

    /// Compilable Go files, in directory order.
    pub fn go_files(&self) -> impl Iterator<Item = &'a Source> + '_ {
        self.files.iter().copied().filter(|s| is_go_file(&s.name))
    }
}

/// Build a package from fetched sources.
///
/// `record` carries the facets decided by the fetch (project path,
/// etag, std/subrepo flags); the builder fills in the rest.
pub fn build_package(
    record: PackageRecord,
    sources: &[Source],
    line_fmt: &str,
    extractor: &dyn DeclExtractor,
) -> Built {
    let dir = VirtualDir::new(sources);
    let mut pkg = Package {
        record,
        ..Default::default()
    };

    for (locale, src) in dir.readmes() {
        pkg.readmes
            .entry(locale.to_string())
            .or_insert_with(|| src.data.clone());
    }

    let files: Vec<SourceFile> = dir
        .go_files()
        .map(|s| SourceFile {
            name: s.name.clone(),
            data: s.data.clone(),
        })
        .collect();
    let req = ExtractRequest::for_host(pkg.record.import_path.clone(), files);

    match extractor.extract(&req) {
        Ok(extracted) => {
            let urls: HashMap<&str, &str> = sources
                .iter()
                .map(|s| (s.name.as_str(), s.browse_url.as_str()))
                .collect();
            apply(&mut pkg, extracted, &|file: &str, line: usize| {
                decl_url(urls.get(file).copied().unwrap_or_default(), line_fmt, line)
            });
            Built {
                package: pkg,
                extract_error: None,
            }
        }
        Err(e) => Built {
            package: pkg,
            extract_error: Some(e),
        },
    }
}

/// Browse URL of a declaration: file URL plus the backend's line fragment.
pub fn decl_url(browse_url: &str, line_fmt: &str, line: usize) -> String {
    if browse_url.is_empty() {
        return String::new();
    }
    format!("{}{}", browse_url, line_fmt.replace("{line}", &line.to_string()))
}

/// Normalize a declaration for display: tabs become four spaces and
/// trailing whitespace is trimmed on every line.
pub fn normalize_decl(decl: &str) -> String {
    decl.lines()
        .map(|l| l.replace('\t', "    ").trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn apply(pkg: &mut Package, ext: ExtractedPackage, url: &dyn Fn(&str, usize) -> String) {
    pkg.record.synopsis = escaped_synopsis(&ext.doc);
    pkg.record.is_cmd = ext.name == "main";
    pkg.record.is_cgo = ext.is_cgo;
    pkg.record.import_paths = ext.imports.clone();

    pkg.name = ext.name;
    pkg.doc = to_html(&ext.doc);
    pkg.consts = ext.consts.into_iter().map(|v| map_value(v, url)).collect();
    pkg.vars = ext.vars.into_iter().map(|v| map_value(v, url)).collect();
    pkg.funcs = ext.funcs.into_iter().map(|f| map_func(f, url)).collect();
    pkg.types = ext.types.into_iter().map(|t| map_type(t, url)).collect();
    pkg.examples = ext.examples;
    pkg.files = ext.files;
    pkg.test_files = ext.test_files;
    pkg.imports = ext.imports;
    pkg.test_imports = ext.test_imports;
}

fn map_value(mut v: Value, url: &dyn Fn(&str, usize) -> String) -> Value {
    v.decl = normalize_decl(&v.decl);
    v.url = url(&v.file, v.line);
    v
}

fn map_func(mut f: Func, url: &dyn Fn(&str, usize) -> String) -> Func {
    f.decl = normalize_decl(&f.decl);
    f.code = normalize_decl(&f.code);
    f.url = url(&f.file, f.line);
    f
}

fn map_type(mut t: Type, url: &dyn Fn(&str, usize) -> String) -> Type {
    t.decl = normalize_decl(&t.decl);
    t.url = url(&t.file, t.line);
    t.consts = t.consts.into_iter().map(|v| map_value(v, url)).collect();
    t.vars = t.vars.into_iter().map(|v| map_value(v, url)).collect();
    t.funcs = t.funcs.into_iter().map(|f| map_func(f, url)).collect();
    t.methods = t.methods.into_iter().map(|f| map_func(f, url)).collect();
    t
}

/// Escaped synopsis no longer than [`MAX_SYNOPSIS_LEN`]. The cut is made
/// on the plain text so no entity is split.
fn escaped_synopsis(doc: &str) -> String {
    let full = synopsis(doc);
    let mut plain = truncate_bytes(&full, MAX_SYNOPSIS_LEN).to_string();
    let mut escaped = html_escape(&plain);
    while escaped.len() > MAX_SYNOPSIS_LEN {
        plain.pop();
        escaped = html_escape(&plain);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gosrc::GoSourceExtractor;

    fn source(name: &str, body: &str) -> Source {
        let mut s = Source::new(
            name,
            format!("https://github.com/u/r/blob/master/{}", name),
            format!("https://raw.github.com/u/r/master/{}", name),
        );
        s.data = body.as_bytes().to_vec();
        s
    }

    #[test]
    fn test_build_maps_declarations() {
        let sources = vec![
            source("README.md", "# r"),
            source("README_zh.md", "# 中文"),
            source(
                "r.go",
                "// Package r is <small>. More.\npackage r\n\nimport \"fmt\"\n\n// Hello greets.\nfunc Hello() {\n\tfmt.Println(\"hi\")\n}\n",
            ),
        ];
        let built = build_package(
            PackageRecord::new("github.com/u/r"),
            &sources,
            GITHUB_LINE_FMT,
            &GoSourceExtractor,
        );
        assert!(built.extract_error.is_none());
        let pkg = built.package;
        assert_eq!(pkg.name, "r");
        assert_eq!(pkg.record.synopsis, "Package r is &lt;small&gt;.");
        assert_eq!(pkg.record.import_paths, vec!["fmt"]);
        assert!(!pkg.record.is_cmd);
        assert_eq!(pkg.files, vec!["r.go"]);
        assert_eq!(pkg.readmes.get("en").map(Vec::as_slice), Some(&b"# r"[..]));
        assert!(pkg.readmes.contains_key("zh"));
        assert_eq!(pkg.funcs[0].url, "https://github.com/u/r/blob/master/r.go#L7");
        assert_eq!(pkg.funcs[0].code, "func Hello() {\n    fmt.Println(\"hi\")\n}");
        assert!(pkg.doc.starts_with("<p>"));
    }

    #[test]
    fn test_long_synopsis_keeps_entities_whole() {
        let doc = format!("// Package r {} & more.\npackage r\n", "a".repeat(243));
        let built = build_package(
            PackageRecord::new("github.com/u/r"),
            &[source("r.go", &doc)],
            GITHUB_LINE_FMT,
            &GoSourceExtractor,
        );
        let syn = built.package.record.synopsis;
        assert!(syn.len() <= MAX_SYNOPSIS_LEN);
        assert_eq!(syn, format!("Package r {} ", "a".repeat(243)));

        let short = escaped_synopsis("Package r is <b> & c.");
        assert_eq!(short, "Package r is &lt;b&gt; &amp; c.");
    }

    #[test]
    fn test_extract_failure_keeps_readmes() {
        let sources = vec![source("README.md", "x"), source("a_plan9.go", "package a\n")];
        let mut rec = PackageRecord::new("github.com/u/r");
        rec.etag = "abc".to_string();
        let built = build_package(rec, &sources, GITHUB_LINE_FMT, &GoSourceExtractor);
        assert!(matches!(built.extract_error, Some(ExtractError::NoBuildable(_))));
        assert!(built.package.readmes.contains_key("en"));
        assert_eq!(built.package.record.etag, "abc");
        assert!(!built.package.has_decls());
    }

    #[test]
    fn test_command_detection() {
        let sources = vec![source("main.go", "package main\n\nfunc main() {}\n")];
        let built = build_package(
            PackageRecord::new("github.com/u/cmd"),
            &sources,
            GITHUB_LINE_FMT,
            &GoSourceExtractor,
        );
        assert!(built.package.record.is_cmd);
    }

    #[test]
    fn test_normalize_decl_and_url() {
        assert_eq!(normalize_decl("type T struct {\n\tA int   \n}"), "type T struct {\n    A int\n}");
        assert_eq!(decl_url("", GITHUB_LINE_FMT, 3), "");
        assert_eq!(decl_url("https://x/f.go", GITHUB_LINE_FMT, 3), "https://x/f.go#L3");
    }

    #[test]
    fn test_virtual_dir_only_exposes_fetched_files() {
        let sources = vec![source("a.go", ""), source("_b.go", ""), source("readme", "")];
        let dir = VirtualDir::new(&sources);
        assert!(dir.open("a.go").is_some());
        assert!(dir.open("c.go").is_none());
        let go: Vec<&str> = dir.go_files().map(|s| s.name.as_str()).collect();
        assert_eq!(go, vec!["a.go"]);
        assert_eq!(dir.readmes().count(), 1);
    }
}
