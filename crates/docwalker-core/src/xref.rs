//! Cross-reference index.
//!
//! A [`LinkIndex`] maps identifiers to hyperlink targets for one render:
//!
//! | Entry | `name` | `path` |
//! |-------|--------|--------|
//! | same-package type or func | `Foo` | `None` |
//! | import | `http.` | `Some("net/http")` |
//!
//! Only names with their own heading on the rendered page are indexed:
//! types, package funcs and the funcs grouped under a type. Consts, vars
//! and methods stay unlinked; the highlighter gives a declared name an
//! `id` span instead.
//!
//! The index is built fresh per render from the extracted declarations and
//! the package's import list, and is never persisted.

use std::collections::HashMap;

use crate::comment::html_escape;
use crate::highlight;
use crate::models::{Func, Package, Type};
use crate::path::base_name;

/// One cross-reference target.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub name: String,
    /// Import path for external links, `None` for same-package ones.
    pub path: Option<String>,
    /// Doc comment shown as the anchor title.
    pub comment: String,
}

impl Link {
    pub fn local(name: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            comment: comment.into(),
        }
    }

    pub fn import(import_path: &str) -> Self {
        Self {
            name: format!("{}.", base_name(import_path)),
            path: Some(import_path.to_string()),
            comment: String::new(),
        }
    }
}

/// Name → link table. Later insertions never replace earlier ones, so a
/// local declaration wins over a later import with the same name.
#[derive(Debug, Clone, Default)]
pub struct LinkIndex {
    links: HashMap<String, Link>,
}

impl LinkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, link: Link) {
        self.links.entry(link.name.clone()).or_insert(link);
    }

    pub fn get(&self, name: &str) -> Option<&Link> {
        self.links.get(name)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Build the index for a package: types, funcs, type-scoped funcs and
    /// every import except the `C` pseudo-package.
    pub fn for_package(pkg: &Package) -> Self {
        let mut index = Self::new();
        for f in &pkg.funcs {
            index.insert(Link::local(&f.name, &f.doc));
        }
        for t in &pkg.types {
            index.insert(Link::local(&t.name, &t.doc));
            for f in &t.funcs {
                index.insert(Link::local(&f.name, &f.doc));
            }
        }
        for import in pkg.imports.iter().chain(pkg.test_imports.iter()) {
            if import == "C" {
                continue;
            }
            index.insert(Link::import(import));
        }
        index
    }

    /// Index used for example code, which refers to the package under
    /// documentation by its qualified name.
    pub fn for_examples(pkg: &Package) -> Self {
        let mut index = Self::for_package(pkg);
        let name = if pkg.name.is_empty() {
            base_name(pkg.import_path()).to_string()
        } else {
            pkg.name.clone()
        };
        index.insert(Link::local(format!("{}.", name), ""));
        index
    }

    /// Resolve a word to an `<a>` start tag, or `None` when it has no target.
    ///
    /// Dotted words resolve through their `pkg.` prefix, undotted words
    /// only against same-package entries. A `pkg.` prefix naming the
    /// package itself links only names this index holds.
    pub fn anchor_for(&self, word: &str) -> Option<String> {
        let Some(dot) = word.find('.') else {
            return self.local_anchor(word);
        };
        let (left, right) = word.split_at(dot + 1);
        if right.is_empty() {
            return None;
        }
        match &self.get(left)?.path {
            Some(path) => Some(format!(
                r#"<a class="ext" title="{}" target="_blank" href="/{}#{}">"#,
                html_escape(path),
                path,
                right
            )),
            None => self.local_anchor(right),
        }
    }

    fn local_anchor(&self, name: &str) -> Option<String> {
        let link = self.get(name).filter(|l| l.path.is_none())?;
        Some(internal_anchor(name, &link.comment))
    }
}

fn internal_anchor(target: &str, comment: &str) -> String {
    format!(
        r##"<a class="int" title="{}" href="#{}">"##,
        html_escape(comment.trim()),
        target
    )
}

/// Fill in `fmt_decl` for every declaration and highlight function bodies.
pub fn annotate(pkg: &mut Package) {
    let index = LinkIndex::for_package(pkg);
    let example_index = LinkIndex::for_examples(pkg);

    for v in pkg.consts.iter_mut().chain(pkg.vars.iter_mut()) {
        v.fmt_decl = highlight::format_source(&v.decl, &index);
    }
    for f in pkg.funcs.iter_mut() {
        annotate_func(f, &index, &example_index);
    }
    for t in pkg.types.iter_mut() {
        annotate_type(t, &index, &example_index);
    }
    for e in pkg.examples.iter_mut() {
        e.code = highlight::format_source(&e.code, &example_index);
    }
}

fn annotate_func(f: &mut Func, index: &LinkIndex, example_index: &LinkIndex) {
    f.fmt_decl = highlight::format_source(&f.decl, index);
    f.code = highlight::format_source(&f.code, index);
    for e in f.examples.iter_mut() {
        e.code = highlight::format_source(&e.code, example_index);
    }
}

fn annotate_type(t: &mut Type, index: &LinkIndex, example_index: &LinkIndex) {
    t.fmt_decl = highlight::format_source(&t.decl, index);
    for v in t.consts.iter_mut().chain(t.vars.iter_mut()) {
        v.fmt_decl = highlight::format_source(&v.decl, index);
    }
    for f in t.funcs.iter_mut().chain(t.methods.iter_mut()) {
        annotate_func(f, index, example_index);
    }
    for e in t.examples.iter_mut() {
        e.code = highlight::format_source(&e.code, example_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    fn sample_package() -> Package {
        let mut pkg = Package {
            name: "demo".to_string(),
            imports: vec!["net/http".to_string(), "C".to_string()],
            test_imports: vec!["testing".to_string()],
            ..Default::default()
        };
        pkg.record.import_path = "github.com/u/demo".to_string();
        pkg.funcs.push(Func {
            name: "Serve".to_string(),
            doc: "Serve runs \"it\".".to_string(),
            ..Default::default()
        });
        pkg.consts.push(Value {
            names: vec!["MaxSize".to_string()],
            ..Default::default()
        });
        pkg.types.push(Type {
            name: "Client".to_string(),
            funcs: vec![Func {
                name: "NewClient".to_string(),
                ..Default::default()
            }],
            methods: vec![Func {
                name: "Do".to_string(),
                recv: "Client".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        });
        pkg
    }

    #[test]
    fn test_index_contents() {
        let index = LinkIndex::for_package(&sample_package());
        assert!(index.get("Serve").is_some());
        assert!(index.get("Client").is_some());
        assert!(index.get("NewClient").is_some());
        assert!(index.get("MaxSize").is_none());
        assert!(index.get("Client.Do").is_none());
        assert_eq!(
            index.get("http.").and_then(|l| l.path.as_deref()),
            Some("net/http")
        );
        assert!(index.get("testing.").is_some());
        assert!(index.get("C.").is_none());
    }

    #[test]
    fn test_anchor_resolution() {
        let index = LinkIndex::for_package(&sample_package());
        assert_eq!(
            index.anchor_for("http.Handler").as_deref(),
            Some(r#"<a class="ext" title="net/http" target="_blank" href="/net/http#Handler">"#)
        );
        assert_eq!(
            index.anchor_for("Serve").as_deref(),
            Some(r##"<a class="int" title="Serve runs &#34;it&#34;." href="#Serve">"##)
        );
        assert!(index.anchor_for("Client.Do").is_none());
        assert!(index.anchor_for("MaxSize").is_none());
        assert!(index.anchor_for("unknown").is_none());
        assert!(index.anchor_for("json.Marshal").is_none());
        assert!(index.anchor_for("http.").is_none());
    }

    #[test]
    fn test_examples_index_links_own_package() {
        let index = LinkIndex::for_examples(&sample_package());
        assert_eq!(
            index.anchor_for("demo.Serve").as_deref(),
            Some(r##"<a class="int" title="Serve runs &#34;it&#34;." href="#Serve">"##)
        );
        assert!(index.anchor_for("demo.MaxSize").is_none());
        assert!(index.anchor_for("demo.Client.Do").is_none());
    }

    #[test]
    fn test_annotate_fills_fmt_decl() {
        let mut pkg = sample_package();
        pkg.funcs[0].decl = "func Serve(c *Client) error".to_string();
        annotate(&mut pkg);
        let fmt = &pkg.funcs[0].fmt_decl;
        assert!(fmt.starts_with(r#"<span class="key">func</span> "#));
        assert!(fmt.contains(r##"href="#Client">Client</a>"##));
    }

    #[test]
    fn test_const_names_get_ids() {
        let mut pkg = sample_package();
        pkg.consts[0].decl = "const MaxSize = 1".to_string();
        annotate(&mut pkg);
        assert!(pkg.consts[0].fmt_decl.contains(r#"<span id="MaxSize">MaxSize</span>"#));
    }
}
