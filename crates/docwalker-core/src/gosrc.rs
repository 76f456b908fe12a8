//! Built-in Go declaration extractor.
//!
//! Each file is parsed with the tree-sitter Go grammar and the top-level
//! children of `source_file` are read directly. Nothing is type-checked
//! or resolved; the walk recovers what the documentation needs:
//!
//! | Node | Recovered |
//! |------|-----------|
//! | `package_clause` | package name, package comment |
//! | `import_declaration` | imports (regular and test) |
//! | `const_declaration`, `var_declaration` | exported values, typed groups under their type |
//! | `type_declaration` | exported types, grouped or single |
//! | `function_declaration` | funcs, constructors (first result `T`/`*T`) under `T`, `Example*` |
//! | `method_declaration` | methods of exported types |
//!
//! Doc comments are the run of `comment` siblings directly above a node
//! with no blank line in between.
//!
//! Files are filtered for the target platform by their `_GOOS`/`_GOARCH`
//! name suffixes and by `//go:build` / `// +build` lines.

use std::collections::HashMap;

use tree_sitter::{Node, Parser, Tree};

use crate::extract::{DeclExtractor, ExtractError, ExtractRequest, ExtractedPackage};
use crate::models::{Example, Func, Type, Value};

const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "arm", "arm64", "loong64", "mips", "mipsle", "mips64", "mips64le", "ppc64",
    "ppc64le", "riscv64", "s390x", "wasm",
];

const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux",
    "netbsd", "openbsd", "solaris",
];

/// Top-level node kinds the walk keeps.
const DECL_KINDS: &[&str] = &[
    "package_clause",
    "import_declaration",
    "const_declaration",
    "var_declaration",
    "type_declaration",
    "function_declaration",
    "method_declaration",
];

/// The built-in extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoSourceExtractor;

impl DeclExtractor for GoSourceExtractor {
    fn extract(&self, req: &ExtractRequest) -> Result<ExtractedPackage, ExtractError> {
        let mut parser = go_parser()?;
        let mut parsed = Vec::new();
        for f in &req.files {
            if !matches_file_name(&f.name, &req.goos, &req.goarch) {
                continue;
            }
            let src = String::from_utf8_lossy(&f.data).into_owned();
            if !matches_build_lines(&src, &req.goos, &req.goarch) {
                continue;
            }
            parsed.push(GoFile::parse(&mut parser, &f.name, src)?);
        }

        let mut out = ExtractedPackage::default();
        let mut decls = DeclSet::new(req.all_decls);
        let mut examples = Vec::new();
        for file in &parsed {
            let top = file.top_level();
            let Some(clause) = top.iter().find(|d| d.node.kind() == "package_clause") else {
                return Err(ExtractError::Parse {
                    file: file.name.clone(),
                    message: "expected 'package' clause".to_string(),
                });
            };
            let pkg_name = clause
                .node
                .named_child(0)
                .map(|n| file.text(n).to_string())
                .unwrap_or_default();

            if file.name.ends_with("_test.go") {
                out.test_files.push(file.name.clone());
                for d in &top {
                    match d.node.kind() {
                        "import_declaration" => {
                            push_unique(&mut out.test_imports, file.import_paths(d.node))
                        }
                        "function_declaration" => examples.extend(file.example(d)),
                        _ => {}
                    }
                }
                continue;
            }

            if out.name.is_empty() {
                out.name = pkg_name;
            } else if out.name != pkg_name {
                return Err(ExtractError::MultiplePackages {
                    import_path: req.import_path.clone(),
                    first: out.name.clone(),
                    second: pkg_name,
                });
            }
            if out.doc.is_empty() && !clause.doc.is_empty() {
                out.doc = clause.doc.clone();
            }
            out.files.push(file.name.clone());
            for d in &top {
                decls.add(file, d, &mut out.imports);
            }
        }

        if out.files.is_empty() {
            return Err(ExtractError::NoBuildable(req.import_path.clone()));
        }

        out.is_cgo = out.imports.iter().any(|i| i == "C");
        decls.finish(&mut out);
        attach_examples(&mut out, examples);
        Ok(out)
    }
}

fn go_parser() -> Result<Parser, ExtractError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| ExtractError::Parse {
            file: String::new(),
            message: format!("loading Go grammar: {}", e),
        })?;
    Ok(parser)
}

// ============ File selection ============

/// Checks `_GOOS`, `_GOARCH` and `_GOOS_GOARCH` file name suffixes.
pub fn matches_file_name(name: &str, goos: &str, goarch: &str) -> bool {
    let stem = name.trim_end_matches(".go").trim_end_matches("_test");
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 2 {
        return true;
    }
    let last = parts[parts.len() - 1];
    let prev = parts[parts.len() - 2];
    if KNOWN_ARCH.contains(&last) {
        if parts.len() >= 3 && KNOWN_OS.contains(&prev) {
            return prev == goos && last == goarch;
        }
        return last == goarch;
    }
    if KNOWN_OS.contains(&last) {
        return last == goos;
    }
    true
}

/// Evaluates build constraint lines above the package clause.
///
/// A `//go:build` line wins over `// +build` lines. A malformed
/// `//go:build` expression excludes the file.
pub fn matches_build_lines(src: &str, goos: &str, goarch: &str) -> bool {
    for line in src.lines() {
        let line = line.trim();
        if line.starts_with("package ") {
            break;
        }
        if let Some(expr) = line.strip_prefix("//go:build ") {
            return BuildExpr::parse(expr, goos, goarch).unwrap_or(false);
        }
        if let Some(expr) = line.strip_prefix("// +build ") {
            // space-separated terms are OR, comma-separated are AND
            let ok = expr.split_whitespace().any(|alt| {
                alt.split(',').all(|t| eval_build_term(t, goos, goarch))
            });
            if !ok {
                return false;
            }
        }
    }
    true
}

fn eval_build_term(term: &str, goos: &str, goarch: &str) -> bool {
    if let Some(inner) = term.strip_prefix('!') {
        return !eval_build_term(inner, goos, goarch);
    }
    match term {
        "ignore" => false,
        "gc" | "cgo" => true,
        "unix" => UNIX_OS.contains(&goos),
        t if t.starts_with("go1.") => true,
        t => t == goos || t == goarch,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tok<'a> {
    Or,
    And,
    Not,
    Open,
    Close,
    Tag(&'a str),
}

/// Recursive-descent evaluator for `//go:build` expressions.
///
/// ```text
/// or   := and ("||" and)*
/// and  := not ("&&" not)*
/// not  := "!" not | atom
/// atom := "(" or ")" | tag
/// ```
struct BuildExpr<'a> {
    toks: Vec<Tok<'a>>,
    pos: usize,
    goos: &'a str,
    goarch: &'a str,
}

impl<'a> BuildExpr<'a> {
    fn parse(expr: &'a str, goos: &'a str, goarch: &'a str) -> Option<bool> {
        let mut p = BuildExpr {
            toks: tokenize_build(expr)?,
            pos: 0,
            goos,
            goarch,
        };
        let v = p.or()?;
        (p.pos == p.toks.len()).then_some(v)
    }

    fn peek(&self) -> Option<Tok<'a>> {
        self.toks.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Tok<'a>> {
        let t = self.peek();
        self.pos += 1;
        t
    }

    fn or(&mut self) -> Option<bool> {
        let mut v = self.and()?;
        while self.peek() == Some(Tok::Or) {
            self.pos += 1;
            let rhs = self.and()?;
            v = v || rhs;
        }
        Some(v)
    }

    fn and(&mut self) -> Option<bool> {
        let mut v = self.not()?;
        while self.peek() == Some(Tok::And) {
            self.pos += 1;
            let rhs = self.not()?;
            v = v && rhs;
        }
        Some(v)
    }

    fn not(&mut self) -> Option<bool> {
        if self.peek() == Some(Tok::Not) {
            self.pos += 1;
            return self.not().map(|v| !v);
        }
        match self.bump()? {
            Tok::Open => {
                let v = self.or()?;
                (self.bump()? == Tok::Close).then_some(v)
            }
            Tok::Tag(tag) => Some(eval_build_term(tag, self.goos, self.goarch)),
            _ => None,
        }
    }
}

fn tokenize_build(expr: &str) -> Option<Vec<Tok<'_>>> {
    let mut toks = Vec::new();
    let mut rest = expr.trim_start();
    while let Some(c) = rest.chars().next() {
        let (tok, len) = match c {
            '(' => (Tok::Open, 1),
            ')' => (Tok::Close, 1),
            '!' => (Tok::Not, 1),
            '&' if rest.starts_with("&&") => (Tok::And, 2),
            '|' if rest.starts_with("||") => (Tok::Or, 2),
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let len = rest
                    .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
                    .unwrap_or(rest.len());
                (Tok::Tag(&rest[..len]), len)
            }
            _ => return None,
        };
        toks.push(tok);
        rest = rest[len..].trim_start();
    }
    Some(toks)
}

// ============ Syntax tree ============

/// One parsed source file.
struct GoFile {
    name: String,
    src: String,
    tree: Tree,
}

/// A top-level declaration node with its doc comment.
struct TopDecl<'t> {
    node: Node<'t>,
    doc: String,
}

impl GoFile {
    fn parse(parser: &mut Parser, name: &str, src: String) -> Result<Self, ExtractError> {
        let tree = parser.parse(&src, None).ok_or_else(|| ExtractError::Parse {
            file: name.to_string(),
            message: "parser returned no tree".to_string(),
        })?;
        Ok(Self {
            name: name.to_string(),
            src,
            tree,
        })
    }

    fn text(&self, node: Node) -> &str {
        node.utf8_text(self.src.as_bytes()).unwrap_or_default()
    }

    fn line(node: Node) -> usize {
        node.start_position().row + 1
    }

    fn top_level(&self) -> Vec<TopDecl<'_>> {
        let root = self.tree.root_node();
        let mut cursor = root.walk();
        let decls = root
            .named_children(&mut cursor)
            .filter(|n| DECL_KINDS.contains(&n.kind()))
            .map(|node| TopDecl {
                node,
                doc: self.doc_comment(node),
            })
            .collect();
        decls
    }

    /// Comment siblings directly above `node`, blank lines ending the run.
    fn doc_comment(&self, node: Node) -> String {
        let mut group = Vec::new();
        let mut next_row = node.start_position().row;
        let mut cur = node.prev_named_sibling();
        while let Some(c) = cur {
            if c.kind() != "comment" || c.end_position().row + 1 < next_row {
                break;
            }
            let prev = c.prev_named_sibling();
            // trailing comment of the line above
            if prev.is_some_and(|p| {
                p.kind() != "comment" && p.end_position().row == c.start_position().row
            }) {
                break;
            }
            group.push(c);
            next_row = c.start_position().row;
            cur = prev;
        }

        let mut lines = Vec::new();
        for c in group.into_iter().rev() {
            let text = self.text(c);
            if let Some(line) = text.strip_prefix("//") {
                if !is_directive(line) {
                    lines.push(line.strip_prefix(' ').unwrap_or(line).trim_end());
                }
            } else {
                let body = text.trim_start_matches("/*").trim_end_matches("*/");
                lines.extend(body.lines().map(str::trim_end));
            }
        }
        while lines.first().is_some_and(|l| l.trim().is_empty()) {
            lines.remove(0);
        }
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }
        lines.join("\n")
    }

    /// Import paths of an `import_declaration`, in source order.
    fn import_paths(&self, decl: Node) -> Vec<String> {
        specs(decl, &["import_spec"])
            .into_iter()
            .filter_map(|s| s.child_by_field_name("path"))
            .map(|p| self.text(p).trim_matches(['"', '`']).to_string())
            .collect()
    }

    /// Base name of a type expression, `*` and type arguments stripped.
    fn type_name(&self, node: Node) -> String {
        leading_ident(self.text(node).trim_start_matches('*')).to_string()
    }

    fn func_parts(&self, node: Node) -> Option<FuncParts> {
        let name = self.text(node.child_by_field_name("name")?).to_string();
        let recv = node
            .child_by_field_name("receiver")
            .and_then(first_param_type)
            .map(|t| self.type_name(t))
            .unwrap_or_default();
        let result = node
            .child_by_field_name("result")
            .and_then(|r| {
                if r.kind() == "parameter_list" {
                    first_param_type(r)
                } else {
                    Some(r)
                }
            })
            .map(|t| self.type_name(t))
            .unwrap_or_default();
        let no_signature = node.child_by_field_name("result").is_none()
            && node
                .child_by_field_name("parameters")
                .is_some_and(|p| p.named_child_count() == 0);

        let body = node.child_by_field_name("body");
        let decl = match body {
            Some(b) => self.src[node.start_byte()..b.start_byte()].trim_end(),
            None => self.text(node),
        };
        let body = body.map(|b| {
            let text = self.text(b);
            let inner = text.strip_prefix('{').unwrap_or(text);
            inner.strip_suffix('}').unwrap_or(inner).to_string()
        });

        Some(FuncParts {
            name,
            recv,
            decl: decl.to_string(),
            result,
            no_signature,
            body,
        })
    }

    fn example(&self, d: &TopDecl) -> Option<Example> {
        let parts = self.func_parts(d.node)?;
        let name = parts.name.strip_prefix("Example")?;
        if !parts.no_signature || name.chars().next().is_some_and(|c| c.is_lowercase()) {
            return None;
        }
        let body = parts.body?;
        let mut code_lines = Vec::new();
        let mut output_lines = Vec::new();
        let mut in_output = false;
        for line in body.lines() {
            let trimmed = line.trim();
            if !in_output {
                let lower = trimmed.to_lowercase();
                if lower.starts_with("// output:") || lower.starts_with("// unordered output:") {
                    in_output = true;
                    let rest = trimmed.split_once(':').map(|(_, r)| r.trim()).unwrap_or_default();
                    if !rest.is_empty() {
                        output_lines.push(rest.to_string());
                    }
                    continue;
                }
                code_lines.push(line.strip_prefix('\t').unwrap_or(line));
            } else if let Some(c) = trimmed.strip_prefix("//") {
                output_lines.push(c.strip_prefix(' ').unwrap_or(c).to_string());
            }
        }
        Some(Example {
            name: name.to_string(),
            doc: d.doc.clone(),
            code: code_lines.join("\n").trim().to_string(),
            output: output_lines.join("\n"),
        })
    }
}

/// Spec nodes of a declaration, looking through `(...)` list nodes.
fn specs<'t>(node: Node<'t>, kinds: &[&str]) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if kinds.contains(&child.kind()) {
            out.push(child);
        } else if child.kind().ends_with("_list") {
            out.extend(specs(child, kinds));
        }
    }
    out
}

/// Type of the first declaration in a parameter list.
fn first_param_type(list: Node) -> Option<Node> {
    let mut cursor = list.walk();
    let first = list
        .named_children(&mut cursor)
        .find(|p| p.kind().ends_with("parameter_declaration"));
    first.and_then(|p| p.child_by_field_name("type"))
}

fn is_directive(comment: &str) -> bool {
    comment.starts_with("go:") || comment.starts_with(" +build") || comment.starts_with("line ")
}

fn leading_ident(s: &str) -> &str {
    let end = s
        .bytes()
        .position(|b| !(b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80))
        .unwrap_or(s.len());
    &s[..end]
}

pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

fn push_unique(dst: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !dst.contains(&item) {
            dst.push(item);
        }
    }
}

// ============ Declarations ============

/// Parsed function header.
struct FuncParts {
    name: String,
    recv: String,
    decl: String,
    /// Base name of the first result type, `*` stripped.
    result: String,
    /// No parameters and no results.
    no_signature: bool,
    /// Body between the braces, if any.
    body: Option<String>,
}

/// Accumulates declarations across files before grouping.
struct DeclSet {
    all_decls: bool,
    values: Vec<(bool, Value, String)>,
    funcs: Vec<(Func, String)>,
    methods: Vec<Func>,
    types: Vec<Type>,
}

impl DeclSet {
    fn new(all_decls: bool) -> Self {
        Self {
            all_decls,
            values: Vec::new(),
            funcs: Vec::new(),
            methods: Vec::new(),
            types: Vec::new(),
        }
    }

    fn visible(&self, name: &str) -> bool {
        self.all_decls || is_exported(name)
    }

    fn add(&mut self, file: &GoFile, d: &TopDecl, imports: &mut Vec<String>) {
        match d.node.kind() {
            "import_declaration" => push_unique(imports, file.import_paths(d.node)),
            "function_declaration" | "method_declaration" => self.add_func(file, d),
            "type_declaration" => self.add_types(file, d),
            "const_declaration" => self.add_values(file, d, true),
            "var_declaration" => self.add_values(file, d, false),
            _ => {}
        }
    }

    fn add_func(&mut self, file: &GoFile, d: &TopDecl) {
        let Some(parts) = file.func_parts(d.node) else {
            return;
        };
        if !self.visible(&parts.name) || parts.name == "init" && !self.all_decls {
            return;
        }
        let func = Func {
            name: parts.name,
            recv: parts.recv.clone(),
            doc: d.doc.clone(),
            decl: parts.decl,
            code: file.text(d.node).to_string(),
            file: file.name.clone(),
            line: GoFile::line(d.node),
            ..Default::default()
        };
        if d.node.kind() == "function_declaration" {
            self.funcs.push((func, parts.result));
        } else if self.visible(&parts.recv) {
            self.methods.push(func);
        }
    }

    fn add_types(&mut self, file: &GoFile, d: &TopDecl) {
        let grouped = specs(d.node, &["type_spec", "type_alias"]);
        let single = grouped.len() == 1;
        for spec in grouped {
            let Some(name) = spec.child_by_field_name("name").map(|n| file.text(n)) else {
                continue;
            };
            if !self.visible(name) {
                continue;
            }
            let doc = file.doc_comment(spec);
            let doc = if doc.is_empty() && single { d.doc.clone() } else { doc };
            self.types.push(Type {
                name: name.to_string(),
                doc,
                decl: format!("type {}", file.text(spec)),
                file: file.name.clone(),
                line: GoFile::line(spec),
                ..Default::default()
            });
        }
    }

    fn add_values(&mut self, file: &GoFile, d: &TopDecl, is_const: bool) {
        let kind = if is_const { "const_spec" } else { "var_spec" };
        let mut names = Vec::new();
        let mut first_type = None;
        for spec in specs(d.node, &[kind]) {
            let ty = spec
                .child_by_field_name("type")
                .map(|t| file.type_name(t))
                .unwrap_or_default();
            first_type.get_or_insert(ty);
            let mut cursor = spec.walk();
            names.extend(
                spec.children_by_field_name("name", &mut cursor)
                    .map(|n| file.text(n).to_string()),
            );
        }
        let all_decls = self.all_decls;
        names.retain(|n| all_decls || is_exported(n));
        if names.is_empty() {
            return;
        }
        self.values.push((
            is_const,
            Value {
                names,
                doc: d.doc.clone(),
                decl: file.text(d.node).to_string(),
                file: file.name.clone(),
                line: GoFile::line(d.node),
                ..Default::default()
            },
            first_type.unwrap_or_default(),
        ));
    }

    fn finish(self, out: &mut ExtractedPackage) {
        let mut types = self.types;
        let index: HashMap<String, usize> = types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();

        for (is_const, value, ty) in self.values {
            let target = index.get(&ty).map(|&i| &mut types[i]);
            match (target, is_const) {
                (Some(t), true) => t.consts.push(value),
                (Some(t), false) => t.vars.push(value),
                (None, true) => out.consts.push(value),
                (None, false) => out.vars.push(value),
            }
        }
        for (func, result) in self.funcs {
            match index.get(&result) {
                Some(&i) => types[i].funcs.push(func),
                None => out.funcs.push(func),
            }
        }
        for method in self.methods {
            if let Some(&i) = index.get(&method.recv) {
                types[i].methods.push(method);
            }
        }

        for t in types.iter_mut() {
            t.funcs.sort_by(|a, b| a.name.cmp(&b.name));
            t.methods.sort_by(|a, b| a.name.cmp(&b.name));
        }
        types.sort_by(|a, b| a.name.cmp(&b.name));
        out.funcs.sort_by(|a, b| a.name.cmp(&b.name));
        out.types = types;
    }
}

// ============ Examples ============

/// Attach examples to the func, type or method they are named after.
///
/// `ExampleF`, `ExampleT`, `ExampleT_M` attach to `F`, `T` and `T.M`; a
/// trailing lower-case `_suffix` is ignored. Anything else stays at
/// package level.
fn attach_examples(out: &mut ExtractedPackage, examples: Vec<Example>) {
    for ex in examples {
        let mut target = ex.name.as_str();
        if let Some((head, suffix)) = target.rsplit_once('_') {
            if suffix.chars().next().is_some_and(|c| c.is_lowercase()) {
                target = head;
            }
        }
        if target.is_empty() {
            out.examples.push(ex);
            continue;
        }
        let (ty_name, member) = match target.split_once('_') {
            Some((t, m)) => (t, Some(m)),
            None => (target, None),
        };

        if member.is_none() {
            let func = out
                .funcs
                .iter_mut()
                .chain(out.types.iter_mut().flat_map(|t| t.funcs.iter_mut()))
                .find(|f| f.name == ty_name);
            if let Some(f) = func {
                f.examples.push(ex);
                continue;
            }
        }
        let Some(t) = out.types.iter_mut().find(|t| t.name == ty_name) else {
            out.examples.push(ex);
            continue;
        };
        match member {
            None => t.examples.push(ex),
            Some(m) => {
                let found = t
                    .methods
                    .iter_mut()
                    .chain(t.funcs.iter_mut())
                    .find(|f| f.name == m);
                match found {
                    Some(f) => f.examples.push(ex),
                    None => t.examples.push(ex),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::SourceFile;

    const CLIENT_GO: &str = r#"// Copyright notice.

// Package client talks to the service.
//
// It keeps one connection.
package client

import (
	"fmt"
	"net/http"
)

// MaxRetries bounds retries.
const MaxRetries = 3

// Mode values.
const (
	ModeA Mode = iota
	ModeB
)

var internal = 1

// Mode selects behaviour.
type Mode int

// Client is a connection.
type Client struct {
	URL string // endpoint
	h   *http.Client
}

// NewClient returns a client for url.
func NewClient(url string) *Client {
	return &Client{URL: url}
}

// Do sends a request.
func (c *Client) Do(path string) (string, error) {
	if path == "" {
		return "", fmt.Errorf("empty {path}")
	}
	return c.URL + path, nil
}

func (c *Client) reset() {}

// Version reports the version.
func Version() string { return "1" }
"#;

    const CLIENT_TEST_GO: &str = r#"package client_test

import (
	"fmt"
	"testing"

	"example.com/client"
)

func ExampleNewClient() {
	c := client.NewClient("x")
	fmt.Println(c.URL)
	// Output: x
}

func ExampleClient_Do() {
	// Output:
	// a
	// b
}

func Example() {}

func TestX(t *testing.T) {}
"#;

    fn request(files: &[(&str, &str)]) -> ExtractRequest {
        ExtractRequest {
            import_path: "example.com/client".to_string(),
            files: files
                .iter()
                .map(|(n, s)| SourceFile {
                    name: n.to_string(),
                    data: s.as_bytes().to_vec(),
                })
                .collect(),
            goos: "linux".to_string(),
            goarch: "amd64".to_string(),
            all_decls: false,
        }
    }

    #[test]
    fn test_top_level_kinds_and_docs() {
        let mut parser = go_parser().unwrap();
        let file = GoFile::parse(&mut parser, "client.go", CLIENT_GO.to_string()).unwrap();
        let decls = file.top_level();
        let kinds: Vec<&str> = decls.iter().map(|d| d.node.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "package_clause",
                "import_declaration",
                "const_declaration",
                "const_declaration",
                "var_declaration",
                "type_declaration",
                "type_declaration",
                "function_declaration",
                "method_declaration",
                "method_declaration",
                "function_declaration",
            ]
        );
        assert_eq!(decls[0].doc, "Package client talks to the service.\n\nIt keeps one connection.");
        assert_eq!(GoFile::line(decls[0].node), 6);
        assert_eq!(decls[2].doc, "MaxRetries bounds retries.");
        assert!(decls[4].doc.is_empty());
        assert!(decls[9].doc.is_empty());
    }

    #[test]
    fn test_trailing_comment_is_not_doc() {
        let src = "package p\n\nconst A = 1 // one\nconst B = 2\n";
        let pkg = GoSourceExtractor.extract(&request(&[("p.go", src)])).unwrap();
        assert_eq!(pkg.consts.len(), 2);
        assert!(pkg.consts[1].doc.is_empty());
    }

    #[test]
    fn test_extract_package() {
        let req = request(&[("client.go", CLIENT_GO), ("client_test.go", CLIENT_TEST_GO)]);
        let pkg = GoSourceExtractor.extract(&req).unwrap();

        assert_eq!(pkg.name, "client");
        assert!(pkg.doc.starts_with("Package client talks"));
        assert_eq!(pkg.imports, vec!["fmt", "net/http"]);
        assert_eq!(pkg.test_imports, vec!["fmt", "testing", "example.com/client"]);
        assert_eq!(pkg.files, vec!["client.go"]);
        assert_eq!(pkg.test_files, vec!["client_test.go"]);

        assert_eq!(pkg.consts.len(), 1);
        assert_eq!(pkg.consts[0].names, vec!["MaxRetries"]);
        assert!(pkg.vars.is_empty());

        let names: Vec<&str> = pkg.funcs.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Version"]);
        assert_eq!(pkg.funcs[0].decl, "func Version() string");

        let names: Vec<&str> = pkg.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Client", "Mode"]);

        let client = &pkg.types[0];
        assert_eq!(client.doc, "Client is a connection.");
        assert_eq!(client.funcs[0].name, "NewClient");
        assert_eq!(client.funcs[0].decl, "func NewClient(url string) *Client");
        assert_eq!(client.methods.len(), 1);
        assert_eq!(client.methods[0].name, "Do");
        assert_eq!(client.methods[0].decl, "func (c *Client) Do(path string) (string, error)");
        assert_eq!(client.methods[0].file, "client.go");

        let mode = &pkg.types[1];
        assert_eq!(mode.consts.len(), 1);
        assert_eq!(mode.consts[0].names, vec!["ModeA", "ModeB"]);
    }

    #[test]
    fn test_examples_are_attached() {
        let req = request(&[("client.go", CLIENT_GO), ("client_test.go", CLIENT_TEST_GO)]);
        let pkg = GoSourceExtractor.extract(&req).unwrap();
        let client = &pkg.types[0];
        let ctor = &client.funcs[0];
        assert_eq!(ctor.examples.len(), 1);
        assert_eq!(ctor.examples[0].output, "x");
        assert_eq!(
            ctor.examples[0].code,
            "c := client.NewClient(\"x\")\nfmt.Println(c.URL)"
        );
        assert_eq!(client.methods[0].examples[0].output, "a\nb");
        assert_eq!(pkg.examples.len(), 1);
        assert_eq!(pkg.examples[0].name, "");
    }

    #[test]
    fn test_line_numbers() {
        let req = request(&[("client.go", CLIENT_GO)]);
        let pkg = GoSourceExtractor.extract(&req).unwrap();
        let line_of = |needle: &str| {
            CLIENT_GO
                .lines()
                .position(|l| l.starts_with(needle))
                .map(|p| p + 1)
                .unwrap()
        };
        assert_eq!(pkg.types[0].line, line_of("type Client"));
        assert_eq!(pkg.funcs[0].line, line_of("func Version"));
        assert_eq!(pkg.types[0].methods[0].line, line_of("func (c *Client) Do"));
    }

    #[test]
    fn test_grouped_types() {
        let src = "package p\n\ntype (\n\t// A is a.\n\tA int\n\tb string\n\t// C is c.\n\tC struct {\n\t\tX int\n\t}\n)\n";
        let pkg = GoSourceExtractor.extract(&request(&[("p.go", src)])).unwrap();
        let names: Vec<&str> = pkg.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
        assert_eq!(pkg.types[0].doc, "A is a.");
        assert_eq!(pkg.types[0].line, 5);
        assert_eq!(pkg.types[1].decl, "type C struct {\n\t\tX int\n\t}");
    }

    #[test]
    fn test_generic_receiver_and_grouped_vars() {
        let src = "package p\n\n// List holds items.\ntype List[T any] struct{ items []T }\n\nfunc (l *List[T]) Len() int { return len(l.items) }\n\nvar (\n\tDefault List[int]\n\tother   = 2\n)\n";
        let pkg = GoSourceExtractor.extract(&request(&[("p.go", src)])).unwrap();
        assert_eq!(pkg.types[0].name, "List");
        assert_eq!(pkg.types[0].methods[0].name, "Len");
        assert_eq!(pkg.types[0].vars[0].names, vec!["Default"]);
    }

    #[test]
    fn test_platform_filtering() {
        assert!(matches_file_name("x.go", "linux", "amd64"));
        assert!(matches_file_name("x_linux.go", "linux", "amd64"));
        assert!(!matches_file_name("x_windows.go", "linux", "amd64"));
        assert!(!matches_file_name("x_arm64.go", "linux", "amd64"));
        assert!(matches_file_name("x_linux_amd64_test.go", "linux", "amd64"));
        assert!(!matches_file_name("x_darwin_amd64.go", "linux", "amd64"));
        assert!(matches_file_name("net_http.go", "linux", "amd64"));

        assert!(!matches_build_lines("//go:build ignore\n\npackage main\n", "linux", "amd64"));
        assert!(matches_build_lines("//go:build linux || darwin\n\npackage p\n", "linux", "amd64"));
        assert!(!matches_build_lines("//go:build !linux\n\npackage p\n", "linux", "amd64"));
        assert!(matches_build_lines("// +build unix,amd64\n\npackage p\n", "linux", "amd64"));
        assert!(matches_build_lines("package p\n//go:build ignore\n", "linux", "amd64"));
    }

    #[test]
    fn test_parenthesized_build_constraints() {
        let windows_only = "//go:build windows && (386 || amd64)\n\npackage a\n";
        assert!(!matches_build_lines(windows_only, "linux", "amd64"));
        assert!(matches_build_lines(windows_only, "windows", "amd64"));
        assert!(!matches_build_lines(windows_only, "windows", "arm64"));

        assert!(matches_build_lines("//go:build !(windows || plan9)\n\npackage a\n", "linux", "amd64"));
        assert!(!matches_build_lines("//go:build !(linux && amd64)\n\npackage a\n", "linux", "amd64"));
        assert!(matches_build_lines("//go:build (linux && !cgo) || amd64\n\npackage a\n", "linux", "amd64"));
        // unbalanced
        assert!(!matches_build_lines("//go:build (linux\n\npackage a\n", "linux", "amd64"));
    }

    #[test]
    fn test_no_buildable_and_multiple_packages() {
        let err = GoSourceExtractor
            .extract(&request(&[("x_windows.go", "package x\n")]))
            .unwrap_err();
        assert!(matches!(err, ExtractError::NoBuildable(_)));

        let err = GoSourceExtractor
            .extract(&request(&[("a.go", "package a\n"), ("b.go", "package b\n")]))
            .unwrap_err();
        assert!(matches!(err, ExtractError::MultiplePackages { .. }));
    }

    #[test]
    fn test_missing_package_clause() {
        let err = GoSourceExtractor
            .extract(&request(&[("a.go", "func F() {}\n")]))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Parse { .. }));
    }

    #[test]
    fn test_all_decls_keeps_unexported() {
        let mut req = request(&[("client.go", CLIENT_GO)]);
        req.all_decls = true;
        let pkg = GoSourceExtractor.extract(&req).unwrap();
        assert!(pkg.vars.iter().any(|v| v.names == vec!["internal"]));
        assert!(pkg.types[0].methods.iter().any(|m| m.name == "reset"));
    }

    #[test]
    fn test_cgo_detection() {
        let src = "package p\n\n// #include <stdio.h>\nimport \"C\"\n";
        let pkg = GoSourceExtractor.extract(&request(&[("p.go", src)])).unwrap();
        assert!(pkg.is_cgo);
    }
}
