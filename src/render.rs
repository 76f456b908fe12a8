//! Template rendering.
//!
//! [`Render`] is the seam between the check layer and the page templates.
//! [`TemplateRenderer`] is the default implementation on top of `upon`,
//! shipping one template, `docs`, which renders a [`Package`] into the
//! HTML that is later split into JS chunks.
//!
//! `upon` does not escape output. Everything [`page_data`] hands to the
//! template is either pre-rendered HTML (declarations, docs, highlighted
//! code) or escaped here.

use anyhow::{anyhow, Result};
use serde_json::{json, Value as Json};
use upon::Engine;

use docwalker_core::comment::{html_escape, to_html};
use docwalker_core::models::{Example, Func, Package, Type, Value};

/// Name of the package documentation template.
pub const DOCS_TEMPLATE: &str = "docs";

const DOCS_SOURCE: &str = include_str!("../templates/docs.html");

/// Renders named templates against JSON data.
pub trait Render: Send + Sync {
    fn render(&self, template: &str, data: &Json) -> Result<Vec<u8>>;
}

pub struct TemplateRenderer {
    engine: Engine<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self> {
        let mut engine = Engine::new();
        engine
            .add_template(DOCS_TEMPLATE, DOCS_SOURCE)
            .map_err(|e| anyhow!("invalid {} template: {}", DOCS_TEMPLATE, e))?;
        Ok(Self { engine })
    }

    /// Register an extra template, replacing one with the same name.
    pub fn with_template(mut self, name: &'static str, source: String) -> Result<Self> {
        self.engine
            .add_template(name, source)
            .map_err(|e| anyhow!("invalid {} template: {}", name, e))?;
        Ok(self)
    }
}

impl Render for TemplateRenderer {
    fn render(&self, template: &str, data: &Json) -> Result<Vec<u8>> {
        let tpl = self
            .engine
            .get_template(template)
            .ok_or_else(|| anyhow!("unknown template: {}", template))?;
        let out = tpl
            .render(data)
            .to_string()
            .map_err(|e| anyhow!("render {}: {}", template, e))?;
        Ok(out.into_bytes())
    }
}

// ============ Page data ============

/// Template context for one package.
pub fn page_data(pkg: &Package) -> Json {
    let types: Vec<Json> = pkg.types.iter().map(type_data).collect();
    json!({
        "import_path": pkg.import_path(),
        "name": pkg.name,
        "synopsis": pkg.record.synopsis,
        "is_cmd": pkg.record.is_cmd,
        "doc": pkg.doc,
        "has_index": !pkg.consts.is_empty() || !pkg.vars.is_empty() || !pkg.funcs.is_empty() || !pkg.types.is_empty(),
        "has_consts": !pkg.consts.is_empty(),
        "has_vars": !pkg.vars.is_empty(),
        "has_examples": !pkg.examples.is_empty(),
        "has_files": !pkg.files.is_empty(),
        "has_imports": !pkg.imports.is_empty(),
        "has_subdirs": !pkg.record.subdirs.is_empty(),
        "consts": pkg.consts.iter().map(value_data).collect::<Vec<_>>(),
        "vars": pkg.vars.iter().map(value_data).collect::<Vec<_>>(),
        "funcs": pkg.funcs.iter().map(func_data).collect::<Vec<_>>(),
        "types": types,
        "examples": pkg.examples.iter().map(example_data).collect::<Vec<_>>(),
        "files": pkg.files,
        "imports": pkg.imports,
        "subdirs": pkg.record.subdirs,
    })
}

fn value_data(v: &Value) -> Json {
    json!({
        "fmt_decl": v.fmt_decl,
        "doc": to_html(&v.doc),
    })
}

fn func_data(f: &Func) -> Json {
    json!({
        "name": f.name,
        "recv": html_escape(&f.recv),
        "fmt_decl": f.fmt_decl,
        "doc": to_html(&f.doc),
        "url": f.url,
        "examples": f.examples.iter().map(example_data).collect::<Vec<_>>(),
    })
}

fn type_data(t: &Type) -> Json {
    json!({
        "name": t.name,
        "fmt_decl": t.fmt_decl,
        "doc": to_html(&t.doc),
        "url": t.url,
        "has_members": !t.funcs.is_empty() || !t.methods.is_empty(),
        "consts": t.consts.iter().map(value_data).collect::<Vec<_>>(),
        "vars": t.vars.iter().map(value_data).collect::<Vec<_>>(),
        "funcs": t.funcs.iter().map(func_data).collect::<Vec<_>>(),
        "methods": t.methods.iter().map(func_data).collect::<Vec<_>>(),
        "examples": t.examples.iter().map(example_data).collect::<Vec<_>>(),
    })
}

fn example_data(e: &Example) -> Json {
    let suffix = if e.name.is_empty() {
        String::new()
    } else {
        format!(" ({})", html_escape(&e.name))
    };
    json!({
        "suffix": suffix,
        "code": e.code,
        "has_output": !e.output.is_empty(),
        "output": html_escape(&e.output),
    })
}
