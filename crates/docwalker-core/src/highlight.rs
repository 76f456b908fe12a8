//! Single-pass source highlighter.
//!
//! A byte-level finite-state machine that classifies Go source into
//! comments, strings, keywords and identifiers, and splices in anchors
//! from a [`LinkIndex`]. Apart from the inserted markup the output is
//! byte-identical to the input: nothing is reordered, dropped or rewritten.
//!
//! ```text
//!            "//"              '\n'
//!   Normal ───────▶ LineComment ─────▶ Normal
//!     │   "/*"               "*/"
//!     ├───────▶ BlockComment ─────▶ Normal
//!     │  '"' '\'' '`'         same quote (unescaped)
//!     └───────▶ Str{quote} ─────────────────▶ Normal
//! ```
//!
//! Input is expected to be pre-escaped for `<`, `>` and `&` (see
//! [`format_source`]). Entities such as `&lt;` are copied through whole so
//! their letters are never mistaken for identifiers. Unterminated strings
//! and comments are closed at end of input. Malformed UTF-8 and control
//! bytes pass through untouched.

use crate::comment::escape_code;
use crate::xref::LinkIndex;

/// Lexer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Normal,
    LineComment,
    BlockComment,
    Str { quote: u8, escaped: bool },
}

/// Semantic class of a reserved word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordClass {
    /// `return`, `break`, `goto`
    Ret,
    /// declaration and control-flow keywords
    Key,
    /// `true`, `false`, `nil`, `iota`
    Boo,
    /// built-in functions
    Bui,
}

impl WordClass {
    pub fn css(self) -> &'static str {
        match self {
            WordClass::Ret => "ret",
            WordClass::Key => "key",
            WordClass::Boo => "boo",
            WordClass::Bui => "bui",
        }
    }
}

pub fn classify(word: &[u8]) -> Option<WordClass> {
    Some(match word {
        b"return" | b"break" | b"goto" => WordClass::Ret,
        b"func" | b"range" | b"for" | b"if" | b"else" | b"type" | b"struct" | b"select"
        | b"case" | b"var" | b"const" | b"switch" | b"default" | b"continue" | b"import"
        | b"package" | b"interface" | b"map" | b"chan" | b"go" | b"defer" | b"fallthrough" => {
            WordClass::Key
        }
        b"true" | b"false" | b"nil" | b"iota" => WordClass::Boo,
        b"new" | b"append" | b"make" | b"panic" | b"recover" | b"len" | b"cap" | b"copy"
        | b"close" | b"delete" | b"print" | b"println" | b"complex" | b"real" | b"imag"
        | b"min" | b"max" | b"clear" => WordClass::Bui,
        _ => return None,
    })
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b >= 0x80
}

/// Length of an HTML entity starting at `src[i] == b'&'`, if there is one.
fn entity_len(src: &[u8], i: usize) -> Option<usize> {
    let rest = &src[i + 1..];
    let end = rest.iter().take(10).position(|&b| b == b';')?;
    if end == 0 {
        return None;
    }
    let body = &rest[..end];
    let valid = body
        .iter()
        .enumerate()
        .all(|(k, &b)| b.is_ascii_alphanumeric() || (k == 0 && b == b'#'));
    valid.then_some(end + 2)
}

const SPAN_END: &[u8] = b"</span>";

/// Highlighter over one buffer.
pub struct Highlighter<'a> {
    links: &'a LinkIndex,
    state: State,
    out: Vec<u8>,
}

impl<'a> Highlighter<'a> {
    pub fn new(links: &'a LinkIndex) -> Self {
        Self {
            links,
            state: State::Normal,
            out: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Run the state machine over `src` and return the annotated bytes.
    pub fn run(mut self, src: &[u8]) -> Vec<u8> {
        self.out.reserve(src.len() + src.len() / 2);
        let mut i = 0;
        while i < src.len() {
            i = match self.state {
                State::Normal => self.step_normal(src, i),
                State::LineComment => self.step_line_comment(src, i),
                State::BlockComment => self.step_block_comment(src, i),
                State::Str { quote, escaped } => self.step_string(src, i, quote, escaped),
            };
        }
        if self.state != State::Normal {
            self.out.extend_from_slice(SPAN_END);
            self.state = State::Normal;
        }
        self.out
    }

    fn step_normal(&mut self, src: &[u8], i: usize) -> usize {
        let b = src[i];
        let next = src.get(i + 1).copied();
        match b {
            b'/' if next == Some(b'/') => {
                self.out.extend_from_slice(br#"<span class="com">//"#);
                self.state = State::LineComment;
                i + 2
            }
            b'/' if next == Some(b'*') => {
                self.out.extend_from_slice(br#"<span class="com">/*"#);
                self.state = State::BlockComment;
                i + 2
            }
            b'"' | b'\'' | b'`' => {
                self.out.extend_from_slice(br#"<span class="str">"#);
                self.out.push(b);
                self.state = State::Str {
                    quote: b,
                    escaped: false,
                };
                i + 1
            }
            b'&' => match entity_len(src, i) {
                Some(n) => {
                    self.out.extend_from_slice(&src[i..i + n]);
                    i + n
                }
                None => {
                    self.out.push(b);
                    i + 1
                }
            },
            _ if is_word_byte(b) => {
                let end = src[i..]
                    .iter()
                    .position(|&c| !is_word_byte(c))
                    .map_or(src.len(), |p| i + p);
                self.emit_word(&src[i..end], src.get(end).copied());
                end
            }
            _ => {
                self.out.push(b);
                i + 1
            }
        }
    }

    fn step_line_comment(&mut self, src: &[u8], i: usize) -> usize {
        if src[i] == b'\n' {
            self.out.extend_from_slice(SPAN_END);
            self.out.push(b'\n');
            self.state = State::Normal;
        } else {
            self.out.push(src[i]);
        }
        i + 1
    }

    fn step_block_comment(&mut self, src: &[u8], i: usize) -> usize {
        if src[i] == b'*' && src.get(i + 1) == Some(&b'/') {
            self.out.extend_from_slice(b"*/");
            self.out.extend_from_slice(SPAN_END);
            self.state = State::Normal;
            return i + 2;
        }
        self.out.push(src[i]);
        i + 1
    }

    fn step_string(&mut self, src: &[u8], i: usize, quote: u8, escaped: bool) -> usize {
        let b = src[i];
        if escaped {
            self.out.push(b);
            self.state = State::Str {
                quote,
                escaped: false,
            };
            return i + 1;
        }
        if b == b'\n' && quote != b'`' {
            // Interpreted strings cannot span lines; close before the newline.
            self.out.extend_from_slice(SPAN_END);
            self.out.push(b);
            self.state = State::Normal;
            return i + 1;
        }
        self.out.push(b);
        if b == quote {
            self.out.extend_from_slice(SPAN_END);
            self.state = State::Normal;
        } else if b == b'\\' && quote != b'`' {
            self.state = State::Str {
                quote,
                escaped: true,
            };
        }
        i + 1
    }

    fn emit_word(&mut self, word: &[u8], next: Option<u8>) {
        if let Some(class) = classify(word) {
            self.out.extend_from_slice(b"<span class=\"");
            self.out.extend_from_slice(class.css().as_bytes());
            self.out.extend_from_slice(b"\">");
            self.out.extend_from_slice(word);
            self.out.extend_from_slice(SPAN_END);
            return;
        }

        let trimmed_len = word.len() - word.iter().rev().take_while(|&&c| c == b'.').count();
        let (name, tail) = word.split_at(trimmed_len);
        let starts_ident = name
            .first()
            .is_some_and(|&c| c.is_ascii_alphabetic() || c == b'_' || c >= 0x80);
        if !starts_ident {
            self.out.extend_from_slice(word);
            return;
        }
        let Ok(name_str) = std::str::from_utf8(name) else {
            self.out.extend_from_slice(word);
            return;
        };

        if let Some(anchor) = self.links.anchor_for(name_str) {
            self.out.extend_from_slice(anchor.as_bytes());
            self.out.extend_from_slice(name);
            self.out.extend_from_slice(b"</a>");
            self.out.extend_from_slice(tail);
        } else if next == Some(b' ') && tail.is_empty() {
            self.out.extend_from_slice(b"<span id=\"");
            self.out.extend_from_slice(name);
            self.out.extend_from_slice(b"\">");
            self.out.extend_from_slice(name);
            self.out.extend_from_slice(SPAN_END);
        } else {
            self.out.extend_from_slice(word);
        }
    }
}

/// Highlight pre-escaped bytes.
pub fn highlight(src: &[u8], links: &LinkIndex) -> Vec<u8> {
    Highlighter::new(links).run(src)
}

/// Highlight pre-escaped text.
pub fn format_code(code: &str, links: &LinkIndex) -> String {
    let bytes = highlight(code.as_bytes(), links);
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// Escape raw source and highlight it.
pub fn format_source(code: &str, links: &LinkIndex) -> String {
    format_code(&escape_code(code), links)
}

/// Remove every `<...>` tag. Used to check that highlighting only adds markup.
pub fn strip_tags(html: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(html.len());
    let mut in_tag = false;
    for &b in html {
        match (in_tag, b) {
            (false, b'<') => in_tag = true,
            (true, b'>') => in_tag = false,
            (false, _) => out.push(b),
            (true, _) => {}
        }
    }
    out
}
