//! Closing-tag-boundary artifact splitter.
//!
//! Rendered documentation pages are served as one or more static
//! JavaScript files, each a single `document.write("…")` call. Small pages
//! become one file; large pages are split so the browser can start
//! rendering before the whole page has downloaded.
//!
//! # Algorithm
//!
//! 1. Output below [`SINGLE_CHUNK_LIMIT`] bytes is one chunk.
//! 2. Otherwise the first split point is [`FIRST_CHUNK_SIZE`] bytes in,
//!    and every later one [`CHUNK_SIZE`] bytes after the previous.
//! 3. Each split point moves forward to just past the next closing tag
//!    (`</…>`). With no closing tag ahead it is only moved forward to a
//!    char boundary.
//! 4. Every chunk is JS-string escaped and wrapped.
//!
//! # Example
//!
//! ```rust
//! use docwalker_core::chunk::split_html;
//!
//! let page = "<p>x</p>".repeat(12_000);
//! let chunks = split_html(&page);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks.concat(), page);
//! ```

/// Pages shorter than this are written as a single chunk.
pub const SINGLE_CHUNK_LIMIT: usize = 80_000;

/// Size of the first chunk of a split page.
pub const FIRST_CHUNK_SIZE: usize = 40_000;

/// Size of every following chunk.
pub const CHUNK_SIZE: usize = 204_800;

/// Split rendered HTML into chunk slices.
///
/// The slices are contiguous and concatenate back to `html`. At least one
/// slice is always returned.
pub fn split_html(html: &str) -> Vec<&str> {
    if html.len() < SINGLE_CHUNK_LIMIT {
        return vec![html];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut step = FIRST_CHUNK_SIZE;
    while start < html.len() {
        let target = start + step;
        if target >= html.len() {
            chunks.push(&html[start..]);
            break;
        }
        let end = next_tag_boundary(html, target);
        chunks.push(&html[start..end]);
        start = end;
        step = CHUNK_SIZE;
    }
    chunks
}

/// Byte index just past the first closing tag at or after `from`, or the
/// first char boundary at or after `from` when no closing tag follows.
fn next_tag_boundary(html: &str, from: usize) -> usize {
    let from = snap_forward(html, from);
    html[from..]
        .find("</")
        .and_then(|open| {
            let tag_start = from + open;
            html[tag_start..].find('>').map(|close| tag_start + close + 1)
        })
        .unwrap_or(from)
}

/// Move a byte index forward to the nearest valid UTF-8 char boundary.
fn snap_forward(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Escape text for a double-quoted JavaScript string literal.
pub fn js_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / 16);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            // keeps "</script>" inside the payload from closing a host tag
            '<' => out.push_str("\\x3c"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Wrap one chunk as a `document.write` call.
pub fn to_js(chunk: &str) -> String {
    format!("document.write(\"{}\")", js_escape(chunk))
}

/// Split and wrap a rendered page. The number of extra files is
/// `len() - 1`.
pub fn build_js_chunks(html: &str) -> Vec<String> {
    split_html(html).into_iter().map(to_js).collect()
}
