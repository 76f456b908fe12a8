//! Doc comment helpers: HTML escaping, synopsis extraction and the
//! comment-to-HTML conversion used for package and declaration docs.

/// Escape `<`, `>`, `&`, `"` and `'` for HTML text and attributes.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape only `<`, `>` and `&`, the set the highlighter expects its
/// input to be pre-escaped with.
pub fn escape_code(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / 8);
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

/// First sentence of a doc comment, whitespace collapsed.
///
/// The sentence ends at the first period followed by whitespace (unless
/// the word before it is a single upper-case letter, as in `"A. Smith"`),
/// or at the first blank line.
pub fn synopsis(doc: &str) -> String {
    let para = doc.split("\n\n").next().unwrap_or_default();
    let flat: String = para.split_whitespace().collect::<Vec<_>>().join(" ");

    let bytes = flat.as_bytes();
    let mut end = flat.len();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'.' {
            continue;
        }
        let at_end = i + 1 == bytes.len();
        let followed_by_space = !at_end && bytes[i + 1] == b' ';
        if !(at_end || followed_by_space) {
            continue;
        }
        let initial = i >= 1
            && bytes[i - 1].is_ascii_uppercase()
            && (i == 1 || bytes[i - 2] == b' ');
        if initial {
            continue;
        }
        end = i + 1;
        break;
    }
    flat[..end].to_string()
}

/// Truncate to at most `max` bytes without splitting a character.
pub fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Convert a plain-text doc comment into simple HTML.
///
/// Blank lines separate paragraphs. Runs of indented lines become a
/// `<pre>` block. Text is escaped.
pub fn to_html(doc: &str) -> String {
    let mut out = String::new();
    let mut para: Vec<&str> = Vec::new();
    let mut pre: Vec<&str> = Vec::new();

    fn flush_para(out: &mut String, para: &mut Vec<&str>) {
        if para.is_empty() {
            return;
        }
        out.push_str("<p>\n");
        out.push_str(&html_escape(&para.join("\n")));
        out.push_str("\n</p>\n");
        para.clear();
    }

    fn flush_pre(out: &mut String, pre: &mut Vec<&str>) {
        while pre.last().is_some_and(|l| l.trim().is_empty()) {
            pre.pop();
        }
        if pre.is_empty() {
            return;
        }
        out.push_str("<pre>");
        out.push_str(&html_escape(&unindent(pre).join("\n")));
        out.push_str("</pre>\n");
        pre.clear();
    }

    for line in doc.lines() {
        let indented = line.starts_with(' ') || line.starts_with('\t');
        if line.trim().is_empty() {
            if pre.is_empty() {
                flush_para(&mut out, &mut para);
            } else {
                pre.push(line);
            }
        } else if indented {
            flush_para(&mut out, &mut para);
            pre.push(line);
        } else {
            flush_pre(&mut out, &mut pre);
            para.push(line);
        }
    }
    flush_pre(&mut out, &mut pre);
    flush_para(&mut out, &mut para);
    out
}

/// Strip the common leading whitespace of non-blank lines.
fn unindent<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| if l.len() >= indent { &l[indent..] } else { l.trim_start() })
        .collect()
}
