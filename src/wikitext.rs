//! Template introspection and section extraction for raw page markup.

use std::{ops::Range, sync::LazyLock};

use compact_str::CompactString;
use regex::Regex;
use rustc_hash::FxHashMap;

/// A template transcluded by a page, with its parameters.
///
/// Positional parameters are keyed by their 1-based index (`"1"`, `"2"`, ...),
/// named parameters by their trimmed name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateReference {
    pub name: CompactString,
    pub parameters: FxHashMap<CompactString, String>,
}

impl TemplateReference {
    pub fn new(name: &str) -> Self {
        Self {
            name: normalize_template_name(name),
            parameters: FxHashMap::default(),
        }
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

/// MediaWiki treats `_` and ` ` alike in titles and upper-cases the first letter.
fn normalize_template_name(name: &str) -> CompactString {
    let name = name.trim();
    let name = name
        .strip_prefix("Template:")
        .or_else(|| name.strip_prefix("template:"))
        .unwrap_or(name)
        .trim();

    let mut result = CompactString::with_capacity(name.len());
    let mut chars = name.chars();
    if let Some(first) = chars.next() {
        result.extend(first.to_uppercase());
    }
    let mut last_was_space = false;
    for c in chars {
        let c = if c == '_' { ' ' } else { c };
        if c == ' ' && last_was_space {
            continue;
        }
        last_was_space = c == ' ';
        result.push(c);
    }
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Brace {
    Template,
    Parameter,
}

/// Finds every template call in `text`, including templates nested inside parameters.
///
/// Results are ordered by the position of their opening braces. Parser functions
/// (`{{#if:...}}`) and template parameters (`{{{1}}}`) are not reported.
pub fn extract_templates(text: &str) -> Vec<TemplateReference> {
    template_spans(text)
        .into_iter()
        .filter_map(|span| parse_template(&text[span.start + 2..span.end - 2]))
        .collect()
}

/// Removes every call of a template named in `names` (compared after name
/// normalization). A call that had a line to itself takes its line break along.
pub fn remove_templates(text: &str, names: &[&str]) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    for span in template_spans(text) {
        // nested in a call that is already gone
        if span.start < last {
            continue;
        }
        let Some(template) = parse_template(&text[span.start + 2..span.end - 2]) else {
            continue;
        };
        if !names.iter().any(|name| template.name == *name) {
            continue;
        }

        result.push_str(&text[last..span.start]);
        last = span.end;
        let line_start = span.start == 0 || text.as_bytes()[span.start - 1] == b'\n';
        if line_start && text.as_bytes().get(span.end) == Some(&b'\n') {
            last += 1;
        }
    }
    result.push_str(&text[last..]);
    result
}

/// Byte ranges of all `{{...}}` calls, ordered by their start.
fn template_spans(text: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut stack: Vec<(Brace, usize)> = Vec::new();
    let mut spans = Vec::new();

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(b"<!--") {
            // comments may contain stray braces
            match memchr::memmem::find(&bytes[i + 4..], b"-->") {
                Some(end) => i += 4 + end + 3,
                None => break,
            }
            continue;
        }
        if bytes[i..].starts_with(b"{{{") {
            stack.push((Brace::Parameter, i));
            i += 3;
        } else if bytes[i..].starts_with(b"{{") {
            stack.push((Brace::Template, i));
            i += 2;
        } else if bytes[i..].starts_with(b"}}") {
            match stack.last() {
                Some((Brace::Parameter, _)) if bytes[i..].starts_with(b"}}}") => {
                    stack.pop();
                    i += 3;
                }
                Some((Brace::Template, start)) => {
                    spans.push(*start..i + 2);
                    stack.pop();
                    i += 2;
                }
                // unbalanced, treat as text
                _ => i += 2,
            }
        } else {
            i += 1;
        }
    }

    spans.sort_by_key(|span| span.start);
    spans
}

fn parse_template(inner: &str) -> Option<TemplateReference> {
    let mut parts = split_top_level(inner).into_iter();
    let name = parts.next()?.trim();
    if name.is_empty() || name.starts_with('#') || name.contains(['{', '}', '\n']) {
        return None;
    }

    let mut template = TemplateReference::new(name);
    let mut position = 0;
    for part in parts {
        match top_level_equals(part) {
            Some(eq) => {
                let key = part[..eq].trim();
                template
                    .parameters
                    .insert(CompactString::from(key), part[eq + 1..].trim().to_string());
            }
            None => {
                position += 1;
                template
                    .parameters
                    .insert(CompactString::from(position.to_string()), part.to_string());
            }
        }
    }
    Some(template)
}

/// Splits on `|` that are not inside nested templates or links.
fn split_top_level(inner: &str) -> Vec<&str> {
    let bytes = inner.as_bytes();
    let mut depth = 0usize;
    let mut parts = Vec::new();
    let mut last = 0;
    let mut i = 0;
    while i < bytes.len() {
        match &bytes[i..] {
            [b'{', b'{', ..] | [b'[', b'[', ..] => {
                depth += 1;
                i += 2;
            }
            [b'}', b'}', ..] | [b']', b']', ..] => {
                depth = depth.saturating_sub(1);
                i += 2;
            }
            [b'|', ..] if depth == 0 => {
                parts.push(&inner[last..i]);
                i += 1;
                last = i;
            }
            _ => i += 1,
        }
    }
    parts.push(&inner[last..]);
    parts
}

fn top_level_equals(part: &str) -> Option<usize> {
    let bytes = part.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match &bytes[i..] {
            [b'{', b'{', ..] | [b'[', b'[', ..] => {
                depth += 1;
                i += 2;
            }
            [b'}', b'}', ..] | [b']', b']', ..] => {
                depth = depth.saturating_sub(1);
                i += 2;
            }
            [b'=', ..] if depth == 0 => return Some(i),
            _ => i += 1,
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// The heading line as written, e.g. `== Summary ==`.
    pub heading: String,
    /// The heading text without the surrounding `=`.
    pub title: String,
    pub level: usize,
    /// Everything between the heading line and the next heading.
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSections {
    pub header: String,
    pub sections: Vec<Section>,
    /// Trailing category links after the last section.
    pub footer: String,
}

impl PageSections {
    /// Index of the first section whose title contains any of `needles`, ignoring case.
    pub fn find(&self, needles: &[&str]) -> Option<usize> {
        self.sections.iter().position(|section| {
            let title = section.title.to_lowercase();
            needles.iter().any(|needle| title.contains(needle))
        })
    }
}

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(=+)[ \t]*(.+?)[ \t]*(=+)[ \t]*$").unwrap());
static CATEGORY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*\[\[\s*[Cc]ategory\s*:[^\]]*\]\]\s*)+$").unwrap()
});

/// Splits page markup into the text before the first heading, the headed
/// sections in order, and the trailing block of category links.
pub fn extract_sections(text: &str) -> PageSections {
    let mut headings = Vec::new();
    for cap in HEADING.captures_iter(text) {
        let left = cap[1].len();
        let right = cap[3].len();
        let level = left.min(right);
        if level > 6 {
            continue;
        }
        let Some(whole) = cap.get(0) else {
            continue;
        };
        // unbalanced `=` belong to the title
        let mut title = String::new();
        title.push_str(&"=".repeat(left - level));
        title.push_str(&cap[2]);
        title.push_str(&"=".repeat(right - level));
        headings.push((whole.start(), whole.end(), title.trim().to_string(), level));
    }

    let header_end = headings.first().map_or(text.len(), |h| h.0);
    let mut result = PageSections {
        header: text[..header_end].to_string(),
        ..PageSections::default()
    };

    for (idx, (start, end, title, level)) in headings.iter().enumerate() {
        let body_start = (*end + 1).min(text.len());
        let body_end = headings.get(idx + 1).map_or(text.len(), |next| next.0);
        result.sections.push(Section {
            heading: text[*start..*end].to_string(),
            title: title.clone(),
            level: *level,
            body: text[body_start.min(body_end)..body_end].to_string(),
        });
    }

    let last = match result.sections.last_mut() {
        Some(section) => &mut section.body,
        None => &mut result.header,
    };
    let footer_start = footer_start(last);
    result.footer = last.split_off(footer_start);

    result
}

fn footer_start(text: &str) -> usize {
    let mut start = text.len();
    let mut found_category = false;
    for (offset, line) in line_offsets(text).into_iter().rev() {
        if line.trim().is_empty() {
            start = offset;
        } else if CATEGORY_LINE.is_match(line) {
            found_category = true;
            start = offset;
        } else {
            break;
        }
    }
    if found_category {
        start
    } else {
        text.len()
    }
}

fn line_offsets(text: &str) -> Vec<(usize, &str)> {
    let mut offset = 0;
    text.split_inclusive('\n')
        .map(|line| {
            let start = offset;
            offset += line.len();
            (start, line)
        })
        .collect()
}
