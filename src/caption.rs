//! Caption derivation from free-text summaries.
//!
//! File pages uploaded by hand often carry a bare description such as
//! `Brick Egg2.` or `Location of Tree`. These functions turn that text into a
//! caption suitable for the page's `Summary` section.

use std::sync::LazyLock;

use memchr::memmem;
use regex::Regex;

use crate::{classify::EGG_TEXTURE_PREFIX, wikitext::PageSections};

pub const EGG_TEXTURE_CAPTION: &str = "{{Egg texture}}";

/// Section titles (lowercase) that hold a page's description.
pub const SUMMARY_SECTION_NAMES: &[&str] = &["summary", "description"];

static LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[lL]ocation([.]| of)?").unwrap());

/// Where the caption text of a page was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionSource {
    /// Index into [`PageSections::sections`].
    Section(usize),
    Header,
}

/// Picks the summary or description section, falling back to the header.
pub fn find_caption_source(sections: &PageSections) -> (CaptionSource, &str) {
    match sections.find(SUMMARY_SECTION_NAMES) {
        Some(idx) => (CaptionSource::Section(idx), &sections.sections[idx].body),
        None => (CaptionSource::Header, &sections.header),
    }
}

/// Cuts `source` at the first embedded template call and then before the
/// first ` in ` clause.
pub fn truncate_caption(source: &str) -> &str {
    let mut caption = source.trim();
    if let Some(i) = memchr::memchr(b'{', caption.as_bytes()) {
        caption = &caption[..i];
    }
    if let Some(i) = memmem::find(caption.as_bytes(), b" in ") {
        caption = &caption[..i];
    }
    caption.trim()
}

/// Applies the rewrite rules to an already truncated caption.
///
/// Captions that already contain a wikilink are only cleaned up, never relinked.
pub fn rewrite_caption(caption: &str) -> String {
    let caption = caption.trim();
    let caption = caption.strip_suffix('.').unwrap_or(caption);
    // uploads were often named like 'Brick Egg2', only the 'Brick Egg' part is wanted
    let caption = caption.replace('2', "");
    let caption = caption.trim();

    if caption.contains("[[") {
        return caption.to_string();
    }

    if caption.contains("ocation") {
        let target = capitalize(LOCATION.replace_all(caption, "").trim());
        if !target.is_empty() {
            return format!("the location of [[{target}]]");
        }
    } else if caption.contains("Egg") {
        // known gap: '65th Egg' becomes '[[th Egg]]'
        let target: String = caption.chars().filter(|c| !c.is_ascii_digit()).collect();
        return format!("[[{}]]", target.trim());
    }

    caption.to_string()
}

/// Derives the caption for `title` from its summary text.
///
/// Returns `None` if nothing usable is left, in which case the operator has to
/// describe the file.
pub fn derive_caption(title: &str, source: &str) -> Option<String> {
    if title.starts_with(EGG_TEXTURE_PREFIX) {
        return Some(EGG_TEXTURE_CAPTION.to_string());
    }

    let truncated = truncate_caption(source);
    if truncated.is_empty() {
        return None;
    }
    let caption = rewrite_caption(truncated);
    if caption.is_empty() {
        None
    } else {
        Some(caption)
    }
}

/// Text the operator's "ready" choice keeps. A header source loses everything
/// from its first template call on, those calls move to the `Licensing` section.
pub fn ready_text(source: CaptionSource, text: &str) -> &str {
    let text = text.trim();
    match (source, memchr::memchr(b'{', text.as_bytes())) {
        (CaptionSource::Header, Some(i)) => text[..i].trim(),
        _ => text,
    }
}

/// Upper-cases the first character and lower-cases the rest.
fn capitalize(input: &str) -> String {
    fn push_mapped(result: &mut String, original: char, mapped: &[u32]) {
        if mapped.iter().all(|&c| c == 0) {
            result.push(original);
            return;
        }
        for &c in mapped.iter().take_while(|&&c| c != 0) {
            result.push(char::from_u32(c).unwrap_or(original));
        }
    }

    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars();
    if let Some(first) = chars.next() {
        push_mapped(&mut result, first, &unicode_case_mapping::to_uppercase(first));
    }
    for c in chars {
        push_mapped(&mut result, c, &unicode_case_mapping::to_lowercase(c));
    }
    result
}

/// What the operator decided about a proposed caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionChoice {
    Accept,
    /// Leave the page alone for this run.
    Reject,
    Screenshot,
    MapScreenshot,
    /// Take the original text verbatim.
    Ready,
}

impl CaptionChoice {
    /// Final caption for this choice, `None` when the page should be left alone.
    pub fn apply(self, caption: &str, source: &str) -> Option<String> {
        match self {
            CaptionChoice::Accept => Some(caption.to_string()),
            CaptionChoice::Reject => None,
            CaptionChoice::Screenshot => Some(wrap_in_template("Screenshot", caption)),
            CaptionChoice::MapScreenshot => Some(wrap_in_template("Map screenshot", caption)),
            CaptionChoice::Ready => Some(source.trim().to_string()),
        }
    }
}

fn wrap_in_template(template: &str, caption: &str) -> String {
    if caption.contains('=') {
        format!("{{{{{template}|1={caption}}}}}")
    } else {
        format!("{{{{{template}|{caption}}}}}")
    }
}
