//! Composition of the new page text and its edit summary.

use crate::{
    caption::CaptionSource,
    classify::{
        Verb, COPYRIGHT_GAME_TEMPLATE, DEVELOPER_PLACEHOLDER_TEMPLATES, EGG_TEXTURE_TEMPLATE,
    },
    wikitext::{remove_templates, PageSections},
};

pub const BOT_TASK_AD: &str = " ([[User:AndrybakBot/Image copyright]])";

/// Section titles (lowercase) that hold a page's licensing.
pub const LICENSING_SECTION_NAMES: &[&str] = &["licens"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryContent {
    /// Keep whatever summary section exists.
    Keep,
    Caption {
        text: String,
        source: CaptionSource,
    },
    /// The fixed caption of egg texture pages.
    EggTexture { text: String, source: CaptionSource },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicensingContent {
    Keep,
    CopyrightGame(Verb),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    /// Clause fragments describing what changed, e.g. `add summary`.
    pub clauses: Vec<String>,
}

impl Draft {
    pub fn edit_summary(&self, extra: Option<&str>) -> String {
        let clauses = if self.clauses.is_empty() {
            "clean up file page".to_string()
        } else {
            self.clauses.join("; ")
        };
        match extra {
            Some(extra) if !extra.is_empty() => format!("{clauses}{BOT_TASK_AD} ({extra})"),
            _ => format!("{clauses}{BOT_TASK_AD}"),
        }
    }
}

/// Lays out the page as header, `Summary`, `Licensing`, the remaining sections
/// in their original order, and the footer.
///
/// When `{{Copyright game}}` is added, developer placeholders are dropped from
/// everything that is kept.
pub fn compose(
    sections: &PageSections,
    summary: &SummaryContent,
    licensing: LicensingContent,
) -> Draft {
    let mut parts: Vec<String> = Vec::new();
    let mut clauses = Vec::new();

    let replaces_placeholders = matches!(licensing, LicensingContent::CopyrightGame(_));
    let kept = |text: &str| -> String {
        let text = if replaces_placeholders {
            remove_templates(text, DEVELOPER_PLACEHOLDER_TEMPLATES)
        } else {
            text.to_string()
        };
        text.trim().to_string()
    };

    let summary_idx = sections.find(crate::caption::SUMMARY_SECTION_NAMES);
    let licensing_idx = sections.find(LICENSING_SECTION_NAMES);
    let existing_summary = summary_idx.map(|idx| sections.sections[idx].body.trim());

    let header_consumed = match summary {
        SummaryContent::Keep => false,
        SummaryContent::Caption { source, .. } | SummaryContent::EggTexture { source, .. } => {
            *source == CaptionSource::Header
        }
    };
    let header = sections.header.trim();
    if !header_consumed {
        let header = kept(header);
        if !header.is_empty() {
            parts.push(header);
        }
    }

    match summary {
        SummaryContent::Keep => {
            if let Some(body) = existing_summary {
                parts.push(format!("== Summary ==\n{}", kept(body)));
            }
        }
        SummaryContent::Caption { text, .. } => {
            match existing_summary {
                None => clauses.push("add summary".to_string()),
                Some(body) if body != text.trim() => clauses.push("update summary".to_string()),
                Some(_) => {}
            }
            parts.push(format!("== Summary ==\n{}", text.trim()));
        }
        SummaryContent::EggTexture { text, .. } => {
            if existing_summary != Some(text.trim()) {
                clauses.push(format!("add [[Template:{EGG_TEXTURE_TEMPLATE}]]"));
            }
            parts.push(format!("== Summary ==\n{}", text.trim()));
        }
    }

    match licensing {
        LicensingContent::Keep => match licensing_idx {
            Some(idx) => parts.push(format!(
                "== Licensing ==\n{}",
                sections.sections[idx].body.trim()
            )),
            // a consumed header may still carry the licence templates
            None if header_consumed => {
                if let Some(i) = header.find('{') {
                    parts.push(format!("== Licensing ==\n{}", &header[i..]));
                }
            }
            None => {}
        },
        LicensingContent::CopyrightGame(verb) => {
            clauses.push(format!("{verb} [[Template:{COPYRIGHT_GAME_TEMPLATE}]]"));
            parts.push(format!("== Licensing ==\n{{{{{COPYRIGHT_GAME_TEMPLATE}}}}}"));
        }
    }

    for (idx, section) in sections.sections.iter().enumerate() {
        if Some(idx) == summary_idx || Some(idx) == licensing_idx {
            continue;
        }
        let body = kept(&section.body);
        if body.is_empty() {
            parts.push(section.heading.clone());
        } else {
            parts.push(format!("{}\n{body}", section.heading));
        }
    }

    let footer = sections.footer.trim();
    if !footer.is_empty() {
        parts.push(footer.to_string());
    }

    Draft {
        text: parts.join("\n\n"),
        clauses,
    }
}
