//! Readiness classification of file pages by the templates they carry.

use std::{fmt, sync::LazyLock};

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

use crate::wikitext::TemplateReference;

/// Templates asserting a copyright status.
pub const LICENSING_READY_TEMPLATES: &[&str] = &[
    COPYRIGHT_GAME_TEMPLATE,
    "CC0",
    "CC-BY-SA-3.0",
    "Copyright missing",
    DELETION_TEMPLATE,
];

/// Templates that render a caption on their own.
pub const DESCRIPTION_READY_TEMPLATES: &[&str] = &[
    "Map screenshot",
    "Screenshot",
    "File information",
    "Datamined texture",
    EGG_TEXTURE_TEMPLATE,
];

/// Stand-ins for the developer's name that should be replaced by [`COPYRIGHT_GAME_TEMPLATE`].
pub const DEVELOPER_PLACEHOLDER_TEMPLATES: &[&str] = &["Copyright missing", "Copyright developer"];

pub const COPYRIGHT_GAME_TEMPLATE: &str = "Copyright game";
pub const DELETION_TEMPLATE: &str = "Delete";
pub const EGG_TEXTURE_TEMPLATE: &str = "Egg texture";
pub const EGG_TEXTURE_PREFIX: &str = "File:Egg-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verb {
    #[default]
    Add,
    /// A placeholder is being swapped for the real template.
    Use,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Add => write!(f, "add"),
            Verb::Use => write!(f, "use"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub description_ready: bool,
    pub licensing_ready: bool,
    pub egg_texture: bool,
    pub copyright_game_present: bool,
    pub verb: Verb,
    pub deletion_marked: bool,
    pub placeholder_present: bool,
}

impl Classification {
    /// Nothing left to do for this page.
    pub fn is_ready(&self) -> bool {
        self.description_ready && (self.licensing_ready || self.copyright_game_present)
    }

    /// The `Licensing` section should receive [`COPYRIGHT_GAME_TEMPLATE`].
    pub fn needs_licensing(&self) -> bool {
        !self.copyright_game_present && (!self.licensing_ready || self.placeholder_present)
    }
}

// every marker name a template name is matched against, deduplicated
static MARKERS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    let mut markers: Vec<&str> = LICENSING_READY_TEMPLATES
        .iter()
        .chain(DESCRIPTION_READY_TEMPLATES)
        .chain(DEVELOPER_PLACEHOLDER_TEMPLATES)
        .copied()
        .collect();
    markers.sort_unstable();
    markers.dedup();
    markers
});

static MARKER_MATCHER: LazyLock<AhoCorasick> = LazyLock::new(|| {
    let mut builder = AhoCorasickBuilder::new();
    // overlapping search requires standard semantics
    builder.match_kind(MatchKind::Standard);
    let matcher = builder.build(MARKERS.iter()).unwrap();
    tracing::debug!(
        "built template marker matcher, kind: {:?}",
        matcher.kind()
    );
    matcher
});

/// Marker names contained in `template_name`.
fn markers_in(template_name: &str) -> impl Iterator<Item = &'static str> + '_ {
    MARKER_MATCHER
        .find_overlapping_iter(template_name)
        .map(|m| MARKERS[m.pattern().as_usize()])
}

pub fn classify(title: &str, templates: &[TemplateReference]) -> Classification {
    let mut result = Classification {
        egg_texture: title.starts_with(EGG_TEXTURE_PREFIX),
        ..Classification::default()
    };

    for template in templates {
        for marker in markers_in(&template.name) {
            if LICENSING_READY_TEMPLATES.contains(&marker) {
                result.licensing_ready = true;
            }
            if DESCRIPTION_READY_TEMPLATES.contains(&marker) {
                result.description_ready = true;
            }
            if DEVELOPER_PLACEHOLDER_TEMPLATES.contains(&marker) {
                result.placeholder_present = true;
            }
            match marker {
                COPYRIGHT_GAME_TEMPLATE => result.copyright_game_present = true,
                DELETION_TEMPLATE => result.deletion_marked = true,
                _ => {}
            }
        }
    }

    if result.deletion_marked {
        result.description_ready = true;
        result.licensing_ready = true;
    }
    if result.egg_texture {
        result.description_ready = true;
    }
    if result.placeholder_present && !result.copyright_game_present {
        result.verb = Verb::Use;
    }

    result
}
