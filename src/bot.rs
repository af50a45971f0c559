//! The page-by-page run loop.

use compact_str::CompactString;
use rustc_hash::FxHashSet;
use tracing::instrument;

use crate::{
    caption::{
        derive_caption, find_caption_source, ready_text, CaptionChoice, CaptionSource,
        EGG_TEXTURE_CAPTION,
    },
    classify::{classify, Classification},
    operator::{Choice, Operator, OperatorError},
    rewrite::{compose, LicensingContent, SummaryContent, LICENSING_SECTION_NAMES},
    site::{
        save_with_retry, FilePage, RetriesExhausted, RetryPolicy, SaveOutcome, Site, SiteError,
        FILE_NAMESPACE,
    },
    wikitext::{extract_sections, extract_templates, PageSections},
};

const CAPTION_CHOICES: &[Choice] = &[
    ("Yes", 'y'),
    ("No", 'n'),
    ("Screenshot", 's'),
    ("Map screenshot", 'm'),
    ("Ready", 'r'),
    ("open in Browser", 'b'),
    ("Quit", 'q'),
];

const CONFIRM_CHOICES: &[Choice] = &[
    ("Yes", 'y'),
    ("No", 'n'),
    ("open in Browser", 'b'),
    ("Quit", 'q'),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub namespace: i32,
    /// Appended to every edit summary in parentheses.
    pub extra_summary: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            namespace: FILE_NAMESPACE,
            extra_summary: None,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("operator quit the bot run")]
    Quit,
    #[error("failed to talk to the operator")]
    Operator(#[source] std::io::Error),
    #[error(transparent)]
    Site(#[from] SiteError),
    #[error(transparent)]
    RetriesExhausted(#[from] RetriesExhausted),
}

impl From<OperatorError> for BotError {
    fn from(err: OperatorError) -> Self {
        match err {
            OperatorError::Quit => BotError::Quit,
            OperatorError::Io(err) => BotError::Operator(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Both description and licensing are in place.
    AlreadyReady,
    /// Missing or a redirect.
    Unavailable,
    NoChanges,
    /// The operator turned the caption or the edit down.
    Declined,
    Saved,
    /// The wiki refused the edit.
    Refused,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub pages: usize,
    pub already_ready: usize,
    pub unavailable: usize,
    pub no_changes: usize,
    pub declined: usize,
    pub saved: usize,
    pub refused: usize,
    pub quit: bool,
}

impl RunReport {
    fn record(&mut self, outcome: PageOutcome) {
        let counter = match outcome {
            PageOutcome::AlreadyReady => &mut self.already_ready,
            PageOutcome::Unavailable => &mut self.unavailable,
            PageOutcome::NoChanges => &mut self.no_changes,
            PageOutcome::Declined => &mut self.declined,
            PageOutcome::Saved => &mut self.saved,
            PageOutcome::Refused => &mut self.refused,
        };
        *counter += 1;
    }
}

pub struct Bot<S: Site, O: Operator> {
    site: S,
    operator: O,
    config: BotConfig,
}

impl<S: Site, O: Operator> Bot<S, O> {
    pub fn new(site: S, operator: O, config: BotConfig) -> Self {
        Self {
            site,
            operator,
            config,
        }
    }

    pub fn into_parts(self) -> (S, O) {
        (self.site, self.operator)
    }

    /// Works through all pages of the configured namespace.
    ///
    /// Stops early when a title shows up a second time or the operator quits.
    pub fn run(&mut self) -> Result<RunReport, BotError> {
        let mut report = RunReport::default();
        let mut looked_at: FxHashSet<CompactString> = FxHashSet::default();

        while let Some(page) = self.site.next_page(self.config.namespace)? {
            if !looked_at.insert(page.title.clone()) {
                self.operator.output("Done.")?;
                break;
            }
            report.pages += 1;

            match self.process_page(&page) {
                Ok(outcome) => report.record(outcome),
                Err(BotError::Quit) => {
                    tracing::info!("Operator quit the bot run");
                    report.quit = true;
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        tracing::info!(report = ?report, "Finished");
        Ok(report)
    }

    #[instrument(skip_all, fields(title = page.title.as_str()))]
    pub fn process_page(&mut self, page: &FilePage) -> Result<PageOutcome, BotError> {
        let url = self.site.page_url(page);
        self.operator.output(&format!(
            "Page '{}' | {}",
            page.title,
            url.as_deref().unwrap_or("(no URL)")
        ))?;

        let old_text = match page.text() {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(message = "Skipping page", error = %err);
                return Ok(PageOutcome::Unavailable);
            }
        };

        let templates = extract_templates(old_text);
        let classification = classify(&page.title, &templates);
        tracing::debug!(?classification, templates = templates.len());
        if classification.is_ready() {
            tracing::info!(message = "Page already has its templates, skipping");
            self.operator.output("\tSkipping.")?;
            return Ok(PageOutcome::AlreadyReady);
        }

        let sections = extract_sections(old_text);
        self.operator.output(&format!("Editing page {}.", page.title))?;
        let Some(summary) =
            self.summary_content(page, &classification, &sections, url.as_deref())?
        else {
            return Ok(PageOutcome::Declined);
        };

        if let Some(idx) = sections.find(LICENSING_SECTION_NAMES) {
            self.operator.output(&format!(
                "Have \"Licensing\":\n\t{}",
                sections.sections[idx].body.trim()
            ))?;
        }
        let licensing = if classification.needs_licensing() {
            LicensingContent::CopyrightGame(classification.verb)
        } else {
            LicensingContent::Keep
        };

        let draft = compose(&sections, &summary, licensing);
        // the wiki drops trailing whitespace on save
        if draft.text == old_text.trim_end() {
            self.operator.output("No changes. Nothing to do.")?;
            return Ok(PageOutcome::NoChanges);
        }

        self.operator.show_diff(old_text, &draft.text)?;
        let edit_summary = draft.edit_summary(self.config.extra_summary.as_deref());
        self.operator
            .output(&format!("Edit summary will be\n\t{edit_summary}"))?;

        loop {
            match self.operator.input_choice(
                "Do you want to accept these changes?",
                CONFIRM_CHOICES,
                'n',
            )? {
                'y' => break,
                'b' => self.open_in_browser(url.as_deref())?,
                _ => {
                    self.operator.output("Okay, doing nothing.")?;
                    return Ok(PageOutcome::Declined);
                }
            }
        }

        match save_with_retry(
            &mut self.site,
            page,
            &draft.text,
            &edit_summary,
            self.config.retry,
        )? {
            SaveOutcome::Saved => {
                tracing::info!(message = "Saved page", summary = edit_summary.as_str());
                Ok(PageOutcome::Saved)
            }
            SaveOutcome::Refused(_) => Ok(PageOutcome::Refused),
        }
    }

    /// Decides what goes into the `Summary` section, asking the operator when
    /// the caption had to be rewritten. `None` leaves the page alone.
    fn summary_content(
        &mut self,
        page: &FilePage,
        classification: &Classification,
        sections: &PageSections,
        url: Option<&str>,
    ) -> Result<Option<SummaryContent>, BotError> {
        let (source, source_text) = find_caption_source(sections);

        if classification.egg_texture {
            let text = derive_caption(&page.title, source_text)
                .unwrap_or_else(|| EGG_TEXTURE_CAPTION.to_string());
            return Ok(Some(SummaryContent::EggTexture { text, source }));
        }
        if classification.description_ready {
            return Ok(Some(SummaryContent::Keep));
        }

        let source_text = source_text.trim();
        if !source_text.is_empty() {
            self.operator
                .output(&format!("Have \"Summary\":\n\t{source_text}"))?;
        }

        let text = match derive_caption(&page.title, source_text) {
            // the summary section already holds this caption
            Some(caption)
                if matches!(source, CaptionSource::Section(_)) && caption == source_text =>
            {
                caption
            }
            Some(caption) => {
                self.operator
                    .output(&format!("Will have \"Summary\" section:\n\t{caption}"))?;
                loop {
                    let choice = match self.operator.input_choice(
                        "Is it a good summary?",
                        CAPTION_CHOICES,
                        'n',
                    )? {
                        'b' => {
                            self.open_in_browser(url)?;
                            continue;
                        }
                        'y' => CaptionChoice::Accept,
                        's' => CaptionChoice::Screenshot,
                        'm' => CaptionChoice::MapScreenshot,
                        'r' => CaptionChoice::Ready,
                        _ => CaptionChoice::Reject,
                    };
                    match choice.apply(&caption, ready_text(source, source_text)) {
                        Some(text) => break text,
                        None => {
                            self.operator.output("Okay, leaving the page alone.")?;
                            return Ok(None);
                        }
                    }
                }
            }
            None => {
                self.operator
                    .output("Type '[s]kip' to skip the image completely.")?;
                let description = self.operator.input("Please describe the file:")?;
                if matches!(description.as_str(), "" | "s" | "skip") {
                    return Ok(None);
                }
                description
            }
        };

        Ok(Some(SummaryContent::Caption { text, source }))
    }

    fn open_in_browser(&mut self, url: Option<&str>) -> Result<(), BotError> {
        match url {
            Some(url) => self.operator.open_in_browser(url)?,
            None => self.operator.output("No URL known for this page.")?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemorySite, ScriptedOperator};

    fn bot(pages: &[(&str, &str)], answers: &[&str]) -> Bot<MemorySite, ScriptedOperator> {
        Bot::new(
            MemorySite::with_pages(pages),
            ScriptedOperator::new(answers),
            BotConfig::default(),
        )
    }

    #[test]
    fn ready_page_is_not_saved() {
        let mut bot = bot(
            &[("File:Tree.png", "{{Map screenshot|Tree}}\n{{Copyright game}}")],
            &[],
        );

        let report = bot.run().unwrap();
        let (site, operator) = bot.into_parts();

        assert_eq!(report.already_ready, 1);
        assert_eq!(site.save_attempts, 0);
        assert!(operator.asked.is_empty());
    }

    #[test]
    fn accepted_caption_is_saved() {
        let mut bot = bot(&[("File:Brick Egg2.png", "Brick Egg2")], &["y", "y"]);

        let report = bot.run().unwrap();
        let (site, operator) = bot.into_parts();

        assert_eq!(report.saved, 1);
        assert_eq!(
            site.saved[0].text,
            "== Summary ==\n[[Brick Egg]]\n\n== Licensing ==\n{{Copyright game}}"
        );
        assert_eq!(
            site.saved[0].summary,
            "add summary; add [[Template:Copyright game]] ([[User:AndrybakBot/Image copyright]])"
        );
        assert!(site.saved[0].minor);
        assert_eq!(
            operator.asked,
            vec!["Is it a good summary?", "Do you want to accept these changes?"]
        );
    }

    #[test]
    fn rejected_caption_leaves_page_alone() {
        let mut bot = bot(&[("File:Tree.png", "Location of Tree")], &["n"]);

        let report = bot.run().unwrap();
        let (site, _) = bot.into_parts();

        assert_eq!(report.declined, 1);
        assert_eq!(site.save_attempts, 0);
    }

    #[test]
    fn screenshot_wrapping_and_extra_summary() {
        let mut bot = Bot::new(
            MemorySite::with_pages(&[("File:Tree.png", "Location of Tree")]),
            ScriptedOperator::new(&["m", "y"]),
            BotConfig {
                extra_summary: Some("cleanup".into()),
                ..BotConfig::default()
            },
        );

        bot.run().unwrap();
        let (site, _) = bot.into_parts();

        assert_eq!(
            site.saved[0].text,
            "== Summary ==\n{{Map screenshot|the location of [[Tree]]}}\n\n== Licensing ==\n{{Copyright game}}"
        );
        assert!(site.saved[0].summary.ends_with(" (cleanup)"));
    }

    #[test]
    fn ready_choice_keeps_source_text() {
        let mut bot = bot(&[("File:Egg2.png", "Egg2")], &["r", "y"]);

        bot.run().unwrap();
        let (site, _) = bot.into_parts();

        assert_eq!(
            site.saved[0].text,
            "== Summary ==\nEgg2\n\n== Licensing ==\n{{Copyright game}}"
        );
    }

    #[test]
    fn missing_caption_is_asked_for() {
        let mut bot = bot(
            &[
                ("File:A.png", "{{Information}}"),
                ("File:B.png", ""),
            ],
            &["Title screen", "y", "skip"],
        );

        let report = bot.run().unwrap();
        let (site, operator) = bot.into_parts();

        assert_eq!(report.saved, 1);
        assert_eq!(report.declined, 1);
        assert_eq!(
            site.saved[0].text,
            "== Summary ==\nTitle screen\n\n== Licensing ==\n{{Copyright game}}"
        );
        assert_eq!(
            operator.asked,
            vec![
                "Please describe the file:",
                "Do you want to accept these changes?",
                "Please describe the file:"
            ]
        );
    }

    #[test]
    fn egg_texture_page_needs_no_caption_prompt() {
        let mut bot = bot(&[("File:Egg-Brick.png", "Brick Egg2")], &["y"]);

        bot.run().unwrap();
        let (site, operator) = bot.into_parts();

        assert_eq!(
            site.saved[0].text,
            "== Summary ==\n{{Egg texture}}\n\n== Licensing ==\n{{Copyright game}}"
        );
        assert_eq!(
            site.saved[0].summary,
            "add [[Template:Egg texture]]; add [[Template:Copyright game]] ([[User:AndrybakBot/Image copyright]])"
        );
        assert_eq!(operator.asked, vec!["Do you want to accept these changes?"]);
    }

    #[test]
    fn plain_header_caption_is_still_offered() {
        let mut bot = bot(&[("File:Title.png", "Title screen")], &["s", "y"]);

        bot.run().unwrap();
        let (site, operator) = bot.into_parts();

        assert_eq!(
            operator.asked,
            vec!["Is it a good summary?", "Do you want to accept these changes?"]
        );
        assert_eq!(
            site.saved[0].text,
            "== Summary ==\n{{Screenshot|Title screen}}\n\n== Licensing ==\n{{Copyright game}}"
        );
    }

    #[test]
    fn ready_header_caption_leaves_licence_to_licensing_section() {
        let mut bot = bot(
            &[("File:Title.png", "Title screen in the well {{CC0}}")],
            &["r", "y"],
        );

        bot.run().unwrap();
        let (site, _) = bot.into_parts();

        assert_eq!(
            site.saved[0].text,
            "== Summary ==\nTitle screen in the well\n\n== Licensing ==\n{{CC0}}"
        );
    }

    #[test]
    fn placeholder_in_header_is_replaced() {
        let mut bot = bot(
            &[("File:Tree.png", "{{Screenshot|Tree}}\n{{Copyright developer}}")],
            &["y"],
        );

        bot.run().unwrap();
        let (site, _) = bot.into_parts();

        assert_eq!(
            site.saved[0].text,
            "{{Screenshot|Tree}}\n\n== Licensing ==\n{{Copyright game}}"
        );
        assert!(site.saved[0].summary.starts_with("use [[Template:Copyright game]]"));

        let mut bot = Bot::new(
            site.reload(&[("File:Tree.png", "")]),
            ScriptedOperator::default(),
            BotConfig::default(),
        );
        let report = bot.run().unwrap();
        assert_eq!(report.already_ready, 1);
    }

    #[test]
    fn placeholder_is_replaced_with_use_verb() {
        let mut bot = bot(
            &[(
                "File:Tree.png",
                "== Summary ==\n{{Screenshot|Tree}}\n== Licensing ==\n{{Copyright developer}}",
            )],
            &["y"],
        );

        bot.run().unwrap();
        let (site, _) = bot.into_parts();

        assert_eq!(
            site.saved[0].text,
            "== Summary ==\n{{Screenshot|Tree}}\n\n== Licensing ==\n{{Copyright game}}"
        );
        assert!(site.saved[0].summary.starts_with("use [[Template:Copyright game]]"));
    }

    #[test]
    fn redirects_and_missing_pages_are_skipped() {
        let mut site = MemorySite::with_pages(&[("File:A.png", "Brick Egg")]);
        site.push_page(FilePage {
            content: crate::site::PageContent::Missing,
            ..FilePage::new("File:Gone.png", FILE_NAMESPACE, "")
        });
        site.push_page(FilePage {
            content: crate::site::PageContent::Redirect("File:A.png".into()),
            ..FilePage::new("File:Old.png", FILE_NAMESPACE, "")
        });
        let mut bot = Bot::new(site, ScriptedOperator::new(&["n"]), BotConfig::default());

        let report = bot.run().unwrap();

        assert_eq!(report.pages, 3);
        assert_eq!(report.declined, 1);
        assert_eq!(report.unavailable, 2);
    }

    #[test]
    fn browser_choice_asks_again() {
        let mut bot = bot(&[("File:Tree.png", "Location of Tree")], &["b", "y", "b", "n"]);

        let report = bot.run().unwrap();
        let (site, operator) = bot.into_parts();

        assert_eq!(report.declined, 1);
        assert_eq!(site.save_attempts, 0);
        assert_eq!(
            operator.opened,
            vec![
                "https://wiki.example/wiki/File:Tree.png",
                "https://wiki.example/wiki/File:Tree.png"
            ]
        );
    }
}
