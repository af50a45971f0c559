//! The wiki the bot works on: page enumeration and saving.

use std::{fmt, time::Duration};

use compact_str::CompactString;

/// MediaWiki namespace of file description pages.
pub const FILE_NAMESPACE: i32 = 6;
pub const USER_TALK_NAMESPACE: i32 = 3;

#[derive(Clone, PartialEq, Eq)]
pub enum PageContent {
    Text(String),
    Missing,
    Redirect(CompactString),
}

impl fmt::Debug for PageContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageContent::Text(text) => write!(f, "Text({} bytes)", text.len()),
            PageContent::Missing => write!(f, "Missing"),
            PageContent::Redirect(target) => write!(f, "Redirect({target:?})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePage {
    /// Full title including the namespace prefix, e.g. `File:Egg-Brick.png`.
    pub title: CompactString,
    pub namespace: i32,
    pub content: PageContent,
}

impl FilePage {
    pub fn new(title: &str, namespace: i32, text: &str) -> Self {
        Self {
            title: title.into(),
            namespace,
            content: PageContent::Text(text.to_string()),
        }
    }

    pub fn text(&self) -> Result<&str, PageError> {
        match &self.content {
            PageContent::Text(text) => Ok(text),
            PageContent::Missing => Err(PageError::NoPage(self.title.clone())),
            PageContent::Redirect(target) => Err(PageError::IsRedirect {
                title: self.title.clone(),
                target: target.clone(),
            }),
        }
    }

    /// Title as it appears in URLs.
    pub fn url_title(&self) -> String {
        self.title.replace(' ', "_")
    }

    pub fn is_minor_edit(&self) -> bool {
        self.namespace != USER_TALK_NAMESPACE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("{0} doesn't exist")]
    NoPage(CompactString),
    #[error("{title} is a redirect to {target}")]
    IsRedirect {
        title: CompactString,
        target: CompactString,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SaveError {
    #[error("edit conflict")]
    EditConflict,
    /// Transient, the save may be retried.
    #[error("server error: {0}")]
    ServerError(String),
    #[error("blacklisted URL {url}")]
    SpamBlacklist { url: String },
    #[error("page is locked")]
    Locked,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("failed to read pages")]
    Parsing(#[from] crate::dump_parser::ParsingError),
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// Access to the wiki.
pub trait Site {
    /// The next page in `namespace`, `None` when there are no more.
    fn next_page(&mut self, namespace: i32) -> Result<Option<FilePage>, SiteError>;

    fn save(
        &mut self,
        page: &FilePage,
        text: &str,
        summary: &str,
        minor: bool,
    ) -> Result<(), SaveError>;

    /// Where a human can look at the page.
    fn page_url(&self, page: &FilePage) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 15,
            retry_wait: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The wiki refused the edit, the page stays as it was.
    Refused(SaveError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("server error while saving {title}, maximum retries ({attempts}) exceeded: {last_error}")]
pub struct RetriesExhausted {
    pub title: CompactString,
    pub attempts: u32,
    pub last_error: String,
}

/// Saves `text`, retrying server errors according to `policy`.
///
/// A server error is retried as long as no more than `max_retries` errors came
/// before it, so at most `max_retries + 2` attempts are made.
///
/// Every other save error is logged and reported as [`SaveOutcome::Refused`].
pub fn save_with_retry<S: Site + ?Sized>(
    site: &mut S,
    page: &FilePage,
    text: &str,
    summary: &str,
    policy: RetryPolicy,
) -> Result<SaveOutcome, RetriesExhausted> {
    let mut error_count = 0;
    loop {
        let error = match site.save(page, text, summary, page.is_minor_edit()) {
            Ok(()) => return Ok(SaveOutcome::Saved),
            Err(error) => error,
        };

        match &error {
            SaveError::ServerError(message) => {
                if error_count > policy.max_retries {
                    return Err(RetriesExhausted {
                        title: page.title.clone(),
                        attempts: error_count + 1,
                        last_error: message.clone(),
                    });
                }
                error_count += 1;
                tracing::warn!(
                    message = "Server error, waiting before retrying",
                    title = page.title.as_str(),
                    error = message.as_str(),
                    attempt = error_count,
                    wait = ?policy.retry_wait
                );
                std::thread::sleep(policy.retry_wait);
                continue;
            }
            SaveError::EditConflict => {
                tracing::warn!(message = "Edit conflict, skipping", title = page.title.as_str());
            }
            SaveError::SpamBlacklist { url } => {
                tracing::warn!(
                    message = "Cannot change page because of blacklist entry",
                    title = page.title.as_str(),
                    url = url.as_str()
                );
            }
            SaveError::Locked => {
                tracing::warn!(message = "Skipping locked page", title = page.title.as_str());
            }
            SaveError::Other(reason) => {
                tracing::error!(
                    message = "Error putting page",
                    title = page.title.as_str(),
                    reason = reason.as_str()
                );
            }
        }
        return Ok(SaveOutcome::Refused(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemorySite;

    fn no_wait(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            retry_wait: Duration::ZERO,
        }
    }

    #[test]
    fn page_text_reports_missing_and_redirects() {
        let page = FilePage {
            content: PageContent::Missing,
            ..FilePage::new("File:Gone.png", FILE_NAMESPACE, "")
        };
        assert_eq!(page.text(), Err(PageError::NoPage("File:Gone.png".into())));

        let page = FilePage {
            content: PageContent::Redirect("File:New.png".into()),
            ..FilePage::new("File:Old.png", FILE_NAMESPACE, "")
        };
        assert!(matches!(page.text(), Err(PageError::IsRedirect { .. })));
    }

    #[test]
    fn url_title_and_minor_flag() {
        let page = FilePage::new("File:Brick Egg.png", FILE_NAMESPACE, "");
        assert_eq!(page.url_title(), "File:Brick_Egg.png");
        assert!(page.is_minor_edit());

        let page = FilePage::new("User talk:Bot", USER_TALK_NAMESPACE, "");
        assert!(!page.is_minor_edit());
    }

    #[test]
    fn retries_server_errors_until_success() {
        let page = FilePage::new("File:Tree.png", FILE_NAMESPACE, "old");
        let mut site = MemorySite::default().with_save_results([
            Err(SaveError::ServerError("503".into())),
            Err(SaveError::ServerError("503".into())),
            Ok(()),
        ]);

        let outcome = save_with_retry(&mut site, &page, "new", "summary", no_wait(2));

        assert_eq!(outcome, Ok(SaveOutcome::Saved));
        assert_eq!(site.save_attempts, 3);
        assert_eq!(site.saved.len(), 1);
        assert!(site.saved[0].minor);
    }

    #[test]
    fn gives_up_after_retry_budget() {
        let page = FilePage::new("File:Tree.png", FILE_NAMESPACE, "old");
        let mut site = MemorySite::default()
            .with_save_results((0..5).map(|_| Err(SaveError::ServerError("503".into()))));

        let error = save_with_retry(&mut site, &page, "new", "summary", no_wait(2)).unwrap_err();

        assert_eq!(error.attempts, 4);
        assert_eq!(site.save_attempts, 4);
        assert!(site.saved.is_empty());
    }

    #[test]
    fn zero_retry_budget_still_retries_once() {
        let page = FilePage::new("File:Tree.png", FILE_NAMESPACE, "old");
        let mut site = MemorySite::default().with_save_results([
            Err(SaveError::ServerError("503".into())),
            Ok(()),
        ]);

        let outcome = save_with_retry(&mut site, &page, "new", "summary", no_wait(0));

        assert_eq!(outcome, Ok(SaveOutcome::Saved));
        assert_eq!(site.save_attempts, 2);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let page = FilePage::new("File:Tree.png", FILE_NAMESPACE, "old");
        for error in [
            SaveError::EditConflict,
            SaveError::SpamBlacklist {
                url: "spam.example".into(),
            },
            SaveError::Locked,
            SaveError::Other("abusefilter".into()),
        ] {
            let mut site = MemorySite::default().with_save_results([Err(error.clone())]);

            let outcome = save_with_retry(&mut site, &page, "new", "summary", no_wait(3));

            assert_eq!(outcome, Ok(SaveOutcome::Refused(error)));
            assert_eq!(site.save_attempts, 1);
        }
    }
}
