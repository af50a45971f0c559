//! A [`Site`] backed by a MediaWiki XML export.
//!
//! Pages are read from the export and accepted edits are written to a second
//! XML file that can be loaded with `Special:Import` or `importDump.php`.

use std::io::{BufRead, Write};

use compact_str::CompactString;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::{
    dump_parser::{DumpParser, Namespace, Page, SiteInfo, Text, TIMESTAMP_FORMAT_LONG},
    site::{FilePage, PageContent, SaveError, Site, SiteError},
};

const EXPORT_NAMESPACE: &str = "http://www.mediawiki.org/xml/export-0.11/";

/// Writes pages in the MediaWiki export format.
pub struct ImportWriter<W: Write> {
    writer: quick_xml::Writer<W>,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to write import file: {0}")]
pub struct ImportError(String);

impl<W: Write> ImportWriter<W> {
    pub fn new(inner: W, site_info: &SiteInfo) -> Result<Self, ImportError> {
        let mut new = Self {
            writer: quick_xml::Writer::new_with_indent(inner, b' ', 2),
        };

        new.emit(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        new.emit(Event::Start(
            BytesStart::new("mediawiki")
                .with_attributes([("xmlns", EXPORT_NAMESPACE), ("version", "0.11")]),
        ))?;
        new.start("siteinfo")?;
        new.text_element("sitename", &site_info.sitename)?;
        new.text_element("dbname", &site_info.dbname)?;
        if let Some(base) = &site_info.base {
            new.text_element("base", base)?;
        }
        new.start("namespaces")?;
        let mut keys: Vec<_> = site_info.namespaces.keys().copied().collect();
        keys.sort_unstable();
        for key in keys {
            let key_string = key.to_string();
            let tag = BytesStart::new("namespace").with_attributes([("key", key_string.as_str())]);
            match &site_info.namespaces[&key] {
                Namespace::Default => new.emit(Event::Empty(tag))?,
                Namespace::Named(name) => {
                    new.emit(Event::Start(tag))?;
                    new.emit(Event::Text(BytesText::new(name)))?;
                    new.end("namespace")?;
                }
            }
        }
        new.end("namespaces")?;
        new.end("siteinfo")?;

        Ok(new)
    }

    fn emit(&mut self, event: Event<'_>) -> Result<(), ImportError> {
        self.writer
            .write_event(event)
            .map_err(|err| ImportError(err.to_string()))
    }

    fn start(&mut self, name: &str) -> Result<(), ImportError> {
        self.emit(Event::Start(BytesStart::new(name)))
    }

    fn end(&mut self, name: &str) -> Result<(), ImportError> {
        self.emit(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<(), ImportError> {
        self.start(name)?;
        self.emit(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    pub fn write_page(
        &mut self,
        page: &FilePage,
        username: &str,
        text: &str,
        summary: &str,
        minor: bool,
    ) -> Result<(), ImportError> {
        let timestamp = chrono::Utc::now().format(TIMESTAMP_FORMAT_LONG).to_string();

        self.start("page")?;
        self.text_element("title", &page.title)?;
        self.text_element("ns", &page.namespace.to_string())?;
        self.start("revision")?;
        self.text_element("timestamp", &timestamp)?;
        self.start("contributor")?;
        self.text_element("username", username)?;
        self.end("contributor")?;
        self.text_element("comment", summary)?;
        if minor {
            self.emit(Event::Empty(BytesStart::new("minor")))?;
        }
        self.text_element("model", "wikitext")?;
        self.text_element("format", "text/x-wiki")?;
        let bytes = text.len().to_string();
        self.emit(Event::Start(BytesStart::new("text").with_attributes([
            ("bytes", bytes.as_str()),
            ("xml:space", "preserve"),
        ])))?;
        self.emit(Event::Text(BytesText::new(text)))?;
        self.end("text")?;
        self.end("revision")?;
        self.end("page")
    }

    pub fn finish(mut self) -> Result<W, ImportError> {
        self.end("mediawiki")?;
        Ok(self.writer.into_inner())
    }
}

pub struct DumpSite<R: BufRead, W: Write> {
    parser: DumpParser<R>,
    import: ImportWriter<W>,
    username: CompactString,
    article_path: Option<String>,
}

impl<R: BufRead, W: Write> DumpSite<R, W> {
    pub fn new(parser: DumpParser<R>, output: W, username: &str) -> Result<Self, ImportError> {
        let import = ImportWriter::new(output, parser.site_info())?;
        let article_path = parser.site_info().article_path().map(str::to_string);
        Ok(Self {
            parser,
            import,
            username: username.into(),
            article_path,
        })
    }

    /// Overrides the URL prefix derived from the dump's `<base>`.
    pub fn with_article_path(mut self, article_path: Option<String>) -> Self {
        if article_path.is_some() {
            self.article_path = article_path;
        }
        self
    }

    pub fn site_info(&self) -> &SiteInfo {
        self.parser.site_info()
    }

    /// Closes the import file.
    pub fn finish(self) -> Result<W, ImportError> {
        self.import.finish()
    }
}

fn file_page(page: Page) -> FilePage {
    let content = match (page.redirect, page.revision) {
        (Some(target), _) => PageContent::Redirect(target),
        (None, None) => PageContent::Missing,
        (None, Some(revision)) => match revision.text {
            Text::Deleted => PageContent::Missing,
            Text::Normal(text) => match redirect_target(&text) {
                Some(target) => PageContent::Redirect(target),
                None => PageContent::Text(text),
            },
        },
    };
    FilePage {
        title: page.title,
        namespace: page.namespace,
        content,
    }
}

fn redirect_target(text: &str) -> Option<CompactString> {
    let rest = text.trim_start();
    if !rest.get(..9)?.eq_ignore_ascii_case("#redirect") {
        return None;
    }
    let start = rest.find("[[")? + 2;
    let end = start + rest[start..].find("]]")?;
    Some(CompactString::from(rest[start..end].trim()))
}

impl<R: BufRead, W: Write> Site for DumpSite<R, W> {
    fn next_page(&mut self, namespace: i32) -> Result<Option<FilePage>, SiteError> {
        while let Some(page) = self.parser.parse_page()? {
            if page.namespace == namespace {
                return Ok(Some(file_page(page)));
            }
        }
        Ok(None)
    }

    fn save(
        &mut self,
        page: &FilePage,
        text: &str,
        summary: &str,
        minor: bool,
    ) -> Result<(), SaveError> {
        self.import
            .write_page(page, &self.username, text, summary, minor)
            .map_err(|err| SaveError::Other(err.to_string()))
    }

    fn page_url(&self, page: &FilePage) -> Option<String> {
        let article_path = self.article_path.as_deref()?;
        Some(format!("{article_path}{}", page.url_title()))
    }
}
