use std::{any::type_name_of_val, collections::HashMap, fmt::Debug, io::BufRead};

use compact_str::CompactString;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use tracing::instrument;

// list of all tags that are relevant for our use case
// i.e. the tags of which we need a value and their parent tags
#[derive(PartialEq, Eq)]
enum Tag {
    MediaWiki,  // <mediawiki version="0.11" ...other attributes>...</mediawiki> is the root tag
    SiteInfo,   // <siteinfo><sitename>...</sitename><base>...</base> ...other tags</siteinfo>
    SiteName,   // <sitename>Animal Well Wiki</sitename>
    DbName,     // <dbname>animalwell_en</dbname>
    Base,       // <base>https://animalwell.wiki.gg/wiki/Animal_Well_Wiki</base>
    Namespaces, // <namespaces><namespace key="0" /> ...more namespace tags</namespaces>
    Namespace(String), // <namespace key="6">File</namespace>
    Page,       // <page>...tags are (title, ns, id, redirect, revision)</page>
    Title,      // <title>File:Egg-Brick.png</title>
    Ns,         // <ns>6</ns>
    Id,         // <id>500</id>
    Redirect(String), // <redirect title="File:Other.png" />
    Revision,   // <revision>...(id, timestamp, contributor, text, comment, minor)</revision>
    Timestamp,  // <timestamp>2024-05-09T06:41:50Z</timestamp>
    Contributor, // <contributor><username>blah</username><id>500</id></contributor>
    Username,   // <username>blah</username>
    Text(bool), // <text bytes="20">blah</text> or <text bytes="20" deleted="deleted" />
    Comment,    // <comment>blah</comment>
    Minor,      // <minor />
    Unknown(CompactString), // any other tag
}

impl Debug for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tag::MediaWiki => write!(f, "<mediawiki>"),
            Tag::SiteInfo => write!(f, "<siteinfo>"),
            Tag::SiteName => write!(f, "<sitename>"),
            Tag::DbName => write!(f, "<dbname>"),
            Tag::Base => write!(f, "<base>"),
            Tag::Namespaces => write!(f, "<namespaces>"),
            Tag::Namespace(key) => write!(f, "<namespace key={}>", key),
            Tag::Page => write!(f, "<page>"),
            Tag::Title => write!(f, "<title>"),
            Tag::Ns => write!(f, "<ns>"),
            Tag::Id => write!(f, "<id>"),
            Tag::Redirect(target) => write!(f, "<redirect title={:?}>", target),
            Tag::Revision => write!(f, "<revision>"),
            Tag::Timestamp => write!(f, "<timestamp>"),
            Tag::Contributor => write!(f, "<contributor>"),
            Tag::Username => write!(f, "<username>"),
            Tag::Text(deleted) => {
                if *deleted {
                    write!(f, "<text deleted>")
                } else {
                    write!(f, "<text>")
                }
            }
            Tag::Comment => write!(f, "<comment>"),
            Tag::Minor => write!(f, "<minor>"),
            Tag::Unknown(name) => write!(f, "<{}>", name),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum TagReadingError {
    #[error("XML error")]
    XmlError(#[from] quick_xml::Error),
    #[error("missing expected attribute `{0}` for tag `{1}`")]
    MissingAttribute(&'static str, &'static str),
}

impl Tag {
    fn from_start_bytes(e: &BytesStart) -> Result<Self, TagReadingError> {
        match e.name().as_ref() {
            b"mediawiki" => Ok(Tag::MediaWiki),
            b"siteinfo" => Ok(Tag::SiteInfo),
            b"sitename" => Ok(Tag::SiteName),
            b"dbname" => Ok(Tag::DbName),
            b"base" => Ok(Tag::Base),
            b"namespaces" => Ok(Tag::Namespaces),
            b"namespace" => {
                let key = Self::attribute(e, b"key")?
                    .ok_or(TagReadingError::MissingAttribute("key", "namespace"))?;
                Ok(Tag::Namespace(key))
            }
            b"page" => Ok(Tag::Page),
            b"title" => Ok(Tag::Title),
            b"ns" => Ok(Tag::Ns),
            b"id" => Ok(Tag::Id),
            b"redirect" => {
                let target = Self::attribute(e, b"title")?
                    .ok_or(TagReadingError::MissingAttribute("title", "redirect"))?;
                Ok(Tag::Redirect(target))
            }
            b"revision" => Ok(Tag::Revision),
            b"timestamp" => Ok(Tag::Timestamp),
            b"contributor" => Ok(Tag::Contributor),
            b"username" => Ok(Tag::Username),
            b"text" => Ok(Tag::Text(Self::attribute(e, b"deleted")?.is_some())),
            b"comment" => Ok(Tag::Comment),
            b"minor" => Ok(Tag::Minor),
            name => Ok(Tag::Unknown(CompactString::from(
                String::from_utf8_lossy(name).as_ref(),
            ))),
        }
    }

    fn attribute(e: &BytesStart, key: &[u8]) -> Result<Option<String>, quick_xml::Error> {
        for attr in e.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            if attr.key.as_ref() == key {
                return Ok(Some(attr.unescape_value()?.into_owned()));
            }
        }
        Ok(None)
    }

    fn matches_end_bytes(&self, e: &BytesEnd) -> bool {
        match (self, e.name().as_ref()) {
            (Tag::MediaWiki, b"mediawiki") => true,
            (Tag::SiteInfo, b"siteinfo") => true,
            (Tag::SiteName, b"sitename") => true,
            (Tag::DbName, b"dbname") => true,
            (Tag::Base, b"base") => true,
            (Tag::Namespaces, b"namespaces") => true,
            (Tag::Namespace(_), b"namespace") => true,
            (Tag::Page, b"page") => true,
            (Tag::Title, b"title") => true,
            (Tag::Ns, b"ns") => true,
            (Tag::Id, b"id") => true,
            (Tag::Redirect(_), b"redirect") => true,
            (Tag::Revision, b"revision") => true,
            (Tag::Timestamp, b"timestamp") => true,
            (Tag::Contributor, b"contributor") => true,
            (Tag::Username, b"username") => true,
            (Tag::Text(_), b"text") => true,
            (Tag::Comment, b"comment") => true,
            (Tag::Minor, b"minor") => true,
            (Tag::Unknown(expected), name) => expected.as_bytes() == name,
            _ => false,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Text {
    Normal(String),
    Deleted,
}

impl Debug for Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Text::Normal(text) => write!(f, "{:?}", text),
            Text::Deleted => write!(f, "Deleted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision {
    /// Import files leave this out, the wiki assigns ids on import.
    pub id: Option<i64>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub contributor: CompactString,
    pub text: Text,
    pub comment: Option<CompactString>,
    pub minor: bool,
}

#[derive(Debug)]
struct RevisionBuilder {
    id: Option<i64>,
    timestamp: Option<chrono::DateTime<chrono::Utc>>,
    contributor: Option<CompactString>,
    text: Option<Text>,
    comment: Option<CompactString>,
    minor: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("missing mandatory field: {0}")]
struct BuildRevisionError(&'static str, Box<RevisionBuilder>);

impl RevisionBuilder {
    fn new() -> Self {
        Self {
            id: None,
            timestamp: None,
            contributor: None,
            text: None,
            comment: None,
            minor: false,
        }
    }

    fn try_build(self) -> Result<Revision, BuildRevisionError> {
        let (Some(timestamp), Some(text)) = (self.timestamp, self.text.clone()) else {
            let field = if self.timestamp.is_none() {
                "timestamp"
            } else {
                "text"
            };
            return Err(BuildRevisionError(field, self.into()));
        };

        Ok(Revision {
            id: self.id,
            timestamp,
            // suppressed or IP editors have no username
            contributor: self.contributor.unwrap_or_default(),
            text,
            comment: self.comment,
            minor: self.minor,
        })
    }
}

/// A page of the dump with its latest revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Page {
    /// Full title including the namespace prefix.
    pub title: CompactString,
    pub namespace: i32,
    pub id: Option<i64>,
    pub redirect: Option<CompactString>,
    pub revision: Option<Revision>,
}

#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub enum Namespace {
    #[default]
    Default,
    Named(CompactString),
}

impl Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Namespace::Default => write!(f, "Default"),
            Namespace::Named(name) => write!(f, "{:?}", name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteInfo {
    pub sitename: CompactString,
    pub dbname: CompactString,
    /// URL of the main page, e.g. `https://animalwell.wiki.gg/wiki/Animal_Well_Wiki`.
    pub base: Option<String>,
    pub namespaces: HashMap<i32, Namespace>,
}

impl SiteInfo {
    /// Prefix of article URLs, derived from the main page URL.
    pub fn article_path(&self) -> Option<&str> {
        let base = self.base.as_deref()?;
        let end = base.find("/wiki/")? + "/wiki/".len();
        Some(&base[..end])
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParsingError {
    #[error("XML error")]
    XmlError(#[from] quick_xml::Error),
    #[error("unexpected end of file")]
    Eof,
    #[error("malformed dump: {0}")]
    Malformed(String),
}

pub struct DumpParser<R: BufRead> {
    xml_parser: quick_xml::Reader<R>,
    buf: Vec<u8>,
    current_path: Vec<Tag>,
    site_info: SiteInfo,
}

impl<R: BufRead> Debug for DumpParser<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpParser")
            .field("xml_parser", &type_name_of_val(&self.xml_parser))
            .field("buf.len", &self.buf.len())
            .field("buf.capacity", &self.buf.capacity())
            .field("current_path", &self.current_path)
            .field("site_info", &self.site_info.sitename)
            .finish()
    }
}

impl<R: BufRead> DumpParser<R> {
    pub fn new(reader: R) -> Result<Self, ParsingError> {
        let xml_parser = quick_xml::Reader::from_reader(reader);
        // expand_empty_elements not set, take care to handle empty elements!

        let mut new = Self {
            xml_parser,
            buf: Vec::with_capacity(64 * 1024),
            current_path: Vec::new(),
            site_info: SiteInfo::default(),
        };

        new.parse_site_info()?;

        Ok(new)
    }

    pub fn site_info(&self) -> &SiteInfo {
        &self.site_info
    }

    fn start_tag(e: &BytesStart, current_path: &[Tag]) -> Result<Tag, ParsingError> {
        match Tag::from_start_bytes(e) {
            Ok(tag) => Ok(tag),
            Err(TagReadingError::XmlError(e)) => Err(e.into()),
            Err(TagReadingError::MissingAttribute(attr, tag)) => {
                if cfg!(feature = "strict") {
                    return Err(ParsingError::Malformed(format!(
                        "missing attribute `{attr}` on <{tag}>"
                    )));
                }
                tracing::warn!(
                    message = "missing expected attribute, ignoring the tag",
                    attribute = attr,
                    tag = tag,
                    path = ?current_path
                );
                Ok(Tag::Unknown(CompactString::from(tag)))
            }
        }
    }

    // takes the fields separately because the current event still borrows `buf`
    fn check_end_tag(
        e: &BytesEnd,
        current_path: &mut Vec<Tag>,
        xml_parser: &quick_xml::Reader<R>,
    ) -> Result<Option<Tag>, ParsingError> {
        // error handling for mismatched tags
        let Some(tag) = current_path.pop() else {
            let tag = String::from_utf8_lossy(e.name().into_inner()).into_owned();
            tracing::error!(
                message = "Unexpected end tag",
                tag = tag.as_str(),
                position = xml_parser.buffer_position()
            );

            if cfg!(feature = "strict") {
                return Err(ParsingError::Malformed(format!("unexpected </{tag}>")));
            }
            tracing::warn!("Ignoring unexpected end tag. This may lead to incorrect results.");
            return Ok(None);
        };

        if !tag.matches_end_bytes(e) {
            tracing::error!(
                message = "Mismatched tags",
                expected = ?tag,
                actual = String::from_utf8_lossy(e.name().as_ref()).as_ref(),
                current_path = ?current_path,
                position = xml_parser.buffer_position()
            );

            if cfg!(feature = "strict") {
                return Err(ParsingError::Malformed(format!("mismatched end tag for {tag:?}")));
            }
            tracing::warn!("Ignoring mismatched tag. This may lead to incorrect results.");
        }

        Ok(Some(tag))
    }

    #[instrument(skip(self))]
    fn parse_site_info(&mut self) -> Result<(), ParsingError> {
        let mut site_info = SiteInfo::default();

        loop {
            match self.xml_parser.read_event_into(&mut self.buf)? {
                Event::Start(ref e) => {
                    let tag = Self::start_tag(e, &self.current_path)?;
                    self.current_path.push(tag);
                }
                Event::Empty(ref e) => {
                    let tag = Self::start_tag(e, &self.current_path)?;

                    use Tag::*;

                    if let [MediaWiki, SiteInfo, Namespaces] = self.current_path.as_slice() {
                        if let Namespace(id) = &tag {
                            match id.parse() {
                                Ok(key) => {
                                    site_info.namespaces.insert(key, self::Namespace::Default);
                                }
                                Err(_) => tracing::warn!(
                                    message = "Ignoring namespace with invalid id",
                                    id = id.as_str()
                                ),
                            }
                        }
                    }
                }
                Event::Text(e) => {
                    let text = e.unescape()?;

                    use Tag::*;

                    match self.current_path.as_slice() {
                        [MediaWiki, SiteInfo, SiteName] => {
                            site_info.sitename = CompactString::from(text.as_ref());
                        }
                        [MediaWiki, SiteInfo, DbName] => {
                            site_info.dbname = CompactString::from(text.as_ref());
                        }
                        [MediaWiki, SiteInfo, Base] => {
                            site_info.base = Some(text.into_owned());
                        }
                        [MediaWiki, SiteInfo, Namespaces, Namespace(id)] => match id.parse() {
                            Ok(key) => {
                                site_info.namespaces.insert(
                                    key,
                                    self::Namespace::Named(CompactString::from(text.as_ref())),
                                );
                            }
                            Err(_) => tracing::warn!(
                                message = "Ignoring namespace with invalid id",
                                id = id.as_str(),
                                name = text.as_ref()
                            ),
                        },
                        _ => {}
                    }
                }
                Event::End(ref e) => {
                    let tag = Self::check_end_tag(e, &mut self.current_path, &self.xml_parser)?;

                    if tag == Some(Tag::SiteInfo) {
                        // found the closing tag for siteinfo, we're done
                        break;
                    }
                }
                Event::Eof => {
                    // a correct file never ends before the closing siteinfo tag
                    tracing::error!(
                        partial_site_info = ?site_info,
                        current_path = ?self.current_path
                    );
                    return Err(ParsingError::Eof);
                }
                _ => {}
            }
            self.buf.clear();
        }
        self.buf.clear();

        self.site_info = site_info;
        Ok(())
    }

    /// Parses the next page, keeping only its last revision.
    pub fn parse_page(&mut self) -> Result<Option<Page>, ParsingError> {
        let span = tracing::span!(
            tracing::Level::DEBUG,
            "parse_page",
            title = tracing::field::Empty
        );
        let _entered = span.enter();

        let mut page = Page {
            title: CompactString::default(),
            namespace: 0,
            id: None,
            redirect: None,
            revision: None,
        };
        let mut started_page = false;

        let mut revision_builder = None;

        loop {
            match self.xml_parser.read_event_into(&mut self.buf)? {
                Event::Start(ref e) => {
                    let tag = Self::start_tag(e, &self.current_path)?;

                    if tag == Tag::Page {
                        started_page = true;
                    }

                    if tag == Tag::Revision {
                        revision_builder = Some(RevisionBuilder::new());
                    }

                    // `<text></text>` produces no text event
                    if let (Tag::Text(deleted), Some(revision_builder)) =
                        (&tag, &mut revision_builder)
                    {
                        revision_builder.text = Some(if *deleted {
                            self::Text::Deleted
                        } else {
                            self::Text::Normal(String::new())
                        });
                    }

                    self.current_path.push(tag);
                }
                Event::Empty(ref e) => {
                    let tag = Self::start_tag(e, &self.current_path)?;

                    use Tag::*;

                    match (self.current_path.as_slice(), &tag) {
                        ([MediaWiki, Page], Redirect(target)) => {
                            page.redirect = Some(CompactString::from(target.as_str()));
                        }
                        ([MediaWiki, Page, Revision], Text(deleted)) => {
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.text = Some(if *deleted {
                                    self::Text::Deleted
                                } else {
                                    self::Text::Normal(String::new())
                                });
                            }
                        }
                        ([MediaWiki, Page, Revision], Minor) => {
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.minor = true;
                            }
                        }
                        _ => {}
                    }
                }
                Event::Text(e) => {
                    let text = e.unescape()?;

                    use Tag::*;

                    match self.current_path.as_slice() {
                        [MediaWiki, Page, Title] => {
                            page.title = CompactString::from(text.as_ref());
                            span.record("title", page.title.as_str());
                        }
                        [MediaWiki, Page, Ns] => {
                            page.namespace = text.trim().parse().unwrap_or_else(|_| {
                                tracing::warn!(
                                    message = "Found invalid namespace id, defaulting to 0",
                                    ns = text.as_ref(),
                                    position = self.xml_parser.buffer_position()
                                );
                                0
                            });
                        }
                        [MediaWiki, Page, Id] => {
                            page.id = text.trim().parse().ok();
                        }
                        [MediaWiki, Page, Revision, Id] => {
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.id = text.trim().parse().ok();
                            }
                        }
                        [MediaWiki, Page, Revision, Timestamp] => {
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.timestamp = parse_timestamp(&text);
                                if revision_builder.timestamp.is_none() {
                                    tracing::warn!(
                                        message = "Found invalid revision timestamp",
                                        timestamp = text.as_ref(),
                                        position = self.xml_parser.buffer_position()
                                    );
                                }
                            }
                        }
                        [MediaWiki, Page, Revision, Contributor, Username] => {
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.contributor =
                                    Some(CompactString::from(text.as_ref()));
                            }
                        }
                        [MediaWiki, Page, Revision, Text(deleted)] => {
                            if let Some(revision_builder) = &mut revision_builder {
                                if *deleted {
                                    revision_builder.text = Some(self::Text::Deleted);
                                } else {
                                    // text may arrive in several events
                                    match &mut revision_builder.text {
                                        Some(self::Text::Normal(existing)) => {
                                            existing.push_str(&text)
                                        }
                                        _ => {
                                            revision_builder.text =
                                                Some(self::Text::Normal(text.into_owned()))
                                        }
                                    }
                                }
                            }
                        }
                        [MediaWiki, Page, Revision, Comment] => {
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.comment = Some(CompactString::from(text.as_ref()));
                            }
                        }
                        _ => {}
                    }
                }
                Event::End(ref e) => {
                    let tag = Self::check_end_tag(e, &mut self.current_path, &self.xml_parser)?;

                    if tag == Some(Tag::Revision) {
                        if let Some(revision_builder) = revision_builder.take() {
                            match revision_builder.try_build() {
                                // the export lists revisions oldest first
                                Ok(revision) => page.revision = Some(revision),
                                Err(BuildRevisionError(field, revision_builder)) => {
                                    tracing::error!(
                                        message = "Missing mandatory field in revision",
                                        field,
                                        partial_revision = ?revision_builder,
                                        revision_end_position = self.xml_parser.buffer_position()
                                    );
                                    if cfg!(feature = "strict") {
                                        return Err(ParsingError::Malformed(format!(
                                            "revision without {field}"
                                        )));
                                    }
                                    tracing::warn!("Ignoring revision with missing mandatory field");
                                }
                            }
                        }
                    }

                    if tag == Some(Tag::Page) {
                        break;
                    }
                }
                Event::Eof => {
                    if started_page {
                        tracing::error!(partial_page = ?page, current_path = ?self.current_path);
                        return Err(ParsingError::Eof);
                    } else {
                        return Ok(None);
                    }
                }
                _ => {}
            }
            self.buf.clear();
        }
        self.buf.clear();

        Ok(Some(page))
    }
}

// Source: https://github.com/mediawiki-utilities/python-mwtypes/blob/523a93f98fe1372938fc15872b5abb1f267cc643/mwtypes/timestamp.py#L12
pub const TIMESTAMP_FORMAT_LONG: &str = "%Y-%m-%dT%H:%M:%SZ";
const TIMESTAMP_FORMAT_SHORT: &str = "%Y%m%d%H%M%S";

fn parse_timestamp(text: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let text = text.trim();
    chrono::NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT_SHORT)
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT_LONG))
        .map(|dt| chrono::DateTime::from_naive_utc_and_offset(dt, chrono::Utc))
        .ok()
}
