use std::{
    collections::VecDeque,
    io::{Cursor, Write},
};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::{
    operator::{Choice, Operator, OperatorError},
    site::{FilePage, PageContent, SaveError, Site, SiteError, FILE_NAMESPACE},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedEdit {
    pub title: String,
    pub text: String,
    pub summary: String,
    pub minor: bool,
}

/// In-memory wiki. Saves succeed unless a result was queued with
/// [`MemorySite::with_save_results`].
#[derive(Debug, Default)]
pub struct MemorySite {
    pages: VecDeque<FilePage>,
    save_results: VecDeque<Result<(), SaveError>>,
    pub save_attempts: usize,
    pub saved: Vec<SavedEdit>,
}

impl MemorySite {
    /// File pages given as `(title, text)`.
    pub fn with_pages(pages: &[(&str, &str)]) -> Self {
        let mut site = Self::default();
        for (title, text) in pages {
            site.push_page(FilePage::new(title, FILE_NAMESPACE, text));
        }
        site
    }

    pub fn push_page(&mut self, page: FilePage) {
        self.pages.push_back(page);
    }

    pub fn with_save_results(
        mut self,
        results: impl IntoIterator<Item = Result<(), SaveError>>,
    ) -> Self {
        self.save_results.extend(results);
        self
    }

    /// Current text of `title` as the wiki would serve it next.
    pub fn text_of(&self, title: &str) -> Option<&str> {
        self.saved
            .iter()
            .rev()
            .find(|edit| edit.title == title)
            .map(|edit| edit.text.as_str())
    }

    /// Pages as they are after the saved edits, ready for another run.
    pub fn reload(&self, pages: &[(&str, &str)]) -> Self {
        let mut site = Self::default();
        for (title, text) in pages {
            let text = self.text_of(title).unwrap_or(text);
            site.push_page(FilePage::new(title, FILE_NAMESPACE, text));
        }
        site
    }
}

impl Site for MemorySite {
    fn next_page(&mut self, namespace: i32) -> Result<Option<FilePage>, SiteError> {
        while let Some(page) = self.pages.pop_front() {
            if page.namespace == namespace {
                return Ok(Some(page));
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
        self.save_attempts += 1;
        self.save_results.pop_front().unwrap_or(Ok(()))?;
        self.saved.push(SavedEdit {
            title: page.title.to_string(),
            text: text.to_string(),
            summary: summary.to_string(),
            minor,
        });
        Ok(())
    }

    fn page_url(&self, page: &FilePage) -> Option<String> {
        match page.content {
            PageContent::Missing => None,
            _ => Some(format!("https://wiki.example/wiki/{}", page.url_title())),
        }
    }
}

/// Answers questions from a fixed script. Running out of answers quits.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    answers: VecDeque<String>,
    pub asked: Vec<String>,
    pub output: Vec<String>,
    pub opened: Vec<String>,
}

impl ScriptedOperator {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|answer| answer.to_string()).collect(),
            ..Self::default()
        }
    }

    fn answer(&mut self, question: &str) -> Result<String, OperatorError> {
        self.asked.push(question.to_string());
        self.answers.pop_front().ok_or(OperatorError::Quit)
    }
}

impl Operator for ScriptedOperator {
    fn output(&mut self, text: &str) -> Result<(), OperatorError> {
        self.output.push(text.to_string());
        Ok(())
    }

    fn input_choice(
        &mut self,
        question: &str,
        options: &[Choice],
        default: char,
    ) -> Result<char, OperatorError> {
        let answer = self.answer(question)?;
        let key = answer.chars().next().unwrap_or(default);
        if key == 'q' {
            return Err(OperatorError::Quit);
        }
        assert!(
            options.iter().any(|(_, option)| *option == key),
            "scripted answer {answer:?} is not an option of {question:?}"
        );
        Ok(key)
    }

    fn input(&mut self, question: &str) -> Result<String, OperatorError> {
        self.answer(question)
    }

    fn open_in_browser(&mut self, url: &str) -> Result<(), OperatorError> {
        self.opened.push(url.to_string());
        Ok(())
    }
}

/// Export with the siteinfo of a small wiki and the given `(title, namespace, text)` pages.
pub fn dump_xml(pages: &[(&str, i32, &str)]) -> String {
    let mut xml = Vec::new();
    let mut writer = quick_xml::Writer::new_with_indent(Cursor::new(&mut xml), b' ', 2);

    fn text_element<W: Write>(writer: &mut quick_xml::Writer<W>, name: &str, text: &str) {
        writer
            .write_event(Event::Start(BytesStart::new(name)))
            .unwrap();
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .unwrap();
        writer.write_event(Event::End(BytesEnd::new(name))).unwrap();
    }

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .unwrap();
    writer
        .write_event(Event::Start(
            BytesStart::new("mediawiki").with_attributes([("version", "0.11"), ("xml:lang", "en")]),
        ))
        .unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("siteinfo")))
        .unwrap();
    text_element(&mut writer, "sitename", "Animal Well Wiki");
    text_element(&mut writer, "dbname", "animalwell_en");
    text_element(
        &mut writer,
        "base",
        "https://animalwell.wiki.gg/wiki/Animal_Well_Wiki",
    );
    text_element(&mut writer, "generator", "MediaWiki 1.39.3");
    writer
        .write_event(Event::Start(BytesStart::new("namespaces")))
        .unwrap();
    writer
        .write_event(Event::Empty(
            BytesStart::new("namespace").with_attributes([("key", "0"), ("case", "first-letter")]),
        ))
        .unwrap();
    writer
        .write_event(Event::Start(
            BytesStart::new("namespace").with_attributes([("key", "6"), ("case", "first-letter")]),
        ))
        .unwrap();
    writer
        .write_event(Event::Text(BytesText::new("File")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("namespace")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("namespaces")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("siteinfo")))
        .unwrap();

    for (id, (title, namespace, text)) in pages.iter().enumerate() {
        writer
            .write_event(Event::Start(BytesStart::new("page")))
            .unwrap();
        text_element(&mut writer, "title", title);
        text_element(&mut writer, "ns", &namespace.to_string());
        text_element(&mut writer, "id", &(id + 1).to_string());

        writer
            .write_event(Event::Start(BytesStart::new("revision")))
            .unwrap();
        text_element(&mut writer, "id", &(100 + id).to_string());
        text_element(&mut writer, "timestamp", "2024-05-09T06:41:50Z");
        writer
            .write_event(Event::Start(BytesStart::new("contributor")))
            .unwrap();
        text_element(&mut writer, "username", "Uploader");
        writer
            .write_event(Event::End(BytesEnd::new("contributor")))
            .unwrap();
        text_element(&mut writer, "model", "wikitext");
        text_element(&mut writer, "format", "text/x-wiki");
        let bytes = text.len().to_string();
        writer
            .write_event(Event::Start(BytesStart::new("text").with_attributes([
                ("bytes", bytes.as_str()),
                ("xml:space", "preserve"),
            ])))
            .unwrap();
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .unwrap();
        writer
            .write_event(Event::End(BytesEnd::new("text")))
            .unwrap();
        writer
            .write_event(Event::End(BytesEnd::new("revision")))
            .unwrap();

        writer
            .write_event(Event::End(BytesEnd::new("page")))
            .unwrap();
    }

    writer
        .write_event(Event::End(BytesEnd::new("mediawiki")))
        .unwrap();

    String::from_utf8(xml).unwrap()
}
