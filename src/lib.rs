// SPDX-License-Identifier: MIT
//! # imagebot
//!
//! An operator-assisted bot that tidies up file description pages on a MediaWiki wiki.
//!
//! ## Overview
//!
//! Screenshots and textures uploaded to a game wiki tend to arrive with a one-line
//! description (`Brick Egg2.`, `Location of Tree`) and no licensing information at all.
//! `imagebot` walks the pages of the `File:` namespace and, for every page that lacks a
//! description template or a licence, proposes a page laid out as
//!
//! ```text
//! == Summary ==
//! the location of [[Tree]]
//!
//! == Licensing ==
//! {{Copyright game}}
//! ```
//!
//! A human confirms every caption it rewrites and every edit before it is saved.
//!
//! **Key Features:**
//!
//! - **Template-aware**: Pages already carrying description and licence templates are left alone,
//!   so a second run over the same pages changes nothing.
//! - **Caption rewriting**: Bare descriptions are trimmed and turned into wikilinks.
//! - **Offline operation**: Pages are read from a MediaWiki XML export (optionally zstd compressed)
//!   and accepted edits are written to an XML file that can be imported with `Special:Import`.
//!
//! ## Basic Usage
//!
//! ```rust
//! use imagebot::bot::{Bot, BotConfig};
//! use imagebot::dump_parser::DumpParser;
//! use imagebot::dump_site::DumpSite;
//! use imagebot::operator::TerminalOperator;
//! use std::io::Cursor;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dump = r#"<mediawiki>
//!   <siteinfo><sitename>Animal Well Wiki</sitename></siteinfo>
//!   <page>
//!     <title>File:Brick Egg2.png</title>
//!     <ns>6</ns>
//!     <revision>
//!       <timestamp>2024-05-09T06:41:50Z</timestamp>
//!       <text>Brick Egg2</text>
//!     </revision>
//!   </page>
//! </mediawiki>"#;
//!
//!     let parser = DumpParser::new(Cursor::new(dump))?;
//!     let site = DumpSite::new(parser, Vec::new(), "ImageBot")?;
//!     // accept the proposed caption, then the edit
//!     let operator = TerminalOperator::new(Cursor::new("y\ny\n"), Vec::new());
//!
//!     let mut bot = Bot::new(site, operator, BotConfig::default());
//!     let report = bot.run()?;
//!     assert_eq!(report.saved, 1);
//!
//!     let (site, _) = bot.into_parts();
//!     let import = String::from_utf8(site.finish()?)?;
//!     assert!(import.contains("[[Brick Egg]]"));
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`wikitext`]: template and section extraction.
//! - [`classify`]: decides whether a page still needs work.
//! - [`caption`]: caption derivation and the operator's caption choices.
//! - [`rewrite`]: composes the new page text and its edit summary.
//! - [`site`] and [`operator`]: the two collaborators of a run, the wiki and the human.
//! - [`dump_parser`] and [`dump_site`]: the offline wiki backed by XML exports.
//! - [`bot`]: the run loop.
//!
//! ## Logging
//!
//! Diagnostics are emitted through [`tracing`]. The binary installs a subscriber that
//! writes to stderr and honours `RUST_LOG`; library users bring their own.

pub mod bot;
pub mod caption;
pub mod classify;
pub mod dump_parser;
pub mod dump_site;
pub mod operator;
pub mod rewrite;
pub mod site;
#[cfg(test)]
mod test_support;
pub mod wikitext;
