use clap::Parser;
use imagebot::{
    bot::{Bot, BotConfig},
    dump_parser::DumpParser,
    dump_site::DumpSite,
    operator::TerminalOperator,
    site::{RetryPolicy, FILE_NAMESPACE},
};
use std::{
    error::Error,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use tracing_subscriber::EnvFilter;

/// Adds summaries and licensing to file description pages of a MediaWiki export.
#[derive(Debug, clap::Parser)]
struct CommandLine {
    /// MediaWiki XML export to read pages from, optionally zstd compressed (`.zst`).
    input_file: PathBuf,
    /// Where accepted edits are written, as an XML file for `Special:Import`.
    #[arg(short, long, default_value = "imagebot-import.xml")]
    output: PathBuf,
    /// Extra text appended to every edit summary.
    #[arg(short, long)]
    summary: Option<String>,
    #[arg(long, default_value_t = FILE_NAMESPACE)]
    namespace: i32,
    #[arg(long, default_value_t = 15)]
    max_retries: u32,
    /// Seconds to wait between retries after a server error.
    #[arg(long, default_value_t = 5)]
    retry_wait: u64,
    /// Author of the saved revisions.
    #[arg(long, default_value = "AndrybakBot")]
    username: String,
    /// Page URL prefix, e.g. `https://animalwell.wiki.gg/wiki/`.
    /// Derived from the export if omitted.
    #[arg(long)]
    base_url: Option<String>,
}

impl CommandLine {
    fn bot_config(&self) -> BotConfig {
        BotConfig {
            namespace: self.namespace,
            extra_summary: self.summary.clone(),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                retry_wait: Duration::from_secs(self.retry_wait),
            },
        }
    }
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead>, Box<dyn Error>> {
    let file = File::open(path)
        .map_err(|err| format!("failed to open {}: {err}", path.display()))?;
    let reader = BufReader::new(file);
    if path.extension().is_some_and(|ext| ext == "zst") {
        let reader = zstd::stream::Decoder::with_buffer(reader)?;
        Ok(Box::new(BufReader::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = CommandLine::parse();

    let parser = DumpParser::new(open_input(&args.input_file)?)?;
    tracing::info!(site_info = ?parser.site_info(), "Opened export");

    let output = BufWriter::new(File::create(&args.output)?);
    let site = DumpSite::new(parser, output, &args.username)?
        .with_article_path(args.base_url.clone());

    let mut bot = Bot::new(site, TerminalOperator::stdio(), args.bot_config());
    let result = bot.run();

    // close the import file even when the run failed, edits saved so far stay usable
    let (site, _) = bot.into_parts();
    site.finish()?.flush()?;

    let report = result?;
    tracing::info!(
        pages = report.pages,
        saved = report.saved,
        output = %args.output.display(),
        "Run complete"
    );
    Ok(())
}
