//! Interaction with the human running the bot.

use std::io::{self, BufRead, Write};

use imara_diff::{intern::InternedInput, Algorithm, UnifiedDiffBuilder};

#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    #[error("operator quit the bot run")]
    Quit,
    #[error("failed to talk to the operator")]
    Io(#[from] io::Error),
}

/// A labelled choice, e.g. `("Yes", 'y')`.
pub type Choice = (&'static str, char);

pub trait Operator {
    /// Shows a line of text.
    fn output(&mut self, text: &str) -> Result<(), OperatorError>;

    /// Asks `question` and returns the hotkey of the selected option.
    ///
    /// Selecting `q` (or closing the input) is reported as [`OperatorError::Quit`].
    fn input_choice(
        &mut self,
        question: &str,
        options: &[Choice],
        default: char,
    ) -> Result<char, OperatorError>;

    /// Asks for free text.
    fn input(&mut self, question: &str) -> Result<String, OperatorError>;

    fn open_in_browser(&mut self, url: &str) -> Result<(), OperatorError>;

    fn show_diff(&mut self, old: &str, new: &str) -> Result<(), OperatorError> {
        self.output(&unified_diff(old, new))
    }
}

/// Line based unified diff with three lines of context.
pub fn unified_diff(old: &str, new: &str) -> String {
    let input = InternedInput::new(old, new);
    imara_diff::diff(Algorithm::Histogram, &input, UnifiedDiffBuilder::new(&input))
}

/// `open in Browser` with hotkey `b` becomes `open in [b]rowser`.
fn option_label(label: &str, key: char, is_default: bool) -> String {
    let shown = if is_default {
        key.to_ascii_uppercase()
    } else {
        key
    };
    match label
        .char_indices()
        .find(|(_, c)| c.to_ascii_lowercase() == key)
    {
        Some((i, c)) => format!("{}[{shown}]{}", &label[..i], &label[i + c.len_utf8()..]),
        None => format!("{label} [{shown}]"),
    }
}

/// Operator on a terminal, or anything else that reads and writes lines.
pub struct TerminalOperator<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl TerminalOperator<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn read_line(&mut self) -> Result<String, OperatorError> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            // closed input, nobody is left to answer
            return Err(OperatorError::Quit);
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> Operator for TerminalOperator<R, W> {
    fn output(&mut self, text: &str) -> Result<(), OperatorError> {
        writeln!(self.output, "{text}")?;
        Ok(())
    }

    fn input_choice(
        &mut self,
        question: &str,
        options: &[Choice],
        default: char,
    ) -> Result<char, OperatorError> {
        let labels: Vec<String> = options
            .iter()
            .map(|(label, key)| option_label(label, *key, *key == default))
            .collect();

        loop {
            write!(self.output, "{question} ({}) ", labels.join(", "))?;
            self.output.flush()?;

            let answer = self.read_line()?.to_lowercase();
            let key = match answer.chars().next() {
                None => default,
                Some(key) => key,
            };
            if key == 'q' {
                return Err(OperatorError::Quit);
            }
            if options.iter().any(|(_, option)| *option == key) {
                return Ok(key);
            }
            writeln!(self.output, "Invalid choice {answer:?}")?;
        }
    }

    fn input(&mut self, question: &str) -> Result<String, OperatorError> {
        write!(self.output, "{question} ")?;
        self.output.flush()?;
        self.read_line()
    }

    fn open_in_browser(&mut self, url: &str) -> Result<(), OperatorError> {
        if let Err(err) = webbrowser::open(url) {
            tracing::warn!(message = "Failed to open browser", url, error = %err);
        }
        Ok(())
    }
}
