use crate::lexer::Token;
use tracing::debug;

/// A single command line, classified and ready to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Command name as typed (after `$$` expansion).
    pub name: String,
    /// Full argument vector; `argv[0]` is always `name`.
    pub argv: Vec<String>,
    /// File bound to the child's standard input (`< file`).
    pub input: Option<String>,
    /// File bound to the child's standard output (`> file`).
    pub output: Option<String>,
    /// Set by a trailing `&` unless foreground-only mode is active.
    pub background: bool,
}

/// Parser states. Each token drives exactly one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    ExpectCommand,
    ExpectArgOrOperator,
    ExpectInputTarget,
    ExpectOutputTarget,
}

struct CommandBuilder {
    state: ParseState,
    name: String,
    argv: Vec<String>,
    input: Option<String>,
    output: Option<String>,
    background: bool,
}

/// Outcome of feeding one token to the builder.
enum Step {
    Continue,
    Comment,
}

impl CommandBuilder {
    fn new() -> Self {
        CommandBuilder {
            state: ParseState::ExpectCommand,
            name: String::new(),
            argv: Vec::new(),
            input: None,
            output: None,
            background: false,
        }
    }

    fn feed(&mut self, token: &Token, is_last: bool) -> Step {
        self.state = match (self.state, token) {
            (ParseState::ExpectCommand, Token::Word(w)) if w.starts_with('#') => {
                return Step::Comment;
            }
            (ParseState::ExpectCommand, token) => {
                self.name = token.text().to_string();
                self.argv.push(self.name.clone());
                ParseState::ExpectArgOrOperator
            }
            // `&` only means "background" as the very last token.
            (ParseState::ExpectArgOrOperator, Token::Ampersand) if is_last => {
                self.background = true;
                ParseState::ExpectArgOrOperator
            }
            (ParseState::ExpectArgOrOperator, Token::RedirectLeft) => {
                ParseState::ExpectInputTarget
            }
            (ParseState::ExpectArgOrOperator, Token::RedirectRight) => {
                ParseState::ExpectOutputTarget
            }
            (ParseState::ExpectArgOrOperator, token) => {
                self.argv.push(token.text().to_string());
                ParseState::ExpectArgOrOperator
            }
            (ParseState::ExpectInputTarget, token) => {
                self.input = Some(token.text().to_string());
                ParseState::ExpectArgOrOperator
            }
            (ParseState::ExpectOutputTarget, token) => {
                self.output = Some(token.text().to_string());
                ParseState::ExpectArgOrOperator
            }
        };
        Step::Continue
    }

    fn finish(self, foreground_only: bool) -> Option<ParsedCommand> {
        match self.state {
            ParseState::ExpectCommand => return None,
            ParseState::ExpectInputTarget | ParseState::ExpectOutputTarget => {
                debug!(command = %self.name, "redirection operator without a target, ignoring it");
            }
            ParseState::ExpectArgOrOperator => {}
        }
        Some(ParsedCommand {
            name: self.name,
            argv: self.argv,
            input: self.input,
            output: self.output,
            background: self.background && !foreground_only,
        })
    }
}

/// Builds a [`ParsedCommand`] from the tokens of one line.
///
/// Returns `None` when the line should be skipped: no tokens at all, or a
/// first token starting with `#`. When `foreground_only` is set a trailing
/// `&` is consumed but ignored.
pub fn construct_command(tokens: &[Token], foreground_only: bool) -> Option<ParsedCommand> {
    let mut builder = CommandBuilder::new();
    let last = tokens.len().checked_sub(1)?;
    for (i, token) in tokens.iter().enumerate() {
        if let Step::Comment = builder.feed(token, i == last) {
            return None;
        }
    }
    builder.finish(foreground_only)
}
