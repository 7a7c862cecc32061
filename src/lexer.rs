//! Lexical analysis for the shell's input lines.
//!
//! The language is deliberately flat: a line is split on runs of whitespace
//! and the only operators are the standalone tokens `<`, `>` and `&`. Before
//! splitting, every `$$` is replaced with the shell's process id.

/// Two-character marker replaced by the shell's pid.
pub const PID_MARKER: &str = "$$";

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Any whitespace-delimited text that is not an operator.
    Word(String),
    /// Input redirection symbol, `<`.
    RedirectLeft,
    /// Output redirection symbol, `>`.
    RedirectRight,
    /// Background marker, `&`.
    Ampersand,
}

impl Token {
    /// The text this token was read from.
    pub fn text(&self) -> &str {
        match self {
            Token::Word(s) => s,
            Token::RedirectLeft => "<",
            Token::RedirectRight => ">",
            Token::Ampersand => "&",
        }
    }

    fn classify(raw: &str) -> Token {
        match raw {
            "<" => Token::RedirectLeft,
            ">" => Token::RedirectRight,
            "&" => Token::Ampersand,
            word => Token::Word(word.to_string()),
        }
    }
}

/// Replaces every occurrence of [`PID_MARKER`] with `pid` in decimal.
///
/// Matches are taken left to right without overlap, so `$$$$` expands twice
/// and `$$$` expands once followed by a literal `$`. There is no escape.
pub fn expand_pid(line: &str, pid: u32) -> String {
    if !line.contains(PID_MARKER) {
        return line.to_string();
    }
    line.replace(PID_MARKER, &pid.to_string())
}

/// Splits an (already expanded) line into tokens.
///
/// A blank or all-whitespace line produces no tokens.
pub fn split_into_tokens(line: &str) -> Vec<Token> {
    line.split_whitespace().map(Token::classify).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn word(s: &str) -> Token {
        Token::Word(s.to_string())
    }

    #[test]
    fn expands_nothing_without_marker() {
        assert_eq!(expand_pid("echo hello", 4567), "echo hello");
        assert_eq!(expand_pid("cost is $5", 4567), "cost is $5");
    }

    #[test]
    fn expands_single_and_embedded_markers() {
        assert_eq!(expand_pid("echo $$", 4567), "echo 4567");
        assert_eq!(expand_pid("file-$$.txt", 12), "file-12.txt");
    }

    #[test]
    fn expands_adjacent_markers_without_overlap() {
        assert_eq!(expand_pid("$$$$", 42), "4242");
        assert_eq!(expand_pid("$$$", 42), "42$");
        assert_eq!(expand_pid("a$$b$$c", 7), "a7b7c");
    }

    #[test]
    fn blank_lines_have_no_tokens() {
        assert!(split_into_tokens("").is_empty());
        assert!(split_into_tokens("   \t  ").is_empty());
    }

    #[test]
    fn operators_are_only_whole_tokens() {
        let tokens = split_into_tokens("sort <in >out a&b &");
        assert_eq!(
            tokens,
            vec![
                word("sort"),
                word("<in"),
                word(">out"),
                word("a&b"),
                Token::Ampersand,
            ]
        );
    }

    #[test]
    fn splits_on_runs_of_whitespace() {
        let tokens = split_into_tokens("  wc\t -l  <   notes.txt ");
        assert_eq!(
            tokens,
            vec![word("wc"), word("-l"), Token::RedirectLeft, word("notes.txt")]
        );
        assert_eq!(tokens[2].text(), "<");
    }
}
