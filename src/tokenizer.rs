//! Character-driven state machine that turns one pipe segment into tokens.
//!
//! Mirrors the WHITESPACE/CHAR/QUOTE machine from the command-line analyzer:
//! double-quoted runs become a single token with the quotes stripped, and the
//! three redirection operators (`<`, `>`, `>>`) are recognized outside quotes
//! regardless of adjacent whitespace.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Normal,
    Redir,
    FnameIn,
    FnameOutTrunc,
    FnameOutAppend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
}

impl Token {
    fn normal(text: String) -> Token {
        Token {
            text,
            kind: TokenKind::Normal,
        }
    }

    fn redir(text: &str) -> Token {
        Token {
            text: text.to_string(),
            kind: TokenKind::Redir,
        }
    }
}

#[derive(PartialEq)]
enum State {
    Whitespace,
    Char,
    Quote,
}

/// Split a raw command line into pipe segments.
///
/// `|` is treated as a literal separator even inside double quotes — this
/// reproduces the source shell's behavior rather than classical POSIX
/// quoting, per the command-line analyzer's segmentation rule.
pub fn split_segments(line: &str) -> Vec<&str> {
    line.split('|').collect()
}

/// Tokenize a single pipe segment.
pub fn tokenize_segment(segment: &str) -> Vec<Token> {
    let chars: Vec<char> = segment.chars().collect();
    let mut tokens = Vec::new();
    let mut state = State::Whitespace;
    let mut current = String::new();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];

        // Redirection operators are recognized outside QUOTE regardless of
        // the current state, splitting an in-progress CHAR run if needed.
        if state != State::Quote && (c == '<' || c == '>') {
            if state == State::Char {
                tokens.push(Token::normal(std::mem::take(&mut current)));
                state = State::Whitespace;
            }

            if c == '>' {
                if i + 1 < chars.len() && chars[i + 1] == '>' {
                    tokens.push(Token::redir(">>"));
                    i += 1;
                } else {
                    tokens.push(Token::redir(">"));
                }
            } else {
                tokens.push(Token::redir("<"));
            }

            i += 1;
            continue;
        }

        match state {
            State::Whitespace => {
                if c == '"' {
                    state = State::Quote;
                } else if c != ' ' && c != '\t' {
                    state = State::Char;
                    current.push(c);
                }
            }
            State::Char => {
                if c == ' ' || c == '\t' {
                    tokens.push(Token::normal(std::mem::take(&mut current)));
                    state = State::Whitespace;
                } else if c == '"' {
                    // A quote mid-word only toggles whitespace-sensitivity,
                    // it doesn't end the token.
                    state = State::Quote;
                } else {
                    current.push(c);
                }
            }
            State::Quote => {
                if c == '"' {
                    state = State::Char;
                } else {
                    current.push(c);
                }
            }
        }

        i += 1;
    }

    if !current.is_empty() || state != State::Whitespace {
        tokens.push(Token::normal(current));
    }

    tokens
}
