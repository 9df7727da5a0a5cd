//! Structural pass that turns a token list into a validated pipeline of
//! command descriptors: re-tag redirections, extract them into the
//! descriptor, set pipe flags by segment position, and validate channel
//! exclusivity.

use crate::errors::ShellError;
use crate::tokenizer::{self, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinSource {
    Default,
    File(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutSink {
    Default,
    FileTrunc(String),
    FileAppend(String),
}

/// One segment of a pipeline: argv plus its redirection/pipe wiring.
#[derive(Debug)]
pub struct CommandDescriptor {
    pub cmd_name: String,
    pub argv: Vec<String>,
    pub pipe_in: bool,
    pub pipe_out: bool,
    pub stdin_source: StdinSource,
    pub stdout_sink: StdoutSink,
}

impl CommandDescriptor {
    pub fn is_queue_eligible(&self) -> bool {
        !self.pipe_in
            && !self.pipe_out
            && self.stdin_source == StdinSource::Default
            && self.stdout_sink == StdoutSink::Default
    }
}

pub type Pipeline = Vec<CommandDescriptor>;

/// Assemble a raw command line into a validated, non-empty pipeline.
pub fn assemble(line: &str) -> Result<Pipeline, ShellError> {
    let segments = tokenizer::split_segments(line);
    let total = segments.len();
    let mut pipeline = Vec::with_capacity(total);

    for (index, segment) in segments.iter().enumerate() {
        let tokens = retag_redirections(tokenizer::tokenize_segment(segment))?;
        let (argv, stdin_source, stdout_sink) = extract_redirections(tokens)?;

        if argv.is_empty() {
            return Err(ShellError::MalformedCmdline);
        }

        let pipe_in = index > 0;
        let pipe_out = index + 1 < total;

        if pipe_in && stdin_source != StdinSource::Default {
            return Err(ShellError::MalformedCmdline);
        }
        if pipe_out && stdout_sink != StdoutSink::Default {
            return Err(ShellError::MalformedCmdline);
        }

        pipeline.push(CommandDescriptor {
            cmd_name: argv[0].clone(),
            argv,
            pipe_in,
            pipe_out,
            stdin_source,
            stdout_sink,
        });
    }

    Ok(pipeline)
}

/// Re-tag each token following a REDIR token with the matching FNAME_* kind
/// and drop the REDIR token. Errors if a REDIR token has nothing after it.
fn retag_redirections(tokens: Vec<Token>) -> Result<Vec<Token>, ShellError> {
    let mut result = Vec::with_capacity(tokens.len());
    let mut i = 0;

    while i < tokens.len() {
        if tokens[i].kind == TokenKind::Redir {
            let op = tokens[i].text.clone();
            let next = tokens.get(i + 1).ok_or(ShellError::MalformedCmdline)?;
            let kind = match op.as_str() {
                ">" => TokenKind::FnameOutTrunc,
                ">>" => TokenKind::FnameOutAppend,
                "<" => TokenKind::FnameIn,
                _ => unreachable!("tokenizer only emits <, >, >> as REDIR text"),
            };
            result.push(Token {
                text: next.text.clone(),
                kind,
            });
            i += 2;
        } else {
            result.push(tokens[i].clone());
            i += 1;
        }
    }

    Ok(result)
}

/// Pull FNAME_* tokens out of the argv sequence and into the descriptor's
/// stdin/stdout channels. Errors if either channel is chosen twice.
fn extract_redirections(
    tokens: Vec<Token>,
) -> Result<(Vec<String>, StdinSource, StdoutSink), ShellError> {
    let mut argv = Vec::new();
    let mut stdin_source = StdinSource::Default;
    let mut stdout_sink = StdoutSink::Default;

    for token in tokens {
        match token.kind {
            TokenKind::FnameIn => {
                if stdin_source != StdinSource::Default {
                    return Err(ShellError::MalformedCmdline);
                }
                stdin_source = StdinSource::File(token.text);
            }
            TokenKind::FnameOutTrunc => {
                if stdout_sink != StdoutSink::Default {
                    return Err(ShellError::MalformedCmdline);
                }
                stdout_sink = StdoutSink::FileTrunc(token.text);
            }
            TokenKind::FnameOutAppend => {
                if stdout_sink != StdoutSink::Default {
                    return Err(ShellError::MalformedCmdline);
                }
                stdout_sink = StdoutSink::FileAppend(token.text);
            }
            TokenKind::Normal => argv.push(token.text),
            TokenKind::Redir => unreachable!("redirections are retagged before extraction"),
        }
    }

    Ok((argv, stdin_source, stdout_sink))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_command_no_redirections() {
        let pipeline = assemble("echo hello world").unwrap();
        assert_eq!(pipeline.len(), 1);
        assert_eq!(pipeline[0].cmd_name, "echo");
        assert_eq!(pipeline[0].argv, vec!["echo", "hello", "world"]);
        assert!(!pipeline[0].pipe_in);
        assert!(!pipeline[0].pipe_out);
    }

    #[test]
    fn pipe_flags_follow_segment_position() {
        let pipeline = assemble("a | b | c").unwrap();
        assert_eq!(pipeline.len(), 3);
        assert!(!pipeline[0].pipe_in);
        assert!(pipeline[0].pipe_out);
        assert!(pipeline[1].pipe_in);
        assert!(pipeline[1].pipe_out);
        assert!(pipeline[2].pipe_in);
        assert!(!pipeline[2].pipe_out);
    }

    #[test]
    fn redirections_are_extracted_from_argv() {
        let pipeline = assemble("sort < in.txt > out.txt").unwrap();
        assert_eq!(pipeline[0].argv, vec!["sort"]);
        assert_eq!(
            pipeline[0].stdin_source,
            StdinSource::File("in.txt".to_string())
        );
        assert_eq!(
            pipeline[0].stdout_sink,
            StdoutSink::FileTrunc("out.txt".to_string())
        );
    }

    #[test]
    fn append_redirection() {
        let pipeline = assemble("echo hi >> out.txt").unwrap();
        assert_eq!(
            pipeline[0].stdout_sink,
            StdoutSink::FileAppend("out.txt".to_string())
        );
    }

    #[test]
    fn trailing_redirection_with_no_command_is_malformed() {
        // scenario 7: `>out` with no command — but even `cmd >` has no filename.
        let err = assemble("echo >").unwrap_err();
        assert!(matches!(err, ShellError::MalformedCmdline));
    }

    #[test]
    fn no_command_before_redirection_is_malformed() {
        // scenario 7 literally: `>out`
        let err = assemble(">out").unwrap_err();
        assert!(matches!(err, ShellError::MalformedCmdline));
    }

    #[test]
    fn two_outputs_on_one_segment_is_malformed() {
        // scenario 8: `echo a > f1 > f2`
        let err = assemble("echo a > f1 > f2").unwrap_err();
        assert!(matches!(err, ShellError::MalformedCmdline));
    }

    #[test]
    fn empty_segment_in_pipeline_is_malformed() {
        let err = assemble("echo a | | echo b").unwrap_err();
        assert!(matches!(err, ShellError::MalformedCmdline));
    }

    #[test]
    fn redirection_on_non_terminal_pipeline_stage_is_malformed() {
        let err = assemble("echo a > out.txt | tr a-z A-Z").unwrap_err();
        assert!(matches!(err, ShellError::MalformedCmdline));
    }

    #[test]
    fn token_count_conservation() {
        // Each redirection consumes two tokens out of a segment (the REDIR
        // operator plus its filename) and contributes zero to argv; pipes
        // are consumed by segmentation and never become tokens at all. So
        // per segment: len(argv) + 2*count(redirections) == token count.
        let line = "sort < in.txt | tr a-z A-Z > out.txt";
        let segments = tokenizer::split_segments(line);
        let per_segment_tokens: Vec<usize> = segments
            .iter()
            .map(|s| tokenizer::tokenize_segment(s).len())
            .collect();

        let pipeline = assemble(line).unwrap();
        for (descriptor, token_count) in pipeline.iter().zip(per_segment_tokens) {
            let redirections = (descriptor.stdin_source != StdinSource::Default) as usize
                + (descriptor.stdout_sink != StdoutSink::Default) as usize;
            assert_eq!(descriptor.argv.len() + 2 * redirections, token_count);
        }
    }
}
