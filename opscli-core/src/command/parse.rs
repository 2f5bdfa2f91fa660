#![allow(clippy::module_name_repetitions)]

//! Lexer and parser for shell command lines.
//!
//! The lexer uses `regal` to produce a bounded lexeme stream, while the
//! parser composes `winnow` combinators over those lexemes to split the line
//! into pipe-separated sub-commands. Parsing is purely lexical; it never
//! consults the registered grammar.

use core::ops::Range;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
use thiserror::Error;
#[allow(deprecated)]
use winnow::error::ErrorKind;
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::stream::Stream;

/// Maximum number of lexemes accepted per line.
pub const MAX_LEXEMES: usize = 1024;
const MAX_CACHE_RECORDS: usize = MAX_LEXEMES * 2;

/// Lexical classes of a command line.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LexemeKind {
    /// Single-quoted segment; a backslash escapes the next character.
    #[regex(r"'(?:[^'\\]|\\.)*'", priority = 2)]
    SingleQuoted,
    /// Double-quoted segment; a backslash escapes the next character.
    #[regex(r#""(?:[^"\\]|\\.)*""#, priority = 2)]
    DoubleQuoted,
    /// Run of characters other than whitespace and `|`.
    #[regex(r#"[^ \t|'"][^ \t|]*"#)]
    Bare,
    /// Sub-command separator.
    #[token("|")]
    Pipe,
    #[regex(r"[ \t]+")]
    Space,
    /// Quote character without its closing partner.
    #[default]
    #[regex(r#"['"]"#, priority = 1024)]
    Error,
}

impl LexemeKind {
    const fn is_word(self) -> bool {
        matches!(
            self,
            LexemeKind::Bare | LexemeKind::SingleQuoted | LexemeKind::DoubleQuoted
        )
    }
}

/// Lexeme emitted by the lexer with a byte span back into the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lexeme<'a> {
    pub kind: LexemeKind,
    pub text: &'a str,
    pub span: Range<usize>,
}

pub type LexemeBuffer<'a> = HeaplessVec<Lexeme<'a>, MAX_LEXEMES>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("empty command")]
    Empty,
    #[error("leading whitespace")]
    LeadingWhitespace,
    #[error("trailing whitespace")]
    TrailingWhitespace,
    #[error("missing command after `|`")]
    DanglingPipe,
    #[error("unexpected `|`")]
    UnexpectedPipe,
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("missing space between words")]
    AdjacentWords,
    #[error("too many words")]
    TooManyLexemes,
    #[error("lexer failure")]
    Engine,
}

/// Lexical failure with the byte offset it was detected at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("{kind} at position {position}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: usize,
}

impl ParseError {
    const fn new(kind: ParseErrorKind, position: usize) -> Self {
        ParseError { kind, position }
    }

    fn at(kind: ParseErrorKind, lexeme: Option<&Lexeme<'_>>) -> Self {
        ParseError::new(kind, lexeme.map_or(0, |lexeme| lexeme.span.start))
    }
}

type Input<'src, 'slice> = &'slice [Lexeme<'src>];

#[allow(deprecated)]
impl<'src, 'slice> ParserError<Input<'src, 'slice>> for ParseError
where
    'src: 'slice,
{
    fn from_error_kind(input: &Input<'src, 'slice>, _kind: ErrorKind) -> Self {
        ParseError::at(ParseErrorKind::Engine, input.first())
    }

    fn append(
        self,
        _input: &Input<'src, 'slice>,
        _token_start: &<Input<'src, 'slice> as Stream>::Checkpoint,
        _kind: ErrorKind,
    ) -> Self {
        self
    }

    fn or(self, other: Self) -> Self {
        other
    }
}

/// One word after quote removal and unescaping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    pub span: Range<usize>,
    pub quoted: bool,
}

/// Words of one pipe-delimited stage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubCommand {
    pub words: Vec<Word>,
}

impl SubCommand {
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(|word| word.text.as_str())
    }

    pub fn into_texts(self) -> Vec<String> {
        self.words.into_iter().map(|word| word.text).collect()
    }
}

/// A parsed line: one or more sub-commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine {
    pub stages: Vec<SubCommand>,
}

/// Tokenize the provided line.
pub fn lex(line: &str) -> Result<LexemeBuffer<'_>, ParseError> {
    let compiled = LexemeKind::lexer();
    let mut cache: TokenCache<LexemeKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = LexemeBuffer::new();

    for record in cache.tokens() {
        if record.skipped {
            continue;
        }

        let span = record.start..record.end;
        push_lexeme(
            &mut buffer,
            Lexeme {
                kind: record.token,
                text: &line[span.clone()],
                span,
            },
        )?;
    }

    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let start = partial.start;
        push_lexeme(
            &mut buffer,
            Lexeme {
                kind: LexemeKind::Error,
                text: partial.fragment,
                span: start..start + partial.fragment.len(),
            },
        )?;
    }

    Ok(buffer)
}

fn push_lexeme<'a>(buffer: &mut LexemeBuffer<'a>, lexeme: Lexeme<'a>) -> Result<(), ParseError> {
    let position = lexeme.span.start;
    buffer
        .push(lexeme)
        .map_err(|_| ParseError::new(ParseErrorKind::TooManyLexemes, position))
}

fn map_incremental_error(error: IncrementalError) -> ParseError {
    match error {
        IncrementalError::TokenOverflow => ParseError::new(ParseErrorKind::TooManyLexemes, 0),
        _ => ParseError::new(ParseErrorKind::Engine, 0),
    }
}

/// Parse a full command line into its sub-commands.
pub fn parse(line: &str) -> Result<CommandLine, ParseError> {
    let lexemes = lex(line)?;
    let lexemes = lexemes.as_slice();

    let (Some(first), Some(last)) = (lexemes.first(), lexemes.last()) else {
        return Err(ParseError::new(ParseErrorKind::Empty, 0));
    };
    if first.kind == LexemeKind::Space {
        return Err(ParseError::at(ParseErrorKind::LeadingWhitespace, Some(first)));
    }
    if last.kind == LexemeKind::Space {
        return Err(ParseError::at(ParseErrorKind::TrailingWhitespace, Some(last)));
    }
    if last.kind == LexemeKind::Pipe {
        return Err(ParseError::at(ParseErrorKind::DanglingPipe, Some(last)));
    }
    if let Some(bad) = lexemes.iter().find(|lexeme| lexeme.kind == LexemeKind::Error) {
        return Err(ParseError::at(ParseErrorKind::UnterminatedQuote, Some(bad)));
    }

    let mut input = lexemes;
    match command_line().parse_next(&mut input) {
        Ok(command) => Ok(command),
        Err(ErrMode::Backtrack(err) | ErrMode::Cut(err)) => Err(err),
        Err(ErrMode::Incomplete(_)) => Err(ParseError::at(ParseErrorKind::Engine, input.first())),
    }
}

fn command_line<'src, 'slice>() -> impl Parser<Input<'src, 'slice>, CommandLine, ParseError>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let mut stages = vec![stage().parse_next(input)?];
        while !input.is_empty() {
            separator().parse_next(input)?;
            stages.push(stage().parse_next(input)?);
        }
        Ok(CommandLine { stages })
    }
}

fn stage<'src, 'slice>() -> impl Parser<Input<'src, 'slice>, SubCommand, ParseError>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let mut words = vec![word().parse_next(input)?];
        loop {
            match input.split_first() {
                Some((lexeme, rest)) if lexeme.kind == LexemeKind::Space => {
                    match rest.first() {
                        Some(next) if next.kind.is_word() => {
                            *input = rest;
                            words.push(word().parse_next(input)?);
                        }
                        _ => break,
                    }
                }
                Some((lexeme, _)) if lexeme.kind.is_word() => {
                    return Err(ErrMode::Cut(ParseError::at(
                        ParseErrorKind::AdjacentWords,
                        Some(lexeme),
                    )));
                }
                _ => break,
            }
        }
        Ok(SubCommand { words })
    }
}

fn separator<'src, 'slice>() -> impl Parser<Input<'src, 'slice>, (), ParseError>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        skip_space(input);
        expect_kind(LexemeKind::Pipe, ParseErrorKind::UnexpectedPipe).parse_next(input)?;
        skip_space(input);
        Ok(())
    }
}

fn word<'src, 'slice>() -> impl Parser<Input<'src, 'slice>, Word, ParseError>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((lexeme, rest)) if lexeme.kind.is_word() => {
            *input = rest;
            Ok(to_word(lexeme))
        }
        Some((lexeme, _)) if lexeme.kind == LexemeKind::Pipe => Err(ErrMode::Cut(
            ParseError::at(ParseErrorKind::UnexpectedPipe, Some(lexeme)),
        )),
        Some((lexeme, _)) => Err(ErrMode::Backtrack(ParseError::at(
            ParseErrorKind::Engine,
            Some(lexeme),
        ))),
        None => Err(ErrMode::Cut(ParseError::at(ParseErrorKind::DanglingPipe, None))),
    }
}

fn expect_kind<'src, 'slice>(
    kind: LexemeKind,
    error: ParseErrorKind,
) -> impl Parser<Input<'src, 'slice>, Lexeme<'src>, ParseError>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((lexeme, rest)) if lexeme.kind == kind => {
            *input = rest;
            Ok(lexeme.clone())
        }
        Some((lexeme, _)) => Err(ErrMode::Backtrack(ParseError::at(error, Some(lexeme)))),
        None => Err(ErrMode::Backtrack(ParseError::at(error, None))),
    }
}

fn skip_space(input: &mut Input<'_, '_>) {
    if let Some((_, rest)) = input
        .split_first()
        .filter(|(lexeme, _)| lexeme.kind == LexemeKind::Space)
    {
        *input = rest;
    }
}

fn to_word(lexeme: &Lexeme<'_>) -> Word {
    let quoted = matches!(
        lexeme.kind,
        LexemeKind::SingleQuoted | LexemeKind::DoubleQuoted
    );
    let text = if quoted {
        unescape(&lexeme.text[1..lexeme.text.len() - 1])
    } else {
        lexeme.text.to_owned()
    };
    Word {
        text,
        span: lexeme.span.clone(),
        quoted,
    }
}

fn unescape(body: &str) -> String {
    let mut text = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(escaped) = chars.next() {
                text.push(escaped);
            }
        } else {
            text.push(ch);
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn stages(line: &str) -> Vec<Vec<String>> {
        parse(line)
            .expect("line should parse")
            .stages
            .into_iter()
            .map(SubCommand::into_texts)
            .collect()
    }

    fn error_kind(line: &str) -> ParseErrorKind {
        match parse(line) {
            Err(err) => err.kind,
            Ok(other) => panic!("unexpected parse of {line:?}: {other:?}"),
        }
    }

    #[test]
    fn splits_pipeline_and_quoted_words() {
        assert_eq!(
            stages(r#"hello test "a b" | cmd2"#),
            vec![vec!["hello", "test", "a b"], vec!["cmd2"]]
        );
    }

    #[test]
    fn unescapes_quoted_words() {
        assert_eq!(stages(r"'multi \' space'"), vec![vec!["multi ' space"]]);
        assert_eq!(stages(r#""say \"hi\"""#), vec![vec![r#"say "hi""#]]);
    }

    #[test]
    fn pipe_needs_no_surrounding_spaces() {
        assert_eq!(stages("a|b c"), vec![vec!["a"], vec!["b", "c"]]);
    }

    #[test]
    fn collapses_runs_of_spaces() {
        assert_eq!(stages("show   vlan\t10"), vec![vec!["show", "vlan", "10"]]);
    }

    #[test]
    fn records_word_spans() {
        let line = parse("vlan 'ten'").expect("line should parse");
        let words = &line.stages[0].words;
        assert_eq!(words[1].span, 5..10);
        assert!(words[1].quoted);
        assert!(!words[0].quoted);
    }

    #[rstest]
    #[case("test ", ParseErrorKind::TrailingWhitespace)]
    #[case(" test", ParseErrorKind::LeadingWhitespace)]
    #[case("test|", ParseErrorKind::DanglingPipe)]
    #[case("test | ", ParseErrorKind::TrailingWhitespace)]
    #[case("| test", ParseErrorKind::UnexpectedPipe)]
    #[case("a || b", ParseErrorKind::UnexpectedPipe)]
    #[case("'open", ParseErrorKind::UnterminatedQuote)]
    #[case("\"a\"b", ParseErrorKind::AdjacentWords)]
    #[case("", ParseErrorKind::Empty)]
    fn rejects_malformed_lines(#[case] line: &str, #[case] expected: ParseErrorKind) {
        assert_eq!(error_kind(line), expected);
    }

    #[test]
    fn accepts_long_lines() {
        let line = vec!["word"; 100].join(" ");
        let parsed = stages(&line);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].len(), 100);

        let pipeline = vec!["a"; 100].join(" | ");
        assert_eq!(stages(&pipeline).len(), 100);
    }

    #[test]
    fn rejects_lines_past_the_lexeme_limit() {
        let line = vec!["w"; MAX_LEXEMES].join(" ");
        assert_eq!(error_kind(&line), ParseErrorKind::TooManyLexemes);
    }

    #[test]
    fn reports_error_position() {
        let err = parse("show vlan ").expect_err("trailing space");
        assert_eq!(err.position, 9);
    }

    #[test]
    fn lexer_classifies_line() {
        let lexemes = lex("no 'x'|y").expect("lexing should succeed");
        let kinds: Vec<_> = lexemes.iter().map(|lexeme| lexeme.kind).collect();
        assert_eq!(
            kinds,
            [
                LexemeKind::Bare,
                LexemeKind::Space,
                LexemeKind::SingleQuoted,
                LexemeKind::Pipe,
                LexemeKind::Bare
            ]
        );
    }
}
