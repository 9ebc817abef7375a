use colored::Colorize;
use itertools::Itertools;
use nom::{
    bytes::complete::{tag, take_till},
    combinator::all_consuming,
    multi::separated_list1,
    IResult,
};
use std::{collections::BTreeSet, error::Error, fmt::Display, num::ParseIntError};

use self::{parser::Parser, visitor::Visitor};

mod parser {
    // a cursor over the raw pattern bytes, shared by every nesting level

    use super::ParserError;

    #[derive(Debug)]
    pub struct Parser<'a> {
        regex: &'a [u8],
        position: usize,
    }

    impl<'a> Parser<'a> {
        pub fn new(input: &'a [u8]) -> Parser<'a> {
            Parser {
                regex: input,
                position: 0,
            }
        }

        pub fn position(&self) -> usize {
            self.position
        }

        pub fn peek(&self) -> Option<u8> {
            self.regex.get(self.position).copied()
        }

        pub fn advance_by(&mut self, by: usize) {
            self.position += by;
        }

        pub fn consume_unseen(&mut self) -> Option<u8> {
            let c = self.peek()?;
            self.position += 1;
            Some(c)
        }

        pub fn consume(&mut self, expected: u8) -> Result<u8, ParserError> {
            match self.peek() {
                Some(actual) if actual == expected => {
                    self.advance_by(1);
                    Ok(expected)
                }
                _ => Err(ParserError::UnexpectedByte(self.position, expected)),
            }
        }

        /// Consumes everything up to `terminator` and the terminator itself,
        /// returning the bytes in between.
        pub fn take_until(&mut self, terminator: u8) -> Option<&'a [u8]> {
            let regex = self.regex;
            let rest = &regex[self.position..];
            let offset = rest.iter().position(|&c| c == terminator)?;
            self.position += offset + 1;
            Some(&rest[..offset])
        }
    }
}

#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq)]
pub enum UpperBound {
    Unbounded,
    Bounded(usize),
}

impl Display for UpperBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unbounded => Ok(()),
            Self::Bounded(max) => write!(f, "{}", max),
        }
    }
}

/// One node of the token tree produced by [`run_parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(u8),
    Bracket(BTreeSet<u8>),
    /// Both sides are always `GroupUncaptured`.
    Or(Box<Token>, Box<Token>),
    Repeat(usize, UpperBound, Box<Token>),
    Group(Vec<Token>),
    GroupUncaptured(Vec<Token>),
}

pub(crate) trait Data {
    fn accept<V: Visitor>(&self, visitor: &mut V) -> V::Result;
}

impl Data for Token {
    fn accept<V: Visitor>(&self, visitor: &mut V) -> V::Result {
        match self {
            Self::Literal(c) => visitor.visit_literal(*c),
            Self::Bracket(set) => visitor.visit_bracket(set),
            Self::Or(left, right) => visitor.visit_or(left, right),
            Self::Repeat(min, max, token) => visitor.visit_repeat(*min, *max, token),
            Self::Group(tokens) | Self::GroupUncaptured(tokens) => visitor.visit_group(tokens),
        }
    }
}

fn display_byte(c: u8) -> String {
    std::ascii::escape_default(c).to_string()
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(c) => write!(f, "{}", display_byte(*c)),
            Self::Bracket(set) => {
                write!(f, "[{}]", set.iter().map(|c| display_byte(*c)).join(""))
            }
            Self::Or(left, right) => write!(f, "{}|{}", left, right),
            Self::Repeat(min, max, token) => match max {
                UpperBound::Bounded(max) if max == min => write!(f, "{}{{{}}}", token, min),
                _ => write!(f, "{}{{{},{}}}", token, min, max),
            },
            Self::Group(tokens) => write!(f, "({})", tokens.iter().join("")),
            Self::GroupUncaptured(tokens) => write!(f, "{}", tokens.iter().join("")),
        }
    }
}

/// Every way a pattern can be malformed. The `usize` is the byte offset at
/// which the problem was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserError {
    UnexpectedByte(usize, u8),
    UnterminatedGroup(usize),
    UnterminatedBracket(usize),
    UnterminatedQuantifier(usize),
    CantParseRangeBound(usize, ParseIntError),
    InvalidFieldCount(usize, usize),
    InvalidRangeQuantifier(usize, usize, usize),
    NothingToRepeat(usize),
    DanglingRange(usize),
    EmptyExpression(usize),
    UnmatchedClose(usize),
    RepeatTooLarge(usize, usize),
}

impl ParserError {
    pub fn position(&self) -> usize {
        match *self {
            Self::UnexpectedByte(position, _)
            | Self::UnterminatedGroup(position)
            | Self::UnterminatedBracket(position)
            | Self::UnterminatedQuantifier(position)
            | Self::CantParseRangeBound(position, _)
            | Self::InvalidFieldCount(position, _)
            | Self::InvalidRangeQuantifier(position, _, _)
            | Self::NothingToRepeat(position)
            | Self::DanglingRange(position)
            | Self::EmptyExpression(position)
            | Self::UnmatchedClose(position)
            | Self::RepeatTooLarge(position, _) => position,
        }
    }

    fn code(&self) -> usize {
        match self {
            Self::UnexpectedByte(..) => 1,
            Self::UnterminatedGroup(_) => 2,
            Self::UnterminatedBracket(_) => 3,
            Self::UnterminatedQuantifier(_) => 4,
            Self::CantParseRangeBound(..) => 5,
            Self::InvalidFieldCount(..) => 6,
            Self::InvalidRangeQuantifier(..) => 7,
            Self::NothingToRepeat(_) => 8,
            Self::DanglingRange(_) => 9,
            Self::EmptyExpression(_) => 10,
            Self::UnmatchedClose(_) => 11,
            Self::RepeatTooLarge(..) => 12,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::UnexpectedByte(_, expected) => {
                format!("expected '{}'", display_byte(*expected))
            }
            Self::UnterminatedGroup(_) => "unterminated group".to_string(),
            Self::UnterminatedBracket(_) => "unterminated character group".to_string(),
            Self::UnterminatedQuantifier(_) => "unterminated range quantifier".to_string(),
            Self::CantParseRangeBound(_, err) => format!("invalid quantifier bound: {}", err),
            Self::InvalidFieldCount(_, count) => format!(
                "there must be 1 or 2 values specified for the quantifier: provided {}",
                count
            ),
            Self::InvalidRangeQuantifier(_, min, max) => {
                format!("quantifier upper bound {} is below lower bound {}", max, min)
            }
            Self::NothingToRepeat(_) => "quantifier does not follow anything".to_string(),
            Self::DanglingRange(_) => "range has no start".to_string(),
            Self::EmptyExpression(_) => "empty expression".to_string(),
            Self::UnmatchedClose(_) => "')' closes no group".to_string(),
            Self::RepeatTooLarge(_, count) => format!(
                "quantifier count {} exceeds the limit of {}",
                count, REPEAT_MAX
            ),
        }
    }

    /// Renders the error against the pattern it came from, with a caret
    /// under the offending offset.
    pub fn render(&self, pattern: &str) -> String {
        format!(
            "{}\n | {}\n | {}{}",
            self,
            pattern,
            " ".repeat(self.position()),
            "^".green()
        )
    }
}

impl Display for ParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} at offset {}",
            format!("[{:0>3}]", self.code()).red().bold(),
            self.message(),
            self.position()
        )
    }
}

impl Error for ParserError {}

/// The tokens accumulated at one nesting level.
#[derive(Debug, Default)]
struct ParseContext {
    tokens: Vec<Token>,
}

impl ParseContext {
    fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    fn finish(self, start: usize) -> Result<Vec<Token>, ParserError> {
        if self.tokens.is_empty() {
            Err(ParserError::EmptyExpression(start))
        } else {
            Ok(self.tokens)
        }
    }
}

/// Tokenizes a whole pattern into the token sequence of its top level.
pub fn run_parse(input: &[u8]) -> Result<Vec<Token>, ParserError> {
    let mut parser = Parser::new(input);
    parse_sequence(&mut parser, None, false)
}

// `opened_at` is `None` at the top level and the offset of the `(` inside a group.
// The right side of `|` always ends at `)`; at the top level that `)` is unmatched.
fn parse_sequence(
    parser: &mut Parser,
    opened_at: Option<usize>,
    alternative: bool,
) -> Result<Vec<Token>, ParserError> {
    let start = parser.position();
    let mut context = ParseContext::default();
    loop {
        match (parser.peek(), opened_at) {
            (None, Some(opened)) => return Err(ParserError::UnterminatedGroup(opened)),
            (None, None) => break,
            (Some(b')'), Some(_)) => break,
            (Some(b')'), None) if alternative => {
                return Err(ParserError::UnmatchedClose(parser.position()))
            }
            (Some(_), _) => process(parser, &mut context, opened_at)?,
        }
    }
    context.finish(start)
}

fn process(
    parser: &mut Parser,
    context: &mut ParseContext,
    opened_at: Option<usize>,
) -> Result<(), ParserError> {
    match parser.peek() {
        Some(b'(') => parse_group(parser, context),
        Some(b'[') => parse_bracket(parser, context),
        Some(b'*') | Some(b'+') | Some(b'?') => parse_repeat(parser, context),
        Some(b'{') => parse_repeat_specified(parser, context),
        Some(b'|') => parse_or(parser, context, opened_at),
        Some(c) => {
            parser.advance_by(1);
            context.push(Token::Literal(c));
            Ok(())
        }
        None => Ok(()),
    }
}

fn parse_group(parser: &mut Parser, context: &mut ParseContext) -> Result<(), ParserError> {
    let opened = parser.position();
    parser.consume(b'(')?;
    let tokens = parse_sequence(parser, Some(opened), false)?;
    parser.consume(b')')?;
    context.push(Token::Group(tokens));
    Ok(())
}

fn parse_bracket(parser: &mut Parser, context: &mut ParseContext) -> Result<(), ParserError> {
    let opened = parser.position();
    parser.consume(b'[')?;

    let mut ranges: Vec<(u8, u8)> = Vec::new();
    loop {
        let position = parser.position();
        match parser.consume_unseen() {
            None => return Err(ParserError::UnterminatedBracket(opened)),
            Some(b']') => break,
            Some(b'-') => {
                let next = parser
                    .consume_unseen()
                    .ok_or(ParserError::UnterminatedBracket(opened))?;
                let last = ranges
                    .last_mut()
                    .ok_or(ParserError::DanglingRange(position))?;
                last.1 = next;
            }
            Some(c) => ranges.push((c, c)),
        }
    }

    let set: BTreeSet<u8> = ranges.into_iter().flat_map(|(lo, hi)| lo..=hi).collect();
    context.push(Token::Bracket(set));
    Ok(())
}

fn parse_or(
    parser: &mut Parser,
    context: &mut ParseContext,
    opened_at: Option<usize>,
) -> Result<(), ParserError> {
    let bar = parser.position();
    parser.consume(b'|')?;

    let left = std::mem::take(context).finish(bar)?;
    let right = parse_sequence(parser, opened_at, true)?;

    context.push(Token::Or(
        Box::new(Token::GroupUncaptured(left)),
        Box::new(Token::GroupUncaptured(right)),
    ));
    Ok(())
}

fn wrap_last(
    context: &mut ParseContext,
    position: usize,
    min: usize,
    max: UpperBound,
) -> Result<(), ParserError> {
    let last = context
        .tokens
        .pop()
        .ok_or(ParserError::NothingToRepeat(position))?;
    context.push(Token::Repeat(min, max, Box::new(last)));
    Ok(())
}

fn parse_repeat(parser: &mut Parser, context: &mut ParseContext) -> Result<(), ParserError> {
    let position = parser.position();
    let (min, max) = match parser.consume_unseen() {
        Some(b'*') => (0, UpperBound::Unbounded),
        Some(b'+') => (1, UpperBound::Unbounded),
        Some(b'?') => (0, UpperBound::Bounded(1)),
        _ => return Err(ParserError::UnexpectedByte(position, b'*')),
    };
    wrap_last(context, position, min, max)
}

fn quantifier_fields(body: &[u8]) -> IResult<&[u8], Vec<&[u8]>> {
    all_consuming(separated_list1(tag(","), take_till(|c: u8| c == b',')))(body)
}

fn parse_bound(field: &[u8], position: usize) -> Result<usize, ParserError> {
    String::from_utf8_lossy(field)
        .parse::<usize>()
        .map_err(|err| ParserError::CantParseRangeBound(position, err))
}

/// The largest count a `{m,n}` quantifier may name. Every counted copy is
/// compiled separately.
pub const REPEAT_MAX: usize = 1000;

fn validate_range_quantifier(
    position: usize,
    min: usize,
    max: UpperBound,
) -> Result<(usize, UpperBound), ParserError> {
    match max {
        UpperBound::Bounded(upper) if upper < min => {
            Err(ParserError::InvalidRangeQuantifier(position, min, upper))
        }
        UpperBound::Bounded(upper) if upper > REPEAT_MAX => {
            Err(ParserError::RepeatTooLarge(position, upper))
        }
        _ if min > REPEAT_MAX => Err(ParserError::RepeatTooLarge(position, min)),
        _ => Ok((min, max)),
    }
}

fn parse_repeat_specified(
    parser: &mut Parser,
    context: &mut ParseContext,
) -> Result<(), ParserError> {
    let opened = parser.position();
    parser.consume(b'{')?;
    let body = parser
        .take_until(b'}')
        .ok_or(ParserError::UnterminatedQuantifier(opened))?;

    let (_, fields) =
        quantifier_fields(body).map_err(|_| ParserError::InvalidFieldCount(opened, 0))?;
    let (min, max) = match fields.as_slice() {
        [count] => {
            let count = parse_bound(count, opened)?;
            (count, UpperBound::Bounded(count))
        }
        [min, max] => {
            let min = parse_bound(min, opened)?;
            if max.is_empty() {
                (min, UpperBound::Unbounded)
            } else {
                (min, UpperBound::Bounded(parse_bound(max, opened)?))
            }
        }
        _ => return Err(ParserError::InvalidFieldCount(opened, fields.len())),
    };

    let (min, max) = validate_range_quantifier(opened, min, max)?;
    wrap_last(context, opened, min, max)
}

pub mod visitor {
    use std::collections::BTreeSet;

    use super::{Token, UpperBound};

    pub trait Visitor {
        type Result;
        fn visit_literal(&mut self, literal: u8) -> Self::Result;
        fn visit_bracket(&mut self, set: &BTreeSet<u8>) -> Self::Result;
        fn visit_or(&mut self, left: &Token, right: &Token) -> Self::Result;
        fn visit_repeat(&mut self, min: usize, max: UpperBound, token: &Token) -> Self::Result;
        fn visit_group(&mut self, tokens: &[Token]) -> Self::Result;
    }
}
