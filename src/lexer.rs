use logos::{Logos, SpannedIter};
use std::fmt::{Display, Formatter};
use thiserror::Error;

#[derive(Default, Error, Debug, Clone, PartialEq)]
pub enum LexicalError {
    #[default]
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid character '{character}' at position {position}")]
    InvalidCharacter { character: char, position: usize },
}

#[derive(Clone, Copy, Debug, Logos, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+", error = LexicalError)]
pub enum Token {
    #[token("∩")]
    Intersection,
    #[token("∪")]
    Union,
    #[token("!")]
    #[token("¬")]
    Not,
    #[token("(")]
    LeftParenthesis,
    #[token(")")]
    RightParenthesis,
    #[regex("[A-Z]", |lex| lex.slice().chars().next())]
    Operand(char),
}

impl Display for Token {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intersection => write!(formatter, "∩"),
            Self::Union => write!(formatter, "∪"),
            Self::Not => write!(formatter, "!"),
            Self::LeftParenthesis => write!(formatter, "("),
            Self::RightParenthesis => write!(formatter, ")"),
            Self::Operand(identifier) => write!(formatter, "{identifier}"),
        }
    }
}

pub type Spanned<Tok, Location, Error> = Result<(Location, Tok, Location), Error>;

pub struct Lexer<'input> {
    input: &'input str,
    token_stream: SpannedIter<'input, Token>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        Self {
            input,
            token_stream: Token::lexer(input).spanned(),
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Spanned<Token, usize, LexicalError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.token_stream.next().map(|(token, span)| {
            let token = token.map_err(|error| {
                self.input[span.start..]
                    .chars()
                    .next()
                    .map_or(error, |character| LexicalError::InvalidCharacter {
                        character,
                        position: span.start,
                    })
            })?;

            Ok((span.start, token, span.end))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_tokens(input: &str) -> Result<Vec<Token>, LexicalError> {
        Lexer::new(input)
            .map(|value| value.map(|(_, token, _)| token))
            .collect()
    }

    #[test]
    fn can_lex_intersection() {
        let actual = lex_tokens("∩").unwrap();
        assert_eq!(vec![Token::Intersection], actual);
    }

    #[test]
    fn can_lex_union() {
        let actual = lex_tokens("∪").unwrap();
        assert_eq!(vec![Token::Union], actual);
    }

    #[test]
    fn can_lex_not() {
        let actual = lex_tokens("!").unwrap();
        let other = lex_tokens("¬").unwrap();
        assert_eq!(vec![Token::Not], actual);
        assert_eq!(vec![Token::Not], other);
    }

    #[test]
    fn can_lex_parentheses() {
        let actual = lex_tokens("()").unwrap();
        assert_eq!(
            vec![Token::LeftParenthesis, Token::RightParenthesis],
            actual
        );
    }

    #[test]
    fn can_lex_operands() {
        let actual = lex_tokens("A Z").unwrap();
        assert_eq!(vec![Token::Operand('A'), Token::Operand('Z')], actual);
    }

    #[test]
    fn lex_adjacent_operands_separately() {
        let actual = lex_tokens("AB").unwrap();
        assert_eq!(vec![Token::Operand('A'), Token::Operand('B')], actual);
    }

    #[test]
    fn skip_spaces_tabs_and_new_lines() {
        let actual = lex_tokens(" A\t∩\r\nB ").unwrap();
        assert_eq!(
            vec![Token::Operand('A'), Token::Intersection, Token::Operand('B')],
            actual
        );
    }

    #[test]
    fn can_lex_a_complex_expression() {
        let actual = lex_tokens("¬(A ∩ B) ∪ C").unwrap();
        assert_eq!(
            vec![
                Token::Not,
                Token::LeftParenthesis,
                Token::Operand('A'),
                Token::Intersection,
                Token::Operand('B'),
                Token::RightParenthesis,
                Token::Union,
                Token::Operand('C'),
            ],
            actual
        );
    }

    #[test]
    fn return_an_error_on_lowercase_operands() {
        let actual = lex_tokens("A ∩ b");
        assert_eq!(
            Err(LexicalError::InvalidCharacter {
                character: 'b',
                position: 6
            }),
            actual
        );
    }

    #[test]
    fn return_an_error_on_unknown_operators() {
        let actual = lex_tokens("A & B");
        assert_eq!(
            Err(LexicalError::InvalidCharacter {
                character: '&',
                position: 2
            }),
            actual
        );
    }

    #[test]
    fn return_an_error_on_form_feeds() {
        assert!(lex_tokens("A\u{c}").is_err());
    }

    #[test]
    fn lex_nothing_from_blank_input() {
        let actual = lex_tokens(" \t\n").unwrap();
        assert!(actual.is_empty());
    }
}
