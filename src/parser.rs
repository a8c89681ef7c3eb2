use crate::{
    constraints::{CompositeParameters, ConstraintKind, NotParameters},
    error::ExpressionError,
    lexer::{Lexer, Token},
    model::RawConstraint,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Parse an expression over named operands into a single raw constraint.
///
/// Operands are single uppercase letters that must be keys of `operands`. `∩` and `∪` combine
/// two constraints while `!` (or `¬`) negates one; `!` binds tighter than `∩` which binds
/// tighter than `∪`. A bare operand parses to its own raw constraint.
///
/// The result is not validated: it still has to go through
/// [`ConstraintRegistry::new_constraint()`](crate::ConstraintRegistry::new_constraint).
pub fn parse(
    expression: &str,
    operands: &BTreeMap<String, RawConstraint>,
) -> Result<RawConstraint, ExpressionError> {
    let tokens = tokenize(expression, operands)?;
    let postfix = to_postfix(&tokens)?;
    reduce(&postfix, operands)
}

/// Lex the expression, check its operands and wrap it in parentheses.
fn tokenize(
    expression: &str,
    operands: &BTreeMap<String, RawConstraint>,
) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = vec![Token::LeftParenthesis];
    let mut operand_count = 0;

    for spanned in Lexer::new(expression) {
        let (_, token, _) = spanned.map_err(ExpressionError::Lexical)?;
        if let Token::Operand(identifier) = token {
            find_operand(operands, identifier)?;
            operand_count += 1;
        }
        tokens.push(token);
    }

    if operand_count == 0 {
        return Err(ExpressionError::Empty);
    }

    tokens.push(Token::RightParenthesis);
    Ok(tokens)
}

#[inline]
const fn precedence(token: &Token) -> u8 {
    match token {
        Token::Union => 1,
        Token::Intersection => 2,
        Token::Not => 3,
        _ => 0,
    }
}

/// Convert the infix tokens to postfix.
///
/// An operator is pushed only if the top of the stack binds strictly looser. Otherwise the top
/// is popped to the output and the same operator is considered again. Two consecutive `!` are
/// therefore not right associative: the first one is emitted before the operand that follows.
/// A `)` without a matching `(` only flushes the stack.
fn to_postfix(tokens: &[Token]) -> Result<Vec<Token>, ExpressionError> {
    let mut postfix = Vec::with_capacity(tokens.len());
    let mut stack: Vec<Token> = Vec::new();
    let mut index = 0;

    while let Some(token) = tokens.get(index) {
        match token {
            Token::Operand(_) => postfix.push(*token),
            Token::LeftParenthesis => stack.push(*token),
            Token::RightParenthesis => loop {
                match stack.pop() {
                    Some(Token::LeftParenthesis) | None => break,
                    Some(operator) => postfix.push(operator),
                }
            },
            operator => {
                let top = stack.last().ok_or(ExpressionError::Malformed)?;
                if precedence(top) < precedence(operator) {
                    stack.push(*operator);
                } else {
                    postfix.extend(stack.pop());
                    continue;
                }
            }
        }
        index += 1;
    }

    Ok(postfix)
}

/// Reduce the postfix tokens into a tree of raw constraints.
fn reduce(
    postfix: &[Token],
    operands: &BTreeMap<String, RawConstraint>,
) -> Result<RawConstraint, ExpressionError> {
    let mut stack: Vec<RawConstraint> = Vec::new();

    for token in postfix {
        let reduced = match token {
            Token::Operand(identifier) => find_operand(operands, *identifier)?.clone(),
            Token::Not => {
                let constraint = stack.pop().ok_or(ExpressionError::Malformed)?;
                synthesize(ConstraintKind::Not, &NotParameters { constraint })?
            }
            Token::Intersection | Token::Union => {
                let right = stack.pop().ok_or(ExpressionError::Malformed)?;
                let left = stack.pop().ok_or(ExpressionError::Malformed)?;
                let kind = if *token == Token::Intersection {
                    ConstraintKind::Intersection
                } else {
                    ConstraintKind::Union
                };
                synthesize(
                    kind,
                    &CompositeParameters {
                        constraints: vec![right, left],
                    },
                )?
            }
            Token::LeftParenthesis | Token::RightParenthesis => {
                return Err(ExpressionError::Malformed)
            }
        };
        stack.push(reduced);
    }

    match (stack.pop(), stack.is_empty()) {
        (Some(constraint), true) => Ok(constraint),
        _ => Err(ExpressionError::Malformed),
    }
}

fn find_operand(
    operands: &BTreeMap<String, RawConstraint>,
    identifier: char,
) -> Result<&RawConstraint, ExpressionError> {
    let mut buffer = [0; 4];
    operands
        .get(identifier.encode_utf8(&mut buffer) as &str)
        .ok_or(ExpressionError::UndefinedOperand(identifier))
}

fn synthesize<P: Serialize>(
    kind: ConstraintKind,
    parameters: &P,
) -> Result<RawConstraint, ExpressionError> {
    let parameters = serde_json::to_value(parameters).map_err(ExpressionError::Encoding)?;
    Ok(RawConstraint::new(kind.name(), parameters))
}
