//! Operator-precedence reduction shared by every expression grammar.
//!
//! Grammars keep an output stack of operands and an operator stack. Binary
//! operators go through [`process_ops`] before being pushed; prefix
//! operators are pushed directly. [`finish`] drains the stacks once the
//! input (or a bracketed group) ends.

use crate::error::SyntaxError;
use crate::lexer::Token;

/// An operator waiting on the operator stack.
#[derive(Clone, Debug)]
pub struct PendingOp<K> {
    pub kind: K,
    pub precedence: u8,
    pub operands: usize,
    pub right_assoc: bool,
    pub token: Token,
}

impl<K> PendingOp<K> {
    pub fn new(kind: K, precedence: u8, operands: usize, token: Token) -> Self {
        Self {
            kind,
            precedence,
            operands,
            right_assoc: false,
            token,
        }
    }

    pub fn right(mut self) -> Self {
        self.right_assoc = true;
        self
    }
}

/// A node together with the source range it was parsed from.
#[derive(Clone, Debug, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub start: usize,
    pub end: usize,
}

impl<T> Spanned<T> {
    pub fn new(node: T, start: usize, end: usize) -> Self {
        Self { node, start, end }
    }
}

/// Reduce stacked operators that bind at least as tightly as `incoming`,
/// then push `incoming`. With `None` every operator is reduced.
///
/// Operands are handed to `reduce` in left-to-right order.
pub fn process_ops<K, N, F>(
    output: &mut Vec<N>,
    operators: &mut Vec<PendingOp<K>>,
    incoming: Option<PendingOp<K>>,
    reduce: &mut F,
) -> Result<(), SyntaxError>
where
    F: FnMut(PendingOp<K>, Vec<N>) -> Result<N, SyntaxError>,
{
    while let Some(top) = operators.last() {
        if let Some(next) = &incoming {
            let binds_tighter = top.precedence > next.precedence
                || (top.precedence == next.precedence && !next.right_assoc);
            if !binds_tighter {
                break;
            }
        }
        let Some(op) = operators.pop() else { break };
        if output.len() < op.operands {
            return Err(SyntaxError::at(
                &op.token,
                format!("missing operand for {}", op.token),
            ));
        }
        let operands = output.split_off(output.len() - op.operands);
        output.push(reduce(op, operands)?);
    }
    if let Some(next) = incoming {
        operators.push(next);
    }
    Ok(())
}

/// Drain the stacks and return the single remaining operand.
///
/// `end` is the token that terminated the expression, used to place the
/// error when nothing was parsed.
pub fn finish<K, T, F>(
    mut output: Vec<Spanned<T>>,
    mut operators: Vec<PendingOp<K>>,
    reduce: &mut F,
    end: &Token,
) -> Result<Spanned<T>, SyntaxError>
where
    F: FnMut(PendingOp<K>, Vec<Spanned<T>>) -> Result<Spanned<T>, SyntaxError>,
{
    process_ops(&mut output, &mut operators, None, reduce)?;
    match output.len() {
        0 => Err(SyntaxError::at(end, format!("expected a value, found {end}"))),
        1 => Ok(output.remove(0)),
        _ => {
            let extra = &output[1];
            Err(SyntaxError::new("unexpected trailing input", extra.start, extra.end))
        }
    }
}
