//! Arithmetic sub-language used by `=expr` masks.

use std::fmt;

use crate::error::SyntaxError;
use crate::grammar::{PendingOp, Spanned, finish, process_ops};
use crate::lexer::{Token, TokenKind, TokenValue, expr_tokenizer};
use crate::stream::TokenStream;

/// Variables bound while evaluating an expression.
///
/// `x y z` are world coordinates of the tested block, `ox oy oz` are the
/// same position relative to the placement point.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vars {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub ox: f64,
    pub oy: f64,
    pub oz: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Var {
    X,
    Y,
    Z,
    Ox,
    Oy,
    Oz,
}

impl Var {
    fn from_name(name: &str) -> Option<Var> {
        Some(match name {
            "x" => Var::X,
            "y" => Var::Y,
            "z" => Var::Z,
            "ox" => Var::Ox,
            "oy" => Var::Oy,
            "oz" => Var::Oz,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Var::X => "x",
            Var::Y => "y",
            Var::Z => "z",
            Var::Ox => "ox",
            Var::Oy => "oy",
            Var::Oz => "oz",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl BinOp {
    fn from_token(tok: &Token) -> Option<(BinOp, u8)> {
        if tok.kind != TokenKind::Punct {
            return None;
        }
        Some(match tok.text.as_str() {
            "||" => (BinOp::Or, 1),
            "&&" => (BinOp::And, 2),
            "==" => (BinOp::Eq, 3),
            "!=" => (BinOp::Ne, 3),
            "<" => (BinOp::Lt, 4),
            "<=" => (BinOp::Le, 4),
            ">" => (BinOp::Gt, 4),
            ">=" => (BinOp::Ge, 4),
            "+" => (BinOp::Add, 5),
            "-" => (BinOp::Sub, 5),
            "*" => (BinOp::Mul, 6),
            "/" => (BinOp::Div, 6),
            "%" => (BinOp::Rem, 6),
            "^" => (BinOp::Pow, POW_PRECEDENCE),
            _ => return None,
        })
    }

    fn symbol(self) -> &'static str {
        match self {
            BinOp::Or => "||",
            BinOp::And => "&&",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Pow => "^",
        }
    }
}

const PREFIX_PRECEDENCE: u8 = 7;
const POW_PRECEDENCE: u8 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Func {
    Abs,
    Floor,
    Ceil,
    Round,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Min,
    Max,
    Pow,
}

impl Func {
    fn from_name(name: &str) -> Option<Func> {
        Some(match name {
            "abs" => Func::Abs,
            "floor" => Func::Floor,
            "ceil" => Func::Ceil,
            "round" => Func::Round,
            "sqrt" => Func::Sqrt,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "min" => Func::Min,
            "max" => Func::Max,
            "pow" => Func::Pow,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Func::Abs => "abs",
            Func::Floor => "floor",
            Func::Ceil => "ceil",
            Func::Round => "round",
            Func::Sqrt => "sqrt",
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Tan => "tan",
            Func::Min => "min",
            Func::Max => "max",
            Func::Pow => "pow",
        }
    }

    /// Accepted argument counts as `(min, max)`.
    fn arity(self) -> (usize, usize) {
        match self {
            Func::Min | Func::Max => (1, usize::MAX),
            Func::Pow => (2, 2),
            _ => (1, 1),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(Var),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

#[inline]
fn truth(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

impl Expr {
    pub fn eval(&self, vars: &Vars) -> f64 {
        match self {
            Expr::Num(n) => *n,
            Expr::Var(v) => match v {
                Var::X => vars.x,
                Var::Y => vars.y,
                Var::Z => vars.z,
                Var::Ox => vars.ox,
                Var::Oy => vars.oy,
                Var::Oz => vars.oz,
            },
            Expr::Neg(e) => -e.eval(vars),
            Expr::Not(e) => truth(e.eval(vars) == 0.0),
            Expr::Bin(op, a, b) => {
                let a = a.eval(vars);
                // short-circuit
                match op {
                    BinOp::Or if a != 0.0 => return 1.0,
                    BinOp::And if a == 0.0 => return 0.0,
                    _ => {}
                }
                let b = b.eval(vars);
                match op {
                    BinOp::Or | BinOp::And => truth(b != 0.0),
                    BinOp::Eq => truth(a == b),
                    BinOp::Ne => truth(a != b),
                    BinOp::Lt => truth(a < b),
                    BinOp::Le => truth(a <= b),
                    BinOp::Gt => truth(a > b),
                    BinOp::Ge => truth(a >= b),
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Rem => a % b,
                    BinOp::Pow => a.powf(b),
                }
            }
            Expr::Call(f, args) => {
                let mut vals = args.iter().map(|a| a.eval(vars));
                let first = vals.next().unwrap_or(0.0);
                match f {
                    Func::Abs => first.abs(),
                    Func::Floor => first.floor(),
                    Func::Ceil => first.ceil(),
                    Func::Round => first.round(),
                    Func::Sqrt => first.sqrt(),
                    Func::Sin => first.sin(),
                    Func::Cos => first.cos(),
                    Func::Tan => first.tan(),
                    Func::Min => vals.fold(first, f64::min),
                    Func::Max => vals.fold(first, f64::max),
                    Func::Pow => first.powf(vals.next().unwrap_or(1.0)),
                }
            }
        }
    }

    /// Whether the expression reads any coordinate.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Num(_) => true,
            Expr::Var(_) => false,
            Expr::Neg(e) | Expr::Not(e) => e.is_constant(),
            Expr::Bin(_, a, b) => a.is_constant() && b.is_constant(),
            Expr::Call(_, args) => args.iter().all(Expr::is_constant),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(n) => write!(f, "{n}"),
            Expr::Var(v) => f.write_str(v.name()),
            Expr::Neg(e) => write!(f, "-{e}"),
            Expr::Not(e) => write!(f, "!{e}"),
            Expr::Bin(op, a, b) => write!(f, "({a}{}{b})", op.symbol()),
            Expr::Call(func, args) => {
                write!(f, "{}(", func.name())?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{a}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Op {
    Bin(BinOp),
    Neg,
    Not,
    Plus,
}

fn reduce(op: PendingOp<Op>, mut args: Vec<Spanned<Expr>>) -> Result<Spanned<Expr>, SyntaxError> {
    let start = args.first().map_or(op.token.pos, |a| a.start).min(op.token.pos);
    let end = args.last().map_or(op.token.end(), |a| a.end);
    let node = match op.kind {
        Op::Bin(b) => {
            let rhs = args.pop();
            let lhs = args.pop();
            match (lhs, rhs) {
                (Some(l), Some(r)) => Expr::Bin(b, Box::new(l.node), Box::new(r.node)),
                _ => return Err(SyntaxError::at(&op.token, "missing operand")),
            }
        }
        Op::Neg | Op::Not | Op::Plus => {
            let Some(arg) = args.pop() else {
                return Err(SyntaxError::at(&op.token, "missing operand"));
            };
            match op.kind {
                Op::Neg => Expr::Neg(Box::new(arg.node)),
                Op::Not => Expr::Not(Box::new(arg.node)),
                _ => arg.node,
            }
        }
    };
    Ok(Spanned::new(node, start, end))
}

/// Parse an expression from the stream, stopping at the first token that
/// cannot continue it.
///
/// With `top_level_spaces` false, whitespace outside parentheses ends the
/// expression instead of being skipped.
pub fn parse_expr(ts: &mut TokenStream, top_level_spaces: bool) -> Result<Spanned<Expr>, SyntaxError> {
    let mut out: Vec<Spanned<Expr>> = Vec::new();
    let mut ops: Vec<PendingOp<Op>> = Vec::new();
    let mut want_operand = true;
    loop {
        if top_level_spaces {
            ts.skip_space();
        }
        let tok = ts.peek().clone();
        if want_operand {
            let prefix = match tok.text.as_str() {
                "-" => Some(Op::Neg),
                "!" => Some(Op::Not),
                "+" => Some(Op::Plus),
                _ => None,
            };
            if let (Some(p), TokenKind::Punct) = (prefix, tok.kind) {
                ts.next();
                ops.push(PendingOp::new(p, PREFIX_PRECEDENCE, 1, tok).right());
                continue;
            }
            out.push(parse_atom(ts)?);
            want_operand = false;
        } else {
            let Some((bin, prec)) = BinOp::from_token(&tok) else {
                break;
            };
            ts.next();
            let mut pending = PendingOp::new(Op::Bin(bin), prec, 2, tok);
            if bin == BinOp::Pow {
                pending = pending.right();
            }
            process_ops(&mut out, &mut ops, Some(pending), &mut reduce)?;
            want_operand = true;
        }
    }
    let end = ts.peek().clone();
    finish(out, ops, &mut reduce, &end)
}

fn parse_atom(ts: &mut TokenStream) -> Result<Spanned<Expr>, SyntaxError> {
    let tok = ts.peek().clone();
    let node = match (&tok.kind, &tok.value) {
        (TokenKind::Number, TokenValue::Number(n)) => {
            ts.next();
            Expr::Num(*n)
        }
        (TokenKind::Bool, TokenValue::Bool(b)) => {
            ts.next();
            Expr::Num(truth(*b))
        }
        (TokenKind::Ident, _) => {
            ts.next();
            let name = tok.text.as_str();
            if ts.peek().is_punct("(") {
                let func = Func::from_name(name)
                    .ok_or_else(|| SyntaxError::at(&tok, format!("unknown function `{name}`")))?;
                parse_call(ts, func, &tok)?
            } else if let Some(v) = Var::from_name(name) {
                Expr::Var(v)
            } else {
                match name {
                    "pi" => Expr::Num(std::f64::consts::PI),
                    "e" => Expr::Num(std::f64::consts::E),
                    _ => return Err(SyntaxError::at(&tok, format!("unknown variable `{name}`"))),
                }
            }
        }
        _ if tok.is_punct("(") => {
            ts.next();
            let inner = parse_expr(ts, true)?;
            ts.skip_space();
            ts.expect(")")?;
            inner.node
        }
        _ => return Err(SyntaxError::at(&tok, format!("expected a value, found {tok}"))),
    };
    Ok(Spanned::new(node, tok.pos, ts.last_end()))
}

fn parse_call(ts: &mut TokenStream, func: Func, name: &Token) -> Result<Expr, SyntaxError> {
    ts.expect("(")?;
    let mut args = Vec::new();
    ts.skip_space();
    if !ts.peek().is_punct(")") {
        loop {
            args.push(parse_expr(ts, true)?.node);
            ts.skip_space();
            if !ts.eat(",") {
                break;
            }
        }
    }
    ts.expect(")")?;
    let (lo, hi) = func.arity();
    if args.len() < lo || args.len() > hi {
        return Err(SyntaxError::new(
            format!("`{}` takes {} argument(s), got {}", func.name(), lo, args.len()),
            name.pos,
            ts.last_end(),
        ));
    }
    Ok(Expr::Call(func, args))
}

/// Parse a complete standalone expression.
pub fn parse_expression(src: &str) -> Result<Expr, SyntaxError> {
    let tokenizer = expr_tokenizer().map_err(|e| SyntaxError::new(e.to_string(), 0, src.len()))?;
    let mut ts = TokenStream::new(tokenizer.tokenize(src)?);
    let e = parse_expr(&mut ts, true)?;
    ts.skip_space();
    if !ts.at_eof() {
        let tok = ts.peek();
        return Err(SyntaxError::at(tok, format!("unexpected {tok}")));
    }
    Ok(e.node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str) -> f64 {
        parse_expression(src).unwrap().eval(&Vars {
            x: 2.0,
            y: 64.0,
            z: -3.0,
            ..Vars::default()
        })
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("2 ^ 3 ^ 2"), 512.0);
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("-2 ^ 2"), -4.0);
        assert_eq!(eval("2 ^ -1"), 0.5);
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(eval("y >= 64 && x < 3"), 1.0);
        assert_eq!(eval("y > 64 || z == -3"), 1.0);
        assert_eq!(eval("!(x != 2)"), 1.0);
    }

    #[test]
    fn functions_and_constants() {
        assert_eq!(eval("max(x, y, 5)"), 64.0);
        assert_eq!(eval("min(3)"), 3.0);
        assert_eq!(eval("abs(z)"), 3.0);
        assert_eq!(eval("pow(2, 10)"), 1024.0);
        assert!((eval("cos(pi)") + 1.0).abs() < 1e-12);
    }

    #[test]
    fn errors_carry_ranges() {
        let err = parse_expression("1 + foo").unwrap_err();
        assert_eq!((err.start, err.end), (4, 7));
        let err = parse_expression("pow(1)").unwrap_err();
        assert_eq!((err.start, err.end), (0, 6));
        let err = parse_expression("1 +").unwrap_err();
        assert!(err.message.contains("expected a value"));
        let err = parse_expression("1 2").unwrap_err();
        assert_eq!(err.start, 2);
    }

    #[test]
    fn constant_detection() {
        assert!(parse_expression("1 + 2").unwrap().is_constant());
        assert!(!parse_expression("x + 2").unwrap().is_constant());
    }
}
