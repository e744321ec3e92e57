use geist_blocks::BlockRegistry;
use geist_geom::IVec3;
use geist_parse::lexer::selector_tokenizer;
use geist_parse::{PendingOp, Spanned, SyntaxError, Token, TokenStream, finish, process_ops};

use super::node::{PatternNode, Weighted, block_text};
use crate::error::{ParseError, Result};
use crate::gradient::GradientKind;
use crate::literal::{parse_literal, parse_name, parse_state_list, resolve_type, whole_number};

const COMMA: u8 = 1;
const PERCENT: u8 = 3;

#[derive(Clone, Copy, Debug)]
enum Op {
    Comma,
    Percent(f64),
}

fn reduce(op: PendingOp<Op>, mut args: Vec<Spanned<PatternNode>>) -> std::result::Result<Spanned<PatternNode>, SyntaxError> {
    let start = args.first().map_or(op.token.pos, |a| a.start).min(op.token.pos);
    let end = args.last().map_or(op.token.end(), |a| a.end);
    let node = match op.kind {
        Op::Comma => {
            let rhs = args.pop();
            let lhs = args.pop();
            let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
                return Err(SyntaxError::at(&op.token, "missing operand"));
            };
            match lhs.node {
                PatternNode::Chain { mut children, weighted } => {
                    children.push(Weighted::new(1.0, rhs.node));
                    PatternNode::Chain { children, weighted }
                }
                l => PatternNode::Chain {
                    children: vec![Weighted::new(1.0, l), Weighted::new(1.0, rhs.node)],
                    weighted: false,
                },
            }
        }
        Op::Percent(weight) => {
            let Some(child) = args.pop() else {
                return Err(SyntaxError::at(&op.token, "missing operand"));
            };
            PatternNode::Percent {
                weight,
                child: Box::new(child.node),
            }
        }
    };
    Ok(Spanned::new(node, start, end))
}

pub(crate) struct PatternParser<'r> {
    registry: &'r BlockRegistry,
}

impl<'r> PatternParser<'r> {
    pub(crate) fn new(registry: &'r BlockRegistry) -> Self {
        Self { registry }
    }

    pub(crate) fn parse_str(&self, src: &str) -> Result<PatternNode> {
        let tokenizer = selector_tokenizer().map_err(|e| ParseError::syntax(e.to_string(), 0, src.len()))?;
        let mut ts = TokenStream::new(tokenizer.tokenize(src)?);
        let node = self.parse_chain(&mut ts)?;
        ts.skip_space();
        if !ts.at_eof() {
            let tok = ts.peek();
            return Err(ParseError::syntax(format!("unexpected {tok}"), tok.pos, tok.end()));
        }
        Ok(node.node)
    }

    fn parse_chain(&self, ts: &mut TokenStream) -> Result<Spanned<PatternNode>> {
        let mut out: Vec<Spanned<PatternNode>> = Vec::new();
        let mut ops: Vec<PendingOp<Op>> = Vec::new();
        let mut want_operand = true;
        loop {
            ts.skip_space();
            let tok = ts.peek().clone();
            if want_operand {
                if let Some(n) = tok.number() {
                    if ts.peek_at(1).is_punct("%") {
                        ts.next();
                        let pct = ts.next();
                        let op_tok = Token {
                            text: format!("{}%", tok.text),
                            pos: tok.pos,
                            ..pct
                        };
                        ops.push(PendingOp::new(Op::Percent(n), PERCENT, 1, op_tok).right());
                        continue;
                    }
                }
                out.push(self.parse_term(ts)?);
                want_operand = false;
            } else if tok.is_punct(",") {
                ts.next();
                process_ops(&mut out, &mut ops, Some(PendingOp::new(Op::Comma, COMMA, 2, tok)), &mut reduce)?;
                want_operand = true;
            } else {
                break;
            }
        }
        let end = ts.peek().clone();
        Ok(finish(out, ops, &mut reduce, &end)?)
    }

    fn parse_term(&self, ts: &mut TokenStream) -> Result<Spanned<PatternNode>> {
        let tok = ts.peek().clone();
        let start = tok.pos;
        let node = if tok.is_punct("(") {
            ts.next();
            let inner = self.parse_chain(ts)?;
            ts.skip_space();
            ts.expect(")")?;
            PatternNode::Group(Box::new(inner.node))
        } else if tok.is_punct("^") {
            ts.next();
            if ts.peek().is_punct("[") {
                let pairs = parse_state_list(ts)?;
                PatternNode::StateSwap {
                    states: pairs.into_iter().map(|p| (p.name, p.value)).collect(),
                }
            } else {
                let (name, _) = parse_name(ts)?;
                let ty = resolve_type(self.registry, &name)?;
                PatternNode::TypeSwap {
                    id: ty.id,
                    name: ty.name.clone(),
                }
            }
        } else if tok.is_punct("*") {
            ts.next();
            let (name, _) = parse_name(ts)?;
            let ty = resolve_type(self.registry, &name)?;
            PatternNode::Random {
                id: ty.id,
                name: ty.name.clone(),
            }
        } else if tok.is_punct("#") {
            ts.next();
            self.parse_flag(ts)?
        } else if tok.is_punct("$") {
            ts.next();
            let name_tok = ts.next();
            let Some(name) = name_tok.ident() else {
                return Err(ParseError::syntax(
                    format!("expected a gradient name, found {name_tok}"),
                    name_tok.pos,
                    name_tok.end(),
                ));
            };
            let name = name.to_string();
            let mut kind = GradientKind::Linear;
            if ts.eat(".") {
                let k = ts.next();
                kind = k.ident().and_then(GradientKind::from_suffix).ok_or_else(|| {
                    ParseError::syntax(format!("unknown gradient kind {k}"), k.pos, k.end())
                })?;
            }
            PatternNode::Gradient { name, kind }
        } else if tok.ident() == Some("void") {
            ts.next();
            PatternNode::Void
        } else if tok.ident().is_some() {
            let lit = parse_literal(ts, self.registry, true)?;
            PatternNode::Block {
                block: lit.block,
                text: block_text(self.registry, lit.block),
            }
        } else {
            return Err(ParseError::syntax(format!("expected a pattern, found {tok}"), tok.pos, tok.end()));
        };
        Ok(Spanned::new(node, start, ts.last_end()))
    }

    fn parse_flag(&self, ts: &mut TokenStream) -> Result<PatternNode> {
        let flag = ts.next();
        let Some(name) = flag.ident() else {
            return Err(ParseError::syntax(
                format!("expected a flag after `#`, found {flag}"),
                flag.pos,
                flag.end(),
            ));
        };
        match name {
            "hand" => Ok(PatternNode::Hand),
            "clipboard" => {
                let mut offset = IVec3::ZERO;
                if ts.eat("@") {
                    offset = parse_offset(ts)?;
                }
                Ok(PatternNode::Clipboard { offset })
            }
            _ => match name.strip_prefix("blob") {
                Some(digits) => {
                    let size: i32 = digits.parse().map_err(|_| {
                        ParseError::syntax("`#blob` needs a cell size, e.g. `#blob4`", flag.pos, flag.end())
                    })?;
                    if size < 1 {
                        return Err(ParseError::syntax("blob size must be positive", flag.pos, flag.end()));
                    }
                    ts.expect("(")?;
                    let inner = self.parse_chain(ts)?;
                    ts.skip_space();
                    ts.expect(")")?;
                    Ok(PatternNode::Blob {
                        size,
                        child: Box::new(inner.node),
                    })
                }
                None => Err(ParseError::UnknownFlag(name.to_string())),
            },
        }
    }
}

/// `[x,y,z]` with optionally negative integers.
fn parse_offset(ts: &mut TokenStream) -> Result<IVec3> {
    ts.expect("[")?;
    let mut v = [0i32; 3];
    for (i, slot) in v.iter_mut().enumerate() {
        if i > 0 {
            ts.skip_space();
            ts.expect(",")?;
        }
        ts.skip_space();
        let neg = ts.eat("-");
        let tok = ts.next();
        let Some(n) = tok.number() else {
            return Err(ParseError::syntax(format!("expected an integer, found {tok}"), tok.pos, tok.end()));
        };
        *slot = whole_number(if neg { -n } else { n }, &tok, "an integer offset")?;
    }
    ts.skip_space();
    ts.expect("]")?;
    Ok(IVec3::new(v[0], v[1], v[2]))
}
