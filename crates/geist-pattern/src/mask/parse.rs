use geist_blocks::{Block, BlockRegistry};
use geist_parse::expr::parse_expr;
use geist_parse::lexer::selector_tokenizer;
use geist_parse::{PendingOp, Spanned, SyntaxError, TokenStream, finish, process_ops};

use super::node::MaskNode;
use crate::error::{ParseError, Result};
use crate::literal::{parse_literal, parse_state_list};

const OR: u8 = 1;
const AND: u8 = 2;
const PREFIX: u8 = 3;

#[derive(Clone, Copy, Debug)]
enum Op {
    Or,
    And,
    Not,
    Offset(i32),
}

fn reduce(op: PendingOp<Op>, mut args: Vec<Spanned<MaskNode>>) -> std::result::Result<Spanned<MaskNode>, SyntaxError> {
    let start = args.first().map_or(op.token.pos, |a| a.start).min(op.token.pos);
    let end = args.last().map_or(op.token.end(), |a| a.end);
    let node = match op.kind {
        Op::Or | Op::And => {
            let rhs = args.pop();
            let lhs = args.pop();
            let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
                return Err(SyntaxError::at(&op.token, "missing operand"));
            };
            match (op.kind, lhs.node) {
                (Op::Or, MaskNode::Or(mut v)) => {
                    v.push(rhs.node);
                    MaskNode::Or(v)
                }
                (Op::And, MaskNode::And(mut v)) => {
                    v.push(rhs.node);
                    MaskNode::And(v)
                }
                (Op::Or, l) => MaskNode::Or(vec![l, rhs.node]),
                (_, l) => MaskNode::And(vec![l, rhs.node]),
            }
        }
        Op::Not | Op::Offset(_) => {
            let Some(child) = args.pop() else {
                return Err(SyntaxError::at(&op.token, "missing operand"));
            };
            match op.kind {
                Op::Offset(dy) => MaskNode::Offset {
                    dy,
                    child: Box::new(child.node),
                },
                _ => MaskNode::Not(Box::new(child.node)),
            }
        }
    };
    Ok(Spanned::new(node, start, end))
}

pub(crate) struct MaskParser<'r, 's> {
    registry: &'r BlockRegistry,
    src: &'s str,
}

impl<'r, 's> MaskParser<'r, 's> {
    pub(crate) fn new(registry: &'r BlockRegistry, src: &'s str) -> Self {
        Self { registry, src }
    }

    pub(crate) fn parse(&self) -> Result<MaskNode> {
        let tokenizer = selector_tokenizer().map_err(|e| ParseError::syntax(e.to_string(), 0, self.src.len()))?;
        let mut ts = TokenStream::new(tokenizer.tokenize(self.src)?);
        ts.skip_space();
        if ts.at_eof() {
            return Ok(MaskNode::Empty);
        }
        let node = self.parse_or(&mut ts)?;
        ts.skip_space();
        if !ts.at_eof() {
            let tok = ts.peek();
            return Err(ParseError::syntax(format!("unexpected {tok}"), tok.pos, tok.end()));
        }
        Ok(node.node)
    }

    /// Whether the spaces at the cursor separate two operands.
    fn space_is_and(ts: &TokenStream) -> bool {
        let mut i = 0;
        while ts.peek_at(i).is_space() {
            i += 1;
        }
        let next = ts.peek_at(i);
        !(next.is_eof() || next.is_punct(",") || next.is_punct(")"))
    }

    fn parse_or(&self, ts: &mut TokenStream) -> Result<Spanned<MaskNode>> {
        let mut out: Vec<Spanned<MaskNode>> = Vec::new();
        let mut ops: Vec<PendingOp<Op>> = Vec::new();
        let mut want_operand = true;
        loop {
            if want_operand {
                ts.skip_space();
                let tok = ts.peek().clone();
                let prefix = if tok.is_punct("!") {
                    Some(Op::Not)
                } else if tok.is_punct("<") {
                    Some(Op::Offset(1))
                } else if tok.is_punct(">") {
                    Some(Op::Offset(-1))
                } else {
                    None
                };
                if let Some(p) = prefix {
                    ts.next();
                    ops.push(PendingOp::new(p, PREFIX, 1, tok).right());
                    continue;
                }
                out.push(self.parse_term(ts)?);
                want_operand = false;
                continue;
            }
            let tok = ts.peek().clone();
            if tok.is_space() {
                if Self::space_is_and(ts) {
                    ts.skip_space();
                    process_ops(&mut out, &mut ops, Some(PendingOp::new(Op::And, AND, 2, tok)), &mut reduce)?;
                    want_operand = true;
                } else {
                    ts.skip_space();
                }
                continue;
            }
            if tok.is_punct(",") {
                ts.next();
                process_ops(&mut out, &mut ops, Some(PendingOp::new(Op::Or, OR, 2, tok)), &mut reduce)?;
                want_operand = true;
                continue;
            }
            break;
        }
        let end = ts.peek().clone();
        Ok(finish(out, ops, &mut reduce, &end)?)
    }

    fn parse_term(&self, ts: &mut TokenStream) -> Result<Spanned<MaskNode>> {
        let tok = ts.peek().clone();
        let start = tok.pos;
        let node = if tok.is_punct("(") {
            ts.next();
            ts.skip_space();
            if ts.eat(")") {
                MaskNode::Empty
            } else {
                let inner = self.parse_or(ts)?;
                ts.skip_space();
                ts.expect(")")?;
                inner.node
            }
        } else if tok.is_punct("^") {
            ts.next();
            let strict = ts.eat("=");
            let pairs = parse_state_list(ts)?;
            MaskNode::States {
                states: pairs.into_iter().map(|p| (p.name, p.value)).collect(),
                strict,
            }
        } else if tok.is_punct("%") {
            ts.next();
            let n = ts.next();
            let Some(chance) = n.number() else {
                return Err(ParseError::syntax(format!("expected a percentage, found {n}"), n.pos, n.end()));
            };
            MaskNode::Percent(chance)
        } else if tok.is_punct("#") {
            ts.next();
            self.parse_flag(ts)?
        } else if tok.is_punct("=") {
            ts.next();
            let expr = parse_expr(ts, false)?;
            MaskNode::Expr {
                source: self.src[expr.start..expr.end].to_string(),
                expr: expr.node,
            }
        } else if tok.ident().is_some() {
            let lit = parse_literal(ts, self.registry, false)?;
            let ty = self.registry.get(lit.block.id);
            let pins_all = ty.is_some_and(|t| {
                !t.state_fields.is_empty()
                    && t.state_fields.iter().all(|f| lit.explicit.iter().any(|(k, _)| *k == f.name))
            });
            MaskNode::Block {
                id: lit.block.id,
                name: lit.name,
                perm: pins_all.then_some(Block::new(lit.block.id, lit.block.state)),
                states: lit.explicit,
            }
        } else {
            return Err(ParseError::syntax(format!("expected a mask, found {tok}"), tok.pos, tok.end()));
        };
        Ok(Spanned::new(node, start, ts.last_end()))
    }

    fn parse_flag(&self, ts: &mut TokenStream) -> Result<MaskNode> {
        if ts.eat("#") {
            let t = ts.next();
            let Some(tag) = t.ident() else {
                return Err(ParseError::syntax(format!("expected a tag, found {t}"), t.pos, t.end()));
            };
            return Ok(MaskNode::Tag(tag.to_string()));
        }
        let flag = ts.next();
        let Some(name) = flag.ident() else {
            return Err(ParseError::syntax(
                format!("expected a flag after `#`, found {flag}"),
                flag.pos,
                flag.end(),
            ));
        };
        match name {
            "existing" => Ok(MaskNode::Existing),
            "shadow" => Ok(MaskNode::Shadow),
            "surface" | "exposed" => {
                let mut slope = None;
                if ts.eat("[") {
                    let lo = angle(ts)?;
                    ts.expect(":")?;
                    let hi = angle(ts)?;
                    ts.expect("]")?;
                    slope = Some((lo.min(hi), lo.max(hi)));
                }
                Ok(MaskNode::Surface { slope })
            }
            other => Err(ParseError::UnknownFlag(other.to_string())),
        }
    }
}

fn angle(ts: &mut TokenStream) -> Result<f32> {
    let t = ts.next();
    t.number()
        .map(|n| n as f32)
        .ok_or_else(|| ParseError::syntax(format!("expected an angle, found {t}"), t.pos, t.end()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::tests::registry;

    fn parse(src: &str) -> Result<MaskNode> {
        MaskParser::new(&registry(), src).parse()
    }

    #[test]
    fn space_binds_tighter_than_comma() {
        match parse("stone dirt,glass").unwrap() {
            MaskNode::Or(v) => {
                assert!(matches!(v[0], MaskNode::And(_)));
                assert!(matches!(v[1], MaskNode::Block { .. }));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn trailing_and_comma_spaces_are_not_and() {
        assert!(matches!(parse(" stone ").unwrap(), MaskNode::Block { .. }));
        assert!(matches!(parse("stone , dirt").unwrap(), MaskNode::Or(_)));
        assert!(matches!(parse("(stone dirt )").unwrap(), MaskNode::And(_)));
    }

    #[test]
    fn prefixes_bind_tightest() {
        match parse("!stone dirt").unwrap() {
            MaskNode::And(v) => assert!(matches!(v[0], MaskNode::Not(_))),
            other => panic!("{other:?}"),
        }
        match parse("<>stone").unwrap() {
            MaskNode::Offset { dy: 1, child } => assert!(matches!(*child, MaskNode::Offset { dy: -1, .. })),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn flags_and_state_tests() {
        assert_eq!(parse("#existing").unwrap(), MaskNode::Existing);
        assert_eq!(parse("##logs").unwrap(), MaskNode::Tag("logs".into()));
        assert_eq!(parse("%25").unwrap(), MaskNode::Percent(25.0));
        assert_eq!(parse("#exposed[40:10]").unwrap(), MaskNode::Surface { slope: Some((10.0, 40.0)) });
        assert!(matches!(parse("^=[axis=x]").unwrap(), MaskNode::States { strict: true, .. }));
        assert!(matches!(parse("^[axis=x]").unwrap(), MaskNode::States { strict: false, .. }));
        assert!(matches!(parse("#bogus"), Err(ParseError::UnknownFlag(_))));
    }

    #[test]
    fn expression_ends_at_space() {
        match parse("=y>3 stone").unwrap() {
            MaskNode::And(v) => match &v[0] {
                MaskNode::Expr { source, .. } => assert_eq!(source, "y>3"),
                other => panic!("{other:?}"),
            },
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn literal_pins_permutation_only_when_complete() {
        match parse("oak_log[axis=x]").unwrap() {
            MaskNode::Block { perm, .. } => assert!(perm.is_some()),
            other => panic!("{other:?}"),
        }
        match parse("stairs[facing=east]").unwrap() {
            MaskNode::Block { perm, .. } => assert!(perm.is_none()),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn empty_input_is_the_empty_mask() {
        assert_eq!(parse("").unwrap(), MaskNode::Empty);
        assert_eq!(parse("  ").unwrap(), MaskNode::Empty);
        assert!(matches!(parse("stone,"), Err(ParseError::Syntax(_))));
        assert!(matches!(parse("!"), Err(ParseError::Syntax(_))));
    }
}
