//! Block literals (`id[:id|:n][state=value,...]`) and bare state lists,
//! shared by the pattern and mask grammars.

use geist_blocks::{Block, BlockRegistry, BlockType, PERSISTENT_BIT, StateError, StateKind, StateValue};
use geist_parse::lexer::selector_tokenizer;
use geist_parse::{Token, TokenKind, TokenStream, TokenValue};

use crate::error::{ParseError, Result};

/// A `name=value` pair as written, with its source range.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct StatePair {
    pub name: String,
    pub value: StateValue,
    pub start: usize,
    pub end: usize,
}

pub(crate) struct Literal {
    pub block: Block,
    /// States written explicitly, validated against the type.
    pub explicit: Vec<(String, StateValue)>,
    pub name: String,
}

/// `n` as a whole number of type `T`, or a syntax error on `tok`.
pub(crate) fn whole_number<T: TryFrom<i64>>(n: f64, tok: &Token, what: &str) -> Result<T> {
    let whole = n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64;
    whole
        .then_some(n as i64)
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| ParseError::syntax(format!("expected {what}, found {tok}"), tok.pos, tok.end()))
}

fn state_value(ts: &mut TokenStream) -> Result<StateValue> {
    let tok = ts.next();
    let negative = tok.is_punct("-");
    let tok = if negative { ts.next() } else { tok };
    match (&tok.kind, &tok.value) {
        (TokenKind::Number, TokenValue::Number(n)) => {
            let v: i32 = whole_number(if negative { -*n } else { *n }, &tok, "an integer state value")?;
            Ok(StateValue::Int(v))
        }
        (TokenKind::Bool, TokenValue::Bool(b)) if !negative => Ok(StateValue::Bool(*b)),
        (TokenKind::Ident, _) if !negative => Ok(StateValue::Str(tok.text.clone())),
        (TokenKind::Str, TokenValue::Text(s)) if !negative => Ok(StateValue::Str(s.clone())),
        _ => Err(ParseError::syntax(
            format!("expected a state value, found {tok}"),
            tok.pos,
            tok.end(),
        )),
    }
}

/// Parse `[name=value, ...]`; the opening bracket must be next.
pub(crate) fn parse_state_list(ts: &mut TokenStream) -> Result<Vec<StatePair>> {
    ts.expect("[")?;
    let mut out = Vec::new();
    ts.skip_space();
    if ts.eat("]") {
        return Ok(out);
    }
    loop {
        ts.skip_space();
        let name_tok = ts.next();
        let Some(name) = name_tok.ident() else {
            return Err(ParseError::syntax(
                format!("expected a state name, found {name_tok}"),
                name_tok.pos,
                name_tok.end(),
            ));
        };
        let name = name.to_string();
        ts.skip_space();
        ts.expect("=")?;
        ts.skip_space();
        let value = state_value(ts)?;
        out.push(StatePair {
            name,
            value,
            start: name_tok.pos,
            end: ts.last_end(),
        });
        ts.skip_space();
        if ts.eat(",") {
            continue;
        }
        ts.expect("]")?;
        return Ok(out);
    }
}

/// Coerce a written value to the kind the state expects where the text
/// allows it, e.g. `level=1` for a string-valued state.
fn coerce(ty: &BlockType, pair: &StatePair) -> StateValue {
    let Some(field) = ty.state_field(&pair.name) else {
        return pair.value.clone();
    };
    let expected = field.values.first().map(StateValue::kind);
    match (expected, &pair.value) {
        (Some(StateKind::Str), v @ (StateValue::Int(_) | StateValue::Bool(_))) => StateValue::Str(v.to_string()),
        _ => pair.value.clone(),
    }
}

/// Check every pair against `ty` and return them typed.
pub(crate) fn validate_states(ty: &BlockType, pairs: &[StatePair]) -> Result<Vec<(String, StateValue)>> {
    let mut out = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let value = coerce(ty, pair);
        match ty.validate_state(&pair.name, &value) {
            Ok(()) => out.push((pair.name.clone(), value)),
            Err(StateError::UnknownState) => {
                return Err(ParseError::UnknownState {
                    state: pair.name.clone(),
                    block: ty.name.clone(),
                });
            }
            Err(e) => {
                return Err(ParseError::InvalidStateValue {
                    state: pair.name.clone(),
                    value: value.to_string(),
                    block: ty.name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(out)
}

/// Parse `id`, `ns:id` and an optional `:n` data value.
pub(crate) fn parse_name(ts: &mut TokenStream) -> Result<(String, Option<u16>)> {
    let first = ts.next();
    let Some(ident) = first.ident() else {
        return Err(ParseError::syntax(
            format!("expected a block, found {first}"),
            first.pos,
            first.end(),
        ));
    };
    let mut name = ident.to_string();
    let mut data_value = None;
    if ts.peek().is_punct(":") {
        let after = ts.peek_at(1).clone();
        if let Some(id) = after.ident() {
            name = format!("{name}:{id}");
            ts.next();
            ts.next();
        }
    }
    if ts.peek().is_punct(":") {
        let after = ts.peek_at(1).clone();
        let Some(n) = after.number() else {
            return Err(ParseError::syntax(
                format!("expected a data value, found {after}"),
                after.pos,
                after.end(),
            ));
        };
        data_value = Some(whole_number(n, &after, "a data value")?);
        ts.next();
        ts.next();
    }
    Ok((name, data_value))
}

pub(crate) fn resolve_type<'r>(registry: &'r BlockRegistry, name: &str) -> Result<&'r BlockType> {
    registry
        .id_by_name(name)
        .and_then(|id| registry.get(id))
        .ok_or_else(|| ParseError::UnknownBlock(name.to_string()))
}

/// Parse a block literal starting at an identifier.
///
/// With `persistent` set, a type carrying `persistent_bit` gets it forced
/// true unless the literal names it.
pub(crate) fn parse_literal(ts: &mut TokenStream, registry: &BlockRegistry, persistent: bool) -> Result<Literal> {
    let (name, data_value) = parse_name(ts)?;
    let ty = resolve_type(registry, &name)?;
    let id = ty.id;

    let pairs = if ts.peek().is_punct("[") {
        parse_state_list(ts)?
    } else {
        Vec::new()
    };
    let explicit = validate_states(ty, &pairs)?;

    let mut state = data_value.map(|n| ty.nth_permutation(usize::from(n))).unwrap_or(0);
    for (k, v) in &explicit {
        if let Some(s) = ty.with_state(state, k, v) {
            state = s;
        }
    }
    if persistent && ty.has_state(PERSISTENT_BIT) && !explicit.iter().any(|(k, _)| k == PERSISTENT_BIT) {
        if let Some(s) = ty.with_state(state, PERSISTENT_BIT, &StateValue::Bool(true)) {
            state = s;
        }
    }
    Ok(Literal {
        block: Block::new(id, state),
        explicit,
        name: ty.name.clone(),
    })
}

/// Parse a whole string as one literal, e.g. a block stored in JSON.
pub(crate) fn parse_literal_str(src: &str, registry: &BlockRegistry, persistent: bool) -> Result<Literal> {
    let tokenizer = selector_tokenizer().map_err(|e| ParseError::syntax(e.to_string(), 0, src.len()))?;
    let mut ts = TokenStream::new(tokenizer.tokenize(src)?);
    let lit = parse_literal(&mut ts, registry, persistent)?;
    if !ts.at_eof() {
        let tok = ts.peek();
        return Err(ParseError::syntax(format!("unexpected {tok}"), tok.pos, tok.end()));
    }
    Ok(lit)
}

/// `name[k=v,...]` text for explicit states.
pub(crate) fn render_states(name: &str, states: &[(String, StateValue)]) -> String {
    if states.is_empty() {
        return name.to_string();
    }
    let inner: Vec<String> = states.iter().map(|(k, v)| format!("{k}={}", render_value(v))).collect();
    format!("{name}[{}]", inner.join(","))
}

pub(crate) fn render_value(v: &StateValue) -> String {
    match v {
        StateValue::Str(s) if !is_plain_ident(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}

fn is_plain_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && s != "true"
        && s != "false"
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn registry() -> BlockRegistry {
        BlockRegistry::from_toml_str(
            r#"
            [[blocks]]
            name = "air"
            solid = false

            [[blocks]]
            name = "stone"

            [[blocks]]
            name = "dirt"

            [[blocks]]
            name = "oak_log"
            tags = ["logs"]
            states = { axis = ["y", "x", "z"] }

            [[blocks]]
            name = "chest"
            states = { facing = ["north", "south", "east", "west"], persistent_bit = [false, true] }

            [[blocks]]
            name = "wool"
            tags = ["soft"]
            states = { color = ["white", "red", "blue"] }

            [[blocks]]
            name = "stairs"
            states = { facing = ["north", "south", "east", "west"], half = ["bottom", "top"], waterlogged = [false, true] }

            [[blocks]]
            name = "glass"
            solid = false
            "#,
        )
        .unwrap()
    }

    fn lit(src: &str) -> Result<Literal> {
        let reg = registry();
        let toks = selector_tokenizer().unwrap().tokenize(src).unwrap();
        let mut ts = TokenStream::new(toks);
        parse_literal(&mut ts, &reg, true)
    }

    #[test]
    fn plain_and_namespaced() {
        let reg = registry();
        let a = lit("stone").unwrap();
        let b = lit("minecraft:stone").unwrap();
        assert_eq!(a.block, b.block);
        assert_eq!(a.block.id, reg.id_by_name("stone").unwrap());
    }

    #[test]
    fn states_are_validated() {
        assert!(lit("oak_log[axis=x]").is_ok());
        match lit("stone[foo=bar]") {
            Err(ParseError::UnknownState { state, block }) => {
                assert_eq!(state, "foo");
                assert_eq!(block, "stone");
            }
            other => panic!("unexpected {:?}", other.map(|l| l.block)),
        }
        assert!(matches!(lit("oak_log[axis=w]"), Err(ParseError::InvalidStateValue { .. })));
        assert!(matches!(lit("oak_log[axis=1]"), Err(ParseError::InvalidStateValue { .. })));
        assert!(matches!(lit("granite"), Err(ParseError::UnknownBlock(_))));
        assert!(matches!(lit("oak_log[axis]"), Err(ParseError::Syntax(_))));
    }

    #[test]
    fn persistent_bit_forced_unless_explicit() {
        let reg = registry();
        let chest = reg.get(reg.id_by_name("chest").unwrap()).unwrap();
        let forced = lit("chest").unwrap();
        assert_eq!(chest.state_prop_value(forced.block.state, PERSISTENT_BIT), Some(&StateValue::Bool(true)));
        let explicit = lit("chest[persistent_bit=false]").unwrap();
        assert_eq!(chest.state_prop_value(explicit.block.state, PERSISTENT_BIT), Some(&StateValue::Bool(false)));
    }

    #[test]
    fn data_value_selects_permutation() {
        let reg = registry();
        let log = reg.get(reg.id_by_name("oak_log").unwrap()).unwrap();
        let l = lit("oak_log:2").unwrap();
        assert_eq!(log.state_prop_value(l.block.state, "axis"), Some(&StateValue::Str("z".into())));
    }

    #[test]
    fn out_of_range_numbers_are_syntax_errors() {
        for src in ["oak_log:70000", "oak_log:-1", "oak_log:1.5", "oak_log[axis=3000000000]"] {
            assert!(matches!(lit(src), Err(ParseError::Syntax(_))), "{src}");
        }
        assert!(lit("oak_log:65535").is_ok());
    }

    #[test]
    fn render_quotes_odd_strings() {
        let states = vec![
            ("a".to_string(), StateValue::Str("x y".into())),
            ("b".to_string(), StateValue::Int(-2)),
        ];
        assert_eq!(render_states("t", &states), "t[a=\"x y\",b=-2]");
    }
}
