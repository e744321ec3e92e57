use std::collections::HashSet;
use std::fmt;

use regex::Regex;

use crate::error::ParsingError;

/// Lexical state every tokenizer starts in.
pub const MAIN: &str = "main";

/// Zero-width `Repeat` actions allowed at one offset before giving up.
const MAX_REPEATS: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Ident,
    Number,
    Bool,
    Str,
    Punct,
    Space,
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenValue {
    None,
    Number(f64),
    Bool(bool),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: TokenValue,
    /// Exact source slice this token was cut from.
    pub text: String,
    pub pos: usize,
    pub line: usize,
    pub column: usize,
}

impl Token {
    #[inline]
    pub fn end(&self) -> usize {
        self.pos + self.text.len()
    }

    #[inline]
    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    #[inline]
    pub fn is_space(&self) -> bool {
        self.kind == TokenKind::Space
    }

    pub fn ident(&self) -> Option<&str> {
        (self.kind == TokenKind::Ident).then_some(self.text.as_str())
    }

    pub fn number(&self) -> Option<f64> {
        match self.value {
            TokenValue::Number(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_eof() {
            f.write_str("end of input")
        } else {
            write!(f, "`{}`", self.text)
        }
    }
}

/// What a rule does with the text it matched.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Emit a token of this kind and consume the text.
    Accept(TokenKind, TokenValue),
    /// Pretend the rule did not match; try the next one.
    Reject,
    /// Consume the text without emitting anything.
    Ignore,
    /// Consume nothing and restart matching at the same offset.
    Repeat,
}

impl Action {
    #[inline]
    pub fn accept(kind: TokenKind) -> Self {
        Action::Accept(kind, TokenValue::None)
    }
}

/// Mutable lexer state visible to rule actions.
#[derive(Clone, Debug)]
pub struct LexerState {
    stack: Vec<&'static str>,
    tags: HashSet<&'static str>,
}

impl Default for LexerState {
    fn default() -> Self {
        Self {
            stack: vec![MAIN],
            tags: HashSet::new(),
        }
    }
}

impl LexerState {
    #[inline]
    pub fn current(&self) -> &'static str {
        self.stack.last().copied().unwrap_or(MAIN)
    }

    pub fn push(&mut self, state: &'static str) {
        self.stack.push(state);
    }

    /// Leave the current state. The bottom state is never popped.
    pub fn pop(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn set_tag(&mut self, tag: &'static str) {
        self.tags.insert(tag);
    }

    pub fn clear_tag(&mut self, tag: &'static str) {
        self.tags.remove(tag);
    }

    #[inline]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

type RuleAction = Box<dyn Fn(&mut LexerState, &str) -> Action + Send + Sync>;

pub struct Rule {
    pattern: Regex,
    states: Vec<&'static str>,
    requires: Option<&'static str>,
    forbids: Option<&'static str>,
    action: RuleAction,
}

impl Rule {
    /// Restrict the rule to the given lexical states (default: `main`).
    pub fn in_states(&mut self, states: &[&'static str]) -> &mut Self {
        self.states = states.to_vec();
        self
    }

    /// Only fire while `tag` is set.
    pub fn when_tag(&mut self, tag: &'static str) -> &mut Self {
        self.requires = Some(tag);
        self
    }

    /// Only fire while `tag` is not set.
    pub fn unless_tag(&mut self, tag: &'static str) -> &mut Self {
        self.forbids = Some(tag);
        self
    }

    fn applies(&self, st: &LexerState) -> bool {
        self.states.contains(&st.current())
            && self.requires.is_none_or(|t| st.has_tag(t))
            && self.forbids.is_none_or(|t| !st.has_tag(t))
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("pattern", &self.pattern.as_str())
            .field("states", &self.states)
            .finish()
    }
}

/// Ordered list of regex rules. The first applicable rule that matches at
/// the current offset and does not reject wins.
#[derive(Debug, Default)]
pub struct Tokenizer {
    rules: Vec<Rule>,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. The pattern is anchored at the current offset.
    pub fn rule<F>(&mut self, pattern: &str, action: F) -> Result<&mut Rule, regex::Error>
    where
        F: Fn(&mut LexerState, &str) -> Action + Send + Sync + 'static,
    {
        let pattern = Regex::new(&format!("^(?:{pattern})"))?;
        self.rules.push(Rule {
            pattern,
            states: vec![MAIN],
            requires: None,
            forbids: None,
            action: Box::new(action),
        });
        let last = self.rules.len() - 1;
        Ok(&mut self.rules[last])
    }

    /// Cut `input` into tokens. The result always ends with an EOF token.
    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>, ParsingError> {
        let mut st = LexerState::default();
        let mut out = Vec::new();
        let mut pos = 0usize;
        let mut line = 1usize;
        let mut column = 1usize;
        let mut repeats = 0usize;

        'outer: while pos < input.len() {
            let rest = &input[pos..];
            for rule in &self.rules {
                if !rule.applies(&st) {
                    continue;
                }
                let Some(m) = rule.pattern.find(rest) else {
                    continue;
                };
                let text = m.as_str();
                match (rule.action)(&mut st, text) {
                    Action::Reject => continue,
                    Action::Repeat => {
                        repeats += 1;
                        if repeats > MAX_REPEATS {
                            break;
                        }
                        continue 'outer;
                    }
                    Action::Ignore if !text.is_empty() => {}
                    Action::Accept(kind, value) if !text.is_empty() => {
                        out.push(Token {
                            kind,
                            value,
                            text: text.to_string(),
                            pos,
                            line,
                            column,
                        });
                    }
                    // empty matches cannot make progress
                    _ => continue,
                }
                repeats = 0;
                for ch in text.chars() {
                    if ch == '\n' {
                        line += 1;
                        column = 1;
                    } else {
                        column += 1;
                    }
                }
                pos += text.len();
                continue 'outer;
            }
            let ch = rest.chars().next().unwrap_or(' ');
            return Err(ParsingError {
                message: format!("unexpected character `{ch}`"),
                offset: pos,
                line,
                column,
            });
        }

        out.push(Token {
            kind: TokenKind::Eof,
            value: TokenValue::None,
            text: String::new(),
            pos: input.len(),
            line,
            column,
        });
        Ok(out)
    }
}

/// Lexical state entered after `=` in a mask; ends at top-level separators.
pub const EXPR: &str = "expr";
/// Parenthesised group inside an expression.
pub const EXPR_GROUP: &str = "expr_group";

const MULTI_OPS: &str = r"<=|>=|==|!=|&&|\|\|";

fn number(_: &mut LexerState, text: &str) -> Action {
    match text.parse::<f64>() {
        Ok(n) => Action::Accept(TokenKind::Number, TokenValue::Number(n)),
        Err(_) => Action::Reject,
    }
}

fn boolean(_: &mut LexerState, text: &str) -> Action {
    Action::Accept(TokenKind::Bool, TokenValue::Bool(text == "true"))
}

fn ident(_: &mut LexerState, text: &str) -> Action {
    Action::Accept(TokenKind::Ident, TokenValue::Text(text.to_string()))
}

fn string(_: &mut LexerState, text: &str) -> Action {
    let inner = &text[1..text.len() - 1];
    Action::Accept(TokenKind::Str, TokenValue::Text(inner.to_string()))
}

fn punct(_: &mut LexerState, _: &str) -> Action {
    Action::accept(TokenKind::Punct)
}

fn space(_: &mut LexerState, _: &str) -> Action {
    Action::accept(TokenKind::Space)
}

/// Rules shared by the `main` state and both expression states.
fn add_atoms(t: &mut Tokenizer, states: &[&'static str]) -> Result<(), regex::Error> {
    t.rule(r"[0-9]+(?:\.[0-9]+)?", number)?.in_states(states);
    t.rule(r"(?:true|false)\b", boolean)?.in_states(states);
    t.rule(r"[A-Za-z_][A-Za-z0-9_]*", ident)?.in_states(states);
    t.rule(r#""[^"]*""#, string)?.in_states(states);
    Ok(())
}

/// Tokenizer shared by the pattern and mask grammars.
///
/// Whitespace is emitted as [`TokenKind::Space`] since it is the AND
/// operator of masks. After `=` the lexer switches to the arithmetic
/// sub-language; that state ends at whitespace, `,`, a bracket or `)`
/// outside of any parenthesis and the separator is re-lexed by the outer rules.
pub fn selector_tokenizer() -> Result<Tokenizer, regex::Error> {
    let mut t = Tokenizer::new();

    // main
    t.rule(r"\s+", space)?;
    add_atoms(&mut t, &[MAIN])?;
    t.rule("=", |st, _| {
        st.push(EXPR);
        Action::accept(TokenKind::Punct)
    })?;
    t.rule(r"[\[\]\(\)\{\},:;!%<>#@^*$.+\-/&|~?]", punct)?;

    // top level of an expression
    t.rule(r"[\s,\)\]\[]", |st, _| {
        st.pop();
        Action::Repeat
    })?
    .in_states(&[EXPR]);
    t.rule(r"\(", |st, _| {
        st.push(EXPR_GROUP);
        Action::accept(TokenKind::Punct)
    })?
    .in_states(&[EXPR, EXPR_GROUP]);

    // inside parentheses of an expression
    t.rule(r"\s+", space)?.in_states(&[EXPR_GROUP]);
    t.rule(r"\)", |st, _| {
        st.pop();
        Action::accept(TokenKind::Punct)
    })?
    .in_states(&[EXPR_GROUP]);

    add_atoms(&mut t, &[EXPR, EXPR_GROUP])?;
    t.rule(MULTI_OPS, punct)?.in_states(&[EXPR, EXPR_GROUP]);
    t.rule(r"[,+\-*/%^<>!]", punct)?.in_states(&[EXPR, EXPR_GROUP]);
    Ok(t)
}

/// Tokenizer for standalone arithmetic expressions.
pub fn expr_tokenizer() -> Result<Tokenizer, regex::Error> {
    let mut t = Tokenizer::new();
    t.rule(r"\s+", space)?;
    add_atoms(&mut t, &[MAIN])?;
    t.rule(MULTI_OPS, punct)?;
    t.rule(r"[(),+\-*/%^<>!]", punct)?;
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(toks: &[Token]) -> Vec<TokenKind> {
        toks.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn ends_with_eof() {
        let t = selector_tokenizer().unwrap();
        let toks = t.tokenize("").unwrap();
        assert_eq!(kinds(&toks), vec![TokenKind::Eof]);
        let toks = t.tokenize("stone").unwrap();
        assert_eq!(kinds(&toks), vec![TokenKind::Ident, TokenKind::Eof]);
    }

    #[test]
    fn percent_chain() {
        let t = selector_tokenizer().unwrap();
        let toks = t.tokenize("10%stone,dirt").unwrap();
        let texts: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["10", "%", "stone", ",", "dirt", ""]);
        assert_eq!(toks[0].number(), Some(10.0));
    }

    #[test]
    fn expression_state_ends_at_top_level_space() {
        let t = selector_tokenizer().unwrap();
        let toks = t.tokenize("=max(x, y)<=4 stone").unwrap();
        let texts: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["=", "max", "(", "x", ",", " ", "y", ")", "<=", "4", " ", "stone", ""]
        );
        assert_eq!(toks[10].kind, TokenKind::Space);
    }

    #[test]
    fn multi_char_ops_only_in_expressions() {
        let t = selector_tokenizer().unwrap();
        let toks = t.tokenize("<=").unwrap();
        assert!(toks[0].is_punct("<"));
        assert!(toks[1].is_punct("="));
    }

    #[test]
    fn error_reports_line_and_column() {
        let t = selector_tokenizer().unwrap();
        let err = t.tokenize("stone\n  `").unwrap_err();
        assert_eq!(err.offset, 8);
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 3);
    }

    #[test]
    fn ignore_and_tags() {
        let mut t = Tokenizer::new();
        t.rule(r"\s+", |_, _| Action::Ignore).unwrap();
        t.rule("!", |st, _| {
            st.set_tag("loud");
            Action::Ignore
        })
        .unwrap();
        t.rule("[a-z]+", |_, s| Action::Accept(TokenKind::Ident, TokenValue::Text(s.to_uppercase())))
            .unwrap()
            .when_tag("loud");
        t.rule("[a-z]+", ident).unwrap();
        let toks = t.tokenize("ab ! cd").unwrap();
        assert_eq!(toks[0].value, TokenValue::Text("ab".into()));
        assert_eq!(toks[1].value, TokenValue::Text("CD".into()));
        assert_eq!(toks[1].pos, 5);
    }

    #[test]
    fn reject_falls_through() {
        let mut t = Tokenizer::new();
        t.rule("[a-z]+", |_, s| if s == "kw" { Action::Reject } else { Action::accept(TokenKind::Ident) })
            .unwrap();
        t.rule("[a-z]+", |_, _| Action::accept(TokenKind::Punct)).unwrap();
        let toks = t.tokenize("kw").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Punct);
    }
}
