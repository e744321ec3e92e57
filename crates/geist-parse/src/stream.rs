use crate::error::SyntaxError;
use crate::lexer::{Token, TokenKind};

/// Cursor over a token vector with nested transactions.
///
/// The vector always ends with an EOF token; reading past it keeps
/// returning that token.
#[derive(Clone, Debug)]
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
    marks: Vec<usize>,
}

impl TokenStream {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            let end = tokens.last().map(|t| t.end()).unwrap_or(0);
            tokens.push(Token {
                kind: TokenKind::Eof,
                value: crate::lexer::TokenValue::None,
                text: String::new(),
                pos: end,
                line: 0,
                column: 0,
            });
        }
        Self {
            tokens,
            pos: 0,
            marks: Vec::new(),
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    pub fn peek_at(&self, ahead: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + ahead).min(last)]
    }

    /// Consume and return the current token.
    pub fn next(&mut self) -> Token {
        let tok = self.peek().clone();
        if !tok.is_eof() {
            self.pos += 1;
        }
        tok
    }

    #[inline]
    pub fn at_eof(&self) -> bool {
        self.peek().is_eof()
    }

    /// Byte offset of the previously consumed token's end.
    pub fn last_end(&self) -> usize {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].end()
        }
    }

    pub fn skip_space(&mut self) {
        while self.peek().is_space() {
            self.pos += 1;
        }
    }

    /// Consume the punctuation `p` if it is next.
    pub fn eat(&mut self, p: &str) -> bool {
        if self.peek().is_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, p: &str) -> Result<Token, SyntaxError> {
        if self.peek().is_punct(p) {
            Ok(self.next())
        } else {
            let tok = self.peek();
            Err(SyntaxError::at(tok, format!("expected `{p}`, found {tok}")))
        }
    }

    pub fn begin(&mut self) {
        self.marks.push(self.pos);
    }

    pub fn commit(&mut self) {
        self.marks.pop();
    }

    pub fn rollback(&mut self) {
        if let Some(m) = self.marks.pop() {
            self.pos = m;
        }
    }

    /// Try each strategy from the current position. The successful one that
    /// consumed the most tokens wins; when all fail, the error of the one
    /// that got furthest is returned.
    pub fn alternatives<T>(
        &mut self,
        alts: &mut [&mut dyn FnMut(&mut TokenStream) -> Result<T, SyntaxError>],
    ) -> Result<T, SyntaxError> {
        let start = self.pos;
        let mut best_ok: Option<(usize, T)> = None;
        let mut best_err: Option<(usize, SyntaxError)> = None;
        for alt in alts.iter_mut() {
            self.begin();
            let res = (*alt)(self);
            let reached = self.pos;
            self.rollback();
            match res {
                Ok(v) => {
                    if best_ok.as_ref().is_none_or(|(p, _)| reached > *p) {
                        best_ok = Some((reached, v));
                    }
                }
                Err(e) => {
                    if best_err.as_ref().is_none_or(|(p, _)| reached > *p) {
                        best_err = Some((reached, e));
                    }
                }
            }
        }
        match (best_ok, best_err) {
            (Some((end, v)), _) => {
                self.pos = end;
                Ok(v)
            }
            (None, Some((_, e))) => Err(e),
            (None, None) => Err(SyntaxError::at(&self.tokens[start], "no alternatives")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::selector_tokenizer;

    fn stream(src: &str) -> TokenStream {
        TokenStream::new(selector_tokenizer().unwrap().tokenize(src).unwrap())
    }

    #[test]
    fn rollback_restores_position() {
        let mut ts = stream("a,b");
        ts.begin();
        ts.next();
        ts.next();
        ts.rollback();
        assert_eq!(ts.peek().text, "a");
        ts.begin();
        ts.next();
        ts.commit();
        assert!(ts.peek().is_punct(","));
    }

    #[test]
    fn never_reads_past_eof() {
        let mut ts = stream("a");
        ts.next();
        assert!(ts.next().is_eof());
        assert!(ts.next().is_eof());
    }

    #[test]
    fn alternatives_prefers_longest_success() {
        let mut ts = stream("a b c");
        let mut one = |s: &mut TokenStream| -> Result<usize, SyntaxError> {
            s.next();
            Ok(1)
        };
        let mut three = |s: &mut TokenStream| -> Result<usize, SyntaxError> {
            for _ in 0..3 {
                s.next();
            }
            Ok(3)
        };
        let mut fails = |s: &mut TokenStream| -> Result<usize, SyntaxError> {
            s.next();
            Err(SyntaxError::new("nope", 0, 1))
        };
        let mut alts: [&mut dyn FnMut(&mut TokenStream) -> Result<usize, SyntaxError>; 3] =
            [&mut one, &mut fails, &mut three];
        let got = ts.alternatives(&mut alts).unwrap();
        assert_eq!(got, 3);
        assert_eq!(ts.position(), 3);
    }

    #[test]
    fn alternatives_reports_furthest_error() {
        let mut ts = stream("a b");
        let mut short = |_: &mut TokenStream| -> Result<(), SyntaxError> {
            Err(SyntaxError::new("short", 0, 1))
        };
        let mut long = |s: &mut TokenStream| -> Result<(), SyntaxError> {
            s.next();
            s.next();
            Err(SyntaxError::new("long", 2, 3))
        };
        let mut alts: [&mut dyn FnMut(&mut TokenStream) -> Result<(), SyntaxError>; 2] =
            [&mut short, &mut long];
        let err = ts.alternatives(&mut alts).unwrap_err();
        assert_eq!(err.message, "long");
        assert_eq!(ts.position(), 0);
    }
}
