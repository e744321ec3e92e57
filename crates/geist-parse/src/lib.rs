//! Rule-based tokenizer and the operator-precedence reducer shared by the
//! pattern, mask and arithmetic grammars.
#![forbid(unsafe_code)]

pub mod error;
pub mod expr;
pub mod grammar;
pub mod lexer;
pub mod stream;

pub use error::{ParsingError, SyntaxError};
pub use expr::{Expr, Vars};
pub use grammar::{PendingOp, Spanned, finish, process_ops};
pub use lexer::{Action, LexerState, Token, TokenKind, TokenValue, Tokenizer};
pub use stream::TokenStream;
