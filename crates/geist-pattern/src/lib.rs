//! Pattern and mask languages: parsers, node trees and their evaluation
//! against a block world.
#![forbid(unsafe_code)]

pub mod args;
pub mod context;
pub mod error;
pub mod gradient;
pub mod json;
mod literal;
pub mod mask;
pub mod pattern;

pub use args::{FromArg, parse_args};
pub use context::EvalContext;
pub use error::{ArgError, ParseError, Result};
pub use gradient::{Gradient, GradientConfig, GradientKind, GradientRegistry};
pub use json::NodeJson;
pub use mask::{Mask, MaskNode};
pub use pattern::{Pattern, PatternNode, Weighted};
