//! Command-argument entry points: parse one argument of a tokenized
//! command line and report failures against that argument.

use geist_blocks::BlockRegistry;

use crate::error::{ArgError, Result};
use crate::mask::Mask;
use crate::pattern::Pattern;

/// Something buildable from a single command argument.
pub trait FromArg: Sized {
    /// Shown when the argument is missing.
    const WHAT: &'static str;

    fn from_arg(src: &str, registry: &BlockRegistry) -> Result<Self>;
}

impl FromArg for Pattern {
    const WHAT: &'static str = "a pattern";

    fn from_arg(src: &str, registry: &BlockRegistry) -> Result<Self> {
        Pattern::parse(src, registry)
    }
}

impl FromArg for Mask {
    const WHAT: &'static str = "a mask";

    fn from_arg(src: &str, registry: &BlockRegistry) -> Result<Self> {
        Mask::parse(src, registry)
    }
}

/// Parse `args[idx]`, returning the value and the index of the next
/// unread argument.
pub fn parse_args<T: FromArg>(
    args: &[&str],
    idx: usize,
    registry: &BlockRegistry,
) -> std::result::Result<(T, usize), ArgError> {
    let src = args.get(idx).ok_or_else(|| ArgError::missing(idx, T::WHAT))?;
    let value = T::from_arg(src, registry).map_err(|e| ArgError::from_parse(idx, e))?;
    Ok((value, idx + 1))
}

impl Pattern {
    pub fn parse_args(
        args: &[&str],
        idx: usize,
        registry: &BlockRegistry,
    ) -> std::result::Result<(Pattern, usize), ArgError> {
        parse_args(args, idx, registry)
    }
}

impl Mask {
    pub fn parse_args(
        args: &[&str],
        idx: usize,
        registry: &BlockRegistry,
    ) -> std::result::Result<(Mask, usize), ArgError> {
        parse_args(args, idx, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::tests::registry;

    #[test]
    fn consumes_one_argument() {
        let reg = registry();
        let args = ["set", "stone,dirt", "!air"];
        let (p, next) = Pattern::parse_args(&args, 1, &reg).unwrap();
        assert_eq!(p.to_string(), "stone,dirt");
        let (m, next) = Mask::parse_args(&args, next, &reg).unwrap();
        assert_eq!(m.to_string(), "!air");
        assert_eq!(next, 3);
    }

    #[test]
    fn errors_carry_the_argument_index() {
        let reg = registry();
        let args = ["set", "stone,(dirt"];
        let e = Pattern::parse_args(&args, 1, &reg).unwrap_err();
        assert!(e.is_syntax_error());
        assert_eq!(e.idx, 1);
        assert_eq!(e.start, Some(11));

        let e = Pattern::parse_args(&["stone[foo=bar]"], 0, &reg).unwrap_err();
        assert!(!e.is_syntax_error());
        assert!(e.message.contains("foo"));

        let e = Mask::parse_args(&args, 2, &reg).unwrap_err();
        assert_eq!(e.idx, 2);
        assert!(e.is_syntax_error());
    }
}
