use bytes::Bytes;
use thiserror::Error;

///
/// The glob subset accepted by KEYS and PSUBSCRIBE.
///
/// Only four shapes exist beyond an exact literal: `*`, `prefix*`,
/// `*suffix` and `*infix*`. Anything smelling of the full glob grammar
/// (`?`, `[`, `^`, backslash escapes, an inner `*`) is rejected up front
/// so the caller can fail the command instead of silently mis-matching.
///

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported pattern '{0}'")]
pub struct PatternError(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    MatchAll,
    Exact(Bytes),
    Prefix(Bytes),
    Suffix(Bytes),
    Infix(Bytes),
}

impl Pattern {
    pub fn parse(spec: &[u8]) -> Result<Pattern, PatternError> {
        let unsupported = || PatternError(String::from_utf8_lossy(spec).into_owned());
        if spec.iter().any(|b| matches!(b, b'?' | b'[' | b'^' | b'\\')) {
            return Err(unsupported());
        }
        let leading = spec.first() == Some(&b'*');
        let trailing = spec.len() > 1 && spec.last() == Some(&b'*');
        let inner_start = if leading { 1 } else { 0 };
        let inner_end = if trailing { spec.len() - 1 } else { spec.len() };
        let inner = &spec[inner_start..inner_end];
        if inner.contains(&b'*') {
            return Err(unsupported());
        }
        let inner = Bytes::copy_from_slice(inner);
        Ok(match (leading, trailing) {
            _ if spec == b"*" => Pattern::MatchAll,
            (false, false) => Pattern::Exact(inner),
            (false, true) => Pattern::Prefix(inner),
            (true, false) => Pattern::Suffix(inner),
            (true, true) => Pattern::Infix(inner),
        })
    }

    /// Byte-exact match; no case folding, no locale.
    pub fn matches(&self, key: &[u8]) -> bool {
        match self {
            Pattern::MatchAll => true,
            Pattern::Exact(lit) => key == lit,
            Pattern::Prefix(p) => key.starts_with(p),
            Pattern::Suffix(s) => key.ends_with(s),
            Pattern::Infix(i) => {
                if i.is_empty() {
                    return true;
                }
                key.len() >= i.len() && key.windows(i.len()).any(|w| w == &i[..])
            }
        }
    }
}
