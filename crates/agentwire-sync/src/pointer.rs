//! RFC 6901 JSON Pointers.

use std::fmt;

use crate::SyncError;

/// A parsed JSON Pointer.
///
/// The empty pointer (`""`) addresses the whole document. Tokens are stored
/// unescaped; `Display` re-escapes them, so parse and print round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    tokens: Vec<String>,
}

impl Pointer {
    /// Parse a pointer from its string form.
    pub fn parse(input: &str) -> Result<Self, SyncError> {
        if input.is_empty() {
            return Ok(Self { tokens: Vec::new() });
        }
        if !input.starts_with('/') {
            return Err(SyncError::PointerSyntax {
                pointer: input.to_string(),
            });
        }
        let tokens = input[1..]
            .split('/')
            .map(|token| unescape(token, input))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tokens })
    }

    /// Whether this pointer addresses the document root.
    pub fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Unescaped reference tokens, in order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Split into parent tokens and the final token. `None` for the root.
    pub fn split_last(&self) -> Option<(&[String], &str)> {
        let (last, parents) = self.tokens.split_last()?;
        Some((parents, last))
    }
}

fn unescape(token: &str, pointer: &str) -> Result<String, SyncError> {
    if !token.contains('~') {
        return Ok(token.to_string());
    }
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => {
                return Err(SyncError::PointerSyntax {
                    pointer: pointer.to_string(),
                })
            }
        }
    }
    Ok(out)
}

fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "/{}", escape(token))?;
        }
        Ok(())
    }
}

/// Interpret a reference token as an array index.
///
/// RFC 6901 forbids leading zeros, so `"01"` is rejected.
pub(crate) fn array_index(token: &str, pointer: &Pointer) -> Result<usize, SyncError> {
    let valid = !token.is_empty()
        && token.bytes().all(|b| b.is_ascii_digit())
        && (token == "0" || !token.starts_with('0'));
    if !valid {
        return Err(SyncError::PointerSyntax {
            pointer: pointer.to_string(),
        });
    }
    token.parse().map_err(|_| SyncError::PointerSyntax {
        pointer: pointer.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pointer_is_root() {
        let ptr = Pointer::parse("").unwrap();
        assert!(ptr.is_root());
        assert_eq!(ptr.to_string(), "");
    }

    #[test]
    fn tokens_are_unescaped() {
        let ptr = Pointer::parse("/a~1b/m~0n").unwrap();
        assert_eq!(ptr.tokens(), ["a/b", "m~n"]);
        assert_eq!(ptr.to_string(), "/a~1b/m~0n");
    }

    #[test]
    fn missing_leading_slash_is_rejected() {
        let err = Pointer::parse("a/b").unwrap_err();
        assert!(matches!(err, SyncError::PointerSyntax { .. }));
    }

    #[test]
    fn dangling_tilde_is_rejected() {
        assert!(Pointer::parse("/a~").is_err());
        assert!(Pointer::parse("/a~2b").is_err());
    }

    #[test]
    fn empty_token_is_a_valid_key() {
        // "/" addresses the "" key of the root object.
        let ptr = Pointer::parse("/").unwrap();
        assert_eq!(ptr.tokens(), [""]);
    }

    #[test]
    fn array_index_rejects_leading_zeros() {
        let ptr = Pointer::parse("/arr/01").unwrap();
        assert!(array_index("01", &ptr).is_err());
        assert_eq!(array_index("0", &ptr).unwrap(), 0);
        assert_eq!(array_index("12", &ptr).unwrap(), 12);
    }
}
