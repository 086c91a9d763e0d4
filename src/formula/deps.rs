//! Lexical dependency extraction.
//!
//! Walks the token stream instead of the tree so templates can be scanned
//! cheaply at load time. Function names and string literals are skipped,
//! time offsets are stripped to the base code and every namespaced
//! reference is left out of the dependency set: those are graph leaves.

use super::ast::{Namespace, Reference};
use super::lexer::{tokenize, Token, TokenKind};
use super::ParseError;
use std::collections::BTreeSet;

/// Every distinct reference a formula reads, namespaced ones included.
pub fn extract_references(formula: &str) -> Result<BTreeSet<Reference>, ParseError> {
    let tokens = tokenize(formula)?;
    let mut refs = BTreeSet::new();
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i].kind {
            TokenKind::Namespace(prefix) => {
                let Some(Token { kind: TokenKind::Ident(code), .. }) = tokens.get(i + 1) else {
                    let at = tokens.get(i + 1).map_or(formula.len(), |t| t.pos);
                    return Err(ParseError::new(format!("expected identifier after '{}:'", prefix), at));
                };
                let (offset, next) = scan_offset(&tokens, i + 2, formula.len())?;
                refs.insert(Reference {
                    namespace: Some(Namespace::from_prefix(prefix)),
                    code: code.clone(),
                    offset,
                });
                i = next;
            }
            TokenKind::Ident(code) => {
                if matches!(tokens.get(i + 1).map(|t| &t.kind), Some(TokenKind::LParen)) {
                    // Function name.
                    i += 1;
                    continue;
                }
                let (offset, next) = scan_offset(&tokens, i + 1, formula.len())?;
                refs.insert(Reference::lagged(code.clone(), offset));
                i = next;
            }
            _ => i += 1,
        }
    }
    Ok(refs)
}

/// Codes of the same template a formula reads, offsets stripped.
pub fn extract_dependencies(formula: &str) -> Result<BTreeSet<String>, ParseError> {
    Ok(extract_references(formula)?
        .into_iter()
        .filter(Reference::is_unqualified)
        .map(|r| r.code)
        .collect())
}

/// Reads an optional `[t±n]` suffix starting at `start`. Returns the offset
/// and the index of the first token after the suffix.
fn scan_offset(tokens: &[Token], start: usize, end: usize) -> Result<(i32, usize), ParseError> {
    let kind_at = |i: usize| tokens.get(i).map(|t| &t.kind);
    let pos_at = |i: usize| tokens.get(i).map_or(end, |t| t.pos);

    if kind_at(start) != Some(&TokenKind::LBracket) {
        return Ok((0, start));
    }
    match kind_at(start + 1) {
        Some(TokenKind::Ident(t)) if t.eq_ignore_ascii_case("t") => {}
        _ => return Err(ParseError::new("time reference must start with 't'", pos_at(start + 1))),
    }
    let sign = match kind_at(start + 2) {
        Some(TokenKind::RBracket) => return Ok((0, start + 3)),
        Some(TokenKind::Minus) => -1,
        Some(TokenKind::Plus) => 1,
        _ => return Err(ParseError::new("expected ']' to close time reference", pos_at(start + 2))),
    };
    let magnitude = match kind_at(start + 3) {
        Some(TokenKind::Number(n)) if n.fract() == 0.0 && *n <= i32::MAX as f64 => *n as i32,
        _ => {
            return Err(ParseError::new(
                "expected integer offset in time reference",
                pos_at(start + 3),
            ))
        }
    };
    if kind_at(start + 4) != Some(&TokenKind::RBracket) {
        return Err(ParseError::new("expected ']' to close time reference", pos_at(start + 4)));
    }
    Ok((sign * magnitude, start + 5))
}
