//! Multi-stream selector grammar.
//!
//! Callers address a set of streams with one string: individual stream IDs
//! joined by `+` (`main+depth+gll`). A parallel position string carries the
//! per-stream start tokens, joined by `+` or a space; when fewer positions
//! than streams are given, the positions cycle — so a single `$` applies
//! "start from now" to every stream.

use crate::entry::Position;
use crate::error::{Error, Result};

/// Parse a `+`-joined stream set and its (cyclically zipped) position string.
///
/// ```
/// use streamvault_core::{parse_selector, Position};
///
/// let sel = parse_selector("main+depth", "$").unwrap();
/// assert_eq!(sel.len(), 2);
/// assert_eq!(sel[0], ("main".to_string(), Position::Now));
/// assert_eq!(sel[1], ("depth".to_string(), Position::Now));
/// ```
pub fn parse_selector(streams: &str, positions: &str) -> Result<Vec<(String, Position)>> {
    let ids: Vec<&str> = streams.split('+').collect();
    if ids.iter().any(|s| s.is_empty()) {
        return Err(Error::InvalidSelector(format!(
            "empty stream ID in {streams:?}"
        )));
    }

    let tokens: Vec<Position> = positions
        .split(['+', ' '])
        .map(|t| t.parse())
        .collect::<Result<_>>()?;
    if tokens.is_empty() {
        return Err(Error::InvalidSelector("no position tokens".into()));
    }

    Ok(ids
        .iter()
        .zip(tokens.iter().cycle())
        .map(|(sid, pos)| (sid.to_string(), *pos))
        .collect())
}

/// Validate a single stream ID for use in a selector: non-empty and free of
/// the `+` separator.
pub fn validate_stream_id(sid: &str) -> Result<()> {
    if sid.is_empty() || sid.contains('+') {
        return Err(Error::InvalidSelector(format!("invalid stream ID {sid:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryId;

    #[test]
    fn one_position_applies_to_all() {
        let sel = parse_selector("a+b+c", "$").unwrap();
        assert!(sel.iter().all(|(_, p)| *p == Position::Now));
        assert_eq!(sel.iter().map(|(s, _)| s.as_str()).collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[test]
    fn positions_cycle_when_fewer_than_streams() {
        let sel = parse_selector("a+b+c", "0-0 $").unwrap();
        assert_eq!(sel[0].1, Position::At(EntryId::new(0, 0)));
        assert_eq!(sel[1].1, Position::Now);
        assert_eq!(sel[2].1, Position::At(EntryId::new(0, 0)));
    }

    #[test]
    fn space_and_plus_both_separate_positions() {
        let a = parse_selector("x+y", "$+*").unwrap();
        let b = parse_selector("x+y", "$ *").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_stream_id_rejected() {
        assert!(parse_selector("a++b", "$").is_err());
        assert!(parse_selector("", "$").is_err());
    }
}
