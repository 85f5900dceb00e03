//! Text splitter for size-limited attributes
//!
//! The infrastructure agent rejects attribute values above 4095 bytes, so long
//! descriptions are shipped as several numbered parts.

/// Hard per-attribute byte limit
pub const NRDB_LIMIT: usize = 4095;

/// Maximum number of `summary.part[N]` attributes per description
pub const SPLIT_MAX_COLS: usize = 16;

/// Longest UTF-8 encoded character
const MAX_CHAR_WIDTH: usize = 4;

/// Split `input` into parts of at most `limit` bytes
///
/// Cuts never land inside a multi-byte character. When `limit` is narrower
/// than the character at the cut, that part holds the whole character and
/// exceeds `limit`. A `limit` of zero or less returns the whole input; an
/// empty input yields no parts.
pub fn limit_split(input: &str, limit: isize) -> Vec<&str> {
    if limit <= 0 {
        return if input.is_empty() { Vec::new() } else { vec![input] };
    }
    let limit = limit as usize;

    let mut parts = Vec::with_capacity(input.len() / limit + 1);
    let mut rest = input;
    while rest.len() > limit {
        let cut = char_boundary_before(rest, limit);
        let (head, tail) = rest.split_at(cut);
        parts.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        parts.push(rest);
    }
    parts
}

/// Walk back from `at` to the nearest character start
///
/// A limit smaller than the character at the cut would produce an empty part,
/// so in that case the whole character is taken instead.
fn char_boundary_before(s: &str, at: usize) -> usize {
    let floor = at.saturating_sub(MAX_CHAR_WIDTH);
    let mut cut = at;
    while cut > floor && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    if cut > 0 && s.is_char_boundary(cut) {
        return cut;
    }
    // Character wider than the limit: take it whole.
    let mut end = at;
    while !s.is_char_boundary(end) {
        end += 1;
    }
    end
}
