//! Fractional sort keys for blocks and links.
//!
//! Siblings (blocks on a page, links in a group) are ordered by a string key
//! over a fixed 62-symbol alphabet. Comparing two keys as plain strings gives
//! their display order, so moving one item only rewrites that item's key:
//!
//! ```text
//! A      ← existing
//! AU     ← inserted between A and B (no midpoint rank exists at position 0)
//! B      ← existing
//! ```
//!
//! ## Alphabet
//!
//! ```text
//! 0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz
//! ^ rank 0                         ^ rank 31 ("U")            ^ rank 61
//! ```
//!
//! The alphabet is ASCII-ordered, so byte comparison of two keys is the same
//! as comparing their ranks position by position.
//!
//! ## Limits
//!
//! No key sorts before `"0"` and nothing fits between `k` and `k + "0"`. Those
//! requests return [`SortKeyError::NoRoomBefore`] / [`SortKeyError::NoRoomBetween`]
//! instead of a key in the wrong place. Passing keys in the wrong order is
//! reported as [`SortKeyError::OutOfOrder`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The ordered key alphabet: `0-9 < A-Z < a-z`.
pub const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const MIN_RANK: usize = 0;
const MAX_RANK: usize = ALPHABET.len() - 1;
const MID_RANK: usize = ALPHABET.len() / 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SortKeyError {
    #[error("sort key must not be empty")]
    Empty,
    #[error("invalid character {ch:?} in sort key {key:?}")]
    InvalidChar { key: String, ch: char },
    #[error("sort keys out of order: {prev:?} must sort before {next:?}")]
    OutOfOrder { prev: String, next: String },
    #[error("no sort key exists before {0:?}")]
    NoRoomBefore(String),
    #[error("no sort key exists between {prev:?} and {next:?}")]
    NoRoomBetween { prev: String, next: String },
}

/// A validated ordering key.
///
/// Always non-empty and drawn from [`ALPHABET`]. `Ord` is plain string order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SortKey(String);

impl SortKey {
    /// The key handed to the very first item of an empty list.
    pub fn midpoint() -> Self {
        SortKey((ALPHABET[MID_RANK] as char).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_ranks(ranks: &[usize]) -> Self {
        SortKey(ranks.iter().map(|&r| ALPHABET[r] as char).collect())
    }

    fn ranks(&self) -> Vec<usize> {
        // Validated on construction, so every byte has a rank.
        self.0.bytes().map(|b| rank(b).unwrap_or(MIN_RANK)).collect()
    }
}

impl TryFrom<String> for SortKey {
    type Error = SortKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(SortKeyError::Empty);
        }
        if let Some(ch) = value.chars().find(|c| !c.is_ascii() || rank(*c as u8).is_none()) {
            return Err(SortKeyError::InvalidChar { key: value, ch });
        }
        Ok(SortKey(value))
    }
}

impl FromStr for SortKey {
    type Err = SortKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortKey::try_from(s.to_string())
    }
}

impl From<SortKey> for String {
    fn from(key: SortKey) -> Self {
        key.0
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn rank(b: u8) -> Option<usize> {
    match b {
        b'0'..=b'9' => Some((b - b'0') as usize),
        b'A'..=b'Z' => Some((b - b'A') as usize + 10),
        b'a'..=b'z' => Some((b - b'a') as usize + 36),
        _ => None,
    }
}

/// Generate a key that sorts strictly after `prev` and strictly before `next`.
///
/// - neither given → the midpoint key `"U"`
/// - only `next` → [`decrement`]
/// - only `prev` → [`increment`]
/// - both → per-position midpoint, with an exact bisection when averaging
///   ranks does not land strictly between the two keys
pub fn generate(prev: Option<&SortKey>, next: Option<&SortKey>) -> Result<SortKey, SortKeyError> {
    match (prev, next) {
        (None, None) => Ok(SortKey::midpoint()),
        (None, Some(next)) => {
            let key = decrement(next);
            if key < *next {
                Ok(key)
            } else {
                Err(SortKeyError::NoRoomBefore(next.to_string()))
            }
        }
        (Some(prev), None) => Ok(increment(prev)),
        (Some(prev), Some(next)) => {
            if prev >= next {
                return Err(SortKeyError::OutOfOrder {
                    prev: prev.to_string(),
                    next: next.to_string(),
                });
            }
            let key = midpoint(prev, next);
            if prev < &key && &key < next {
                return Ok(key);
            }
            bisect(&prev.ranks(), &next.ranks())
                .map(|ranks| SortKey::from_ranks(&ranks))
                .ok_or_else(|| SortKeyError::NoRoomBetween {
                    prev: prev.to_string(),
                    next: next.to_string(),
                })
        }
    }
}

/// The key immediately after `key`: bump the last non-maximum character, or
/// append the minimum character when every character is already maximum.
pub fn increment(key: &SortKey) -> SortKey {
    let mut ranks = key.ranks();
    match ranks.iter().rposition(|&r| r < MAX_RANK) {
        Some(i) => ranks[i] += 1,
        None => ranks.push(MIN_RANK),
    }
    SortKey::from_ranks(&ranks)
}

/// The key immediately before `key`: lower the last non-minimum character, or
/// prepend the minimum character when every character is already minimum.
///
/// The all-minimum case cannot produce a smaller key; [`generate`] rejects it.
pub fn decrement(key: &SortKey) -> SortKey {
    let mut ranks = key.ranks();
    match ranks.iter().rposition(|&r| r > MIN_RANK) {
        Some(i) => ranks[i] -= 1,
        None => ranks.insert(0, MIN_RANK),
    }
    SortKey::from_ranks(&ranks)
}

/// Per-position rank midpoint of two keys padded to equal length.
fn midpoint(prev: &SortKey, next: &SortKey) -> SortKey {
    let mut p = prev.ranks();
    let mut n = next.ranks();
    let len = p.len().max(n.len());
    p.resize(len, MIN_RANK);
    n.resize(len, MIN_RANK);

    let mid: Vec<usize> = p.iter().zip(&n).map(|(a, b)| (a + b) / 2).collect();
    if mid == p {
        // Adjacent at every position: extend prev instead of repeating it.
        let mut extended = prev.ranks();
        extended.push(MID_RANK);
        return SortKey::from_ranks(&extended);
    }
    SortKey::from_ranks(&mid)
}

/// Shortest rank sequence strictly between `a` and `b` in string order.
///
/// Returns `None` only when `b` is `a` followed by nothing but minimum
/// characters.
fn bisect(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let common = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let mut out = b[..common].to_vec();

    if common == a.len() {
        // a is a proper prefix of b: need a non-empty tail below b's tail.
        out.extend(below(&b[common..])?);
        return Some(out);
    }

    let (ra, rb) = (a[common], b[common]);
    if rb - ra > 1 {
        out.push((ra + rb) / 2);
    } else {
        out.push(ra);
        out.extend(after(&a[common + 1..]));
    }
    Some(out)
}

/// Non-empty sequence sorting after `tail` (unbounded above).
fn after(tail: &[usize]) -> Vec<usize> {
    match tail.first() {
        None => vec![MID_RANK],
        Some(&r) if r < MAX_RANK => vec![(r + MAX_RANK + 1) / 2],
        Some(&r) => {
            let mut out = vec![r];
            out.extend(after(&tail[1..]));
            out
        }
    }
}

/// Non-empty sequence sorting before `tail` (and after the empty string).
///
/// Never ends in the minimum rank, so the result can itself be bisected later.
fn below(tail: &[usize]) -> Option<Vec<usize>> {
    let (&first, rest) = tail.split_first()?;
    if first > MIN_RANK + 1 {
        return Some(vec![first / 2]);
    }
    if first == MIN_RANK + 1 {
        return Some(vec![MIN_RANK, MID_RANK]);
    }
    let mut out = vec![MIN_RANK];
    out.extend(below(rest)?);
    Some(out)
}

/// Fresh, strictly increasing keys for a list replaced wholesale.
///
/// Single characters by position (starting at rank 1, so a later insert
/// before the first item still has room) while they fit; longer lists get
/// fixed-width base-62 keys.
pub fn sequence(len: usize) -> Vec<SortKey> {
    if len < ALPHABET.len() {
        return (1..=len).map(|r| SortKey::from_ranks(&[r])).collect();
    }

    let mut width = 1;
    let mut capacity = ALPHABET.len();
    while capacity <= len {
        width += 1;
        capacity *= ALPHABET.len();
    }

    (1..=len)
        .map(|mut n| {
            let mut ranks = vec![MIN_RANK; width];
            for slot in ranks.iter_mut().rev() {
                *slot = n % ALPHABET.len();
                n /= ALPHABET.len();
            }
            SortKey::from_ranks(&ranks)
        })
        .collect()
}
