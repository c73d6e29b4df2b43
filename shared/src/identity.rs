//! Platform identity normalization.
//!
//! The same 64-bit account id can reach us as plain decimal, with leading
//! zeros or whitespace, as hex, or in the bracketed `[U:1:n]` / `STEAM_x:y:z`
//! account forms depending on which message produced it. Every comparison and
//! map key goes through [`PlayerId`], whose only constructor canonicalizes to
//! decimal, so two spellings of one account can never diverge.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest individual account id; account-relative forms are offset from it.
const INDIVIDUAL_ACCOUNT_BASE: u64 = 76_561_197_960_265_728;

/// Canonicalizes an identity string to decimal form.
///
/// Input that does not describe a numeric identity is returned trimmed but
/// otherwise unchanged, which keeps the function idempotent for every input.
pub fn normalize_id(raw: &str) -> String {
    let text = raw.trim();
    parse_numeric_id(text)
        .map(|id| id.to_string())
        .unwrap_or_else(|| text.to_string())
}

fn parse_numeric_id(text: &str) -> Option<u64> {
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16).ok();
    }

    if let Some(inner) = text.strip_prefix("[U:").and_then(|s| s.strip_suffix(']')) {
        let (_universe, account) = inner.split_once(':')?;
        let account: u64 = account.parse().ok()?;
        return INDIVIDUAL_ACCOUNT_BASE.checked_add(account);
    }

    if let Some(rest) = text.strip_prefix("STEAM_") {
        let mut parts = rest.split(':');
        let _universe = parts.next()?;
        let low_bit: u64 = parts.next()?.parse().ok()?;
        let high: u64 = parts.next()?.parse().ok()?;
        if parts.next().is_some() || low_bit > 1 {
            return None;
        }
        return high
            .checked_mul(2)?
            .checked_add(low_bit)?
            .checked_add(INDIVIDUAL_ACCOUNT_BASE);
    }

    let digits = text.strip_prefix('+').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// A normalized player identity.
///
/// Deliberately has no `Borrow<str>` impl: lookups must build a `PlayerId`
/// so that the raw text is normalized first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(raw: &str) -> Self {
        PlayerId(normalize_id(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty ids show up when a lenient parse found no token.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for PlayerId {
    fn from(raw: &str) -> Self {
        PlayerId::new(raw)
    }
}

impl From<String> for PlayerId {
    fn from(raw: String) -> Self {
        PlayerId::new(&raw)
    }
}

impl From<PlayerId> for String {
    fn from(id: PlayerId) -> Self {
        id.0
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        PlayerId(String::new())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
