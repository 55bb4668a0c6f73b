use std::fmt;
use std::sync::Arc;

/// Stable key for a spatial unit across datasets.
/// Keeps the canonicalized id text but avoids repeated owned Strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(Arc<str>);

impl UnitId {
    /// Build an id from raw input text, canonicalizing it first.
    ///
    /// Every id must pass through this constructor before any join or merge;
    /// datasets disagree on the textual form of dotted numeric ids (census
    /// tract uids arrive as both "9330020.01" and "9330020.0100").
    pub fn new(raw: &str) -> Self {
        Self(Arc::from(normalize_unit_id(raw).as_str()))
    }

    /// The canonical id text.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Canonicalize a unit id: trim whitespace, and for dotted numeric ids strip
/// trailing zeros from the fractional part ("9330020.0100" -> "9330020.01",
/// "535.00" -> "535.0"). Idempotent: normalizing a normalized id is a no-op.
pub fn normalize_unit_id(raw: &str) -> String {
    let s = raw.trim();
    match s.split_once('.') {
        Some((left, right)) => {
            let trimmed = right.trim_end_matches('0');
            let right = if trimmed.is_empty() { "0" } else { trimmed };
            format!("{left}.{right}")
        }
        None => s.to_string(),
    }
}
