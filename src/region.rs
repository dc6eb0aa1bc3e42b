//! Region-name normalization.
//!
//! Regions are stored and compared as standard proper names ("United States",
//! "European Union"). Normalizing an already-normalized name returns it
//! unchanged.

/// Region used when a query does not name one.
pub const DEFAULT_REGION: &str = "United States";

const ALIASES: &[(&str, &str)] = &[
    ("us", "United States"),
    ("u.s.", "United States"),
    ("u.s", "United States"),
    ("usa", "United States"),
    ("u.s.a.", "United States"),
    ("america", "United States"),
    ("united states of america", "United States"),
    ("the united states", "United States"),
    ("eu", "European Union"),
    ("eurozone", "European Union"),
    ("euro zone", "European Union"),
    ("euro area", "European Union"),
    ("europe", "European Union"),
    ("uk", "United Kingdom"),
    ("u.k.", "United Kingdom"),
    ("britain", "United Kingdom"),
    ("great britain", "United Kingdom"),
    ("england", "United Kingdom"),
    ("ca", "Canada"),
    ("jp", "Japan"),
    ("cn", "China"),
    ("prc", "China"),
    ("de", "Germany"),
    ("fr", "France"),
    ("au", "Australia"),
    ("mx", "Mexico"),
    ("in", "India"),
    ("br", "Brazil"),
    ("kr", "South Korea"),
    ("korea", "South Korea"),
];

/// Normalize a free-form region to its standard proper name.
///
/// Matching is case-insensitive and ignores surrounding whitespace. Names
/// without a known alias are returned trimmed; blank input yields
/// [`DEFAULT_REGION`].
pub fn normalize_region(region: &str) -> String {
    let trimmed = region.trim();
    if trimmed.is_empty() {
        return DEFAULT_REGION.to_string();
    }

    let lower = trimmed.to_lowercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}
