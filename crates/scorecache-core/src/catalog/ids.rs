//! Catalog id derivation for entities the upstream sends without an id.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Longest slug kept from a display name, in characters.
pub const MAX_SLUG_LEN: usize = 64;

const SEPARATOR: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Tournament,
    Club,
    Player,
}

impl EntityKind {
    /// Prefix for derived ids, keeping the three id spaces apart.
    pub fn prefix(&self) -> &'static str {
        match self {
            EntityKind::Tournament => "tournament",
            EntityKind::Club => "club",
            EntityKind::Player => "player",
        }
    }
}

/// Lower-case, strip diacritics, collapse every run of non-alphanumerics to
/// one separator, trim separators at both ends and cap the length.
pub fn slugify(name: &str) -> Option<String> {
    let mut slug = String::with_capacity(name.len());
    let mut len = 0;
    let mut pending_separator = false;

    let chars = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase);

    for c in chars {
        if !c.is_alphanumeric() {
            pending_separator = true;
            continue;
        }
        if pending_separator && len > 0 {
            if len + 1 >= MAX_SLUG_LEN {
                break;
            }
            slug.push(SEPARATOR);
            len += 1;
        }
        pending_separator = false;
        if len >= MAX_SLUG_LEN {
            break;
        }
        slug.push(c);
        len += 1;
    }

    if slug.is_empty() {
        None
    } else {
        Some(slug)
    }
}

/// Provider id when there is one, otherwise a kind-prefixed slug of the name.
/// `None` means the record cannot be identified and should be skipped.
pub fn derive_id(kind: EntityKind, provider_id: Option<&str>, name: Option<&str>) -> Option<String> {
    if let Some(id) = provider_id.map(str::trim).filter(|id| !id.is_empty()) {
        return Some(id.to_string());
    }
    let slug = slugify(name?)?;
    Some(format!("{}{}{}", kind.prefix(), SEPARATOR, slug))
}
