//! Private utility module for working with UIDs and AE titles

use std::borrow::Cow;

/// Strip trailing padding from a UID.
///
/// UIDs on the wire may carry a trailing NUL byte to reach an even length.
pub(crate) fn trim_uid(uid: Cow<str>) -> Cow<str> {
    if uid.ends_with('\0') || uid.ends_with(' ') {
        Cow::Owned(
            uid.trim_end_matches(|c: char| c.is_whitespace() || c == '\0')
                .to_string(),
        )
    } else {
        uid
    }
}

/// Compare two UIDs for equality, ignoring trailing padding.
pub(crate) fn uid_equal(a: &str, b: &str) -> bool {
    trim_uid(Cow::from(a)) == trim_uid(Cow::from(b))
}

/// Compare two application entity titles,
/// ignoring trailing spaces as mandated by the standard.
pub(crate) fn ae_title_equal(a: &str, b: &str) -> bool {
    a.trim_end_matches(' ') == b.trim_end_matches(' ')
}
