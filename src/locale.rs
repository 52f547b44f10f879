// ── User locale ───────────────────────────────────────────────────────────────
//
// The current user's locale as a BCP-47 style tag (`en-US`, `sr-Latn-RS`).
// POSIX reports names like `en_US.UTF-8@euro`; those are normalised here.

use crate::error::{self, ErrorCode, Record, Result};
use crate::platform::{Locale, LocaleSys};

/// The user's locale tag.
///
/// Fails with `NOT_CONFIGURED` when the OS reports only the neutral
/// `C` / `POSIX` locale.
pub fn current() -> Result<String> {
    let raw = Locale::current().record()?;
    normalize(&raw).ok_or_else(|| {
        error::raise(ErrorCode::NotConfigured, format!("no user locale configured (`{raw}`)"))
    })
}

/// Turn an OS locale name into a tag.  `None` for the neutral locale.
pub fn normalize(raw: &str) -> Option<String> {
    let name = raw.split(['.', '@']).next().unwrap_or_default().trim();
    if name.is_empty() || name.eq_ignore_ascii_case("C") || name.eq_ignore_ascii_case("POSIX") {
        return None;
    }
    Some(name.replace('_', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_names_become_tags() {
        assert_eq!(normalize("en_US.UTF-8").as_deref(), Some("en-US"));
        assert_eq!(normalize("de_DE@euro").as_deref(), Some("de-DE"));
        assert_eq!(normalize("sr_RS.UTF-8@latin").as_deref(), Some("sr-RS"));
        assert_eq!(normalize("fr").as_deref(), Some("fr"));
    }

    #[test]
    fn windows_tags_pass_through() {
        assert_eq!(normalize("en-GB").as_deref(), Some("en-GB"));
        assert_eq!(normalize("zh-Hans-CN").as_deref(), Some("zh-Hans-CN"));
    }

    #[test]
    fn neutral_locale_is_none() {
        assert_eq!(normalize("C"), None);
        assert_eq!(normalize("C.UTF-8"), None);
        assert_eq!(normalize("POSIX"), None);
        assert_eq!(normalize(""), None);
    }

    #[cfg(not(oskit_backend = "fallback"))]
    #[test]
    fn current_is_a_tag_or_not_configured() {
        match current() {
            Ok(tag) => {
                assert!(!tag.is_empty());
                assert!(!tag.contains(['_', '.', '@']), "not normalised: {tag}");
            }
            Err(e) => assert_eq!(e.code, ErrorCode::NotConfigured),
        }
        error::clear();
    }
}
