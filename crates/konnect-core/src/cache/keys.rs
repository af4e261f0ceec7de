//! Cache key scheme and logout purge predicates.
//!
//! Data keys share the `kn_cache` prefix so a purge can enumerate them by
//! pattern without a registry. Session and provider-token keys live outside
//! that prefix and are matched by their own predicates.

/// Prefix shared by every data cache key. Also matches legacy spellings
/// such as `kn_cached_sessions` left behind by older releases.
pub const DATA_PREFIX: &str = "kn_cache";

/// Key holding the persisted authentication/session state.
pub const SESSION_KEY: &str = "conference_auth";

/// Key holding derived info about the current attendee (display name,
/// badge), written at login for fast startup rendering.
pub const ATTENDEE_INFO_KEY: &str = "conference_attendee_info";

/// Provider session tokens are written by the backend SDK under a key that
/// embeds the project ref, e.g. `sb-fjkqhrzkkwawvzpxqdrv-auth-token`.
const PROVIDER_TOKEN_PREFIX: &str = "sb-";
const PROVIDER_TOKEN_SUFFIX: &str = "-auth-token";

/// Build a data cache key for a collection name.
pub fn data_key(name: &str) -> String {
    format!("{DATA_PREFIX}_{name}")
}

/// Does this key hold a provider-issued session token?
///
/// The project ref in the middle is unpredictable and changes when the
/// backend project changes, so the match is prefix + suffix, never an
/// exact list.
pub fn is_provider_token_key(key: &str) -> bool {
    key.len() > PROVIDER_TOKEN_PREFIX.len() + PROVIDER_TOKEN_SUFFIX.len()
        && key.starts_with(PROVIDER_TOKEN_PREFIX)
        && key.ends_with(PROVIDER_TOKEN_SUFFIX)
}

/// Must this key be removed by the logout purge?
///
/// Covers the data prefix, the session key, derived current-user info, and
/// any provider token. Everything else in the store is left untouched.
pub fn is_purged_on_logout(key: &str) -> bool {
    key.starts_with(DATA_PREFIX)
        || key == SESSION_KEY
        || key == ATTENDEE_INFO_KEY
        || is_provider_token_key(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_token_predicate_across_project_refs() {
        for project_ref in ["abcd1234", "fjkqhrzkkwawvzpxqdrv", "x"] {
            let key = format!("sb-{project_ref}-auth-token");
            assert!(is_provider_token_key(&key), "{key}");
        }

        assert!(!is_provider_token_key("sb--auth-token-archive"));
        assert!(!is_provider_token_key("sb-auth-token")); // no embedded ref
        assert!(!is_provider_token_key("prefix-sb-x-auth-token-suffix"));
        assert!(!is_provider_token_key("user_preferences"));
    }

    #[test]
    fn test_purge_predicate_covers_all_owned_keys() {
        assert!(is_purged_on_logout("kn_cache_attendees"));
        assert!(is_purged_on_logout("kn_cached_sessions")); // legacy spelling
        assert!(is_purged_on_logout(SESSION_KEY));
        assert!(is_purged_on_logout(ATTENDEE_INFO_KEY));
        assert!(is_purged_on_logout("sb-someproject-auth-token"));

        assert!(!is_purged_on_logout("user_preferences"));
        assert!(!is_purged_on_logout("theme"));
    }

    #[test]
    fn test_data_key_format() {
        assert_eq!(data_key("attendees"), "kn_cache_attendees");
    }
}
