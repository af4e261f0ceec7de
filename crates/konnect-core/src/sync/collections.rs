//! The entity collections the orchestrator keeps warm.

use serde_json::Value;

// Per-collection TTLs. Staleness is a refresh hint, not an eviction, so
// these only control how eagerly the read path revalidates.

/// Roster changes rarely once the conference starts.
const ATTENDEES_TTL_MS: u64 = 60 * 60 * 1000;
/// Agenda shifts during the day (room changes, overruns).
const SESSIONS_TTL_MS: u64 = 15 * 60 * 1000;
/// Seating is fixed per event but re-checked hourly.
const SEATING_TTL_MS: u64 = 60 * 60 * 1000;
/// Sponsors are effectively static.
const SPONSORS_TTL_MS: u64 = 24 * 60 * 60 * 1000;
/// Announcements are the most time-sensitive collection.
const ANNOUNCEMENTS_TTL_MS: u64 = 5 * 60 * 1000;
/// The attendee's own profile.
const PROFILE_TTL_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Attendees,
    Sessions,
    Seating,
    Sponsors,
    Announcements,
    Profile,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Attendees,
        Collection::Sessions,
        Collection::Seating,
        Collection::Sponsors,
        Collection::Announcements,
        Collection::Profile,
    ];

    /// Backend collection name.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Collection::Attendees => "attendees",
            Collection::Sessions => "agenda_sessions",
            Collection::Seating => "seating_assignments",
            Collection::Sponsors => "sponsors",
            Collection::Announcements => "announcements",
            Collection::Profile => "attendee_profiles",
        }
    }

    /// Cache key the collection is stored under.
    pub fn cache_key(&self) -> &'static str {
        match self {
            Collection::Attendees => "kn_cache_attendees",
            Collection::Sessions => "kn_cache_sessions",
            Collection::Seating => "kn_cache_seating",
            Collection::Sponsors => "kn_cache_sponsors",
            Collection::Announcements => "kn_cache_announcements",
            Collection::Profile => "kn_cache_profile",
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        match self {
            Collection::Attendees => ATTENDEES_TTL_MS,
            Collection::Sessions => SESSIONS_TTL_MS,
            Collection::Seating => SEATING_TTL_MS,
            Collection::Sponsors => SPONSORS_TTL_MS,
            Collection::Announcements => ANNOUNCEMENTS_TTL_MS,
            Collection::Profile => PROFILE_TTL_MS,
        }
    }

    /// Fields that must never be persisted client-side, even when the
    /// backend includes them for elevated viewers.
    fn secret_fields(&self) -> &'static [&'static str] {
        match self {
            Collection::Attendees => &["accessCode", "qrToken"],
            Collection::Profile => &["accessCode"],
            _ => &[],
        }
    }

    /// Strip non-persistable fields from fetched rows, in place.
    pub fn sanitize_rows(&self, rows: &mut [Value]) {
        let fields = self.secret_fields();
        if fields.is_empty() {
            return;
        }
        for row in rows.iter_mut() {
            if let Some(obj) = row.as_object_mut() {
                for field in fields {
                    obj.remove(*field);
                }
            }
        }
    }
}
