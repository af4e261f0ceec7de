use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgendaSession {
    pub id: String,
    pub title: String,
    pub track: Option<String>,
    pub room: Option<String>,
    #[serde(rename = "startsAt")]
    pub starts_at: DateTime<Utc>,
    #[serde(rename = "endsAt")]
    pub ends_at: DateTime<Utc>,
    #[serde(rename = "speakerNames", default)]
    pub speaker_names: Vec<String>,
}

impl AgendaSession {
    /// Is the session running at `now`? Start inclusive, end exclusive, so
    /// back-to-back sessions never both report live.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }

    pub fn is_upcoming_at(&self, now: DateTime<Utc>) -> bool {
        self.starts_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(start_offset_min: i64, len_min: i64) -> AgendaSession {
        let starts_at = Utc::now() + Duration::minutes(start_offset_min);
        AgendaSession {
            id: "s1".into(),
            title: "Opening Keynote".into(),
            track: None,
            room: Some("Main Hall".into()),
            starts_at,
            ends_at: starts_at + Duration::minutes(len_min),
            speaker_names: vec![],
        }
    }

    #[test]
    fn test_live_window_is_start_inclusive_end_exclusive() {
        let now = Utc::now();
        let s = session(-10, 30);
        assert!(s.is_live_at(now));
        assert!(s.is_live_at(s.starts_at));
        assert!(!s.is_live_at(s.ends_at));
    }

    #[test]
    fn test_upcoming() {
        let now = Utc::now();
        assert!(session(5, 30).is_upcoming_at(now));
        assert!(!session(-5, 30).is_upcoming_at(now));
    }
}
