use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Attendee {
    pub id: String,
    #[serde(rename = "badgeId")]
    pub badge_id: Option<String>,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub company: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "avatarUrl")]
    pub avatar_url: Option<String>,
    /// Present only in admin-visibility reads; stripped before caching.
    #[serde(rename = "accessCode", skip_serializing_if = "Option::is_none")]
    pub access_code: Option<String>,
}

impl Attendee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Case-insensitive match against name and company, for roster search.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.full_name().to_lowercase().contains(&query)
            || self
                .company
                .as_deref()
                .map(|c| c.to_lowercase().contains(&query))
                .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AttendeeProfile {
    #[serde(rename = "attendeeId")]
    pub attendee_id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub dietary: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    /// Present only in the owner's own row; stripped before caching.
    #[serde(rename = "accessCode", skip_serializing_if = "Option::is_none")]
    pub access_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatingAssignment {
    #[serde(rename = "attendeeId")]
    pub attendee_id: String,
    pub table: String,
    pub seat: Option<String>,
    pub event: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_query_name_and_company() {
        let attendee = Attendee {
            id: "a1".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            company: Some("Analytical Engines Ltd".into()),
            ..Default::default()
        };

        assert!(attendee.matches_query("lovelace"));
        assert!(attendee.matches_query("ANALYTICAL"));
        assert!(!attendee.matches_query("babbage"));
    }
}
