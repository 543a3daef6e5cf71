//! A location is one studied "meta" clue: the country it points to plus the clue itself.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub country: String,
    pub meta: String,
    #[serde(default)]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when a location is captured; the store assigns the id and timestamp.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewLocation {
    pub country: String,
    pub meta: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl NewLocation {
    pub fn new(country: impl Into<String>, meta: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            meta: meta.into(),
            ..Self::default()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}

/// Allow-list of countries a study session is restricted to.
/// An empty allow-list admits every location.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CardFilter {
    pub countries: Vec<String>,
}

impl CardFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn countries<I, S>(countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            countries: countries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.countries.is_empty()
    }

    pub fn matches(&self, location: &Location) -> bool {
        self.is_unrestricted() || self.countries.iter().any(|c| *c == location.country)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(country: &str) -> Location {
        Location {
            id: 1,
            country: country.to_string(),
            meta: "yellow bollards".to_string(),
            note: String::new(),
            image_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = CardFilter::all();
        assert!(filter.matches(&location("Poland")));
        assert!(filter.matches(&location("Chile")));
    }

    #[test]
    fn test_filter_allow_list() {
        let filter = CardFilter::countries(["Poland", "Czechia"]);
        assert!(filter.matches(&location("Poland")));
        assert!(!filter.matches(&location("Chile")));
    }
}
