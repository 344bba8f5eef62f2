use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who owns an inventory hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    CustomTrip,
    PredefinedTrip,
    HotelOnly,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::CustomTrip => "CUSTOM_TRIP",
            SourceType::PredefinedTrip => "PREDEFINED_TRIP",
            SourceType::HotelOnly => "HOTEL_ONLY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CUSTOM_TRIP" => Some(SourceType::CustomTrip),
            "PREDEFINED_TRIP" => Some(SourceType::PredefinedTrip),
            "HOTEL_ONLY" => Some(SourceType::HotelOnly),
            _ => None,
        }
    }
}

/// (source, source id) pair. Room reservations and guide holds are created and
/// released by tag, never by resource + dates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct HoldTag {
    pub source: SourceType,
    pub source_id: Uuid,
}

impl HoldTag {
    pub fn new(source: SourceType, source_id: Uuid) -> Self {
        Self { source, source_id }
    }
}

impl std::fmt::Display for HoldTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source.as_str(), self.source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_round_trip() {
        for source in [SourceType::CustomTrip, SourceType::PredefinedTrip, SourceType::HotelOnly] {
            assert_eq!(SourceType::parse(source.as_str()), Some(source));
        }
        assert_eq!(SourceType::parse("TOUR"), None);
    }
}
