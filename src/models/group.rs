use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GroupSummary {
    pub label: i64,
    pub name: Option<String>,
    pub face_count: usize,
    /// First few face ids, in ledger order.
    pub sample_faces: Vec<String>,
    pub earliest_date: Option<String>,
    pub latest_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PersonSummary {
    pub name: String,
    pub face_count: usize,
    pub earliest_date: Option<String>,
    pub latest_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Statistics {
    pub total_photos: usize,
    pub total_faces: usize,
    pub named_faces: usize,
    pub unnamed_faces: usize,
    pub clustered_faces: usize,
    pub unclustered_faces: usize,
    pub num_groups: usize,
    pub unique_people: usize,
    pub date_range_start: Option<String>,
    pub date_range_end: Option<String>,
}

/// Photos taken in one year; `photos` is a date-ordered sample.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PhotoYear {
    pub year: String,
    pub photo_count: usize,
    pub photos: Vec<super::PhotoRecord>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PersonYear {
    pub year: String,
    pub appearances: usize,
    pub faces: Vec<super::FaceRecord>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PersonTimeline {
    pub name: String,
    pub total_appearances: usize,
    pub timeline: Vec<PersonYear>,
}
