pub mod face;
pub mod group;

pub use face::{face_id, BoundingBox, FaceRecord, NameSource, PhotoRecord};
pub use group::{GroupSummary, PersonSummary, PersonTimeline, PersonYear, PhotoYear, Statistics};

/// Label carried by faces that are not grouped yet, or that the grouping
/// engine classified as noise.
pub const NOISE_LABEL: i64 = -1;

/// Prefix of Identity Map keys (`group_<label>`).
pub const GROUP_KEY_PREFIX: &str = "group_";

pub fn group_key(label: i64) -> String {
    format!("{GROUP_KEY_PREFIX}{label}")
}

/// Inverse of [`group_key`]. Keys that do not follow the scheme yield `None`.
pub fn label_from_key(key: &str) -> Option<i64> {
    key.strip_prefix(GROUP_KEY_PREFIX)?.parse().ok()
}
