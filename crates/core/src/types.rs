/// Job group and child job identifiers are opaque server-assigned strings.
pub type JobGroupId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
