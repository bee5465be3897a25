/// Build jobs and generation entries are keyed by random v4 UUIDs.
pub type JobId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A generated source snapshot: relative path -> file contents.
///
/// Ordered so that prompts, fixer output, and serialized jobs are stable.
pub type SourceFiles = std::collections::BTreeMap<String, String>;
