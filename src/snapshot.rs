use chrono::{DateTime, Utc};

/// A single, immutable point-in-time capture of a filesystem.
///
/// Identity/equality is the triple `(path, name, timestamp)`. Snapshots are produced exclusively
/// by the storage driver (reading external state) or by the orchestrator (recording a successful
/// creation call) -- nothing else constructs one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Snapshot {
    /// `/`-separated logical path; the first segment is the pool.
    pub path: String,
    /// The local identifier, i.e. the string after `@`.
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(path: impl Into<String>, name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Snapshot {
            path: path.into(),
            name: name.into(),
            timestamp,
        }
    }

    /// The fully-qualified `<path>@<name>` the storage manager expects on its command line.
    pub fn qualified_name(&self) -> String {
        format!("{}@{}", self.path, self.name)
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.name.starts_with(prefix)
    }
}
