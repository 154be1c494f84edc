//! Physical resource descriptors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a physical table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceStatus {
    /// Being provisioned.
    Creating,
    /// Ready for reads, writes and capacity updates.
    Active,
    /// A capacity or schema update is in progress.
    Updating,
    /// Being removed.
    Deleting,
    /// Status could not be determined.
    #[default]
    Unknown,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceStatus::Creating => "CREATING",
            ResourceStatus::Active => "ACTIVE",
            ResourceStatus::Updating => "UPDATING",
            ResourceStatus::Deleting => "DELETING",
            ResourceStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// Read-only snapshot of a physical table, fetched on demand.
///
/// The default value is the zeroed descriptor returned when a describe call
/// fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalResourceDescriptor {
    /// Physical table name.
    pub name: String,
    /// Current status.
    pub status: ResourceStatus,
    /// Creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Approximate size in bytes.
    pub size_bytes: i64,
    /// Approximate number of items.
    pub item_count: i64,
    /// Provisioned read capacity units.
    pub read_capacity: i64,
    /// Provisioned write capacity units.
    pub write_capacity: i64,
}

impl PhysicalResourceDescriptor {
    /// Returns `true` for the zeroed descriptor.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Returns `true` if the table accepts capacity updates.
    pub fn is_active(&self) -> bool {
        self.status == ResourceStatus::Active
    }
}
