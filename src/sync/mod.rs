//! Deferred-write queues
//!
//! Writes made while offline are recorded per queue and replayed in order
//! when a sync trigger for that queue arrives.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub mod manager;

pub use manager::{ReplayReport, SyncManager};

/// Prefix of every sync queue partition
const PARTITION_PREFIX: &str = "syncQueue";

/// The named sync queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncQueue {
    TaskUpdates,
    MilestoneUpdates,
    AttendanceUpdates,
    RobotWeightUpdates,
}

impl SyncQueue {
    pub const ALL: [SyncQueue; 4] = [
        SyncQueue::TaskUpdates,
        SyncQueue::MilestoneUpdates,
        SyncQueue::AttendanceUpdates,
        SyncQueue::RobotWeightUpdates,
    ];

    /// Sync trigger tag
    pub fn tag(&self) -> &'static str {
        match self {
            SyncQueue::TaskUpdates => "task-updates",
            SyncQueue::MilestoneUpdates => "milestone-updates",
            SyncQueue::AttendanceUpdates => "attendance-updates",
            SyncQueue::RobotWeightUpdates => "robot-weight-updates",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        SyncQueue::ALL.into_iter().find(|q| q.tag() == tag)
    }

    pub fn partition(&self) -> String {
        format!("{}/{}", PARTITION_PREFIX, self.tag())
    }
}

impl fmt::Display for SyncQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for SyncQueue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncQueue::from_tag(s).ok_or_else(|| Error::UnknownQueue(s.to_string()))
    }
}

/// One deferred write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRequest {
    pub id: String,
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Raw payload, base64 in storage
    #[serde(default, with = "body_base64")]
    pub body: Option<Vec<u8>>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(with = "ts_milliseconds")]
    pub queued_at: DateTime<Utc>,
}

mod body_base64 {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(body: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match body {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded).map_err(D::Error::custom))
            .transpose()
    }
}

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Queue item id that sorts in enqueue order
pub(crate) fn next_id(now: DateTime<Utc>) -> String {
    let nanos = now.timestamp_nanos_opt().unwrap_or_default().max(0);
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) % 1_000_000;
    format!("{:020}-{:06}", nanos, seq)
}
