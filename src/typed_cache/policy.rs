//! Per-type caching policy

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::router::Strategy;

/// Application data types with their own caching policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheType {
    Tasks,
    Projects,
    TeamMembers,
    Milestones,
    WorkshopSessions,
    Attendance,
    BuildSeason,
    Robots,
    Competitions,
    Static,
}

/// Eviction priority recorded on entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// Immutable caching policy of one data type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyDescriptor {
    pub strategy: Strategy,
    pub max_age: Duration,
    pub max_size: usize,
    pub priority: Priority,
    pub preload: bool,
}

/// A fixed endpoint preloaded into a fixed key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadEndpoint {
    pub url: &'static str,
    pub key: &'static str,
}

const fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

const fn endpoint(url: &'static str, key: &'static str) -> PreloadEndpoint {
    PreloadEndpoint { url, key }
}

impl CacheType {
    /// Every type, in registration order
    pub const ALL: [CacheType; 10] = [
        CacheType::Tasks,
        CacheType::Projects,
        CacheType::TeamMembers,
        CacheType::Milestones,
        CacheType::WorkshopSessions,
        CacheType::Attendance,
        CacheType::BuildSeason,
        CacheType::Robots,
        CacheType::Competitions,
        CacheType::Static,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheType::Tasks => "tasks",
            CacheType::Projects => "projects",
            CacheType::TeamMembers => "teamMembers",
            CacheType::Milestones => "milestones",
            CacheType::WorkshopSessions => "workshopSessions",
            CacheType::Attendance => "attendance",
            CacheType::BuildSeason => "buildSeason",
            CacheType::Robots => "robots",
            CacheType::Competitions => "competitions",
            CacheType::Static => "static",
        }
    }

    /// Store partition holding this type's entries
    pub fn partition(&self) -> String {
        format!("cache_{}", self.as_str())
    }

    /// Name of the update signal that invalidates this type
    pub fn update_event(&self) -> String {
        format!("{}Updated", self.as_str())
    }

    pub fn descriptor(&self) -> StrategyDescriptor {
        use Priority::*;
        use Strategy::*;

        let (strategy, max_age, max_size, priority, preload) = match self {
            CacheType::Tasks => (StaleWhileRevalidate, minutes(30), 500, Medium, true),
            CacheType::Projects => (CacheFirst, minutes(60), 100, High, true),
            CacheType::TeamMembers => (CacheFirst, minutes(120), 200, High, true),
            CacheType::Milestones => (StaleWhileRevalidate, minutes(45), 200, Medium, true),
            CacheType::WorkshopSessions => (NetworkFirst, minutes(15), 100, Low, false),
            CacheType::Attendance => (NetworkFirst, minutes(10), 300, Medium, false),
            CacheType::BuildSeason => (StaleWhileRevalidate, minutes(60), 50, High, true),
            CacheType::Robots => (CacheFirst, minutes(90), 50, Medium, true),
            CacheType::Competitions => (CacheFirst, minutes(240), 100, Medium, true),
            CacheType::Static => (CacheFirst, minutes(24 * 60), 200, High, false),
        };

        StrategyDescriptor {
            strategy,
            max_age,
            max_size,
            priority,
            preload,
        }
    }

    /// Endpoints fetched when this type is preloaded
    pub fn preload_endpoints(&self) -> &'static [PreloadEndpoint] {
        const TASKS: &[PreloadEndpoint] = &[
            endpoint("/api/tasks", "all"),
            endpoint("/api/tasks/active", "active"),
        ];
        const PROJECTS: &[PreloadEndpoint] = &[
            endpoint("/api/projects", "all"),
            endpoint("/api/projects/active", "active"),
        ];
        const TEAM_MEMBERS: &[PreloadEndpoint] = &[endpoint("/api/team-members", "all")];
        const MILESTONES: &[PreloadEndpoint] = &[
            endpoint("/api/milestones", "all"),
            endpoint("/api/milestones/upcoming", "upcoming"),
        ];
        const BUILD_SEASON: &[PreloadEndpoint] = &[
            endpoint("/api/build-season/dashboard", "dashboard"),
            endpoint("/api/build-season/progress", "progress"),
        ];
        const ROBOTS: &[PreloadEndpoint] = &[endpoint("/api/robots/current", "current")];
        const COMPETITIONS: &[PreloadEndpoint] =
            &[endpoint("/api/competitions/upcoming", "upcoming")];

        match self {
            CacheType::Tasks => TASKS,
            CacheType::Projects => PROJECTS,
            CacheType::TeamMembers => TEAM_MEMBERS,
            CacheType::Milestones => MILESTONES,
            CacheType::BuildSeason => BUILD_SEASON,
            CacheType::Robots => ROBOTS,
            CacheType::Competitions => COMPETITIONS,
            CacheType::WorkshopSessions | CacheType::Attendance | CacheType::Static => &[],
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnknownCacheType(s.to_string()))
    }
}

/// A named user workflow whose types are warmed together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    TaskManagement,
    BuildSeason,
    Workshop,
    Competition,
}

impl Workflow {
    pub const ALL: [Workflow; 4] = [
        Workflow::TaskManagement,
        Workflow::BuildSeason,
        Workflow::Workshop,
        Workflow::Competition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Workflow::TaskManagement => "taskManagement",
            Workflow::BuildSeason => "buildSeason",
            Workflow::Workshop => "workshop",
            Workflow::Competition => "competition",
        }
    }

    /// Look up a workflow by name
    pub fn from_name(name: &str) -> Option<Self> {
        Workflow::ALL.into_iter().find(|w| w.as_str() == name)
    }

    pub fn types(&self) -> [CacheType; 3] {
        match self {
            Workflow::TaskManagement => [
                CacheType::Tasks,
                CacheType::Projects,
                CacheType::TeamMembers,
            ],
            Workflow::BuildSeason => [
                CacheType::BuildSeason,
                CacheType::Milestones,
                CacheType::Robots,
            ],
            Workflow::Workshop => [
                CacheType::WorkshopSessions,
                CacheType::Attendance,
                CacheType::TeamMembers,
            ],
            Workflow::Competition => [
                CacheType::Competitions,
                CacheType::BuildSeason,
                CacheType::Robots,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for t in CacheType::ALL {
            assert_eq!(t.as_str().parse::<CacheType>().unwrap(), t);
            let json = serde_json::to_value(t).unwrap();
            assert_eq!(json, serde_json::Value::String(t.as_str().to_string()));
        }
    }

    #[test]
    fn test_unknown_type_is_error() {
        let err = "gadgets".parse::<CacheType>().unwrap_err();
        assert!(matches!(err, Error::UnknownCacheType(ref name) if name == "gadgets"));
    }

    #[test]
    fn test_descriptor_table() {
        let tasks = CacheType::Tasks.descriptor();
        assert_eq!(tasks.strategy, Strategy::StaleWhileRevalidate);
        assert_eq!(tasks.max_age, Duration::from_secs(30 * 60));
        assert_eq!(tasks.max_size, 500);
        assert_eq!(tasks.priority, Priority::Medium);
        assert!(tasks.preload);

        let competitions = CacheType::Competitions.descriptor();
        assert_eq!(competitions.max_age, Duration::from_secs(4 * 3600));

        let attendance = CacheType::Attendance.descriptor();
        assert_eq!(attendance.strategy, Strategy::NetworkFirst);
        assert!(!attendance.preload);

        let robots = CacheType::Robots.descriptor();
        assert_eq!(robots.max_size, 50);
        assert_eq!(robots.max_age, Duration::from_secs(90 * 60));
    }

    #[test]
    fn test_preload_endpoints_only_for_preload_types() {
        for t in CacheType::ALL {
            assert_eq!(
                t.descriptor().preload,
                !t.preload_endpoints().is_empty(),
                "{}",
                t
            );
        }
        assert_eq!(
            CacheType::Milestones.preload_endpoints()[1],
            PreloadEndpoint {
                url: "/api/milestones/upcoming",
                key: "upcoming"
            }
        );
    }

    #[test]
    fn test_partition_and_event_names() {
        assert_eq!(CacheType::TeamMembers.partition(), "cache_teamMembers");
        assert_eq!(CacheType::Tasks.update_event(), "tasksUpdated");
    }

    #[test]
    fn test_workflows() {
        assert_eq!(Workflow::from_name("workshop"), Some(Workflow::Workshop));
        assert_eq!(Workflow::from_name("party"), None);
        assert_eq!(
            Workflow::Competition.types(),
            [
                CacheType::Competitions,
                CacheType::BuildSeason,
                CacheType::Robots
            ]
        );
    }
}
