use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Task types whose logs carry the storage/live migration structure.
/// Everything else goes through generic inference.
pub const MIGRATION_TASK_TYPES: &[&str] = &["qmigrate", "vzmigrate"];

pub fn is_migration_task(task_type: &str) -> bool {
    MIGRATION_TASK_TYPES.contains(&task_type)
}

/// One line of a task's execution log, as returned by the cluster API.
/// Lines are ordered; `sequence` is the position in the full log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub sequence: u64,
    pub text: String,
}

/// Authoritative task state from the cluster API. While the task runs,
/// progress has to be inferred from the log; once `status` is
/// "stopped", `exit_status` is the only signal that matters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusSnapshot {
    pub status: String,
    #[serde(default)]
    pub exit_status: Option<String>,
    pub task_type: String,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
}

impl TaskStatusSnapshot {
    pub fn is_stopped(&self) -> bool {
        self.status == "stopped"
    }

    pub fn is_migration(&self) -> bool {
        is_migration_task(&self.task_type)
    }
}

/// Parsed task identifier:
/// `UPID:<node>:<pid-hex>:<pstart-hex>:<starttime-hex>:<type>:<id>:<user>:`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upid {
    pub node: String,
    pub pid: u32,
    pub pstart: u64,
    pub start_time: i64,
    pub task_type: String,
    pub task_id: String,
    pub user: String,
}

impl FromStr for Upid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidUpid { upid: s.to_string() };

        let rest = s.strip_prefix("UPID:").ok_or_else(invalid)?;
        let parts: Vec<&str> = rest.split(':').collect();
        if parts.len() < 7 || parts[0].is_empty() {
            return Err(invalid());
        }

        let pid = u32::from_str_radix(parts[1], 16).map_err(|_| invalid())?;
        let pstart = u64::from_str_radix(parts[2], 16).map_err(|_| invalid())?;
        let start_time = i64::from_str_radix(parts[3], 16).map_err(|_| invalid())?;
        if parts[4].is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            node: parts[0].to_string(),
            pid,
            pstart,
            start_time,
            task_type: parts[4].to_string(),
            task_id: parts[5].to_string(),
            user: parts[6].to_string(),
        })
    }
}

impl std::fmt::Display for Upid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UPID:{}:{:08X}:{:08X}:{:08X}:{}:{}:{}:",
            self.node, self.pid, self.pstart, self.start_time, self.task_type, self.task_id, self.user
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upid_parses_all_components() {
        let upid: Upid = "UPID:pve1:0003C4F2:00A3B2C1:66334455:qmigrate:101:root@pam:"
            .parse()
            .unwrap();
        assert_eq!(upid.node, "pve1");
        assert_eq!(upid.pid, 0x0003_C4F2);
        assert_eq!(upid.pstart, 0x00A3_B2C1);
        assert_eq!(upid.start_time, 0x6633_4455);
        assert_eq!(upid.task_type, "qmigrate");
        assert_eq!(upid.task_id, "101");
        assert_eq!(upid.user, "root@pam");
    }

    #[test]
    fn upid_roundtrips_through_display() {
        let text = "UPID:pve1:0003C4F2:00A3B2C1:66334455:qmigrate:101:root@pam:";
        let upid: Upid = text.parse().unwrap();
        assert_eq!(upid.to_string(), text);
    }

    #[test]
    fn malformed_upids_are_rejected() {
        for bad in [
            "",
            "UPID:",
            "not-a-upid",
            "UPID:pve1:zzzz:00A3B2C1:66334455:qmigrate:101:root@pam:",
            "UPID:pve1:0003C4F2:00A3B2C1:66334455::101:root@pam:",
            "UPID:pve1:0003C4F2",
        ] {
            assert!(bad.parse::<Upid>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn snapshot_uses_camel_case_wire_names() {
        let json = r#"
{
  "status": "stopped",
  "exitStatus": "OK",
  "taskType": "qmigrate",
  "startTime": 1717320000,
  "endTime": 1717320095
}
"#;
        let snap: TaskStatusSnapshot = serde_json::from_str(json).unwrap();
        assert!(snap.is_stopped());
        assert!(snap.is_migration());
        assert_eq!(snap.exit_status.as_deref(), Some("OK"));
        assert_eq!(snap.end_time, Some(1_717_320_095));
    }

    #[test]
    fn snapshot_tolerates_missing_optional_fields() {
        let json = r#"{ "status": "running", "taskType": "vzdump" }"#;
        let snap: TaskStatusSnapshot = serde_json::from_str(json).unwrap();
        assert!(!snap.is_stopped());
        assert!(!snap.is_migration());
        assert!(snap.exit_status.is_none());
        assert!(snap.start_time.is_none());
    }

    #[test]
    fn migration_task_type_set() {
        assert!(is_migration_task("qmigrate"));
        assert!(is_migration_task("vzmigrate"));
        assert!(!is_migration_task("vzdump"));
        assert!(!is_migration_task(""));
    }
}
