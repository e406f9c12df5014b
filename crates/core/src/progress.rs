use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::debug;

use crate::format::{format_duration, format_rate, format_size, scale_bytes};
use crate::status::{LogLine, TaskStatusSnapshot};

const DEFAULT_MESSAGE: &str = "Starting…";

/// The reconstructed progress of one task: the entire public contract
/// of the engine. `speed` and `eta` are pre-formatted and empty when
/// unknown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub percent: f64,
    pub message: String,
    pub speed: String,
    pub eta: String,
}

impl ProgressReport {
    fn starting() -> Self {
        Self {
            percent: 0.0,
            message: DEFAULT_MESSAGE.to_string(),
            speed: String::new(),
            eta: String::new(),
        }
    }
}

/// Reconstructs a progress report from the authoritative status
/// snapshot and the task's raw log lines.
///
/// The log is only a best-effort signal while the task is in flight;
/// once the cluster reports the task stopped, the exit status wins over
/// anything the log says. Never fails: unrecognized input degrades to
/// the starting report.
pub fn reconstruct_progress(status: &TaskStatusSnapshot, lines: &[LogLine]) -> ProgressReport {
    if status.is_stopped() {
        return stopped_report(status);
    }
    if lines.is_empty() {
        return ProgressReport::starting();
    }
    if status.is_migration() {
        reconstruct_migration(lines)
    } else {
        reconstruct_generic(lines)
    }
}

fn stopped_report(status: &TaskStatusSnapshot) -> ProgressReport {
    let message = match status.exit_status.as_deref() {
        Some("OK") => "task completed successfully".to_string(),
        Some(exit) => format!("task failed: {exit}"),
        None => "task failed: unknown".to_string(),
    };
    ProgressReport {
        percent: 100.0,
        message,
        speed: String::new(),
        eta: String::new(),
    }
}

/// Migration phases, in causal order. Transitions only move forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
enum MigrationPhase {
    #[default]
    Init,
    Storage,
    Live,
    Finalizing,
    Completed,
}

/// Per-disk mirror state, keyed by bus id. Byte counters are cumulative
/// and only ever advance within one scan.
#[derive(Debug, Clone, Default)]
struct DiskTransfer {
    total_bytes: f64,
    transferred_bytes: f64,
    completed: bool,
    last_sample_time_sec: Option<f64>,
    instantaneous_speed_bps: f64,
}

/// VM-state transfer, absent until the live phase reports a sample.
#[derive(Debug, Clone)]
struct LiveMemoryTransfer {
    transferred_bytes: f64,
    total_bytes: f64,
    speed_bps: f64,
}

#[derive(Debug, Default)]
struct MigrationScan {
    phase: MigrationPhase,
    disks: BTreeMap<String, DiskTransfer>,
    live: Option<LiveMemoryTransfer>,
    average_speed_bps: Option<f64>,
    message: String,
    started_at: Option<NaiveDateTime>,
}

impl MigrationScan {
    fn advance(&mut self, to: MigrationPhase) {
        if to > self.phase {
            debug!(event = "migrate.phase", from = ?self.phase, to = ?to, "migrate.phase");
            self.phase = to;
        }
    }
}

static TIMESTAMP_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) (.*)$").expect("timestamp pattern")
});

static DISK_SAMPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<disk>[a-z][a-z0-9_-]*\d): transferred (?P<done>[0-9][0-9.]*) ?(?P<done_unit>[kmgt]?i?b)? of (?P<total>[0-9][0-9.]*) ?(?P<total_unit>[kmgt]?i?b)? \((?P<pct>[0-9.]+)%\)(?: in (?P<elapsed>[0-9]+)s)?",
    )
    .expect("disk sample pattern")
});

static LIVE_SAMPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)migration active.*transferred (?P<done>[0-9][0-9.]*) ?(?P<done_unit>[kmgt]?i?b)? of (?P<total>[0-9][0-9.]*) ?(?P<total_unit>[kmgt]?i?b)? vm-state, (?P<speed>[0-9][0-9.]*) ?(?P<speed_unit>[kmgt]?i?b)?/s",
    )
    .expect("live sample pattern")
});

static AVERAGE_SPEED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)average migration speed: (?P<speed>[0-9][0-9.]*) ?(?P<unit>[kmgt]?i?b)?/s")
        .expect("average speed pattern")
});

static GENERIC_PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)%").expect("percent pattern"));

static GENERIC_TRANSFER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)transferred (?P<done>[0-9][0-9.]*) ?(?P<done_unit>[kmgt]?i?b)? of (?P<total>[0-9][0-9.]*) ?(?P<total_unit>[kmgt]?i?b)?",
    )
    .expect("transfer pattern")
});

static GENERIC_RATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?P<speed>[0-9][0-9.]*) ?(?P<unit>[kmgt]?i?b)/s").expect("rate pattern")
});

fn split_timestamp(text: &str) -> (Option<NaiveDateTime>, &str) {
    let Some(caps) = TIMESTAMP_PREFIX.captures(text) else {
        return (None, text);
    };
    let at = NaiveDateTime::parse_from_str(&caps[1], "%Y-%m-%d %H:%M:%S").ok();
    let rest = caps.get(2).map_or("", |m| m.as_str());
    (at, rest)
}

fn captured_bytes(caps: &Captures<'_>, value: &str, unit: &str) -> Option<f64> {
    let value: f64 = caps.name(value)?.as_str().parse().ok()?;
    let unit = caps.name(unit).map_or("", |m| m.as_str());
    Some(scale_bytes(value, unit))
}

fn reconstruct_migration(lines: &[LogLine]) -> ProgressReport {
    let mut scan = MigrationScan::default();

    for line in lines {
        let (timestamp, text) = split_timestamp(&line.text);
        if scan.started_at.is_none() {
            scan.started_at = timestamp;
        }
        let line_time = match (timestamp, scan.started_at) {
            (Some(at), Some(start)) => Some((at - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        };

        if let Some(caps) = DISK_SAMPLE.captures(text) {
            apply_disk_sample(&mut scan, &caps, line_time);
        } else if text.contains("mirror") && text.contains("jobs are ready") {
            scan.message = "all mirror jobs are ready".to_string();
        } else if text.contains("switching mirror jobs to actively synced mode") {
            scan.message = "switching mirror jobs to actively synced mode".to_string();
        } else if text.contains("starting online/live migration") {
            scan.advance(MigrationPhase::Live);
            scan.message = "live memory migration in progress".to_string();
        } else if let Some(caps) = LIVE_SAMPLE.captures(text) {
            apply_live_sample(&mut scan, &caps);
        } else if let Some(caps) = AVERAGE_SPEED.captures(text) {
            if let Some(speed) = captured_bytes(&caps, "speed", "unit") {
                scan.average_speed_bps = Some(speed);
            }
        } else if text.contains("migration status: completed") {
            scan.advance(MigrationPhase::Finalizing);
            scan.message = "finalizing".to_string();
        } else if text.contains("migration finished successfully") {
            scan.advance(MigrationPhase::Completed);
            scan.message = "migration finished successfully".to_string();
        } else if text.contains("ready") {
            mark_ready_disks(&mut scan, text);
        }
    }

    finish_migration(scan)
}

fn apply_disk_sample(scan: &mut MigrationScan, caps: &Captures<'_>, line_time: Option<f64>) {
    let Some(done) = captured_bytes(caps, "done", "done_unit") else {
        return;
    };
    let Some(total) = captured_bytes(caps, "total", "total_unit") else {
        return;
    };
    let disk_id = caps["disk"].to_string();
    let elapsed = caps
        .name("elapsed")
        .and_then(|m| m.as_str().parse::<f64>().ok());
    // "in Ns" is the transfer's own clock; the line timestamp is the
    // fallback clock for delta-based speed.
    let sample_time = elapsed.or(line_time);

    let disk = scan.disks.entry(disk_id.clone()).or_default();
    let prev_done = disk.transferred_bytes;
    let prev_time = disk.last_sample_time_sec;

    disk.total_bytes = disk.total_bytes.max(total);
    disk.transferred_bytes = disk.transferred_bytes.max(done);

    if let Some(elapsed) = elapsed {
        if done > 0.0 && elapsed > 0.0 {
            disk.instantaneous_speed_bps = done / elapsed;
        }
    } else if let (Some(now), Some(prev)) = (sample_time, prev_time) {
        let delta_bytes = disk.transferred_bytes - prev_done;
        let delta_time = now - prev;
        if delta_bytes > 0.0 && delta_time > 0.0 {
            disk.instantaneous_speed_bps = delta_bytes / delta_time;
        }
    }
    if sample_time.is_some() {
        disk.last_sample_time_sec = sample_time;
    }

    let message = format!(
        "{disk_id}: {} / {}",
        format_size(disk.transferred_bytes),
        format_size(disk.total_bytes)
    );
    scan.advance(MigrationPhase::Storage);
    scan.message = message;
}

fn apply_live_sample(scan: &mut MigrationScan, caps: &Captures<'_>) {
    let Some(done) = captured_bytes(caps, "done", "done_unit") else {
        return;
    };
    let Some(total) = captured_bytes(caps, "total", "total_unit") else {
        return;
    };
    let live = LiveMemoryTransfer {
        transferred_bytes: done,
        total_bytes: total,
        speed_bps: captured_bytes(caps, "speed", "speed_unit").unwrap_or(0.0),
    };
    debug!(
        event = "migrate.live_sample",
        transferred_bytes = live.transferred_bytes,
        total_bytes = live.total_bytes,
        speed_bps = live.speed_bps,
        "migrate.live_sample"
    );

    scan.live = Some(live);
    scan.advance(MigrationPhase::Live);
    scan.message = format!("memory: {} / {}", format_size(done), format_size(total));
}

fn mark_ready_disks(scan: &mut MigrationScan, text: &str) {
    for (disk_id, disk) in scan.disks.iter_mut() {
        if !disk.completed && text.contains(disk_id.as_str()) {
            disk.completed = true;
            disk.transferred_bytes = disk.total_bytes;
        }
    }
}

fn finish_migration(scan: MigrationScan) -> ProgressReport {
    let mut total_bytes = 0.0;
    let mut transferred_bytes = 0.0;
    for disk in scan.disks.values() {
        total_bytes += disk.total_bytes;
        transferred_bytes += disk.transferred_bytes;
    }
    // VM-state bytes only count once the live phase is reached; before
    // that the denominator is storage only.
    if scan.phase >= MigrationPhase::Live {
        if let Some(live) = &scan.live {
            total_bytes += live.total_bytes;
            transferred_bytes += live.transferred_bytes;
        }
    }

    let raw_percent = if total_bytes > 0.0 {
        100.0 * transferred_bytes / total_bytes
    } else {
        0.0
    };
    let percent = match scan.phase {
        MigrationPhase::Completed => 100.0,
        // Finalization is fast and not represented in bytes; the bar
        // must not sit below 95 here.
        MigrationPhase::Finalizing => raw_percent.max(95.0),
        // Byte totals are approximate during storage/live; the last 5
        // points are reserved for finalization.
        _ => raw_percent * 0.95,
    };

    let speed_bps = match scan.average_speed_bps {
        Some(avg) if avg > 0.0 => avg,
        _ => {
            let speeds: Vec<f64> = scan
                .disks
                .values()
                .map(|d| d.instantaneous_speed_bps)
                .filter(|s| *s > 0.0)
                .collect();
            if speeds.is_empty() {
                0.0
            } else {
                // Unweighted mean across disks, regardless of size.
                speeds.iter().sum::<f64>() / speeds.len() as f64
            }
        }
    };

    let remaining_bytes = total_bytes - transferred_bytes;
    let speed = if speed_bps > 0.0 {
        format_rate(speed_bps)
    } else {
        String::new()
    };
    let eta = if speed_bps > 0.0 && remaining_bytes > 0.0 {
        format_duration(remaining_bytes / speed_bps)
    } else {
        String::new()
    };

    let message = if scan.message.is_empty() {
        DEFAULT_MESSAGE.to_string()
    } else {
        scan.message
    };

    ProgressReport {
        percent: round_percent(percent),
        message,
        speed,
        eta,
    }
}

fn reconstruct_generic(lines: &[LogLine]) -> ProgressReport {
    let mut max_percent: f64 = 0.0;
    let mut message = String::new();
    let mut speed_bps: Option<f64> = None;
    let mut finished = false;

    for line in lines {
        let text = line.text.as_str();
        if text.contains("TASK OK") {
            finished = true;
        }
        for caps in GENERIC_PERCENT.captures_iter(text) {
            if let Ok(pct) = caps[1].parse::<f64>() {
                max_percent = max_percent.max(pct);
            }
        }
        if let Some(caps) = GENERIC_TRANSFER.captures(text) {
            if let (Some(done), Some(total)) = (
                captured_bytes(&caps, "done", "done_unit"),
                captured_bytes(&caps, "total", "total_unit"),
            ) {
                message = format!("{} / {}", format_size(done), format_size(total));
            }
        }
        if let Some(caps) = GENERIC_RATE.captures(text) {
            if let Some(bps) = captured_bytes(&caps, "speed", "unit") {
                speed_bps = Some(bps);
            }
        }
    }

    let (percent, message) = if finished {
        (100.0, "task completed successfully".to_string())
    } else {
        let message = if message.is_empty() {
            DEFAULT_MESSAGE.to_string()
        } else {
            message
        };
        (round_percent(max_percent), message)
    };
    let speed = match speed_bps {
        Some(bps) if bps > 0.0 => format_rate(bps),
        _ => String::new(),
    };

    ProgressReport {
        percent,
        message,
        speed,
        eta: String::new(),
    }
}

fn round_percent(percent: f64) -> f64 {
    (percent.clamp(0.0, 100.0) * 10.0).round() / 10.0
}
