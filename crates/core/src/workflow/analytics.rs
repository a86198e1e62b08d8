//! Workflow performance analytics (duration statistics, bottlenecks,
//! overdue monitoring).
//!
//! Pure aggregation over pre-loaded snapshots. Unfinished work is measured
//! against `now`; nothing here fails on partial data.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::{DbId, Timestamp};
use crate::workflow::{ActionRequired, StepState, StepStatus, WorkflowSnapshot, WorkflowStatus};

/// Default analytics window in days.
pub const DEFAULT_DAYS_BACK: i64 = 30;

/// Largest accepted analytics window in days.
pub const MAX_DAYS_BACK: i64 = 365;

/// Clamp a requested window to `1..=MAX_DAYS_BACK`.
pub fn clamp_days_back(days_back: Option<i64>) -> i64 {
    days_back
        .unwrap_or(DEFAULT_DAYS_BACK)
        .clamp(1, MAX_DAYS_BACK)
}

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Count and average/min/max of a set of durations, in hours.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationStats {
    pub count: usize,
    pub average_hours: f64,
    pub min_hours: f64,
    pub max_hours: f64,
}

impl DurationStats {
    fn from_hours(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let sum: f64 = samples.iter().sum();
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            count: samples.len(),
            average_hours: round2(sum / samples.len() as f64),
            min_hours: round2(min),
            max_hours: round2(max),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepTypeStats {
    pub action_required: ActionRequired,
    #[serde(flatten)]
    pub durations: DurationStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentStats {
    pub department_id: DbId,
    #[serde(flatten)]
    pub durations: DurationStats,
}

/// Aggregate report for `GET /workflows/performance-analytics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub days_back: i64,
    pub generated_at: Timestamp,
    pub total_workflows: usize,
    pub completed_workflows: usize,
    pub rejected_workflows: usize,
    pub in_progress_workflows: usize,
    pub pending_workflows: usize,
    pub overdue_workflows: usize,
    /// `completed / total`, 0 when the window is empty.
    pub completion_rate: f64,
    /// Creation to completion, completed workflows only.
    pub average_completion_hours: Option<f64>,
    pub step_types: Vec<StepTypeStats>,
    pub departments: Vec<DepartmentStats>,
    pub bottleneck_step_type: Option<ActionRequired>,
    pub bottleneck_department_id: Option<DbId>,
}

/// One row of `GET /workflows/performance-monitoring`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowMonitorEntry {
    pub workflow_id: DbId,
    pub reference_number: String,
    pub name: String,
    pub status: WorkflowStatus,
    pub current_step_index: i32,
    pub current_step_id: Option<DbId>,
    pub current_department_id: Option<DbId>,
    pub current_assignee_id: Option<DbId>,
    pub current_action_required: Option<ActionRequired>,
    pub due_date: Option<Timestamp>,
    /// Creation to completion, or to `now` while open.
    pub elapsed_hours: f64,
    /// Time spent in the current step so far.
    pub current_step_hours: Option<f64>,
    pub is_overdue: bool,
    pub hours_overdue: Option<f64>,
}

// ---------------------------------------------------------------------------
// Computation
// ---------------------------------------------------------------------------

fn hours_between(from: Timestamp, to: Timestamp) -> f64 {
    (to - from).num_seconds().max(0) as f64 / 3600.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Active time of a step across all its attempts, the open attempt
/// measured to `now`.
///
/// Steps that were never activated have no duration.
pub fn step_duration_hours(step: &StepState, now: Timestamp) -> Option<f64> {
    let current = match (step.started_at, step.completed_at) {
        (Some(started), Some(done)) => Some(hours_between(started, done)),
        (Some(started), None) if step.status == StepStatus::InProgress => {
            Some(hours_between(started, now))
        }
        _ => None,
    };
    if step.prior_active_secs == 0 {
        return current;
    }
    Some(step.prior_active_secs as f64 / 3600.0 + current.unwrap_or(0.0))
}

/// Creation to completion, or to `now` while the instance is open.
pub fn total_duration_hours(snapshot: &WorkflowSnapshot, now: Timestamp) -> f64 {
    let end = snapshot.instance.completed_at.unwrap_or(now);
    hours_between(snapshot.instance.created_at, end)
}

/// Whether the current step is past its due date on a running instance.
///
/// Terminal instances are never overdue.
pub fn is_overdue(snapshot: &WorkflowSnapshot, now: Timestamp) -> bool {
    overdue_hours(snapshot, now).is_some()
}

fn overdue_hours(snapshot: &WorkflowSnapshot, now: Timestamp) -> Option<f64> {
    let step = snapshot.current_step()?;
    if step.status != StepStatus::InProgress {
        return None;
    }
    let due = step.due_date?;
    (due < now).then(|| round2(hours_between(due, now)))
}

/// Build the performance report for instances created in the last
/// `days_back` days.
pub fn analyze_performance(
    snapshots: &[WorkflowSnapshot],
    now: Timestamp,
    days_back: i64,
) -> PerformanceReport {
    let cutoff = now - chrono::Duration::days(days_back);
    let in_window: Vec<&WorkflowSnapshot> = snapshots
        .iter()
        .filter(|s| s.instance.created_at >= cutoff)
        .collect();

    let count_status = |status: WorkflowStatus| {
        in_window
            .iter()
            .filter(|s| s.instance.status == status)
            .count()
    };
    let total = in_window.len();
    let completed = count_status(WorkflowStatus::Completed);

    let completion_hours: Vec<f64> = in_window
        .iter()
        .filter(|s| s.instance.status == WorkflowStatus::Completed)
        .map(|s| total_duration_hours(s, now))
        .collect();
    let average_completion_hours = DurationStats::from_hours(&completion_hours).map(|d| d.average_hours);

    let mut by_type: BTreeMap<ActionRequired, Vec<f64>> = BTreeMap::new();
    let mut by_department: BTreeMap<DbId, Vec<f64>> = BTreeMap::new();
    for snapshot in &in_window {
        for step in &snapshot.steps {
            if let Some(hours) = step_duration_hours(step, now) {
                by_type.entry(step.action_required).or_default().push(hours);
                by_department.entry(step.department_id).or_default().push(hours);
            }
        }
    }

    let step_types: Vec<StepTypeStats> = by_type
        .iter()
        .filter_map(|(action, samples)| {
            DurationStats::from_hours(samples).map(|durations| StepTypeStats {
                action_required: *action,
                durations,
            })
        })
        .collect();
    let departments: Vec<DepartmentStats> = by_department
        .iter()
        .filter_map(|(dept, samples)| {
            DurationStats::from_hours(samples).map(|durations| DepartmentStats {
                department_id: *dept,
                durations,
            })
        })
        .collect();

    let bottleneck_step_type = slowest(step_types.iter().map(|s| (s.action_required, &s.durations)));
    let bottleneck_department_id =
        slowest(departments.iter().map(|d| (d.department_id, &d.durations)));

    PerformanceReport {
        days_back,
        generated_at: now,
        total_workflows: total,
        completed_workflows: completed,
        rejected_workflows: count_status(WorkflowStatus::Rejected),
        in_progress_workflows: count_status(WorkflowStatus::InProgress),
        pending_workflows: count_status(WorkflowStatus::Pending),
        overdue_workflows: in_window.iter().filter(|s| is_overdue(s, now)).count(),
        completion_rate: if total == 0 {
            0.0
        } else {
            round2(completed as f64 / total as f64)
        },
        average_completion_hours,
        step_types,
        departments,
        bottleneck_step_type,
        bottleneck_department_id,
    }
}

/// Highest average wins; ties go to the larger sample, then to the first key.
fn slowest<'a, K: Copy>(items: impl Iterator<Item = (K, &'a DurationStats)>) -> Option<K> {
    let mut best: Option<(K, &DurationStats)> = None;
    for (key, stats) in items {
        let better = match best {
            None => true,
            Some((_, current)) => {
                stats.average_hours > current.average_hours
                    || (stats.average_hours == current.average_hours
                        && stats.count > current.count)
            }
        };
        if better {
            best = Some((key, stats));
        }
    }
    best.map(|(key, _)| key)
}

/// Monitoring rows for every snapshot, overdue workflows first, then by
/// elapsed time descending.
pub fn monitor(snapshots: &[WorkflowSnapshot], now: Timestamp) -> Vec<WorkflowMonitorEntry> {
    let mut entries: Vec<WorkflowMonitorEntry> = snapshots
        .iter()
        .map(|snapshot| {
            let current = snapshot.current_step();
            let hours_overdue = overdue_hours(snapshot, now);
            WorkflowMonitorEntry {
                workflow_id: snapshot.instance.id,
                reference_number: snapshot.instance.reference_number.clone(),
                name: snapshot.instance.name.clone(),
                status: snapshot.instance.status,
                current_step_index: snapshot.instance.current_step_index,
                current_step_id: current.map(|s| s.id),
                current_department_id: current.map(|s| s.department_id),
                current_assignee_id: current.and_then(|s| s.assigned_to_id),
                current_action_required: current.map(|s| s.action_required),
                due_date: current.and_then(|s| s.due_date),
                elapsed_hours: round2(total_duration_hours(snapshot, now)),
                current_step_hours: current
                    .and_then(|s| step_duration_hours(s, now))
                    .map(round2),
                is_overdue: hours_overdue.is_some(),
                hours_overdue,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.is_overdue
            .cmp(&a.is_overdue)
            .then(b.elapsed_hours.total_cmp(&a.elapsed_hours))
    });
    entries
}
