use chrono::{Local, Timelike};
use serde::{Deserialize, Serialize};

/// Self-declared cognitive/physical demand of a task. The evening rule uses
/// `High` to suppress demanding suggestions late in the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    High,
    Medium,
    Low,
}

impl EnergyLevel {
    /// Lenient tag parsing: anything outside the enumeration is "unclassified".
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Declared scheduling preference of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBlock {
    Morning,
    Afternoon,
    Evening,
    Any,
}

impl TimeBlock {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "morning" => Some(Self::Morning),
            "afternoon" => Some(Self::Afternoon),
            "evening" => Some(Self::Evening),
            "any" => Some(Self::Any),
            _ => None,
        }
    }
}

/// One of the three real blocks of the day. Tasks may additionally be tagged
/// `any`, but that is a preference rather than a clock state, so it has no
/// variant here: every hour maps to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockBlock {
    Morning,
    Afternoon,
    Evening,
}

/// Anything task-shaped the filter can look at. Records lacking either tag are
/// never hidden and never reordered.
pub trait TimeSensitive {
    fn energy_level(&self) -> Option<EnergyLevel>;
    fn time_block(&self) -> Option<TimeBlock>;
}

/// Partition of an input list into the tasks worth showing right now and the
/// ones held back, with a human-readable reason for the suppression.
///
/// The two lists borrow from the input and together contain every input record
/// exactly once, each preserving original relative order.
#[derive(Debug, Serialize)]
pub struct FilterResult<'a, T> {
    pub visible_tasks: Vec<&'a T>,
    pub hidden_tasks: Vec<&'a T>,
    pub hidden_reason: Option<String>,
}

impl<'a, T> FilterResult<'a, T> {
    fn pass_through(tasks: &'a [T]) -> Self {
        Self {
            visible_tasks: tasks.iter().collect(),
            hidden_tasks: Vec::new(),
            hidden_reason: None,
        }
    }
}

/// Local wall-clock hour, 0-23.
pub fn current_hour() -> u32 {
    Local::now().hour()
}

/// Hour >= 18. Callers are expected to pass 0-23; out-of-range values are not
/// specially handled.
pub fn is_evening(hour: u32) -> bool {
    hour >= 18
}

/// Hour < 9.
pub fn is_morning(hour: u32) -> bool {
    hour < 9
}

pub fn time_block_for_hour(hour: u32) -> ClockBlock {
    if is_morning(hour) {
        ClockBlock::Morning
    } else if is_evening(hour) {
        ClockBlock::Evening
    } else {
        ClockBlock::Afternoon
    }
}

/// Classify the current wall-clock moment.
pub fn current_time_block() -> ClockBlock {
    time_block_for_hour(current_hour())
}

fn hidden_reason_for(count: usize) -> Option<String> {
    match count {
        0 => None,
        1 => Some("1 high-energy task hidden after 6pm".to_string()),
        n => Some(format!("{n} high-energy tasks hidden after 6pm")),
    }
}

/// Apply the Dynamic Now visibility rules for the given hour:
///
/// - evening (hour >= 18): high-energy tasks are hidden;
/// - morning (hour < 9): nothing is hidden, but morning-tagged tasks are
///   surfaced ahead of the rest (stable partition, not a sort);
/// - midday: the input passes through untouched.
///
/// The two windows are mutually exclusive, so at most one rule fires per call.
pub fn filter_tasks_by_dynamic_now<T: TimeSensitive>(
    tasks: &[T],
    current_hour: u32,
) -> FilterResult<'_, T> {
    if is_evening(current_hour) {
        let mut visible_tasks = Vec::new();
        let mut hidden_tasks = Vec::new();
        for task in tasks {
            if task.energy_level() == Some(EnergyLevel::High) {
                hidden_tasks.push(task);
            } else {
                visible_tasks.push(task);
            }
        }
        let hidden_reason = hidden_reason_for(hidden_tasks.len());
        return FilterResult {
            visible_tasks,
            hidden_tasks,
            hidden_reason,
        };
    }

    if is_morning(current_hour) {
        let mut morning = Vec::new();
        let mut rest = Vec::new();
        for task in tasks {
            if task.time_block() == Some(TimeBlock::Morning) {
                morning.push(task);
            } else {
                rest.push(task);
            }
        }
        morning.append(&mut rest);
        return FilterResult {
            visible_tasks: morning,
            hidden_tasks: Vec::new(),
            hidden_reason: None,
        };
    }

    FilterResult::pass_through(tasks)
}

/// Policy wrapper around [`filter_tasks_by_dynamic_now`].
///
/// When `enabled` is false the filter is bypassed entirely. When `show_hidden`
/// is true the suppressed tasks are folded back onto the end of the visible
/// list so the caller can let a user peek at them, while `hidden_reason` is
/// kept so the suppression can still be surfaced as a notice. `current_hour`
/// falls back to the wall clock when absent.
pub fn apply_dynamic_now_filter<T: TimeSensitive>(
    tasks: &[T],
    enabled: bool,
    show_hidden: bool,
    current_hour_override: Option<u32>,
) -> FilterResult<'_, T> {
    if !enabled {
        return FilterResult::pass_through(tasks);
    }

    let hour = current_hour_override.unwrap_or_else(current_hour);
    let mut result = filter_tasks_by_dynamic_now(tasks, hour);

    if show_hidden && !result.hidden_tasks.is_empty() {
        result.visible_tasks.append(&mut result.hidden_tasks);
    }

    result
}
