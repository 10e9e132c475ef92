//! Capacity-bounded sprint scheduling.
//!
//! Tickets are ordered with Kahn's algorithm, riskiest work first among the
//! ready set, then packed greedily into days of `daily_capacity_hours`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SchedulingConfig;
use crate::errors::ArchaiResult;
use crate::models::{Epic, FeasibilityStatus, SprintFeasibility, SprintPlanConfig};
use crate::planning::dag::{check_cycles, DependencyGraph, EpicOutcome};

const DAY_NAMES: [&str; 5] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"];
const EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleFlag {
    Oversized,
    BeyondSprint,
    BlockedByFailedEpic,
    DependencyCycle,
}

impl ScheduleFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleFlag::Oversized => "oversized",
            ScheduleFlag::BeyondSprint => "beyond_sprint",
            ScheduleFlag::BlockedByFailedEpic => "blocked_by_failed_epic",
            ScheduleFlag::DependencyCycle => "dependency_cycle",
        }
    }
}

/// One ticket's slot in the plan. Days are 1-based.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTicket {
    pub ticket_id: String,
    pub epic: String,
    pub effort_hours: f64,
    pub start_day: u32,
    pub end_day: u32,
    pub flags: Vec<ScheduleFlag>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledDay {
    pub day: u32,
    pub name: String,
    pub tickets: Vec<String>,
    pub total_hours: f64,
}

/// A ticket left out of the schedule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnscheduledTicket {
    pub ticket_id: String,
    pub epic: String,
    pub flag: ScheduleFlag,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SprintSchedule {
    /// Scheduled tickets in execution order.
    pub order: Vec<ScheduledTicket>,
    pub unscheduled: Vec<UnscheduledTicket>,
    pub days: Vec<ScheduledDay>,
    pub epic_outcomes: Vec<(String, EpicOutcome)>,
    pub cycles: Vec<Vec<String>>,
    pub daily_capacity_hours: f64,
    pub sprint_days: u32,
    pub utilization: f64,
    pub feasibility: SprintFeasibility,
}

impl SprintSchedule {
    pub fn slot(&self, ticket_id: &str) -> Option<&ScheduledTicket> {
        self.order.iter().find(|t| t.ticket_id == ticket_id)
    }

    /// Schedule flags of a ticket, scheduled or not.
    pub fn flags_for(&self, ticket_id: &str) -> Vec<ScheduleFlag> {
        if let Some(slot) = self.slot(ticket_id) {
            return slot.flags.clone();
        }
        self.unscheduled
            .iter()
            .filter(|u| u.ticket_id == ticket_id)
            .map(|u| u.flag)
            .collect()
    }

    pub fn is_aborted(&self, epic: &str) -> bool {
        self.epic_outcomes
            .iter()
            .any(|(name, outcome)| name == epic && outcome.is_aborted())
    }
}

pub fn day_name(day: u32) -> String {
    match DAY_NAMES.get(day.saturating_sub(1) as usize) {
        Some(name) => name.to_string(),
        None => format!("Day {day}"),
    }
}

/// Heap key for the ready set: riskier first, then more urgent, then the
/// smaller id.
#[derive(Debug, PartialEq, Eq)]
struct ReadyKey<'a> {
    risk_rank: u8,
    priority_rank: u8,
    ticket_id: &'a str,
    index: usize,
}

impl Ord for ReadyKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.risk_rank
            .cmp(&other.risk_rank)
            .then_with(|| other.priority_rank.cmp(&self.priority_rank))
            .then_with(|| other.ticket_id.cmp(self.ticket_id))
    }
}

impl PartialOrd for ReadyKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Kahn order over the tickets `include` admits.
fn topological_order(graph: &DependencyGraph<'_>, include: &[bool]) -> Vec<usize> {
    let key = |i: usize| {
        let ticket = graph.ticket(i);
        ReadyKey {
            risk_rank: ticket.risk_level.schedule_rank(),
            priority_rank: ticket.priority.rank(),
            ticket_id: ticket.ticket_id.as_str(),
            index: i,
        }
    };
    let mut in_degree: Vec<usize> = (0..graph.len())
        .map(|i| graph.dependencies(i).iter().filter(|&&d| include[d]).count())
        .collect();
    let mut ready: BinaryHeap<ReadyKey<'_>> = (0..graph.len())
        .filter(|&i| include[i] && in_degree[i] == 0)
        .map(key)
        .collect();

    let mut order = Vec::new();
    while let Some(next) = ready.pop() {
        order.push(next.index);
        for &dependent in graph.dependents(next.index) {
            if !include[dependent] {
                continue;
            }
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(key(dependent));
            }
        }
    }
    order
}

/// Greedy packing state.
struct DayCursor {
    capacity: f64,
    day: u32,
    remaining: f64,
    hours: Vec<f64>,
    tickets: Vec<Vec<String>>,
}

impl DayCursor {
    fn new(capacity: f64) -> Self {
        Self {
            capacity,
            day: 1,
            remaining: capacity,
            hours: Vec::new(),
            tickets: Vec::new(),
        }
    }

    fn book(&mut self, day: u32, hours: f64, ticket_id: &str) {
        let slot = day as usize - 1;
        if self.hours.len() <= slot {
            self.hours.resize(slot + 1, 0.0);
            self.tickets.resize(slot + 1, Vec::new());
        }
        self.hours[slot] += hours;
        self.tickets[slot].push(ticket_id.to_string());
    }

    fn next_day(&mut self) {
        self.day += 1;
        self.remaining = self.capacity;
    }

    /// Place `effort` hours; returns `(start, end, oversized)`.
    fn place(&mut self, effort: f64, ticket_id: &str) -> (u32, u32, bool) {
        if effort > self.capacity + EPSILON {
            if self.remaining < self.capacity - EPSILON {
                self.next_day();
            }
            let span = (effort / self.capacity - EPSILON).ceil().max(1.0) as u32;
            let start = self.day;
            let mut left = effort;
            for offset in 0..span {
                let booked = left.min(self.capacity);
                self.book(start + offset, booked, ticket_id);
                left -= booked;
            }
            self.day = start + span - 1;
            self.remaining = span as f64 * self.capacity - effort;
            if self.remaining <= EPSILON {
                self.next_day();
            }
            return (start, start + span - 1, true);
        }

        if effort > self.remaining + EPSILON {
            self.next_day();
        }
        let day = self.day;
        self.book(day, effort, ticket_id);
        self.remaining -= effort;
        (day, day, false)
    }
}

/// Tickets whose dependents would no longer fit if they slipped one day.
fn bottlenecks(
    graph: &DependencyGraph<'_>,
    order: &[usize],
    end_days: &[u32],
    plan: &SprintPlanConfig,
    capacity: f64,
) -> Vec<String> {
    order
        .iter()
        .zip(end_days)
        .filter_map(|(&i, &end_day)| {
            let waiting: f64 = graph
                .transitive_dependents(i)
                .iter()
                .filter(|d| order.contains(d))
                .map(|&d| graph.ticket(d).effort_hours)
                .sum();
            if waiting <= 0.0 {
                return None;
            }
            let after_slip = plan.days.saturating_sub(end_day + 1) as f64 * capacity;
            (waiting > after_slip + EPSILON).then(|| graph.ticket(i).ticket_id.clone())
        })
        .collect()
}

/// Order, pack and grade a set of epics.
///
/// Structural violations (unknown dependencies, duplicate ids, invalid
/// effort, an empty team or sprint) are errors. A dependency cycle only
/// aborts the epics it runs through.
pub fn build_schedule(
    epics: &[Epic],
    plan: &SprintPlanConfig,
    config: &SchedulingConfig,
) -> ArchaiResult<SprintSchedule> {
    let plan = SprintPlanConfig::new(plan.team_size, plan.days)?;
    let graph = DependencyGraph::build(epics)?;
    let cycles = check_cycles(&graph, epics.len());

    let include: Vec<bool> = (0..graph.len())
        .map(|i| !cycles.excludes(&graph, i))
        .collect();
    let order = topological_order(&graph, &include);

    let capacity = plan.daily_capacity_hours(config);
    let mut cursor = DayCursor::new(capacity);
    let mut scheduled = Vec::with_capacity(order.len());
    let mut end_days = Vec::with_capacity(order.len());
    for &i in &order {
        let ticket = graph.ticket(i);
        let (start_day, end_day, oversized) = cursor.place(ticket.effort_hours, &ticket.ticket_id);
        let mut flags = Vec::new();
        if oversized {
            flags.push(ScheduleFlag::Oversized);
        }
        if end_day > plan.days {
            flags.push(ScheduleFlag::BeyondSprint);
        }
        end_days.push(end_day);
        scheduled.push(ScheduledTicket {
            ticket_id: ticket.ticket_id.clone(),
            epic: epics[graph.epic_of(i)].name.clone(),
            effort_hours: ticket.effort_hours,
            start_day,
            end_day,
            flags,
        });
    }

    let mut unscheduled = Vec::new();
    for i in (0..graph.len()).filter(|&i| !include[i]) {
        let flag = if cycles.outcomes[graph.epic_of(i)].is_aborted() {
            ScheduleFlag::DependencyCycle
        } else {
            ScheduleFlag::BlockedByFailedEpic
        };
        unscheduled.push(UnscheduledTicket {
            ticket_id: graph.ticket(i).ticket_id.clone(),
            epic: epics[graph.epic_of(i)].name.clone(),
            flag,
        });
    }

    let day_count = (cursor.hours.len() as u32).max(plan.days);
    let days: Vec<ScheduledDay> = (1..=day_count)
        .map(|day| {
            let slot = day as usize - 1;
            ScheduledDay {
                day,
                name: day_name(day),
                tickets: cursor.tickets.get(slot).cloned().unwrap_or_default(),
                total_hours: cursor.hours.get(slot).copied().unwrap_or(0.0),
            }
        })
        .collect();

    let total_effort: f64 = scheduled.iter().map(|t| t.effort_hours).sum();
    let utilization = total_effort / plan.total_capacity_hours(config);
    let bottleneck_ids = bottlenecks(&graph, &order, &end_days, &plan, capacity);
    let epic_outcomes: Vec<(String, EpicOutcome)> = epics
        .iter()
        .map(|e| e.name.clone())
        .zip(cycles.outcomes.iter().cloned())
        .collect();

    let feasibility = assess_feasibility(
        &scheduled,
        &unscheduled,
        &epic_outcomes,
        utilization,
        bottleneck_ids,
        &plan,
        config,
    );
    info!(
        "Scheduled {} of {} tickets over {} days at {:.0}% utilization: {:?}",
        scheduled.len(),
        graph.len(),
        plan.days,
        utilization * 100.0,
        feasibility.status
    );

    Ok(SprintSchedule {
        order: scheduled,
        unscheduled,
        days,
        epic_outcomes,
        cycles: cycles.cycles,
        daily_capacity_hours: capacity,
        sprint_days: plan.days,
        utilization,
        feasibility,
    })
}

fn assess_feasibility(
    scheduled: &[ScheduledTicket],
    unscheduled: &[UnscheduledTicket],
    epic_outcomes: &[(String, EpicOutcome)],
    utilization: f64,
    bottlenecks: Vec<String>,
    plan: &SprintPlanConfig,
    config: &SchedulingConfig,
) -> SprintFeasibility {
    let beyond: Vec<&str> = scheduled
        .iter()
        .filter(|t| t.flags.contains(&ScheduleFlag::BeyondSprint))
        .map(|t| t.ticket_id.as_str())
        .collect();
    let oversized: Vec<&str> = scheduled
        .iter()
        .filter(|t| t.flags.contains(&ScheduleFlag::Oversized))
        .map(|t| t.ticket_id.as_str())
        .collect();
    let aborted: Vec<&str> = epic_outcomes
        .iter()
        .filter(|(_, outcome)| outcome.is_aborted())
        .map(|(name, _)| name.as_str())
        .collect();

    let mut reasons = Vec::new();
    if !beyond.is_empty() {
        reasons.push(format!(
            "{} ticket(s) end after day {}: {}",
            beyond.len(),
            plan.days,
            beyond.join(", ")
        ));
    }
    if !aborted.is_empty() {
        reasons.push(format!(
            "epic(s) aborted by dependency cycles: {} ({} ticket(s) unscheduled)",
            aborted.join(", "),
            unscheduled.len()
        ));
    }
    if !oversized.is_empty() {
        reasons.push(format!(
            "ticket(s) larger than one day's capacity: {}",
            oversized.join(", ")
        ));
    }
    if utilization > config.at_risk_utilization {
        reasons.push(format!(
            "utilization {:.0}% exceeds {:.0}%",
            utilization * 100.0,
            config.at_risk_utilization * 100.0
        ));
    }

    let status = if !beyond.is_empty() {
        FeasibilityStatus::Infeasible
    } else if !reasons.is_empty() {
        FeasibilityStatus::AtRisk
    } else {
        FeasibilityStatus::Feasible
    };
    if status != FeasibilityStatus::Feasible {
        warn!("Sprint plan {:?}: {}", status, reasons.join("; "));
    }

    let rationale = if reasons.is_empty() {
        format!(
            "{} ticket(s) fit within {} day(s) at {:.0}% utilization.",
            scheduled.len(),
            plan.days,
            utilization * 100.0
        )
    } else {
        format!("{}.", reasons.join("; "))
    };

    SprintFeasibility {
        status,
        rationale,
        bottlenecks,
    }
}
