//! Day-by-day sprint simulation over a built schedule.

use std::collections::{BTreeSet, HashMap, VecDeque};

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SimulationConfig;
use crate::errors::{ArchaiError, ArchaiResult};
use crate::models::{Epic, ForecastStatus, Recommendation, RiskLevel, Ticket, TicketState};
use crate::planning::scheduler::{ScheduleFlag, SprintSchedule};
use crate::simulation::probability::{
    base_probability, effective_risk, forecast_status, weighted_mean,
};

const EPSILON: f64 = 1e-9;

/// Every ticket's state at the end of one simulated day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DaySnapshot {
    pub day: u32,
    pub remaining_capacity: f64,
    pub completed: Vec<String>,
    pub in_progress: Vec<String>,
    pub blocked: Vec<String>,
    pub at_risk: Vec<String>,
    pub states: IndexMap<String, TicketState>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TicketOutcome {
    pub ticket_id: String,
    pub epic: String,
    /// Level as planned, before any strict-mode mapping.
    pub risk_level: RiskLevel,
    pub effort_hours: f64,
    pub scheduled: bool,
    pub state: TicketState,
    pub started_day: Option<u32>,
    pub completed_day: Option<u32>,
    pub attempts: u32,
    pub probability: f64,
    /// Dependencies still open when the run ended.
    pub unmet_dependencies: Vec<String>,
    pub flags: Vec<ScheduleFlag>,
    pub rationale: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpicForecast {
    pub epic: String,
    pub effort_hours: f64,
    pub confidence: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    pub seed: u64,
    pub strict: bool,
    pub days: Vec<DaySnapshot>,
    /// Scheduled tickets in execution order, then unscheduled ones.
    pub tickets: Vec<TicketOutcome>,
    pub bottlenecks: Vec<String>,
    pub epics: Vec<EpicForecast>,
    pub confidence_score: f64,
    pub status: ForecastStatus,
}

impl SimulationRun {
    pub fn ticket(&self, ticket_id: &str) -> Option<&TicketOutcome> {
        self.tickets.iter().find(|t| t.ticket_id == ticket_id)
    }

    /// State of a ticket at the end of `day` (1-based).
    pub fn state_on(&self, ticket_id: &str, day: u32) -> Option<TicketState> {
        let snapshot = self.days.get(day.checked_sub(1)? as usize)?;
        snapshot.states.get(ticket_id).copied()
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

struct Live<'a> {
    ticket: &'a Ticket,
    epic: &'a str,
    /// Positions in the run order of this ticket's dependencies; `None` for
    /// a dependency that never made it into the schedule.
    dependencies: Vec<Option<usize>>,
    state: TicketState,
    remaining: f64,
    started_day: Option<u32>,
    completed_day: Option<u32>,
    attempts: u32,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn snapshot(day: u32, capacity: f64, live: &[Live<'_>]) -> DaySnapshot {
    let pick = |state: TicketState| -> Vec<String> {
        live.iter()
            .filter(|l| l.state == state)
            .map(|l| l.ticket.ticket_id.clone())
            .collect()
    };
    DaySnapshot {
        day,
        remaining_capacity: round_to(capacity.max(0.0), 2),
        completed: pick(TicketState::Completed),
        in_progress: pick(TicketState::InProgress),
        blocked: pick(TicketState::Blocked),
        at_risk: pick(TicketState::AtRisk),
        states: live
            .iter()
            .map(|l| (l.ticket.ticket_id.clone(), l.state))
            .collect(),
    }
}

/// Discount for where a ticket stood when the sprint ended.
fn end_state_factor(entry: &Live<'_>, config: &SimulationConfig) -> f64 {
    match entry.state {
        TicketState::Completed => 1.0,
        TicketState::AtRisk => 1.0 - config.rework_share.clamp(0.0, 1.0),
        _ => {
            let effort = entry.ticket.effort_hours;
            let remaining_share = if effort > EPSILON {
                (entry.remaining / effort).clamp(0.0, 1.0)
            } else {
                0.0
            };
            1.0 - config.unfinished_discount.clamp(0.0, 1.0) * remaining_share
        }
    }
}

fn dependencies_met(live: &[Live<'_>], k: usize) -> bool {
    live[k].dependencies.iter().all(|dep| match dep {
        Some(d) => live[*d].state == TicketState::Completed,
        None => false,
    })
}

/// Scheduled tickets whose transitive dependents carry more effort than the
/// configured share of the capacity left from the ticket's start day.
fn bottlenecks(
    live: &[Live<'_>],
    start_days: &[u32],
    days: u32,
    capacity: f64,
    config: &SimulationConfig,
) -> Vec<String> {
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); live.len()];
    for (k, l) in live.iter().enumerate() {
        for d in l.dependencies.iter().flatten() {
            dependents[*d].push(k);
        }
    }
    let mut found = Vec::new();
    for k in 0..live.len() {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<usize> = dependents[k].iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                queue.extend(dependents[next].iter().copied());
            }
        }
        if seen.is_empty() {
            continue;
        }
        let downstream: f64 = seen.iter().map(|&j| live[j].ticket.effort_hours).sum();
        let left = (days + 1).saturating_sub(start_days[k]) as f64 * capacity;
        if downstream > config.bottleneck_threshold_share * left + EPSILON {
            found.push(live[k].ticket.ticket_id.clone());
        }
    }
    found
}

fn describe(outcome: &TicketOutcome, effective: RiskLevel, base: f64) -> String {
    let mut parts = vec![format!(
        "{} risk, {:.1}h: base probability {:.2}",
        outcome.risk_level, outcome.effort_hours, base
    )];
    if effective != outcome.risk_level {
        parts.push(format!("planned as {effective} in strict mode"));
    }
    if !outcome.scheduled {
        let reason = outcome
            .flags
            .first()
            .map(|f| f.as_str())
            .unwrap_or("unscheduled");
        parts.push(format!("not scheduled ({reason})"));
        return parts.join("; ");
    }
    if !outcome.unmet_dependencies.is_empty() {
        parts.push(format!(
            "waits on {}",
            outcome.unmet_dependencies.join(", ")
        ));
    }
    if outcome.flags.contains(&ScheduleFlag::BeyondSprint) {
        parts.push("scheduled past the last sprint day".to_string());
    }
    parts.push(match (outcome.state, outcome.completed_day) {
        (TicketState::Completed, Some(day)) => format!("completed on day {day}"),
        (TicketState::AtRisk, _) => format!("needs rework after {} attempt(s)", outcome.attempts),
        (TicketState::Blocked, _) => "still blocked at sprint end".to_string(),
        (TicketState::InProgress, _) => "unfinished at sprint end".to_string(),
        _ => "not started".to_string(),
    });
    parts.join("; ")
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Walk the sprint day by day with a seeded generator. The same epics,
/// schedule, config and seed always yield the same run.
pub fn simulate(
    epics: &[Epic],
    schedule: &SprintSchedule,
    config: &SimulationConfig,
    strict: bool,
) -> ArchaiResult<SimulationRun> {
    let mut by_id: HashMap<&str, (&Ticket, &str)> = HashMap::new();
    for epic in epics {
        for ticket in &epic.tickets {
            by_id.insert(ticket.ticket_id.as_str(), (ticket, epic.name.as_str()));
        }
    }

    let position: HashMap<&str, usize> = schedule
        .order
        .iter()
        .enumerate()
        .map(|(k, slot)| (slot.ticket_id.as_str(), k))
        .collect();
    let mut live = Vec::with_capacity(schedule.order.len());
    for slot in &schedule.order {
        let (ticket, epic) = by_id.get(slot.ticket_id.as_str()).copied().ok_or_else(|| {
            ArchaiError::InvalidInput(format!(
                "scheduled ticket {} is not part of the plan",
                slot.ticket_id
            ))
        })?;
        live.push(Live {
            ticket,
            epic,
            dependencies: ticket
                .dependencies
                .iter()
                .map(|d| position.get(d.as_str()).copied())
                .collect(),
            state: TicketState::Pending,
            remaining: ticket.effort_hours,
            started_day: None,
            completed_day: None,
            attempts: 0,
        });
    }

    let effective: Vec<RiskLevel> = live
        .iter()
        .map(|l| effective_risk(l.ticket.risk_level, strict))
        .collect();
    let base: Vec<f64> = live
        .iter()
        .zip(&effective)
        .map(|(l, level)| base_probability(*level, l.ticket.effort_hours, config))
        .collect();

    let mut rng = StdRng::seed_from_u64(config.seed);
    let daily = schedule.daily_capacity_hours * config.velocity.max(0.0);
    let mut days = Vec::with_capacity(schedule.sprint_days as usize);
    for day in 1..=schedule.sprint_days {
        let mut capacity = daily;
        for k in 0..live.len() {
            if live[k].state == TicketState::Completed {
                continue;
            }
            if !dependencies_met(&live, k) {
                live[k].state = TicketState::Blocked;
                continue;
            }
            if capacity <= EPSILON && live[k].remaining > EPSILON {
                if live[k].state == TicketState::Blocked {
                    live[k].state = TicketState::Pending;
                }
                continue;
            }
            let entry = &mut live[k];
            let work = capacity.min(entry.remaining);
            capacity -= work;
            entry.remaining -= work;
            entry.started_day.get_or_insert(day);
            entry.state = TicketState::InProgress;
            if entry.remaining > EPSILON {
                continue;
            }
            entry.attempts += 1;
            let draw: f64 = rng.gen();
            if draw < base[k] {
                entry.state = TicketState::Completed;
                entry.completed_day = Some(day);
                entry.remaining = 0.0;
            } else {
                entry.state = TicketState::AtRisk;
                entry.remaining = entry.ticket.effort_hours * config.rework_share.max(0.0);
                debug!(
                    "Day {}: {} failed its completion draw, {:.1}h of rework queued",
                    day, entry.ticket.ticket_id, entry.remaining
                );
            }
        }
        days.push(snapshot(day, capacity, &live));
    }

    // Probabilities settle in run order so a dependency's final value is
    // known before its dependents read it.
    let mut probability = vec![0.0; live.len()];
    let mut tickets = Vec::with_capacity(by_id.len());
    for (k, l) in live.iter().enumerate() {
        let slot = &schedule.order[k];
        let mut p = base[k] * end_state_factor(l, config);
        let mut unmet = Vec::new();
        for (dep_id, dep) in l.ticket.dependencies.iter().zip(&l.dependencies) {
            match dep {
                Some(d) if live[*d].state == TicketState::Completed => {}
                Some(d) => {
                    p *= probability[*d];
                    unmet.push(dep_id.clone());
                }
                None => {
                    p = 0.0;
                    unmet.push(dep_id.clone());
                }
            }
        }
        if slot.flags.contains(&ScheduleFlag::BeyondSprint) {
            p *= config.beyond_sprint_factor;
        }
        probability[k] = p.clamp(0.0, 1.0);
        let mut outcome = TicketOutcome {
            ticket_id: l.ticket.ticket_id.clone(),
            epic: l.epic.to_string(),
            risk_level: l.ticket.risk_level,
            effort_hours: l.ticket.effort_hours,
            scheduled: true,
            state: l.state,
            started_day: l.started_day,
            completed_day: l.completed_day,
            attempts: l.attempts,
            probability: round_to(probability[k], 3),
            unmet_dependencies: unmet,
            flags: slot.flags.clone(),
            rationale: String::new(),
        };
        outcome.rationale = describe(&outcome, effective[k], base[k]);
        tickets.push(outcome);
    }
    for left_out in &schedule.unscheduled {
        let Some((ticket, epic)) = by_id.get(left_out.ticket_id.as_str()).copied() else {
            continue;
        };
        let level = effective_risk(ticket.risk_level, strict);
        let mut outcome = TicketOutcome {
            ticket_id: ticket.ticket_id.clone(),
            epic: epic.to_string(),
            risk_level: ticket.risk_level,
            effort_hours: ticket.effort_hours,
            scheduled: false,
            state: TicketState::Blocked,
            started_day: None,
            completed_day: None,
            attempts: 0,
            probability: 0.0,
            unmet_dependencies: ticket.dependencies.clone(),
            flags: vec![left_out.flag],
            rationale: String::new(),
        };
        outcome.rationale = describe(
            &outcome,
            level,
            base_probability(level, ticket.effort_hours, config),
        );
        tickets.push(outcome);
    }

    let start_days: Vec<u32> = live
        .iter()
        .zip(&schedule.order)
        .map(|(l, slot)| l.started_day.unwrap_or(slot.start_day))
        .collect();
    let bottleneck_ids = bottlenecks(&live, &start_days, schedule.sprint_days, daily, config);

    let epic_forecasts: Vec<EpicForecast> = epics
        .iter()
        .map(|epic| {
            let mine: Vec<&TicketOutcome> =
                tickets.iter().filter(|t| t.epic == epic.name).collect();
            let effort: f64 = mine.iter().map(|t| t.effort_hours).sum();
            let confidence = if schedule.is_aborted(&epic.name) {
                0.0
            } else {
                weighted_mean(mine.iter().map(|t| (t.effort_hours, t.probability))).unwrap_or(0.0)
            };
            EpicForecast {
                epic: epic.name.clone(),
                effort_hours: effort,
                confidence: round_to(confidence, 3),
            }
        })
        .collect();
    let confidence = weighted_mean(epic_forecasts.iter().map(|e| (e.effort_hours, e.confidence)))
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    let confidence_score = round_to(confidence, 3);
    let status = forecast_status(confidence_score, config);

    let completed = tickets
        .iter()
        .filter(|t| t.state == TicketState::Completed)
        .count();
    info!(
        "Simulated {} days (seed {}): {} of {} tickets completed, confidence {:.3} {:?}",
        schedule.sprint_days,
        config.seed,
        completed,
        tickets.len(),
        confidence_score,
        status
    );

    Ok(SimulationRun {
        seed: config.seed,
        strict,
        days,
        tickets,
        bottlenecks: bottleneck_ids,
        epics: epic_forecasts,
        confidence_score,
        status,
    })
}

/// Follow-up actions for the riskiest parts of a run.
pub fn recommendations(run: &SimulationRun, config: &SimulationConfig) -> Vec<Recommendation> {
    let mut out = Vec::new();
    for id in &run.bottlenecks {
        out.push(Recommendation {
            task: id.clone(),
            action: "Start early and staff it first; downstream work depends on it".to_string(),
        });
    }
    for ticket in &run.tickets {
        let action = if !ticket.scheduled {
            Some("Resolve the dependency cycle or the failed epic before planning this ticket".to_string())
        } else if ticket.flags.contains(&ScheduleFlag::BeyondSprint) {
            Some("Move to the next sprint or reduce scope; it does not fit the sprint".to_string())
        } else if ticket.state == TicketState::Blocked {
            Some(format!(
                "Unblock {} before the sprint starts",
                ticket.unmet_dependencies.join(", ")
            ))
        } else if ticket.probability < config.at_risk_confidence {
            Some(format!(
                "Split the work or add characterization tests; completion probability is {:.2}",
                ticket.probability
            ))
        } else {
            None
        };
        if let Some(action) = action {
            out.push(Recommendation {
                task: ticket.ticket_id.clone(),
                action,
            });
        }
    }
    out
}
