//! Ticket dependency graph: structural validation, cycle detection and the
//! epics a cycle takes down.

use std::collections::{BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{ArchaiError, ArchaiResult};
use crate::models::{Epic, Ticket};

/// Scheduling outcome of one epic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EpicOutcome {
    Scheduled,
    /// A dependency cycle runs through this epic; none of its tickets are
    /// scheduled.
    Aborted {
        reason: String,
        ticket_ids: Vec<String>,
    },
}

impl EpicOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self, EpicOutcome::Aborted { .. })
    }
}

/// Tickets of every epic with their dependency edges resolved to indexes.
#[derive(Debug)]
pub struct DependencyGraph<'a> {
    tickets: Vec<(usize, &'a Ticket)>,
    index_of: HashMap<&'a str, usize>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl<'a> DependencyGraph<'a> {
    /// Index every ticket. Duplicate ids, dependencies on ids that do not
    /// exist and non-positive or non-finite effort are fatal.
    pub fn build(epics: &'a [Epic]) -> ArchaiResult<Self> {
        let mut tickets = Vec::new();
        let mut index_of: HashMap<&'a str, usize> = HashMap::new();
        for (e, epic) in epics.iter().enumerate() {
            for ticket in &epic.tickets {
                if !(ticket.effort_hours.is_finite() && ticket.effort_hours > 0.0) {
                    return Err(ArchaiError::InvalidInput(format!(
                        "ticket {} has effort {} (must be a positive number of hours)",
                        ticket.ticket_id, ticket.effort_hours
                    )));
                }
                if index_of
                    .insert(ticket.ticket_id.as_str(), tickets.len())
                    .is_some()
                {
                    return Err(ArchaiError::InvalidInput(format!(
                        "duplicate ticket id {}",
                        ticket.ticket_id
                    )));
                }
                tickets.push((e, ticket));
            }
        }

        let mut dependencies = vec![Vec::new(); tickets.len()];
        let mut dependents = vec![Vec::new(); tickets.len()];
        for (i, (_, ticket)) in tickets.iter().enumerate() {
            for dependency in &ticket.dependencies {
                let Some(&d) = index_of.get(dependency.as_str()) else {
                    return Err(ArchaiError::UnknownDependency {
                        ticket_id: ticket.ticket_id.clone(),
                        dependency: dependency.clone(),
                    });
                };
                dependencies[i].push(d);
                dependents[d].push(i);
            }
        }
        for list in dependencies.iter_mut().chain(dependents.iter_mut()) {
            list.sort_by(|&a, &b| tickets[a].1.ticket_id.cmp(&tickets[b].1.ticket_id));
            list.dedup();
        }

        Ok(Self {
            tickets,
            index_of,
            dependencies,
            dependents,
        })
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub fn ticket(&self, index: usize) -> &'a Ticket {
        self.tickets[index].1
    }

    pub fn epic_of(&self, index: usize) -> usize {
        self.tickets[index].0
    }

    pub fn index_of(&self, ticket_id: &str) -> Option<usize> {
        self.index_of.get(ticket_id).copied()
    }

    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    pub fn dependents(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }

    /// Every ticket that waits on `index`, directly or through others.
    pub fn transitive_dependents(&self, index: usize) -> Vec<usize> {
        let mut seen = vec![false; self.len()];
        let mut queue: VecDeque<usize> = self.dependents[index].iter().copied().collect();
        let mut out = Vec::new();
        while let Some(current) = queue.pop_front() {
            if seen[current] || current == index {
                continue;
            }
            seen[current] = true;
            out.push(current);
            queue.extend(self.dependents[current].iter().copied());
        }
        out.sort_unstable();
        out
    }

    /// Dependency cycles found by an iterative three-colour DFS, each as the
    /// sorted ticket indexes on the cycle. Roots and children are visited in
    /// ticket-id order.
    pub fn find_cycles(&self) -> Vec<Vec<usize>> {
        const WHITE: u8 = 0;
        const GRAY: u8 = 1;
        const BLACK: u8 = 2;

        let mut roots: Vec<usize> = (0..self.len()).collect();
        roots.sort_by(|&a, &b| self.ticket(a).ticket_id.cmp(&self.ticket(b).ticket_id));

        let mut colour = vec![WHITE; self.len()];
        let mut seen_cycles: BTreeSet<Vec<usize>> = BTreeSet::new();
        let mut cycles = Vec::new();
        for root in roots {
            if colour[root] != WHITE {
                continue;
            }
            colour[root] = GRAY;
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            while let Some(frame) = stack.last_mut() {
                let (node, child) = *frame;
                let Some(&next) = self.dependencies[node].get(child) else {
                    colour[node] = BLACK;
                    stack.pop();
                    continue;
                };
                frame.1 += 1;
                match colour[next] {
                    WHITE => {
                        colour[next] = GRAY;
                        stack.push((next, 0));
                    }
                    GRAY => {
                        let start = stack.iter().position(|&(n, _)| n == next).unwrap_or(0);
                        let mut members: Vec<usize> = stack[start..].iter().map(|&(n, _)| n).collect();
                        members.sort_unstable();
                        if seen_cycles.insert(members.clone()) {
                            cycles.push(members);
                        }
                    }
                    _ => {}
                }
            }
        }
        cycles
    }
}

/// Which epics a set of cycles aborts and which surviving tickets are left
/// waiting on an aborted one.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Ticket ids of each cycle, sorted.
    pub cycles: Vec<Vec<String>>,
    pub outcomes: Vec<EpicOutcome>,
    /// Tickets in scheduled epics that depend, possibly transitively, on a
    /// ticket of an aborted epic.
    pub blocked_by_failed_epic: BTreeSet<usize>,
}

impl CycleReport {
    /// Whether ticket `index` is left out of the schedule.
    pub fn excludes(&self, graph: &DependencyGraph<'_>, index: usize) -> bool {
        self.outcomes[graph.epic_of(index)].is_aborted()
            || self.blocked_by_failed_epic.contains(&index)
    }
}

pub fn check_cycles(graph: &DependencyGraph<'_>, epic_count: usize) -> CycleReport {
    let mut report = CycleReport {
        outcomes: vec![EpicOutcome::Scheduled; epic_count],
        ..CycleReport::default()
    };

    for members in graph.find_cycles() {
        let ticket_ids: Vec<String> = {
            let mut ids: Vec<String> = members
                .iter()
                .map(|&i| graph.ticket(i).ticket_id.clone())
                .collect();
            ids.sort();
            ids
        };
        let error = ArchaiError::DependencyCycle {
            ticket_ids: ticket_ids.clone(),
        };
        warn!("{error}");
        let epics: BTreeSet<usize> = members.iter().map(|&i| graph.epic_of(i)).collect();
        for epic in epics {
            match &mut report.outcomes[epic] {
                EpicOutcome::Aborted {
                    reason,
                    ticket_ids: aborted_ids,
                } => {
                    reason.push_str("; ");
                    reason.push_str(&error.to_string());
                    aborted_ids.extend(ticket_ids.iter().cloned());
                    aborted_ids.sort();
                    aborted_ids.dedup();
                }
                outcome => {
                    *outcome = EpicOutcome::Aborted {
                        reason: error.to_string(),
                        ticket_ids: ticket_ids.clone(),
                    };
                }
            }
        }
        report.cycles.push(ticket_ids);
    }

    // Tickets downstream of an aborted epic cannot start either.
    for index in 0..graph.len() {
        if report.outcomes[graph.epic_of(index)].is_aborted() {
            for dependent in graph.transitive_dependents(index) {
                if !report.outcomes[graph.epic_of(dependent)].is_aborted() {
                    report.blocked_by_failed_epic.insert(dependent);
                }
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, RiskLevel};

    fn ticket(id: &str, effort: f64, deps: &[&str]) -> Ticket {
        Ticket {
            ticket_id: id.to_string(),
            title: format!("Work on {id}"),
            description: String::new(),
            priority: Priority::Medium,
            risk_flags: Vec::new(),
            risk_level: RiskLevel::Low,
            effort_hours: effort,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            subtasks: Vec::new(),
        }
    }

    fn epic(name: &str, tickets: Vec<Ticket>) -> Epic {
        Epic {
            name: name.to_string(),
            description: String::new(),
            tickets,
        }
    }

    #[test]
    fn test_two_ticket_cycle_names_both() {
        let epics = vec![epic(
            "Core",
            vec![ticket("A", 2.0, &["B"]), ticket("B", 2.0, &["A"])],
        )];
        let graph = DependencyGraph::build(&epics).unwrap();
        let report = check_cycles(&graph, epics.len());
        assert_eq!(report.cycles, vec![vec!["A".to_string(), "B".to_string()]]);
        assert!(report.outcomes[0].is_aborted());
        let EpicOutcome::Aborted { reason, .. } = &report.outcomes[0] else {
            panic!("epic should be aborted");
        };
        assert!(reason.contains("A, B"));
    }

    #[test]
    fn test_cycle_spares_sibling_epics_but_blocks_dependents() {
        let epics = vec![
            epic("Broken", vec![ticket("A", 2.0, &["B"]), ticket("B", 2.0, &["A"])]),
            epic("Fine", vec![ticket("C", 2.0, &[]), ticket("D", 2.0, &["A"])]),
            epic("Downstream", vec![ticket("E", 2.0, &["D"])]),
        ];
        let graph = DependencyGraph::build(&epics).unwrap();
        let report = check_cycles(&graph, epics.len());
        assert!(report.outcomes[0].is_aborted());
        assert_eq!(report.outcomes[1], EpicOutcome::Scheduled);
        assert_eq!(report.outcomes[2], EpicOutcome::Scheduled);
        let c = graph.index_of("C").unwrap();
        let d = graph.index_of("D").unwrap();
        let e = graph.index_of("E").unwrap();
        assert!(!report.excludes(&graph, c));
        assert!(report.excludes(&graph, d));
        assert!(report.excludes(&graph, e));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let epics = vec![epic("Solo", vec![ticket("A", 1.0, &["A"])])];
        let graph = DependencyGraph::build(&epics).unwrap();
        assert_eq!(graph.find_cycles(), vec![vec![0]]);
    }

    #[test]
    fn test_structural_violations_are_fatal() {
        let unknown = vec![epic("X", vec![ticket("A", 1.0, &["Z"])])];
        assert!(matches!(
            DependencyGraph::build(&unknown),
            Err(ArchaiError::UnknownDependency { .. })
        ));

        let duplicate = vec![
            epic("X", vec![ticket("A", 1.0, &[])]),
            epic("Y", vec![ticket("A", 1.0, &[])]),
        ];
        assert!(DependencyGraph::build(&duplicate).is_err());

        for effort in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let bad = vec![epic("X", vec![ticket("A", effort, &[])])];
            assert!(DependencyGraph::build(&bad).is_err());
        }
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let epics = vec![epic(
            "Core",
            vec![
                ticket("A", 1.0, &[]),
                ticket("B", 1.0, &["A"]),
                ticket("C", 1.0, &["A"]),
                ticket("D", 1.0, &["B", "C"]),
            ],
        )];
        let graph = DependencyGraph::build(&epics).unwrap();
        assert!(graph.find_cycles().is_empty());
        let a = graph.index_of("A").unwrap();
        assert_eq!(graph.transitive_dependents(a).len(), 3);
    }
}
