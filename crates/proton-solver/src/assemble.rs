//! Timetable Assembly
//!
//! Bounded depth-first search placing every [`PlacementUnit`] of an
//! [`Expansion`] into the two-week rotation.
//!
//! # Algorithm
//!
//! Every level of the search owns an immutable [`Snapshot`] (pending units
//! plus placed instances) and a `(day, hour)` cursor. A level tries each
//! pending unit at every slot of its domain from the cursor forward:
//!
//! - a slot refused by the checker records the conflicting instance (never
//!   the `invalid` sentinel) and the scan moves on
//! - an accepted slot recurses with a new snapshot and the cursor moved to
//!   that slot
//! - a failed subtree whose conflicts name this unit keeps scanning; any
//!   other failure jumps straight back to the level that can fix it. A
//!   failure naming nobody ran out of slots behind the cursor and is blamed
//!   on the level directly above
//! - a unit with no legal slot at all makes the level fail, naming the unit
//!   and the collected conflicts
//!
//! The driver reruns the search with a reshuffled unit order until it
//! succeeds or [`SolverConfig::max_resets`] is used up.

use std::collections::HashMap;

use proton_core::{InstanceId, MeetingInstance, ScheduleError, Timetable, DAYS_PER_WEEK};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::checker::{check, CheckContext, Conflict};
use crate::expand::{Expansion, PlacementUnit};

// ============================================================================
// Configuration
// ============================================================================

/// Search budgets and slot layout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Placement attempts allowed per search run
    pub max_attempts: u64,
    /// Reshuffled reruns after the first run fails
    pub max_resets: u32,
    /// Seed of the random source driving reshuffles
    pub seed: u64,
    /// Last normal teaching period
    pub max_normal_hour: u8,
    /// First period of the after-class window
    pub after_class_first_hour: u8,
    /// Last period of the after-class window
    pub after_class_last_hour: u8,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 200_000,
            max_resets: 20,
            seed: 42,
            max_normal_hour: 7,
            after_class_first_hour: 8,
            after_class_last_hour: 10,
        }
    }
}

impl SolverConfig {
    /// Random source seeded from [`SolverConfig::seed`]
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }

    /// Candidate `(day, hour)` starts for a unit, in cursor order
    pub fn domain(&self, unit: &PlacementUnit, side: Side) -> Vec<(u8, u8)> {
        let hours = self.start_hours(unit.stacked, unit.outside_hours, side);
        (0..DAYS_PER_WEEK)
            .flat_map(|day| hours.iter().map(move |&hour| (day, hour)))
            .collect()
    }

    /// Hours a lesson may start at on any day.
    ///
    /// A stacked before/after-class lesson never goes before class: hour 0
    /// plus the next one would run into the first normal period.
    pub fn start_hours(&self, stacked: bool, outside_hours: bool, side: Side) -> Vec<u8> {
        if !outside_hours {
            return (1..=self.max_normal_hour).collect();
        }
        match side {
            Side::Before if !stacked => vec![0],
            _ => {
                let last = if stacked {
                    self.after_class_last_hour.saturating_sub(1)
                } else {
                    self.after_class_last_hour
                };
                (self.after_class_first_hour..=last).collect()
            }
        }
    }

    /// Whether `hour` is a legal start for the lesson on either side
    pub fn admits_start(&self, stacked: bool, outside_hours: bool, hour: u8) -> bool {
        [Side::Before, Side::After]
            .into_iter()
            .any(|side| self.start_hours(stacked, outside_hours, side).contains(&hour))
    }
}

/// Side of the school day a before/after-class unit goes to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Before,
    After,
}

// ============================================================================
// Search
// ============================================================================

/// Why a search run gave up
#[derive(Debug)]
enum Failure {
    Blocked {
        instance: InstanceId,
        reason: String,
        conflicts: Vec<InstanceId>,
    },
    Budget {
        attempts: u64,
    },
}

impl From<Failure> for ScheduleError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Blocked {
                instance,
                reason,
                conflicts,
            } => ScheduleError::Unplaceable {
                instance,
                reason,
                conflicts,
            },
            Failure::Budget { attempts } => ScheduleError::BudgetExhausted { attempts },
        }
    }
}

/// State of one search level
#[derive(Debug)]
struct Snapshot {
    pending: Vec<usize>,
    placed: Vec<MeetingInstance>,
}

impl Snapshot {
    /// Snapshot for the next level with the unit at `position` placed
    fn place(&self, position: usize, members: Vec<MeetingInstance>) -> Self {
        let mut pending = self.pending.clone();
        pending.remove(position);
        let mut placed = Vec::with_capacity(self.placed.len() + members.len());
        placed.extend_from_slice(&self.placed);
        placed.extend(members);
        Self { pending, placed }
    }
}

struct Search<'s, 'a> {
    ctx: &'s CheckContext<'a>,
    expansion: &'s Expansion,
    domains: Vec<Vec<(u8, u8)>>,
    attempts: u64,
    max_attempts: u64,
}

impl Search<'_, '_> {
    fn run(&mut self, order: &[usize]) -> Result<Vec<MeetingInstance>, Failure> {
        let root = Snapshot {
            pending: order.to_vec(),
            placed: Vec::new(),
        };
        self.descend(&root, (0, 0))
    }

    fn descend(
        &mut self,
        state: &Snapshot,
        cursor: (u8, u8),
    ) -> Result<Vec<MeetingInstance>, Failure> {
        if state.pending.is_empty() {
            return Ok(state.placed.clone());
        }

        let mut level_conflicts: Vec<InstanceId> = Vec::new();
        let mut last_blocked = (String::new(), String::new());

        for (position, &unit) in state.pending.iter().enumerate() {
            let mut insertable = false;
            let mut collisions: Vec<InstanceId> = Vec::new();
            let mut reason = String::from("no slot left at or after the cursor");

            for index in 0..self.domains[unit].len() {
                let (day, hour) = self.domains[unit][index];
                if (day, hour) < cursor {
                    continue;
                }
                self.tick()?;

                match self.try_unit(state, unit, day, hour) {
                    Err(conflict) => {
                        if let Some(id) = conflict.culprit() {
                            push_unique(&mut collisions, id);
                        }
                        reason = conflict.to_string();
                    }
                    Ok(members) => {
                        insertable = true;
                        let next = state.place(position, members);
                        match self.descend(&next, (day, hour)) {
                            Ok(done) => return Ok(done),
                            Err(Failure::Blocked { conflicts, .. })
                                if conflicts.is_empty() || self.owns(unit, &conflicts) =>
                            {
                                trace!(unit = %self.lead(unit), day, hour, "Subtree blocked, scanning on");
                            }
                            Err(failure) => return Err(failure),
                        }
                    }
                }
            }

            let instance = self.lead(unit).to_string();
            if !insertable {
                return Err(Failure::Blocked {
                    instance,
                    reason,
                    conflicts: collisions,
                });
            }
            for id in &collisions {
                push_unique(&mut level_conflicts, id);
            }
            last_blocked = (instance, reason);
        }

        let (instance, reason) = last_blocked;
        Err(Failure::Blocked {
            instance,
            reason: format!("every pending unit failed after the cursor ({reason})"),
            conflicts: level_conflicts,
        })
    }

    fn tick(&mut self) -> Result<(), Failure> {
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            return Err(Failure::Budget {
                attempts: self.max_attempts,
            });
        }
        Ok(())
    }

    /// Place every member of a unit at (day, hour) or report the first conflict
    fn try_unit(
        &self,
        state: &Snapshot,
        unit: usize,
        day: u8,
        hour: u8,
    ) -> Result<Vec<MeetingInstance>, Conflict> {
        let mut accepted: Vec<MeetingInstance> = Vec::new();
        for instance in self.expansion.members(unit) {
            let candidate = instance.placed_at(day, hour);
            check(&state.placed, &candidate, self.ctx)?;
            check(&accepted, &candidate, self.ctx)?;
            accepted.push(candidate);
        }
        Ok(accepted)
    }

    fn owns(&self, unit: usize, conflicts: &[InstanceId]) -> bool {
        self.expansion
            .members(unit)
            .any(|m| conflicts.iter().any(|c| *c == m.id))
    }

    fn lead(&self, unit: usize) -> &str {
        self.expansion
            .members(unit)
            .next()
            .map_or("", |m| m.id.as_str())
    }
}

fn push_unique(ids: &mut Vec<InstanceId>, id: &str) {
    if !ids.iter().any(|c| c == id) {
        ids.push(id.to_string());
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Assemble a timetable, reshuffling the unit order between failed runs.
///
/// Configuration errors never reach this point; every failure here is
/// retryable until the reset budget runs out, then [`ScheduleError::RetriesExhausted`]
/// carries the last one. A partial timetable is never returned.
pub fn assemble<R: Rng>(
    expansion: &Expansion,
    ctx: &CheckContext<'_>,
    config: &SolverConfig,
    rng: &mut R,
) -> Result<Timetable, ScheduleError> {
    let mut order: Vec<usize> = (0..expansion.units.len()).collect();
    let mut last_failure = ScheduleError::BudgetExhausted { attempts: 0 };

    for reset in 0..=config.max_resets {
        if reset > 0 {
            order.shuffle(&mut *rng);
        }
        let domains = expansion
            .units
            .iter()
            .map(|unit| {
                let side = if unit.outside_hours && rng.gen_bool(0.5) {
                    Side::After
                } else {
                    Side::Before
                };
                config.domain(unit, side)
            })
            .collect();

        let mut search = Search {
            ctx,
            expansion,
            domains,
            attempts: 0,
            max_attempts: config.max_attempts,
        };

        match search.run(&order) {
            Ok(mut instances) => {
                let rank: HashMap<&str, usize> = expansion
                    .instances
                    .iter()
                    .enumerate()
                    .map(|(i, m)| (m.id.as_str(), i))
                    .collect();
                instances.sort_by_key(|m| rank.get(m.id.as_str()).copied().unwrap_or(usize::MAX));
                info!(
                    instances = instances.len(),
                    resets = reset,
                    attempts = search.attempts,
                    "Timetable assembled"
                );
                return Ok(Timetable {
                    instances,
                    seed: config.seed,
                    resets: reset,
                    attempts: search.attempts,
                });
            }
            Err(failure) => {
                let error = ScheduleError::from(failure);
                debug!(reset, attempts = search.attempts, %error, "Assembly run failed");
                last_failure = error;
            }
        }
    }

    Err(ScheduleError::RetriesExhausted {
        resets: config.max_resets,
        last: Box::new(last_failure),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::expand;
    use pretty_assertions::assert_eq;
    use proton_core::{Class, HourQuota, Rule, RuleBook, RuleConfig, Subject};

    fn unit(stacked: bool, outside_hours: bool) -> PlacementUnit {
        PlacementUnit {
            members: vec![0],
            week: 0,
            stacked,
            outside_hours,
        }
    }

    #[test]
    fn normal_domain_covers_the_week() {
        let config = SolverConfig::default();
        let domain = config.domain(&unit(false, false), Side::Before);
        assert_eq!(domain.len(), 35);
        assert_eq!(domain.first(), Some(&(0, 1)));
        assert_eq!(domain.last(), Some(&(4, 7)));
    }

    #[test]
    fn outside_domains() {
        let config = SolverConfig::default();
        let before = config.domain(&unit(false, true), Side::Before);
        assert!(before.iter().all(|&(_, h)| h == 0));
        assert_eq!(before.len(), 5);

        let after = config.domain(&unit(false, true), Side::After);
        assert_eq!(&after[..3], &[(0, 8), (0, 9), (0, 10)]);

        let stacked_after = config.domain(&unit(true, true), Side::After);
        assert_eq!(&stacked_after[..2], &[(0, 8), (0, 9)]);
        assert_eq!(stacked_after.len(), 10);
    }

    #[test]
    fn stacked_outside_lesson_never_starts_before_class() {
        let config = SolverConfig::default();
        let before = config.domain(&unit(true, true), Side::Before);
        assert_eq!(before, config.domain(&unit(true, true), Side::After));
        assert!(before.iter().all(|&(_, h)| h > config.max_normal_hour));

        assert!(!config.admits_start(true, true, 0));
        assert!(config.admits_start(false, true, 0));
        assert!(!config.admits_start(true, true, 10));
        assert!(!config.admits_start(false, false, 0));
        assert!(config.admits_start(true, false, 7));
    }

    #[test]
    fn config_fills_missing_fields() {
        let config: SolverConfig = serde_json::from_str(r#"{ "max_resets": 3 }"#).unwrap();
        assert_eq!(config.max_resets, 3);
        assert_eq!(config.max_attempts, 200_000);
    }

    #[test]
    fn snapshots_are_not_mutated() {
        let root = Snapshot {
            pending: vec![0, 1, 2],
            placed: Vec::new(),
        };
        let next = root.place(1, Vec::new());
        assert_eq!(root.pending, vec![0, 1, 2]);
        assert_eq!(next.pending, vec![0, 2]);
    }

    #[test]
    fn cursor_keeps_levels_monotonic() {
        let subjects = vec![
            Subject::new("a").teacher("t1").inherit_class("1a").quota(HourQuota::hours(2)),
            Subject::new("b").teacher("t2").inherit_class("1a").quota(HourQuota::hours(2)),
        ];
        let classes = vec![Class::new("1a")];
        let rules = RuleBook::compile(&RuleConfig::new()).unwrap();
        let expansion = expand(&subjects, &classes, &rules).unwrap();
        let ctx = CheckContext::new(&subjects, &rules);
        let config = SolverConfig::default();

        let timetable = assemble(&expansion, &ctx, &config, &mut config.rng()).unwrap();
        let slot = |id: &str| timetable.get(id).and_then(|m| m.slot).map(|s| (s.day, s.hour));
        assert_eq!(slot("a#0"), Some((0, 1)));
        assert_eq!(slot("a#1"), Some((0, 1)));
        assert_eq!(slot("b#0"), Some((0, 2)));
        assert_eq!(slot("b#1"), Some((0, 2)));
        assert_eq!(timetable.resets, 0);
    }

    #[test]
    fn exhausted_budget_is_reported_through_resets() {
        let subjects = vec![Subject::new("a")
            .teacher("t1")
            .inherit_class("1a")
            .quota(HourQuota::hours(4))];
        let classes = vec![Class::new("1a")];
        let mut config = RuleConfig::new();
        config.add_rule(Rule::teacher_hours("t1", [0], [1]));
        let rules = RuleBook::compile(&config).unwrap();
        let expansion = expand(&subjects, &classes, &rules).unwrap();
        let ctx = CheckContext::new(&subjects, &rules);
        let solver = SolverConfig {
            max_attempts: 3,
            max_resets: 2,
            ..SolverConfig::default()
        };

        let err = assemble(&expansion, &ctx, &solver, &mut solver.rng()).unwrap_err();
        match err {
            ScheduleError::RetriesExhausted { resets, last } => {
                assert_eq!(resets, 2);
                assert!(last.is_retryable());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
