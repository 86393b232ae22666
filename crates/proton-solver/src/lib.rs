//! # proton-solver
//!
//! Timetable engine for Proton.
//!
//! This crate provides:
//! - The placement checker (`checker`)
//! - Quota expansion into instances and placement units (`expand`)
//! - Backtracking timetable assembly with a reseeding driver (`assemble`)
//! - Calendar materialization for a school year (`materialize`)
//! - Substitute teacher ranking (`substitute`)
//! - The [`Proton`] service tying them to a rule store and school data
//!
//! ## Example
//!
//! ```rust
//! use proton_core::rules::MemoryRuleStore;
//! use proton_core::{Class, HourQuota, SchoolSnapshot, Subject, Teacher};
//! use proton_solver::{Proton, SolverConfig};
//!
//! let school = SchoolSnapshot::new()
//!     .with_teacher(Teacher::new("t1", "Ana"))
//!     .with_class(Class::new("1a").students(["s1"]))
//!     .with_subject(Subject::new("mat").teacher("t1").inherit_class("1a").quota(HourQuota::hours(2)));
//!
//! let proton = Proton::new(MemoryRuleStore::new(), school, SolverConfig::default())?;
//! let timetable = proton.assemble_timetable()?;
//! assert_eq!(timetable.len(), 2);
//! # Ok::<(), proton_core::ScheduleError>(())
//! ```

pub mod assemble;
pub mod checker;
pub mod expand;
pub mod materialize;
pub mod substitute;

use proton_core::{
    CalendarMeeting, MeetingId, Rule, RuleBook, RuleConfig, RuleStore, ScheduleError,
    SchoolCalendar, SchoolData, TeacherScore, Timetable,
};
use rand::Rng;
use tracing::info;

pub use assemble::{assemble, Side, SolverConfig};
pub use checker::{check, CheckContext, Conflict, ConflictReason, ConflictWith};
pub use expand::{expand, resolve_classes, Expansion, PlacementUnit};
pub use materialize::{materialize, validate};
pub use substitute::recommend;

/// Scheduling service over a rule store and the school's data
#[derive(Debug)]
pub struct Proton<S, D> {
    store: S,
    data: D,
    rules: RuleConfig,
    solver: SolverConfig,
}

impl<S: RuleStore, D: SchoolData> Proton<S, D> {
    /// Create the service, loading (or initializing) the rule config
    pub fn new(store: S, data: D, solver: SolverConfig) -> Result<Self, ScheduleError> {
        let rules = store.load()?;
        Ok(Self {
            store,
            data,
            rules,
            solver,
        })
    }

    pub fn config(&self) -> &RuleConfig {
        &self.rules
    }

    pub fn solver_config(&self) -> &SolverConfig {
        &self.solver
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    /// Replace and persist the whole rule config
    pub fn save_config(&mut self, config: RuleConfig) -> Result<(), ScheduleError> {
        self.store.save(&config)?;
        self.rules = config;
        Ok(())
    }

    /// Append and persist a rule, returning its id
    pub fn add_rule(&mut self, rule: Rule) -> Result<String, ScheduleError> {
        self.rules = self.store.add_rule(self.rules.clone(), rule)?;
        Ok(self
            .rules
            .rules
            .last()
            .map(|r| r.id.clone())
            .unwrap_or_default())
    }

    pub fn delete_rule(&mut self, id: &str) -> Result<(), ScheduleError> {
        self.rules = self.store.delete_rule(id)?;
        Ok(())
    }

    /// Compile the current rule config
    pub fn rule_book(&self) -> Result<RuleBook, ScheduleError> {
        RuleBook::compile(&self.rules)
    }

    /// Assemble a timetable using the configured seed
    pub fn assemble_timetable(&self) -> Result<Timetable, ScheduleError> {
        self.assemble_with(&mut self.solver.rng())
    }

    /// Assemble a timetable drawing randomness from `rng`
    pub fn assemble_with<R: Rng>(&self, rng: &mut R) -> Result<Timetable, ScheduleError> {
        let book = self.rule_book()?;
        let subjects = self.data.subjects()?;
        let classes = self.data.classes()?;
        let expansion = expand(&subjects, &classes, &book)?;
        info!(
            subjects = subjects.len(),
            instances = expansion.instances.len(),
            units = expansion.units.len(),
            "Assembling timetable"
        );
        let ctx = CheckContext::new(&subjects, &book);
        assemble(&expansion, &ctx, &self.solver, rng)
    }

    /// Date a timetable for the school year, numbering meetings after the
    /// last stored one
    pub fn materialize(
        &self,
        timetable: &Timetable,
        calendar: &SchoolCalendar,
    ) -> Result<Vec<CalendarMeeting>, ScheduleError> {
        let book = self.rule_book()?;
        let subjects = self.data.subjects()?;
        let classes = self.data.classes()?;
        let first_id = self.data.next_meeting_id()?;
        let ctx = CheckContext::new(&subjects, &book);
        materialize(timetable, &ctx, &self.solver, &classes, calendar, first_id)
    }

    /// Persist generated meetings through the meeting store
    pub fn publish(&mut self, meetings: &[CalendarMeeting]) -> Result<(), ScheduleError> {
        self.data.store_meetings(meetings)?;
        info!(meetings = meetings.len(), "Meetings published");
        Ok(())
    }

    pub fn recommend_substitutes(
        &self,
        meeting_id: MeetingId,
    ) -> Result<Vec<TeacherScore>, ScheduleError> {
        recommend(&self.data, meeting_id)
    }
}
