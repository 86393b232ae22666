//! # proton-core
//!
//! Core domain model and traits for the Proton timetable scheduler.
//!
//! This crate provides:
//! - Domain types: `Subject`, `Class`, `Teacher`, `MeetingInstance`, `Slot`,
//!   `Timetable`, `CalendarMeeting`, `TeacherScore`
//! - Collaborator traits: `SubjectRoster`, `ClassRoster`, `TeacherDirectory`,
//!   `MeetingStore`
//! - The versioned rule configuration and its stores (`rules`)
//! - An in-memory school snapshot implementing every collaborator (`school`)
//! - Error types
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use proton_core::{Class, HourQuota, Subject};
//!
//! let class = Class::new("1a")
//!     .students(["s1", "s2"])
//!     .last_school_date(NaiveDate::from_ymd_opt(2026, 6, 24).unwrap());
//! let maths = Subject::new("maths")
//!     .teacher("t1")
//!     .inherit_class("1a")
//!     .quota(HourQuota::new(4, false));
//!
//! assert!(maths.inherits_class());
//! assert_eq!(class.students.len(), 2);
//! ```

pub mod rules;
pub mod school;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

pub use rules::{
    Availability, ObjectKind, Rule, RuleBook, RuleConfig, RuleKind, RuleObject, RuleStore,
    RuleStoreError,
};
pub use school::SchoolSnapshot;

// ============================================================================
// Type Aliases
// ============================================================================

/// Unique identifier for a subject
pub type SubjectId = String;

/// Unique identifier for a class
pub type ClassId = String;

/// Unique identifier for a teacher
pub type TeacherId = String;

/// Unique identifier for a student
pub type StudentId = String;

/// Unique identifier for a meeting instance during assembly
pub type InstanceId = String;

/// Identifier of a dated meeting in the meeting store
pub type MeetingId = u64;

/// Number of teaching days in a week (Monday to Friday)
pub const DAYS_PER_WEEK: u8 = 5;

/// Number of weeks in the alternating rotation
pub const WEEKS_IN_ROTATION: u8 = 2;

// ============================================================================
// Hour Quota
// ============================================================================

/// Weekly teaching quota: whole hours plus an optional half hour.
///
/// Serialized as a plain number (`2`, `2.5`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct HourQuota {
    pub whole: u32,
    pub half: bool,
}

impl HourQuota {
    pub const fn new(whole: u32, half: bool) -> Self {
        Self { whole, half }
    }

    pub const fn hours(whole: u32) -> Self {
        Self { whole, half: false }
    }

    pub fn as_hours(&self) -> f64 {
        f64::from(self.whole) + if self.half { 0.5 } else { 0.0 }
    }
}

impl TryFrom<f64> for HourQuota {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("hour quota must be a non-negative number, got {value}"));
        }
        if value >= f64::from(u32::MAX) + 1.0 {
            return Err(format!("hour quota {value} is too large"));
        }
        let whole = value.trunc();
        let fraction = value - whole;
        let half = if fraction == 0.0 {
            false
        } else if (fraction - 0.5).abs() < f64::EPSILON {
            true
        } else {
            return Err(format!("hour quota may only carry a .5 fraction, got {value}"));
        };
        Ok(Self {
            whole: whole as u32,
            half,
        })
    }
}

impl From<HourQuota> for f64 {
    fn from(quota: HourQuota) -> Self {
        quota.as_hours()
    }
}

impl std::fmt::Display for HourQuota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.half {
            write!(f, "{}.5h", self.whole)
        } else {
            write!(f, "{}h", self.whole)
        }
    }
}

// ============================================================================
// Subject, Class, Teacher
// ============================================================================

/// A taught subject with its weekly quota
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// Unique identifier
    pub id: SubjectId,
    /// Short display name
    pub name: String,
    /// Long name, shared by the same subject taught to different groups
    #[serde(default)]
    pub long_name: String,
    /// Owning teacher
    pub teacher_id: TeacherId,
    /// Class whose roster this subject inherits
    #[serde(default)]
    pub class_id: Option<ClassId>,
    /// Explicit roster, used when no class is inherited
    #[serde(default)]
    pub students: Vec<StudentId>,
    /// Weekly hours
    pub quota: HourQuota,
    /// Classroom or location tag
    #[serde(default)]
    pub location: String,
}

impl Subject {
    /// Create a new subject with the given ID
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            long_name: id.clone(),
            id,
            teacher_id: String::new(),
            class_id: None,
            students: Vec::new(),
            quota: HourQuota::default(),
            location: String::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn long_name(mut self, long_name: impl Into<String>) -> Self {
        self.long_name = long_name.into();
        self
    }

    pub fn teacher(mut self, teacher: impl Into<String>) -> Self {
        self.teacher_id = teacher.into();
        self
    }

    /// Inherit the roster of a class
    pub fn inherit_class(mut self, class: impl Into<String>) -> Self {
        self.class_id = Some(class.into());
        self
    }

    /// Use an explicit student roster
    pub fn students<I, S>(mut self, students: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.students = students.into_iter().map(Into::into).collect();
        self
    }

    pub fn quota(mut self, quota: HourQuota) -> Self {
        self.quota = quota;
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn inherits_class(&self) -> bool {
        self.class_id.is_some()
    }
}

/// A class (form) of students
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    #[serde(default)]
    pub students: Vec<StudentId>,
    /// Last teaching day of the academic year for this class
    pub last_school_date: NaiveDate,
}

impl Class {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            students: Vec::new(),
            last_school_date: NaiveDate::MAX,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn students<I, S>(mut self, students: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.students = students.into_iter().map(Into::into).collect();
        self
    }

    pub fn last_school_date(mut self, date: NaiveDate) -> Self {
        self.last_school_date = date;
        self
    }
}

/// A teacher
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: TeacherId,
    pub name: String,
}

impl Teacher {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

// ============================================================================
// Slots and Instances
// ============================================================================

/// A (day, hour, week) coordinate in the two-week rotation.
///
/// Days run 0 (Monday) to 4 (Friday). Hour 0 is the slot before the first
/// period; normal periods start at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    pub week: u8,
    pub day: u8,
    pub hour: u8,
}

impl Slot {
    pub const fn new(day: u8, hour: u8, week: u8) -> Self {
        Self { week, day, hour }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const DAYS: [&str; 5] = ["Mon", "Tue", "Wed", "Thu", "Fri"];
        let day = DAYS.get(self.day as usize).copied().unwrap_or("???");
        write!(f, "w{} {} h{}", self.week, day, self.hour)
    }
}

/// One atomic teaching occurrence that needs a slot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeetingInstance {
    pub id: InstanceId,
    pub subject_id: SubjectId,
    pub subject_name: String,
    pub teacher_id: TeacherId,
    /// Classes whose students attend this instance
    pub class_ids: Vec<ClassId>,
    /// Week parity (0 or 1)
    pub week: u8,
    /// Links the week-0 and week-1 occurrences of the same logical lesson
    pub common_id: Option<String>,
    pub half_hour: bool,
    /// Occupies `hour` and `hour + 1`
    pub stacked: bool,
    /// Scheduled before the first or after the last normal period
    pub outside_hours: bool,
    /// Assigned slot, `None` until placed
    pub slot: Option<Slot>,
}

impl MeetingInstance {
    /// Return a copy of this instance placed at the given day and hour
    pub fn placed_at(&self, day: u8, hour: u8) -> Self {
        Self {
            slot: Some(Slot::new(day, hour, self.week)),
            ..self.clone()
        }
    }

    pub fn is_placed(&self) -> bool {
        self.slot.is_some()
    }

    /// Hours occupied by this instance, empty when unplaced
    pub fn hours(&self) -> Vec<u8> {
        match self.slot {
            Some(slot) if self.stacked => vec![slot.hour, slot.hour + 1],
            Some(slot) => vec![slot.hour],
            None => Vec::new(),
        }
    }
}

// ============================================================================
// Timetable (Result)
// ============================================================================

/// The abstract (non-dated) result of an assembly
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Timetable {
    /// Every instance, each with an assigned slot
    pub instances: Vec<MeetingInstance>,
    /// Seed of the random source the successful attempt started from
    pub seed: u64,
    /// Number of resets the driver needed before succeeding
    pub resets: u32,
    /// Placement attempts spent by the successful search run
    pub attempts: u64,
}

impl Timetable {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&MeetingInstance> {
        self.instances.iter().find(|m| m.id == id)
    }

    /// Instances attended by the given class
    pub fn for_class(&self, class_id: &str) -> Vec<&MeetingInstance> {
        self.instances
            .iter()
            .filter(|m| m.class_ids.iter().any(|c| c == class_id))
            .collect()
    }

    /// Free periods of a class that have a later lesson on the same day.
    ///
    /// Hour 0 (before class) never counts as a hole.
    pub fn holes(&self, class_id: &str) -> Vec<Slot> {
        let mut holes = Vec::new();
        for week in 0..WEEKS_IN_ROTATION {
            for day in 0..DAYS_PER_WEEK {
                let occupied: BTreeSet<u8> = self
                    .for_class(class_id)
                    .into_iter()
                    .filter(|m| m.slot.is_some_and(|s| s.week == week && s.day == day))
                    .flat_map(|m| m.hours())
                    .collect();
                let Some(&last) = occupied.iter().next_back() else {
                    continue;
                };
                holes.extend(
                    (1..last)
                        .filter(|hour| !occupied.contains(hour))
                        .map(|hour| Slot::new(day, hour, week)),
                );
            }
        }
        holes
    }
}

// ============================================================================
// Calendar
// ============================================================================

/// Vacation range (inclusive)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Holiday {
    pub fn new(name: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// School-year calendar used to date an abstract timetable
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolCalendar {
    /// Calendar year in which the school year starts (September 1)
    pub year: i32,
    /// Single school-free days
    #[serde(default)]
    pub school_free_days: Vec<NaiveDate>,
    /// School-free ranges
    #[serde(default)]
    pub vacations: Vec<Holiday>,
}

impl SchoolCalendar {
    pub fn for_year(year: i32) -> Self {
        Self {
            year,
            school_free_days: Vec::new(),
            vacations: Vec::new(),
        }
    }

    pub fn free_day(mut self, date: NaiveDate) -> Self {
        self.school_free_days.push(date);
        self
    }

    pub fn vacation(mut self, holiday: Holiday) -> Self {
        self.vacations.push(holiday);
        self
    }

    /// Check if no lessons take place on a date
    pub fn is_school_free(&self, date: NaiveDate) -> bool {
        self.school_free_days.contains(&date) || self.vacations.iter().any(|h| h.contains(date))
    }

    /// September 1 of `year`, moved forward to Monday when it is a weekend
    pub fn first_school_day(&self) -> Option<NaiveDate> {
        let first = NaiveDate::from_ymd_opt(self.year, 9, 1)?;
        Some(match first.weekday() {
            Weekday::Sat => first + chrono::Duration::days(2),
            Weekday::Sun => first + chrono::Duration::days(1),
            _ => first,
        })
    }
}

impl Default for SchoolCalendar {
    fn default() -> Self {
        Self::for_year(2025)
    }
}

/// A dated, concrete teaching event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarMeeting {
    pub id: MeetingId,
    pub name: String,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    pub hour: u8,
    pub date: NaiveDate,
    #[serde(default)]
    pub location: String,
    /// Produced by the scheduler rather than entered by hand
    #[serde(default)]
    pub generated: bool,
}

// ============================================================================
// Substitutes
// ============================================================================

/// Components of a substitute candidate's tier score
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierGrading {
    pub has_meeting_before: bool,
    pub has_meeting_after: bool,
    pub has_meeting_two_before: bool,
    pub has_meeting_two_after: bool,
    pub teaches_same_subject: bool,
}

impl TierGrading {
    pub fn tier(&self) -> u32 {
        let mut tier = 0;
        if self.teaches_same_subject {
            tier += 5;
        }
        if self.has_meeting_before {
            tier += 3;
        }
        if self.has_meeting_after {
            tier += 3;
        }
        if self.has_meeting_two_before {
            tier += 1;
        }
        if self.has_meeting_two_after {
            tier += 1;
        }
        tier
    }
}

/// A ranked substitute candidate
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherScore {
    pub teacher_id: TeacherId,
    pub name: String,
    pub tier: u32,
    pub grading: TierGrading,
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Read access to subjects
pub trait SubjectRoster {
    fn subjects(&self) -> Result<Vec<Subject>, DataError>;

    fn subject(&self, id: &str) -> Result<Subject, DataError>;

    fn subjects_for_teacher(&self, teacher_id: &str) -> Result<Vec<Subject>, DataError>;

    /// Subjects sharing a long name
    fn subjects_with_long_name(&self, long_name: &str) -> Result<Vec<Subject>, DataError>;
}

/// Read access to classes
pub trait ClassRoster {
    fn classes(&self) -> Result<Vec<Class>, DataError>;

    fn class(&self, id: &str) -> Result<Class, DataError>;
}

/// Read access to teachers
pub trait TeacherDirectory {
    fn teachers(&self) -> Result<Vec<Teacher>, DataError>;
}

/// Dated meetings owned by the surrounding system
pub trait MeetingStore {
    fn meeting(&self, id: MeetingId) -> Result<CalendarMeeting, DataError>;

    fn meetings_for_teacher_on(
        &self,
        teacher_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<CalendarMeeting>, DataError>;

    /// First identifier not used by any stored meeting
    fn next_meeting_id(&self) -> Result<MeetingId, DataError>;

    fn store_meetings(&mut self, meetings: &[CalendarMeeting]) -> Result<(), DataError>;
}

/// Everything the scheduler reads from the surrounding system
pub trait SchoolData: SubjectRoster + ClassRoster + TeacherDirectory + MeetingStore {}

impl<T: SubjectRoster + ClassRoster + TeacherDirectory + MeetingStore> SchoolData for T {}

// ============================================================================
// Errors
// ============================================================================

/// Failure reading or writing collaborator data
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Subject not found: {0}")]
    SubjectNotFound(SubjectId),

    #[error("Class not found: {0}")]
    ClassNotFound(ClassId),

    #[error("Meeting not found: {0}")]
    MeetingNotFound(MeetingId),

    #[error("Data source unavailable: {0}")]
    Unavailable(String),
}

/// Scheduling error
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Subject group {group:?} mixes quotas: {first} vs {second}")]
    GroupQuotaMismatch {
        group: Vec<SubjectId>,
        first: HourQuota,
        second: HourQuota,
    },

    #[error("Malformed rule '{rule}': {reason}")]
    MalformedRule { rule: String, reason: String },

    #[error("Unknown subject referenced by instance: {0}")]
    UnknownSubject(SubjectId),

    #[error("Instance {instance} cannot be placed: {reason} (conflicts: {conflicts:?})")]
    Unplaceable {
        instance: InstanceId,
        reason: String,
        conflicts: Vec<InstanceId>,
    },

    #[error("Search budget exhausted after {attempts} placement attempts")]
    BudgetExhausted { attempts: u64 },

    #[error("No timetable found after {resets} resets; last failure: {last}")]
    RetriesExhausted {
        resets: u32,
        last: Box<ScheduleError>,
    },

    #[error("Timetable invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    RuleStore(#[from] RuleStoreError),
}

impl ScheduleError {
    /// Whether a reseeded retry might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScheduleError::Unplaceable { .. } | ScheduleError::BudgetExhausted { .. }
        )
    }

    /// Whether the rule configuration or subject catalogue is at fault
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ScheduleError::GroupQuotaMismatch { .. }
                | ScheduleError::MalformedRule { .. }
                | ScheduleError::UnknownSubject(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn placed(id: &str, class: &str, day: u8, hour: u8, week: u8) -> MeetingInstance {
        MeetingInstance {
            id: id.into(),
            subject_id: id.into(),
            subject_name: id.into(),
            teacher_id: "t".into(),
            class_ids: vec![class.into()],
            week,
            common_id: None,
            half_hour: false,
            stacked: false,
            outside_hours: false,
            slot: None,
        }
        .placed_at(day, hour)
    }

    #[test]
    fn quota_parses_halves() {
        assert_eq!(HourQuota::try_from(2.5).unwrap(), HourQuota::new(2, true));
        assert_eq!(HourQuota::try_from(3.0).unwrap(), HourQuota::hours(3));
        assert!(HourQuota::try_from(1.25).is_err());
        assert!(HourQuota::try_from(-1.0).is_err());
    }

    #[test]
    fn oversized_quota_is_rejected() {
        assert_eq!(
            HourQuota::try_from(f64::from(u32::MAX)).unwrap(),
            HourQuota::hours(u32::MAX)
        );
        assert!(HourQuota::try_from(f64::from(u32::MAX) + 1.0).is_err());
        assert!(HourQuota::try_from(1e12).is_err());

        let json = r#"{ "id": "x", "name": "x", "teacher_id": "t1", "quota": 5000000000 }"#;
        assert!(serde_json::from_str::<Subject>(json).is_err());
    }

    #[test]
    fn quota_serializes_as_number() {
        let subject = Subject::new("bio").teacher("t1").quota(HourQuota::new(1, true));
        let json = serde_json::to_value(&subject).unwrap();
        assert_eq!(json["quota"], serde_json::json!(1.5));

        let back: Subject = serde_json::from_value(json).unwrap();
        assert_eq!(back.quota, HourQuota::new(1, true));
    }

    #[test]
    fn subject_builder() {
        let subject = Subject::new("chem")
            .name("CHE")
            .long_name("Chemistry")
            .teacher("t2")
            .students(["s1", "s2"])
            .location("Lab 2");

        assert_eq!(subject.name, "CHE");
        assert_eq!(subject.long_name, "Chemistry");
        assert!(!subject.inherits_class());
        assert_eq!(subject.students, vec!["s1", "s2"]);
    }

    #[test]
    fn stacked_instance_occupies_two_hours() {
        let mut instance = placed("a", "1a", 0, 3, 0);
        assert_eq!(instance.hours(), vec![3]);
        instance.stacked = true;
        assert_eq!(instance.hours(), vec![3, 4]);
    }

    #[test]
    fn first_school_day_skips_weekend() {
        // 2024-09-01 is a Sunday
        assert_eq!(
            SchoolCalendar::for_year(2024).first_school_day(),
            Some(date(2024, 9, 2))
        );
        // 2029-09-01 is a Saturday
        assert_eq!(
            SchoolCalendar::for_year(2029).first_school_day(),
            Some(date(2029, 9, 3))
        );
        // 2025-09-01 is a Monday
        assert_eq!(
            SchoolCalendar::for_year(2025).first_school_day(),
            Some(date(2025, 9, 1))
        );
    }

    #[test]
    fn vacation_days_are_school_free() {
        let calendar = SchoolCalendar::for_year(2025)
            .free_day(date(2025, 10, 31))
            .vacation(Holiday::new("Winter", date(2025, 12, 24), date(2026, 1, 2)));

        assert!(calendar.is_school_free(date(2025, 10, 31)));
        assert!(calendar.is_school_free(date(2025, 12, 24)));
        assert!(calendar.is_school_free(date(2026, 1, 2)));
        assert!(!calendar.is_school_free(date(2026, 1, 5)));
    }

    #[test]
    fn holes_are_gaps_before_a_later_lesson() {
        let timetable = Timetable {
            instances: vec![
                placed("a", "1a", 0, 1, 0),
                placed("b", "1a", 0, 4, 0),
                placed("c", "1b", 0, 2, 0),
                placed("d", "1a", 1, 0, 0),
            ],
            ..Timetable::default()
        };

        assert_eq!(
            timetable.holes("1a"),
            vec![Slot::new(0, 2, 0), Slot::new(0, 3, 0)]
        );
        assert!(timetable.holes("1b").is_empty());
        assert_eq!(timetable.for_class("1a").len(), 3);
    }

    #[test]
    fn tier_grading_weights() {
        let grading = TierGrading {
            has_meeting_before: true,
            has_meeting_two_after: true,
            teaches_same_subject: true,
            ..TierGrading::default()
        };
        assert_eq!(grading.tier(), 9);
    }

    #[test]
    fn error_classification() {
        let infeasible = ScheduleError::Unplaceable {
            instance: "x".into(),
            reason: "no slot".into(),
            conflicts: vec![],
        };
        assert!(infeasible.is_retryable());
        assert!(!infeasible.is_configuration());

        let config = ScheduleError::MalformedRule {
            rule: "r".into(),
            reason: "bad day".into(),
        };
        assert!(config.is_configuration());
        assert!(!config.is_retryable());
    }
}
