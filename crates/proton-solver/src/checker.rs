//! Placement Checker
//!
//! Decides whether a candidate instance fits at its slot next to the
//! instances already placed, and names what is in the way when it does not.
//!
//! Checks run in this order for every placed instance overlapping the
//! candidate's hours:
//! 1. same subject at the same time
//! 2. shared students, tolerated only inside a subject group
//! 3. same teacher
//!
//! After the scan, two whole-day checks follow: at most
//! [`MAX_SUBJECT_LESSONS_PER_DAY`] lessons of a subject per day (a stacked
//! lesson counts once), and teacher
//! availability for the candidate (or, when it joined a group, for every
//! subject of that group).

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use proton_core::{InstanceId, MeetingInstance, RuleBook, Subject, SubjectId};

/// Lessons of one subject allowed on a single day of a week
pub const MAX_SUBJECT_LESSONS_PER_DAY: usize = 2;

/// What a failed check collided with
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictWith {
    /// A specific placed instance; moving it could free the slot
    Instance(InstanceId),
    /// The slot is unusable no matter what else moves
    Invalid,
}

/// Why a placement was refused
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictReason {
    SameSubject,
    SharedStudents,
    SameTeacher,
    DailyCap { lessons: usize },
    TeacherUnavailable { subject_id: SubjectId },
    Unplaced,
}

/// A refused placement
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    pub with: ConflictWith,
    pub reason: ConflictReason,
}

impl Conflict {
    fn instance(id: &str, reason: ConflictReason) -> Self {
        Self {
            with: ConflictWith::Instance(id.to_string()),
            reason,
        }
    }

    fn invalid(reason: ConflictReason) -> Self {
        Self {
            with: ConflictWith::Invalid,
            reason,
        }
    }

    /// The placed instance responsible, if any
    pub fn culprit(&self) -> Option<&str> {
        match &self.with {
            ConflictWith::Instance(id) => Some(id),
            ConflictWith::Invalid => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.with == ConflictWith::Invalid
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let with = match &self.with {
            ConflictWith::Instance(id) => format!(" with {id}"),
            ConflictWith::Invalid => String::new(),
        };
        match &self.reason {
            ConflictReason::SameSubject => write!(f, "same subject already taught{with}"),
            ConflictReason::SharedStudents => write!(f, "students already busy{with}"),
            ConflictReason::SameTeacher => write!(f, "teacher already busy{with}"),
            ConflictReason::DailyCap { lessons } => {
                write!(f, "subject would have {lessons} lessons on one day")
            }
            ConflictReason::TeacherUnavailable { subject_id } => {
                write!(f, "teacher of {subject_id} unavailable")
            }
            ConflictReason::Unplaced => write!(f, "instance has no slot"),
        }
    }
}

/// Read-only lookups shared by every check of an assembly
#[derive(Debug)]
pub struct CheckContext<'a> {
    subjects: HashMap<&'a str, &'a Subject>,
    rules: &'a RuleBook,
}

impl<'a> CheckContext<'a> {
    pub fn new(subjects: &'a [Subject], rules: &'a RuleBook) -> Self {
        Self {
            subjects: subjects.iter().map(|s| (s.id.as_str(), s)).collect(),
            rules,
        }
    }

    pub fn subject(&self, id: &str) -> Option<&'a Subject> {
        self.subjects.get(id).copied()
    }

    pub fn rules(&self) -> &'a RuleBook {
        self.rules
    }

    /// Both subjects inherit the same class roster
    fn inherit_same_class(&self, a: &str, b: &str) -> bool {
        match (self.subject(a), self.subject(b)) {
            (Some(a), Some(b)) => a.class_id.is_some() && a.class_id == b.class_id,
            _ => false,
        }
    }
}

/// Check a placed candidate against the instances already placed.
///
/// `placed` may contain the candidate itself; it is skipped by id.
pub fn check(
    placed: &[MeetingInstance],
    candidate: &MeetingInstance,
    ctx: &CheckContext<'_>,
) -> Result<(), Conflict> {
    let Some(slot) = candidate.slot else {
        return Err(Conflict::invalid(ConflictReason::Unplaced));
    };
    let hours = candidate.hours();
    let mut lessons_today = 1;
    let mut group: BTreeSet<&str> = BTreeSet::new();

    for other in placed {
        if other.id == candidate.id {
            continue;
        }
        let Some(other_slot) = other.slot else {
            continue;
        };
        if other_slot.week != slot.week || other_slot.day != slot.day {
            continue;
        }
        let other_hours = other.hours();
        if other.subject_id == candidate.subject_id {
            lessons_today += 1;
        }
        if !other_hours.iter().any(|h| hours.contains(h)) {
            continue;
        }

        if other.subject_id == candidate.subject_id {
            return Err(Conflict::instance(&other.id, ConflictReason::SameSubject));
        }

        if shares_students(candidate, other, ctx) {
            let rules = ctx.rules();
            match rules.group_of(&candidate.subject_id) {
                Some(members) if members.contains(&other.subject_id) => {
                    group.extend(members.iter().map(String::as_str));
                }
                _ => {
                    return Err(Conflict::instance(
                        &other.id,
                        ConflictReason::SharedStudents,
                    ))
                }
            }
        }

        if other.teacher_id == candidate.teacher_id {
            return Err(Conflict::instance(&other.id, ConflictReason::SameTeacher));
        }
    }

    if lessons_today > MAX_SUBJECT_LESSONS_PER_DAY {
        return Err(Conflict::invalid(ConflictReason::DailyCap {
            lessons: lessons_today,
        }));
    }

    if group.is_empty() {
        group.insert(&candidate.subject_id);
    }
    for subject_id in group {
        let teacher = if subject_id == candidate.subject_id {
            candidate.teacher_id.as_str()
        } else {
            match ctx.subject(subject_id) {
                Some(subject) => subject.teacher_id.as_str(),
                None => continue,
            }
        };
        if hours
            .iter()
            .any(|&h| !ctx.rules().teacher_available(teacher, slot.day, h))
        {
            return Err(Conflict::invalid(ConflictReason::TeacherUnavailable {
                subject_id: subject_id.to_string(),
            }));
        }
    }

    Ok(())
}

fn shares_students(a: &MeetingInstance, b: &MeetingInstance, ctx: &CheckContext<'_>) -> bool {
    ctx.inherit_same_class(&a.subject_id, &b.subject_id)
        || a.class_ids.iter().any(|c| b.class_ids.contains(c))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proton_core::{HourQuota, Rule, RuleConfig};

    fn instance(id: &str, subject: &str, teacher: &str, class: &str) -> MeetingInstance {
        MeetingInstance {
            id: id.into(),
            subject_id: subject.into(),
            subject_name: subject.into(),
            teacher_id: teacher.into(),
            class_ids: vec![class.into()],
            week: 0,
            common_id: None,
            half_hour: false,
            stacked: false,
            outside_hours: false,
            slot: None,
        }
    }

    fn subjects() -> Vec<Subject> {
        vec![
            Subject::new("mat").teacher("t1").inherit_class("1a").quota(HourQuota::hours(4)),
            Subject::new("eng").teacher("t2").inherit_class("1a").quota(HourQuota::hours(2)),
            Subject::new("ger").teacher("t3").inherit_class("1a").quota(HourQuota::hours(2)),
            Subject::new("art").teacher("t1").inherit_class("1b").quota(HourQuota::hours(2)),
        ]
    }

    fn book(rules: Vec<Rule>) -> RuleBook {
        let mut config = RuleConfig::new();
        for rule in rules {
            config.add_rule(rule);
        }
        RuleBook::compile(&config).unwrap()
    }

    #[test]
    fn free_slot_is_accepted() {
        let subjects = subjects();
        let rules = book(vec![]);
        let ctx = CheckContext::new(&subjects, &rules);
        let placed = vec![instance("mat#0", "mat", "t1", "1a").placed_at(0, 1)];

        let candidate = instance("eng#0", "eng", "t2", "1a").placed_at(0, 2);
        assert_eq!(check(&placed, &candidate, &ctx), Ok(()));
    }

    #[test]
    fn same_subject_same_hour_names_the_instance() {
        let subjects = subjects();
        let rules = book(vec![]);
        let ctx = CheckContext::new(&subjects, &rules);
        let placed = vec![instance("mat#0", "mat", "t1", "1a").placed_at(0, 1)];

        let conflict = check(&placed, &instance("mat#2", "mat", "t1", "1a").placed_at(0, 1), &ctx)
            .unwrap_err();
        assert_eq!(conflict.reason, ConflictReason::SameSubject);
        assert_eq!(conflict.culprit(), Some("mat#0"));
    }

    #[test]
    fn shared_students_collide() {
        let subjects = subjects();
        let rules = book(vec![]);
        let ctx = CheckContext::new(&subjects, &rules);
        let placed = vec![instance("mat#0", "mat", "t1", "1a").placed_at(2, 3)];

        let conflict = check(&placed, &instance("eng#0", "eng", "t2", "1a").placed_at(2, 3), &ctx)
            .unwrap_err();
        assert_eq!(conflict.reason, ConflictReason::SharedStudents);
        assert_eq!(conflict.culprit(), Some("mat#0"));
    }

    #[test]
    fn other_week_never_collides() {
        let subjects = subjects();
        let rules = book(vec![]);
        let ctx = CheckContext::new(&subjects, &rules);
        let placed = vec![instance("mat#0", "mat", "t1", "1a").placed_at(2, 3)];

        let mut candidate = instance("eng#1", "eng", "t2", "1a");
        candidate.week = 1;
        assert!(check(&placed, &candidate.placed_at(2, 3), &ctx).is_ok());
    }

    #[test]
    fn teacher_cannot_be_in_two_places() {
        let subjects = subjects();
        let rules = book(vec![]);
        let ctx = CheckContext::new(&subjects, &rules);
        let placed = vec![instance("mat#0", "mat", "t1", "1a").placed_at(1, 1)];

        let conflict = check(&placed, &instance("art#0", "art", "t1", "1b").placed_at(1, 1), &ctx)
            .unwrap_err();
        assert_eq!(conflict.reason, ConflictReason::SameTeacher);
    }

    #[test]
    fn group_members_share_a_slot() {
        let subjects = subjects();
        let rules = book(vec![Rule::subject_group(["eng", "ger"])]);
        let ctx = CheckContext::new(&subjects, &rules);
        let placed = vec![instance("eng#0", "eng", "t2", "1a").placed_at(0, 3)];

        assert!(check(&placed, &instance("ger#0", "ger", "t3", "1a").placed_at(0, 3), &ctx).is_ok());
        assert!(check(&placed, &instance("mat#0", "mat", "t1", "1a").placed_at(0, 3), &ctx).is_err());
    }

    #[test]
    fn third_lesson_of_a_subject_per_day_is_invalid() {
        let subjects = subjects();
        let rules = book(vec![]);
        let ctx = CheckContext::new(&subjects, &rules);
        let placed = vec![
            instance("mat#0", "mat", "t1", "1a").placed_at(0, 1),
            instance("mat#2", "mat", "t1", "1a").placed_at(0, 2),
        ];

        let conflict = check(&placed, &instance("mat#4", "mat", "t1", "1a").placed_at(0, 5), &ctx)
            .unwrap_err();
        assert!(conflict.is_invalid());
        assert_eq!(conflict.reason, ConflictReason::DailyCap { lessons: 3 });
    }

    #[test]
    fn two_stacked_lessons_fit_one_day() {
        let subjects = subjects();
        let rules = book(vec![]);
        let ctx = CheckContext::new(&subjects, &rules);
        let stacked = |id: &str, hour: u8| {
            let mut lesson = instance(id, "mat", "t1", "1a");
            lesson.stacked = true;
            lesson.placed_at(0, hour)
        };
        let placed = vec![stacked("mat#0", 1)];

        assert_eq!(check(&placed, &stacked("mat#2", 4), &ctx), Ok(()));

        let placed = vec![stacked("mat#0", 1), stacked("mat#2", 4)];
        let conflict = check(&placed, &stacked("mat#4", 6), &ctx).unwrap_err();
        assert_eq!(conflict.reason, ConflictReason::DailyCap { lessons: 3 });
    }

    #[test]
    fn day_restricted_teacher() {
        let subjects = subjects();
        let rules = book(vec![Rule::teacher_days("t1", [0])]);
        let ctx = CheckContext::new(&subjects, &rules);

        let tuesday = instance("mat#0", "mat", "t1", "1a").placed_at(1, 1);
        let conflict = check(&[], &tuesday, &ctx).unwrap_err();
        assert!(conflict.is_invalid());
        assert_eq!(
            conflict.reason,
            ConflictReason::TeacherUnavailable {
                subject_id: "mat".into()
            }
        );

        let monday = instance("mat#0", "mat", "t1", "1a").placed_at(0, 1);
        assert!(check(&[], &monday, &ctx).is_ok());
    }

    #[test]
    fn stacked_instance_checks_both_hours() {
        let subjects = subjects();
        let rules = book(vec![Rule::teacher_hours("t2", [0], [1])]);
        let ctx = CheckContext::new(&subjects, &rules);

        let mut candidate = instance("eng#0", "eng", "t2", "1a");
        candidate.stacked = true;
        let conflict = check(&[], &candidate.placed_at(0, 1), &ctx).unwrap_err();
        assert!(conflict.is_invalid());

        let placed = vec![instance("mat#0", "mat", "t1", "1a").placed_at(0, 2)];
        let mut free = instance("ger#0", "ger", "t3", "1a");
        free.stacked = true;
        let conflict = check(&placed, &free.placed_at(0, 1), &ctx).unwrap_err();
        assert_eq!(conflict.culprit(), Some("mat#0"));
    }

    #[test]
    fn group_availability_covers_every_member() {
        let subjects = subjects();
        let rules = book(vec![
            Rule::subject_group(["eng", "ger"]),
            Rule::teacher_days("t3", [4]),
        ]);
        let ctx = CheckContext::new(&subjects, &rules);
        let placed = vec![instance("ger#0", "ger", "t3", "1a").placed_at(0, 2)];

        let conflict = check(&placed, &instance("eng#0", "eng", "t2", "1a").placed_at(0, 2), &ctx)
            .unwrap_err();
        assert_eq!(
            conflict.reason,
            ConflictReason::TeacherUnavailable {
                subject_id: "ger".into()
            }
        );
    }

    #[test]
    fn unplaced_candidate_is_invalid() {
        let subjects = subjects();
        let rules = book(vec![]);
        let ctx = CheckContext::new(&subjects, &rules);
        let conflict = check(&[], &instance("mat#0", "mat", "t1", "1a"), &ctx).unwrap_err();
        assert_eq!(conflict.reason, ConflictReason::Unplaced);
    }
}
