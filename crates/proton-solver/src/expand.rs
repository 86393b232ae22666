//! Instance Expansion
//!
//! Turns the subject catalogue into atomic [`MeetingInstance`]s and bundles
//! them into placement units.
//!
//! Whole quota hours alternate week parity `0, 1, 0, 1, ...`; each
//! consecutive week-0/week-1 pair shares a common id. A `.5` remainder adds
//! one half-hour instance in week 0. Members of a subject group must carry
//! the same quota: the k-th instance of every member lands in unit k and is
//! placed in one slot.

use std::collections::{BTreeSet, HashMap};

use proton_core::{
    Class, ClassId, MeetingInstance, RuleBook, ScheduleError, Subject, SubjectId,
    WEEKS_IN_ROTATION,
};
use tracing::warn;

/// Instances that must be placed in the same slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacementUnit {
    /// Indices into [`Expansion::instances`]
    pub members: Vec<usize>,
    pub week: u8,
    pub stacked: bool,
    pub outside_hours: bool,
}

/// Result of expanding a subject catalogue
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Expansion {
    pub instances: Vec<MeetingInstance>,
    pub units: Vec<PlacementUnit>,
}

impl Expansion {
    /// Instances of a unit, in member order
    pub fn members(&self, unit: usize) -> impl Iterator<Item = &MeetingInstance> {
        self.units[unit]
            .members
            .iter()
            .map(move |&i| &self.instances[i])
    }
}

/// Classes attending a subject: the inherited class, or every class whose
/// roster shares a student with the subject roster.
pub fn resolve_classes(subject: &Subject, classes: &[Class]) -> Vec<ClassId> {
    if let Some(class_id) = &subject.class_id {
        return vec![class_id.clone()];
    }
    classes
        .iter()
        .filter(|c| c.students.iter().any(|s| subject.students.contains(s)))
        .map(|c| c.id.clone())
        .collect()
}

/// Verify that every member of a subject group carries the same quota
pub fn check_group_quotas(subjects: &[Subject], rules: &RuleBook) -> Result<(), ScheduleError> {
    let by_id: HashMap<&str, &Subject> = subjects.iter().map(|s| (s.id.as_str(), s)).collect();
    for group in rules.groups() {
        let members: Vec<&Subject> = group
            .iter()
            .filter_map(|id| {
                let found = by_id.get(id.as_str()).copied();
                if found.is_none() {
                    warn!(subject = %id, "Subject group references an unknown subject");
                }
                found
            })
            .collect();
        if let Some(first) = members.first() {
            if let Some(other) = members.iter().find(|s| s.quota != first.quota) {
                return Err(ScheduleError::GroupQuotaMismatch {
                    group: group.iter().cloned().collect(),
                    first: first.quota,
                    second: other.quota,
                });
            }
        }
    }
    Ok(())
}

/// Expand every subject into instances and group them into placement units
pub fn expand(
    subjects: &[Subject],
    classes: &[Class],
    rules: &RuleBook,
) -> Result<Expansion, ScheduleError> {
    check_group_quotas(subjects, rules)?;

    let mut expansion = Expansion::default();
    let mut by_subject: HashMap<&str, Vec<usize>> = HashMap::new();

    for subject in subjects {
        let class_ids = resolve_classes(subject, classes);
        if class_ids.is_empty() {
            warn!(subject = %subject.id, "Subject has no attending class");
        }
        let indices = by_subject.entry(subject.id.as_str()).or_default();
        for instance in subject_instances(subject, &class_ids, rules) {
            indices.push(expansion.instances.len());
            expansion.instances.push(instance);
        }
    }

    let mut grouped: BTreeSet<&SubjectId> = BTreeSet::new();
    for subject in subjects {
        if grouped.contains(&subject.id) {
            continue;
        }
        let members: Vec<&str> = match rules.group_of(&subject.id) {
            Some(group) => {
                grouped.extend(group.iter());
                subjects
                    .iter()
                    .filter(|s| group.contains(&s.id))
                    .map(|s| s.id.as_str())
                    .collect()
            }
            None => vec![subject.id.as_str()],
        };

        let count = by_subject.get(subject.id.as_str()).map_or(0, Vec::len);
        for k in 0..count {
            let indices: Vec<usize> = members
                .iter()
                .filter_map(|m| by_subject.get(m).and_then(|v| v.get(k)).copied())
                .collect();
            let Some(&first) = indices.first() else {
                continue;
            };
            let week = expansion.instances[first].week;
            let stacked = indices.iter().any(|&i| expansion.instances[i].stacked);
            let outside_hours = indices.iter().any(|&i| expansion.instances[i].outside_hours);
            expansion.units.push(PlacementUnit {
                members: indices,
                week,
                stacked,
                outside_hours,
            });
        }
    }

    Ok(expansion)
}

fn subject_instances(
    subject: &Subject,
    class_ids: &[ClassId],
    rules: &RuleBook,
) -> Vec<MeetingInstance> {
    let stacked = rules.is_stacked(&subject.id);
    let outside_hours = rules.is_outside_hours(&subject.id);
    let whole = subject.quota.whole;

    let template = |id: String, week: u8, common_id: Option<String>, half_hour: bool| {
        MeetingInstance {
            id,
            subject_id: subject.id.clone(),
            subject_name: subject.name.clone(),
            teacher_id: subject.teacher_id.clone(),
            class_ids: class_ids.to_vec(),
            week,
            common_id,
            half_hour,
            stacked,
            outside_hours,
            slot: None,
        }
    };

    let mut instances: Vec<MeetingInstance> = (0..whole)
        .map(|k| {
            let week = (k % u32::from(WEEKS_IN_ROTATION)) as u8;
            let pair = k / 2;
            let paired = 2 * pair + 1 < whole;
            let common_id = paired.then(|| format!("{}~{}", subject.id, pair));
            template(format!("{}#{}", subject.id, k), week, common_id, false)
        })
        .collect();
    if subject.quota.half {
        instances.push(template(format!("{}#h", subject.id), 0, None, true));
    }
    instances
}

// ============================================================================
// Tests
// ============================================================================
