//! Substitute Recommendation
//!
//! Ranks colleagues who could cover a meeting of an absent teacher. A
//! colleague teaching at the vacant hour is never offered. Everyone else is
//! scored on teaching the same subject under another group and on having
//! lessons right next to the vacant hour; see [`TierGrading::tier`].

use std::collections::HashSet;

use proton_core::{
    CalendarMeeting, MeetingId, MeetingStore, ScheduleError, SubjectRoster, TeacherDirectory,
    TeacherScore, TierGrading,
};
use tracing::info;

/// Grade a colleague's day against the vacant hour, `None` when busy
pub fn grade(day: &[CalendarMeeting], vacant_hour: u8) -> Option<TierGrading> {
    let vacant = i16::from(vacant_hour);
    let mut grading = TierGrading::default();
    for meeting in day {
        match i16::from(meeting.hour) - vacant {
            0 => return None,
            -1 => grading.has_meeting_before = true,
            1 => grading.has_meeting_after = true,
            -2 => grading.has_meeting_two_before = true,
            2 => grading.has_meeting_two_after = true,
            _ => {}
        }
    }
    Some(grading)
}

/// Rank substitutes for a meeting, best first.
///
/// Ties keep the order in which the teacher directory lists teachers.
pub fn recommend<D>(data: &D, meeting_id: MeetingId) -> Result<Vec<TeacherScore>, ScheduleError>
where
    D: SubjectRoster + TeacherDirectory + MeetingStore + ?Sized,
{
    let vacant = data.meeting(meeting_id)?;
    let subject = data.subject(&vacant.subject_id)?;

    let same_subject: HashSet<String> = if subject.long_name.is_empty() {
        HashSet::new()
    } else {
        data.subjects_with_long_name(&subject.long_name)?
            .into_iter()
            .map(|s| s.teacher_id)
            .collect()
    };

    let mut scores = Vec::new();
    for teacher in data.teachers()? {
        if teacher.id == vacant.teacher_id {
            continue;
        }
        let day = data.meetings_for_teacher_on(&teacher.id, vacant.date)?;
        let Some(mut grading) = grade(&day, vacant.hour) else {
            continue;
        };
        grading.teaches_same_subject = same_subject.contains(&teacher.id);
        scores.push(TeacherScore {
            tier: grading.tier(),
            teacher_id: teacher.id,
            name: teacher.name,
            grading,
        });
    }

    scores.sort_by(|a, b| b.tier.cmp(&a.tier));
    info!(
        meeting = meeting_id,
        candidates = scores.len(),
        "Substitutes ranked"
    );
    Ok(scores)
}
