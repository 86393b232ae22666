//! Calendar Materialization
//!
//! Projects an abstract two-week timetable onto the dates of a school year.
//!
//! The first school day is September 1 of the calendar's year, moved to the
//! following Monday when it falls on a weekend. Weeks start on the Monday of
//! that day's week and alternate parity 0/1. A lesson is dated when its week
//! parity matches, the date is not before the first school day, not past the
//! last teaching date of its classes, and not school-free.

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate};
use proton_core::{
    CalendarMeeting, Class, MeetingId, MeetingInstance, ScheduleError, SchoolCalendar, Slot,
    Timetable, DAYS_PER_WEEK, WEEKS_IN_ROTATION,
};
use tracing::{debug, info};

use crate::assemble::SolverConfig;
use crate::checker::{check, CheckContext};

/// Re-check every placed instance: its slot must lie inside the rotation
/// and the hour window of its kind, and it must pass the checker against all
/// other instances.
///
/// A failure here means the timetable was built by a faulty search or edited
/// by hand; it is never an infeasibility.
pub fn validate(
    timetable: &Timetable,
    ctx: &CheckContext<'_>,
    config: &SolverConfig,
) -> Result<(), ScheduleError> {
    for instance in &timetable.instances {
        if ctx.subject(&instance.subject_id).is_none() {
            return Err(ScheduleError::UnknownSubject(instance.subject_id.clone()));
        }
        let Some(slot) = instance.slot else {
            return Err(violation(instance, "has no slot"));
        };
        if slot.day >= DAYS_PER_WEEK {
            return Err(violation(instance, &format!("is placed on day {}", slot.day)));
        }
        if slot.week >= WEEKS_IN_ROTATION || slot.week != instance.week {
            return Err(violation(
                instance,
                &format!("belongs to week {} but sits in week {}", instance.week, slot.week),
            ));
        }
        if !config.admits_start(instance.stacked, instance.outside_hours, slot.hour) {
            return Err(violation(
                instance,
                &format!("starts at hour {} outside its window", slot.hour),
            ));
        }
        check(&timetable.instances, instance, ctx).map_err(|conflict| {
            ScheduleError::InvariantViolation(format!("instance {}: {conflict}", instance.id))
        })?;
    }
    Ok(())
}

fn violation(instance: &MeetingInstance, what: &str) -> ScheduleError {
    ScheduleError::InvariantViolation(format!("instance {} {what}", instance.id))
}

/// Last date any lesson of the school year may take place
fn season_end(calendar: &SchoolCalendar) -> Result<NaiveDate, ScheduleError> {
    NaiveDate::from_ymd_opt(calendar.year + 1, 8, 31).ok_or_else(|| {
        ScheduleError::InvariantViolation(format!("invalid school year {}", calendar.year))
    })
}

/// Date every instance of a validated timetable for the whole school year.
///
/// Meetings are numbered from `first_id` in output order: by date, then
/// hour, then timetable order. Stacked instances yield one meeting per hour.
pub fn materialize(
    timetable: &Timetable,
    ctx: &CheckContext<'_>,
    config: &SolverConfig,
    classes: &[Class],
    calendar: &SchoolCalendar,
    first_id: MeetingId,
) -> Result<Vec<CalendarMeeting>, ScheduleError> {
    validate(timetable, ctx, config)?;

    let first_day = calendar.first_school_day().ok_or_else(|| {
        ScheduleError::InvariantViolation(format!("invalid school year {}", calendar.year))
    })?;
    let hard_stop = season_end(calendar)?;
    let first_monday =
        first_day - Duration::days(i64::from(first_day.weekday().num_days_from_monday()));

    let by_id: HashMap<&str, &Class> = classes.iter().map(|c| (c.id.as_str(), c)).collect();
    let fallback = classes
        .iter()
        .map(|c| c.last_school_date)
        .max()
        .unwrap_or(hard_stop)
        .min(hard_stop);

    let mut ordered: Vec<(&MeetingInstance, Slot, NaiveDate)> = timetable
        .instances
        .iter()
        .filter_map(|instance| {
            let slot = instance.slot?;
            let end = instance
                .class_ids
                .iter()
                .filter_map(|c| by_id.get(c.as_str()))
                .map(|c| c.last_school_date)
                .max()
                .unwrap_or(fallback)
                .min(hard_stop);
            Some((instance, slot, end))
        })
        .collect();
    ordered.sort_by_key(|(_, slot, _)| (slot.day, slot.hour));

    let Some(last) = ordered.iter().map(|(_, _, end)| *end).max() else {
        return Ok(Vec::new());
    };

    let mut meetings: Vec<CalendarMeeting> = Vec::new();
    let mut skipped = 0_usize;
    let mut week_start = first_monday;
    let mut week_index = 0_u32;

    while week_start <= last {
        let parity = (week_index % 2) as u8;
        for (instance, slot, end) in &ordered {
            if slot.week != parity {
                continue;
            }
            let date = week_start + Duration::days(i64::from(slot.day));
            if date < first_day || date > *end {
                continue;
            }
            if calendar.is_school_free(date) {
                skipped += 1;
                continue;
            }
            let Some(subject) = ctx.subject(&instance.subject_id) else {
                return Err(ScheduleError::UnknownSubject(instance.subject_id.clone()));
            };
            for hour in instance.hours() {
                meetings.push(CalendarMeeting {
                    id: 0,
                    name: subject.name.clone(),
                    subject_id: instance.subject_id.clone(),
                    teacher_id: instance.teacher_id.clone(),
                    hour,
                    date,
                    location: subject.location.clone(),
                    generated: true,
                });
            }
        }
        debug!(week = week_index, %week_start, "Week materialized");
        week_start += Duration::days(7);
        week_index += 1;
    }

    meetings.sort_by_key(|m| (m.date, m.hour));
    for (offset, meeting) in meetings.iter_mut().enumerate() {
        meeting.id = first_id + offset as MeetingId;
    }

    info!(
        meetings = meetings.len(),
        weeks = week_index,
        skipped_school_free = skipped,
        "Calendar materialized"
    );
    Ok(meetings)
}

// ============================================================================
// Tests
// ============================================================================
