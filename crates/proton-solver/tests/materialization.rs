//! Integration tests for calendar materialization

use chrono::{Datelike, NaiveDate, Weekday};
use pretty_assertions::assert_eq;
use proton_core::rules::MemoryRuleStore;
use proton_core::{
    CalendarMeeting, Class, Holiday, HourQuota, MeetingInstance, MeetingStore, Rule, RuleConfig,
    ScheduleError, SchoolCalendar, SchoolSnapshot, Slot, Subject, Teacher, Timetable,
};
use proton_solver::{Proton, SolverConfig};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn school(last_day: NaiveDate) -> SchoolSnapshot {
    SchoolSnapshot::new()
        .with_teacher(Teacher::new("t1", "Ana"))
        .with_teacher(Teacher::new("t2", "Bor"))
        .with_class(Class::new("1a").students(["s1"]).last_school_date(last_day))
        .with_subject(
            Subject::new("mat")
                .name("MAT")
                .teacher("t1")
                .inherit_class("1a")
                .location("A12")
                .quota(HourQuota::hours(1)),
        )
}

fn monday_lesson(subject: &str, hour: u8) -> MeetingInstance {
    MeetingInstance {
        id: format!("{subject}#0"),
        subject_id: subject.into(),
        subject_name: subject.into(),
        teacher_id: "t1".into(),
        class_ids: vec!["1a".into()],
        week: 0,
        common_id: None,
        half_hour: false,
        stacked: false,
        outside_hours: false,
        slot: Some(Slot::new(0, hour, 0)),
    }
}

fn service(school: SchoolSnapshot, rules: Vec<Rule>) -> Proton<MemoryRuleStore, SchoolSnapshot> {
    let mut config = RuleConfig::new();
    for rule in rules {
        config.add_rule(rule);
    }
    Proton::new(
        MemoryRuleStore::with_config(config),
        school,
        SolverConfig::default(),
    )
    .unwrap()
}

#[test]
fn vacations_and_free_days_are_skipped() {
    // 2025-09-01 is a Monday; week-0 Mondays are Sep 1, 15, 29, Oct 13, 27
    let proton = service(school(date(2025, 10, 31)), vec![]);
    let timetable = Timetable {
        instances: vec![monday_lesson("mat", 2)],
        ..Timetable::default()
    };
    let calendar = SchoolCalendar::for_year(2025)
        .free_day(date(2025, 9, 15))
        .vacation(Holiday::new("Autumn", date(2025, 10, 27), date(2025, 10, 31)));

    let meetings = proton.materialize(&timetable, &calendar).unwrap();

    let dates: Vec<NaiveDate> = meetings.iter().map(|m| m.date).collect();
    assert_eq!(
        dates,
        vec![date(2025, 9, 1), date(2025, 9, 29), date(2025, 10, 13)]
    );
    let first = &meetings[0];
    assert_eq!(first.name, "MAT");
    assert_eq!(first.location, "A12");
    assert_eq!(first.hour, 2);
    assert!(first.generated);
}

#[test]
fn last_school_date_is_inclusive() {
    let proton = service(school(date(2025, 9, 15)), vec![]);
    let timetable = Timetable {
        instances: vec![monday_lesson("mat", 1)],
        ..Timetable::default()
    };

    let meetings = proton
        .materialize(&timetable, &SchoolCalendar::for_year(2025))
        .unwrap();

    let dates: Vec<NaiveDate> = meetings.iter().map(|m| m.date).collect();
    assert_eq!(dates, vec![date(2025, 9, 1), date(2025, 9, 15)]);
}

#[test]
fn stacked_lesson_yields_one_meeting_per_hour() {
    let proton = service(school(date(2025, 9, 5)), vec![Rule::stacked_hours(["mat"])]);
    let mut lesson = monday_lesson("mat", 3);
    lesson.stacked = true;
    let timetable = Timetable {
        instances: vec![lesson],
        ..Timetable::default()
    };

    let meetings = proton
        .materialize(&timetable, &SchoolCalendar::for_year(2025))
        .unwrap();

    let hours: Vec<(u64, u8)> = meetings.iter().map(|m| (m.id, m.hour)).collect();
    assert_eq!(hours, vec![(1, 3), (2, 4)]);
}

#[test]
fn ids_continue_after_stored_meetings() {
    let existing = CalendarMeeting {
        id: 41,
        name: "Staff meeting".into(),
        subject_id: "mat".into(),
        teacher_id: "t1".into(),
        hour: 8,
        date: date(2025, 8, 28),
        location: String::new(),
        generated: false,
    };
    let mut proton = service(school(date(2025, 9, 30)).with_meeting(existing), vec![]);
    let timetable = Timetable {
        instances: vec![monday_lesson("mat", 1)],
        ..Timetable::default()
    };

    let meetings = proton
        .materialize(&timetable, &SchoolCalendar::for_year(2025))
        .unwrap();
    assert_eq!(meetings.first().map(|m| m.id), Some(42));

    proton.publish(&meetings).unwrap();
    assert_eq!(
        proton.data().next_meeting_id().unwrap(),
        42 + meetings.len() as u64
    );
}

#[test]
fn assembled_year_is_deterministic_and_in_bounds() {
    let last_day = date(2026, 6, 24);
    let school = school(last_day)
        .with_subject(Subject::new("eng").teacher("t2").inherit_class("1a").quota(HourQuota::new(2, true)));
    let proton = service(school, vec![]);
    let calendar = SchoolCalendar::for_year(2025)
        .free_day(date(2025, 10, 31))
        .vacation(Holiday::new("Winter", date(2025, 12, 24), date(2026, 1, 2)));

    let timetable = proton.assemble_timetable().unwrap();
    let first = proton.materialize(&timetable, &calendar).unwrap();
    let second = proton.materialize(&timetable, &calendar).unwrap();

    assert_eq!(first, second);
    assert!(!first.is_empty());
    assert!(first.iter().all(|m| !calendar.is_school_free(m.date)));
    assert!(first.iter().all(|m| m.date <= last_day));
    assert!(first
        .iter()
        .all(|m| !matches!(m.date.weekday(), Weekday::Sat | Weekday::Sun)));
    assert!(first
        .windows(2)
        .all(|w| (w[0].date, w[0].hour) <= (w[1].date, w[1].hour)));
}

#[test]
fn timetable_breaking_rules_is_rejected() {
    // The lesson sits on Monday, but the rules now keep t1 to Fridays
    let proton = service(school(date(2025, 9, 30)), vec![Rule::teacher_days("t1", [4])]);
    let timetable = Timetable {
        instances: vec![monday_lesson("mat", 1)],
        ..Timetable::default()
    };

    let err = proton
        .materialize(&timetable, &SchoolCalendar::for_year(2025))
        .unwrap_err();
    assert!(matches!(err, ScheduleError::InvariantViolation(_)));
}

#[test]
fn slots_outside_the_rotation_are_rejected() {
    let proton = service(school(date(2025, 9, 30)), vec![]);

    for slot in [
        Slot::new(5, 1, 0),
        Slot::new(0, 40, 0),
        Slot::new(0, 0, 0),
        Slot::new(0, 1, 1),
        Slot::new(0, 1, 2),
    ] {
        let mut lesson = monday_lesson("mat", 1);
        lesson.slot = Some(slot);
        let timetable = Timetable {
            instances: vec![lesson],
            ..Timetable::default()
        };

        let err = proton
            .materialize(&timetable, &SchoolCalendar::for_year(2025))
            .unwrap_err();
        assert!(
            matches!(err, ScheduleError::InvariantViolation(_)),
            "{slot} gave {err}"
        );
    }
}

#[test]
fn each_class_stops_at_its_own_last_date() {
    let school = school(date(2025, 9, 15))
        .with_class(Class::new("1b").students(["s2"]).last_school_date(date(2025, 10, 13)))
        .with_subject(
            Subject::new("art")
                .name("ART")
                .teacher("t2")
                .inherit_class("1b")
                .quota(HourQuota::hours(1)),
        );
    let proton = service(school, vec![]);
    let mut art = monday_lesson("art", 2);
    art.teacher_id = "t2".into();
    art.class_ids = vec!["1b".into()];
    let timetable = Timetable {
        instances: vec![monday_lesson("mat", 1), art],
        ..Timetable::default()
    };

    let meetings = proton
        .materialize(&timetable, &SchoolCalendar::for_year(2025))
        .unwrap();

    let dates_of = |subject: &str| -> Vec<NaiveDate> {
        meetings
            .iter()
            .filter(|m| m.subject_id == subject)
            .map(|m| m.date)
            .collect()
    };
    assert_eq!(dates_of("mat"), vec![date(2025, 9, 1), date(2025, 9, 15)]);
    assert_eq!(
        dates_of("art"),
        vec![
            date(2025, 9, 1),
            date(2025, 9, 15),
            date(2025, 9, 29),
            date(2025, 10, 13)
        ]
    );
}
