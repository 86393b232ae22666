//! Plain-text reports printed by the CLI

use std::fmt::Write;

use proton_core::{CalendarMeeting, Class, ObjectKind, RuleConfig, TeacherScore, Timetable};

pub fn rules(config: &RuleConfig) -> String {
    if config.rules.is_empty() {
        return "No rules defined.\n".into();
    }
    let mut out = String::new();
    for rule in &config.rules {
        let _ = writeln!(out, "{}  {:<18} {}", rule.id, rule.kind, rule.name);
        for (kind, label) in [
            (ObjectKind::Teacher, "teacher"),
            (ObjectKind::Day, "days"),
            (ObjectKind::Hour, "hours"),
            (ObjectKind::Subject, "subjects"),
        ] {
            let ids: Vec<&str> = rule.ids_of(kind).collect();
            if !ids.is_empty() {
                let _ = writeln!(out, "    {label}: {}", ids.join(", "));
            }
        }
    }
    out
}

pub fn timetable(timetable: &Timetable, classes: &[Class]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} instances placed after {} resets ({} attempts)",
        timetable.len(),
        timetable.resets,
        timetable.attempts
    );
    for class in classes {
        let lessons = timetable.for_class(&class.id).len();
        let holes = timetable.holes(&class.id);
        let _ = write!(out, "  {:<8} {lessons:>3} lessons, {} holes", class.id, holes.len());
        if !holes.is_empty() {
            let listed: Vec<String> = holes.iter().map(ToString::to_string).collect();
            let _ = write!(out, " ({})", listed.join(", "));
        }
        out.push('\n');
    }
    out
}

pub fn meetings(meetings: &[CalendarMeeting]) -> String {
    match (meetings.first(), meetings.last()) {
        (Some(first), Some(last)) => format!(
            "{} meetings from {} to {}\n",
            meetings.len(),
            first.date,
            last.date
        ),
        _ => "No meetings generated.\n".into(),
    }
}

pub fn substitutes(scores: &[TeacherScore]) -> String {
    if scores.is_empty() {
        return "No free teacher at that hour.\n".into();
    }
    let mut out = String::from("RANK  TEACHER   TIER  NAME\n");
    for (rank, score) in scores.iter().enumerate() {
        let mut notes = Vec::new();
        if score.grading.teaches_same_subject {
            notes.push("same subject");
        }
        if score.grading.has_meeting_before {
            notes.push("hour before");
        }
        if score.grading.has_meeting_after {
            notes.push("hour after");
        }
        if score.grading.has_meeting_two_before {
            notes.push("two hours before");
        }
        if score.grading.has_meeting_two_after {
            notes.push("two hours after");
        }
        let _ = write!(
            out,
            "{:>4}  {:<9} {:>4}  {}",
            rank + 1,
            score.teacher_id,
            score.tier,
            score.name
        );
        if !notes.is_empty() {
            let _ = write!(out, " ({})", notes.join(", "));
        }
        out.push('\n');
    }
    out
}
