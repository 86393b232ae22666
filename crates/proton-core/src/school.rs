//! In-memory school data
//!
//! [`SchoolSnapshot`] holds teachers, classes, subjects and dated meetings
//! fetched from the surrounding system and implements every collaborator
//! trait over them. The CLI loads it from a JSON export; tests build it with
//! the builder methods.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    CalendarMeeting, Class, ClassRoster, DataError, MeetingId, MeetingStore, Subject,
    SubjectRoster, Teacher, TeacherDirectory,
};

/// A snapshot of the school's rosters and meetings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SchoolSnapshot {
    #[serde(default)]
    pub teachers: Vec<Teacher>,
    #[serde(default)]
    pub classes: Vec<Class>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub meetings: Vec<CalendarMeeting>,
}

impl SchoolSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_teacher(mut self, teacher: Teacher) -> Self {
        self.teachers.push(teacher);
        self
    }

    pub fn with_class(mut self, class: Class) -> Self {
        self.classes.push(class);
        self
    }

    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subjects.push(subject);
        self
    }

    pub fn with_meeting(mut self, meeting: CalendarMeeting) -> Self {
        self.meetings.push(meeting);
        self
    }
}

impl SubjectRoster for SchoolSnapshot {
    fn subjects(&self) -> Result<Vec<Subject>, DataError> {
        Ok(self.subjects.clone())
    }

    fn subject(&self, id: &str) -> Result<Subject, DataError> {
        self.subjects
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| DataError::SubjectNotFound(id.into()))
    }

    fn subjects_for_teacher(&self, teacher_id: &str) -> Result<Vec<Subject>, DataError> {
        Ok(self
            .subjects
            .iter()
            .filter(|s| s.teacher_id == teacher_id)
            .cloned()
            .collect())
    }

    fn subjects_with_long_name(&self, long_name: &str) -> Result<Vec<Subject>, DataError> {
        Ok(self
            .subjects
            .iter()
            .filter(|s| s.long_name == long_name)
            .cloned()
            .collect())
    }
}

impl ClassRoster for SchoolSnapshot {
    fn classes(&self) -> Result<Vec<Class>, DataError> {
        Ok(self.classes.clone())
    }

    fn class(&self, id: &str) -> Result<Class, DataError> {
        self.classes
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| DataError::ClassNotFound(id.into()))
    }
}

impl TeacherDirectory for SchoolSnapshot {
    fn teachers(&self) -> Result<Vec<Teacher>, DataError> {
        Ok(self.teachers.clone())
    }
}

impl MeetingStore for SchoolSnapshot {
    fn meeting(&self, id: MeetingId) -> Result<CalendarMeeting, DataError> {
        self.meetings
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or(DataError::MeetingNotFound(id))
    }

    fn meetings_for_teacher_on(
        &self,
        teacher_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<CalendarMeeting>, DataError> {
        Ok(self
            .meetings
            .iter()
            .filter(|m| m.teacher_id == teacher_id && m.date == date)
            .cloned()
            .collect())
    }

    fn next_meeting_id(&self) -> Result<MeetingId, DataError> {
        Ok(self.meetings.iter().map(|m| m.id + 1).max().unwrap_or(1))
    }

    fn store_meetings(&mut self, meetings: &[CalendarMeeting]) -> Result<(), DataError> {
        self.meetings.extend_from_slice(meetings);
        Ok(())
    }
}
