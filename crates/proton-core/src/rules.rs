//! Scheduling rules and their persistence
//!
//! Rules are administrator-defined constraints stored as one versioned JSON
//! document. Each rule is a kind plus a list of typed object references.
//!
//! # File Format
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "rules": [
//!     {
//!       "id": "5f0c...",
//!       "name": "Mrs. Novak only Monday",
//!       "kind": "teacher_days",
//!       "objects": [
//!         { "object_id": "0", "type": "day" },
//!         { "object_id": "t1", "type": "teacher" }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! The store performs no validation. [`RuleBook::compile`] turns a config into
//! typed lookups and is where malformed rules are rejected.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use crate::{ScheduleError, SubjectId, TeacherId, DAYS_PER_WEEK};

/// Current rule document format version
pub const RULE_CONFIG_VERSION: &str = "1.0";

/// File name used when no explicit rule file is configured
pub const DEFAULT_RULES_FILE: &str = "protonConfig.json";

/// Highest hour a rule may reference
const MAX_RULE_HOUR: u8 = 15;

// ============================================================================
// Rule Types
// ============================================================================

/// Type tag of a rule object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Teacher,
    Day,
    Hour,
    Subject,
}

/// Typed reference held by a rule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleObject {
    pub object_id: String,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
}

impl RuleObject {
    pub fn new(kind: ObjectKind, object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            kind,
        }
    }
}

/// Kind of scheduling rule
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Teacher is at school only on the listed days
    TeacherDays,
    /// Teacher is at school only during the listed (day, hour) pairs
    TeacherHours,
    /// Listed subjects always share a slot
    SubjectGroup,
    /// Listed subjects are taught before or after normal periods
    BeforeAfterClass,
    /// Listed subjects are taught in double periods
    StackedHours,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::TeacherDays => "teacher_days",
            RuleKind::TeacherHours => "teacher_hours",
            RuleKind::SubjectGroup => "subject_group",
            RuleKind::BeforeAfterClass => "before_after_class",
            RuleKind::StackedHours => "stacked_hours",
        }
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "teacher_days" => Ok(RuleKind::TeacherDays),
            "teacher_hours" => Ok(RuleKind::TeacherHours),
            "subject_group" => Ok(RuleKind::SubjectGroup),
            "before_after_class" => Ok(RuleKind::BeforeAfterClass),
            "stacked_hours" => Ok(RuleKind::StackedHours),
            other => Err(format!("unknown rule kind '{other}'")),
        }
    }
}

/// A single scheduling rule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Assigned by [`RuleConfig::add_rule`] when empty
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub kind: RuleKind,
    pub objects: Vec<RuleObject>,
}

impl Rule {
    pub fn new(kind: RuleKind) -> Self {
        Self {
            id: String::new(),
            name: "Proton rule".into(),
            kind,
            objects: Vec::new(),
        }
    }

    /// Teacher present only on the given days (0 = Monday)
    pub fn teacher_days(teacher: impl Into<String>, days: impl IntoIterator<Item = u8>) -> Self {
        let mut rule = Self::new(RuleKind::TeacherDays);
        for day in days {
            rule.objects.push(RuleObject::new(ObjectKind::Day, day.to_string()));
        }
        rule.object(ObjectKind::Teacher, teacher)
    }

    /// Teacher present only during the given hours of the given days
    pub fn teacher_hours(
        teacher: impl Into<String>,
        days: impl IntoIterator<Item = u8>,
        hours: impl IntoIterator<Item = u8>,
    ) -> Self {
        let mut rule = Self::new(RuleKind::TeacherHours);
        for day in days {
            rule.objects.push(RuleObject::new(ObjectKind::Day, day.to_string()));
        }
        for hour in hours {
            rule.objects.push(RuleObject::new(ObjectKind::Hour, hour.to_string()));
        }
        rule.object(ObjectKind::Teacher, teacher)
    }

    pub fn subject_group<I, S>(subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_subjects(RuleKind::SubjectGroup, subjects)
    }

    pub fn before_after_class<I, S>(subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_subjects(RuleKind::BeforeAfterClass, subjects)
    }

    pub fn stacked_hours<I, S>(subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_subjects(RuleKind::StackedHours, subjects)
    }

    fn with_subjects<I, S>(kind: RuleKind, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rule = Self::new(kind);
        rule.objects = subjects
            .into_iter()
            .map(|s| RuleObject::new(ObjectKind::Subject, s))
            .collect();
        rule
    }

    /// Append an object reference
    pub fn object(mut self, kind: ObjectKind, id: impl Into<String>) -> Self {
        self.objects.push(RuleObject::new(kind, id));
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// IDs of all objects of one kind, in rule order
    pub fn ids_of(&self, kind: ObjectKind) -> impl Iterator<Item = &str> {
        self.objects
            .iter()
            .filter(move |o| o.kind == kind)
            .map(|o| o.object_id.as_str())
    }

    pub fn references(&self, kind: ObjectKind, id: &str) -> bool {
        self.ids_of(kind).any(|o| o == id)
    }
}

// ============================================================================
// Rule Config
// ============================================================================

/// Versioned rule document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub version: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            version: RULE_CONFIG_VERSION.into(),
            rules: Vec::new(),
        }
    }
}

impl RuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule, assigning a fresh ID when it has none
    pub fn add_rule(&mut self, mut rule: Rule) -> &Rule {
        if rule.id.is_empty() {
            rule.id = uuid::Uuid::new_v4().to_string();
        }
        self.rules.push(rule);
        &self.rules[self.rules.len() - 1]
    }

    /// Remove a rule by ID
    pub fn remove_rule(&mut self, id: &str) -> Option<Rule> {
        let index = self.rules.iter().position(|r| r.id == id)?;
        Some(self.rules.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Rules referencing a teacher
    pub fn rules_for_teacher(&self, teacher_id: &str) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|r| r.references(ObjectKind::Teacher, teacher_id))
            .collect()
    }

    pub fn subject_groups(&self) -> Vec<&Rule> {
        self.of_kind(RuleKind::SubjectGroup).collect()
    }

    /// Subjects taught in double periods
    pub fn stacked_subjects(&self) -> BTreeSet<SubjectId> {
        self.subjects_of(RuleKind::StackedHours)
    }

    /// Subjects taught outside normal periods
    pub fn before_after_subjects(&self) -> BTreeSet<SubjectId> {
        self.subjects_of(RuleKind::BeforeAfterClass)
    }

    fn of_kind(&self, kind: RuleKind) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |r| r.kind == kind)
    }

    fn subjects_of(&self, kind: RuleKind) -> BTreeSet<SubjectId> {
        self.of_kind(kind)
            .flat_map(|r| r.ids_of(ObjectKind::Subject))
            .map(str::to_string)
            .collect()
    }
}

// ============================================================================
// Rule Book (compiled rules)
// ============================================================================

/// One compiled availability rule of a teacher
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Availability {
    Days(BTreeSet<u8>),
    Hours(BTreeSet<(u8, u8)>),
}

impl Availability {
    pub fn allows(&self, day: u8, hour: u8) -> bool {
        match self {
            Availability::Days(days) => days.contains(&day),
            Availability::Hours(pairs) => pairs.contains(&(day, hour)),
        }
    }
}

/// Typed view of a [`RuleConfig`], read-only for the duration of an assembly
#[derive(Clone, Debug, Default)]
pub struct RuleBook {
    availability: HashMap<TeacherId, Vec<Availability>>,
    groups: Vec<BTreeSet<SubjectId>>,
    stacked: HashSet<SubjectId>,
    outside_hours: HashSet<SubjectId>,
}

impl RuleBook {
    /// Compile a rule config, rejecting malformed rules.
    ///
    /// Subject groups sharing a subject are merged into one group.
    pub fn compile(config: &RuleConfig) -> Result<Self, ScheduleError> {
        let mut book = RuleBook::default();

        for rule in &config.rules {
            match rule.kind {
                RuleKind::TeacherDays | RuleKind::TeacherHours => {
                    let availability = compile_availability(rule)?;
                    let teachers: Vec<&str> = rule.ids_of(ObjectKind::Teacher).collect();
                    if teachers.is_empty() {
                        return Err(malformed(rule, "no teacher referenced"));
                    }
                    for teacher in teachers {
                        book.availability
                            .entry(teacher.to_string())
                            .or_default()
                            .push(availability.clone());
                    }
                }
                RuleKind::SubjectGroup => {
                    let members: BTreeSet<SubjectId> = rule
                        .ids_of(ObjectKind::Subject)
                        .map(str::to_string)
                        .collect();
                    if !members.is_empty() {
                        book.merge_group(members);
                    }
                }
                RuleKind::StackedHours => {
                    book.stacked
                        .extend(rule.ids_of(ObjectKind::Subject).map(str::to_string));
                }
                RuleKind::BeforeAfterClass => {
                    book.outside_hours
                        .extend(rule.ids_of(ObjectKind::Subject).map(str::to_string));
                }
            }
        }

        Ok(book)
    }

    fn merge_group(&mut self, mut members: BTreeSet<SubjectId>) {
        let (overlapping, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.groups)
            .into_iter()
            .partition(|g| !g.is_disjoint(&members));
        for group in overlapping {
            members.extend(group);
        }
        self.groups = rest;
        self.groups.push(members);
    }

    /// Availability rules of a teacher; empty means always available
    pub fn availability(&self, teacher_id: &str) -> &[Availability] {
        self.availability
            .get(teacher_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether any availability rule of the teacher admits (day, hour)
    pub fn teacher_available(&self, teacher_id: &str, day: u8, hour: u8) -> bool {
        let rules = self.availability(teacher_id);
        rules.is_empty() || rules.iter().any(|a| a.allows(day, hour))
    }

    pub fn groups(&self) -> &[BTreeSet<SubjectId>] {
        &self.groups
    }

    pub fn group_of(&self, subject_id: &str) -> Option<&BTreeSet<SubjectId>> {
        self.groups.iter().find(|g| g.contains(subject_id))
    }

    pub fn share_group(&self, a: &str, b: &str) -> bool {
        self.group_of(a).is_some_and(|g| g.contains(b))
    }

    pub fn is_stacked(&self, subject_id: &str) -> bool {
        self.stacked.contains(subject_id)
    }

    pub fn is_outside_hours(&self, subject_id: &str) -> bool {
        self.outside_hours.contains(subject_id)
    }
}

fn compile_availability(rule: &Rule) -> Result<Availability, ScheduleError> {
    let days = rule
        .ids_of(ObjectKind::Day)
        .map(|d| parse_number(rule, d, "day", DAYS_PER_WEEK - 1))
        .collect::<Result<BTreeSet<u8>, _>>()?;

    match rule.kind {
        RuleKind::TeacherHours => {
            if days.is_empty() {
                return Err(malformed(rule, "hour availability without a day"));
            }
            let hours = rule
                .ids_of(ObjectKind::Hour)
                .map(|h| parse_number(rule, h, "hour", MAX_RULE_HOUR))
                .collect::<Result<BTreeSet<u8>, _>>()?;
            Ok(Availability::Hours(
                days.iter()
                    .flat_map(|&d| hours.iter().map(move |&h| (d, h)))
                    .collect(),
            ))
        }
        _ => Ok(Availability::Days(days)),
    }
}

fn parse_number(rule: &Rule, raw: &str, what: &str, max: u8) -> Result<u8, ScheduleError> {
    match raw.trim().parse::<u8>() {
        Ok(value) if value <= max => Ok(value),
        _ => Err(malformed(rule, &format!("invalid {what} '{raw}'"))),
    }
}

fn malformed(rule: &Rule, reason: &str) -> ScheduleError {
    let label = if rule.name.is_empty() { &rule.id } else { &rule.name };
    ScheduleError::MalformedRule {
        rule: label.clone(),
        reason: reason.into(),
    }
}

// ============================================================================
// Stores
// ============================================================================

/// Rule store error
#[derive(Debug, Error)]
pub enum RuleStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid rule document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Unsupported rule document version: {0}")]
    UnsupportedVersion(String),

    #[error("Rule store lock poisoned")]
    Poisoned,
}

/// Durable storage for the rule config
pub trait RuleStore {
    /// Load the config, creating an empty one on first use
    fn load(&self) -> Result<RuleConfig, RuleStoreError>;

    fn save(&self, config: &RuleConfig) -> Result<(), RuleStoreError>;

    /// Append a rule and persist the result
    fn add_rule(&self, mut config: RuleConfig, rule: Rule) -> Result<RuleConfig, RuleStoreError> {
        config.add_rule(rule);
        self.save(&config)?;
        Ok(config)
    }

    /// Remove a rule from the stored config and persist the result
    fn delete_rule(&self, id: &str) -> Result<RuleConfig, RuleStoreError> {
        let mut config = self.load()?;
        if config.remove_rule(id).is_none() {
            return Err(RuleStoreError::RuleNotFound(id.into()));
        }
        self.save(&config)?;
        Ok(config)
    }
}

/// Rule config persisted as a JSON file
#[derive(Clone, Debug)]
pub struct JsonFileRuleStore {
    path: PathBuf,
}

impl JsonFileRuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for JsonFileRuleStore {
    fn default() -> Self {
        Self::new(DEFAULT_RULES_FILE)
    }
}

impl RuleStore for JsonFileRuleStore {
    fn load(&self) -> Result<RuleConfig, RuleStoreError> {
        if !self.path.exists() {
            let config = RuleConfig::default();
            self.save(&config)?;
            return Ok(config);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let config: RuleConfig = serde_json::from_str(&content)?;
        if config.version != RULE_CONFIG_VERSION {
            return Err(RuleStoreError::UnsupportedVersion(config.version));
        }
        Ok(config)
    }

    fn save(&self, config: &RuleConfig) -> Result<(), RuleStoreError> {
        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

/// Rule config kept in memory
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    config: Mutex<Option<RuleConfig>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RuleConfig) -> Self {
        Self {
            config: Mutex::new(Some(config)),
        }
    }
}

impl RuleStore for MemoryRuleStore {
    fn load(&self) -> Result<RuleConfig, RuleStoreError> {
        let mut slot = self.config.lock().map_err(|_| RuleStoreError::Poisoned)?;
        Ok(slot.get_or_insert_with(RuleConfig::default).clone())
    }

    fn save(&self, config: &RuleConfig) -> Result<(), RuleStoreError> {
        let mut slot = self.config.lock().map_err(|_| RuleStoreError::Poisoned)?;
        *slot = Some(config.clone());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
