//! proton CLI - Weekly Timetable Scheduler
//!
//! Command-line interface for managing scheduling rules, assembling a
//! timetable, dating it for a school year and ranking substitute teachers.

mod report;
mod settings;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use proton_core::rules::{JsonFileRuleStore, DEFAULT_RULES_FILE};
use proton_core::{
    ClassRoster, MeetingId, Rule, RuleBook, RuleConfig, RuleKind, SchoolSnapshot, Timetable,
};
use proton_solver::Proton;
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "proton")]
#[command(author, version, about = "Weekly timetable scheduler", long_about = None)]
struct Cli {
    /// Verbose output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Rule configuration document
    #[arg(long, global = true, env = "PROTON_RULES", default_value = DEFAULT_RULES_FILE)]
    rules: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage scheduling rules
    Rules {
        #[command(subcommand)]
        action: RuleAction,
    },

    /// Assemble an abstract two-week timetable
    Assemble {
        /// School data export (JSON)
        #[arg(long, value_name = "FILE")]
        data: PathBuf,

        /// Settings file (TOML)
        #[arg(long, value_name = "FILE")]
        settings: Option<PathBuf>,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Date a timetable for the school year
    Materialize {
        /// School data export (JSON)
        #[arg(long, value_name = "FILE")]
        data: PathBuf,

        /// Timetable produced by `assemble`
        #[arg(long, value_name = "FILE")]
        timetable: PathBuf,

        /// Settings file (TOML)
        #[arg(long, value_name = "FILE")]
        settings: Option<PathBuf>,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Append the generated meetings to the school data file
        #[arg(long)]
        publish: bool,
    },

    /// Rank substitute teachers for a meeting
    Substitutes {
        /// School data export (JSON)
        #[arg(long, value_name = "FILE")]
        data: PathBuf,

        /// Meeting of the absent teacher
        #[arg(value_name = "MEETING_ID")]
        meeting: MeetingId,
    },
}

#[derive(Subcommand)]
enum RuleAction {
    /// List all rules
    List,

    /// Add a rule
    Add {
        /// teacher_days, teacher_hours, subject_group, before_after_class, stacked_hours
        #[arg(value_name = "KIND")]
        kind: RuleKind,

        /// Teacher the rule applies to
        #[arg(long)]
        teacher: Option<String>,

        /// Days (0 = Monday), comma separated
        #[arg(long, value_delimiter = ',')]
        days: Vec<u8>,

        /// Hours, comma separated
        #[arg(long, value_delimiter = ',')]
        hours: Vec<u8>,

        /// Subjects, comma separated
        #[arg(long, value_delimiter = ',')]
        subjects: Vec<String>,

        /// Human-readable name
        #[arg(long)]
        name: Option<String>,
    },

    /// Delete a rule by ID
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match cli.command {
        Commands::Rules { action } => cmd_rules(&cli.rules, action),
        Commands::Assemble {
            data,
            settings,
            output,
        } => cmd_assemble(&cli.rules, &data, settings.as_deref(), output.as_deref()),
        Commands::Materialize {
            data,
            timetable,
            settings,
            output,
            publish,
        } => cmd_materialize(
            &cli.rules,
            &data,
            &timetable,
            settings.as_deref(),
            output.as_deref(),
            publish,
        ),
        Commands::Substitutes { data, meeting } => cmd_substitutes(&cli.rules, &data, meeting),
    }
}

// ============================================================================
// Commands
// ============================================================================

fn service(
    rules: &Path,
    school: SchoolSnapshot,
    settings: &Settings,
) -> Result<Proton<JsonFileRuleStore, SchoolSnapshot>> {
    Proton::new(JsonFileRuleStore::new(rules), school, settings.solver.clone())
        .with_context(|| format!("Failed to load rules: {}", rules.display()))
}

fn cmd_rules(rules: &Path, action: RuleAction) -> Result<()> {
    let mut proton = service(rules, SchoolSnapshot::new(), &Settings::default())?;

    match action {
        RuleAction::List => print!("{}", report::rules(proton.config())),
        RuleAction::Add {
            kind,
            teacher,
            days,
            hours,
            subjects,
            name,
        } => {
            let mut rule = build_rule(kind, teacher, days, hours, subjects)?;
            if let Some(name) = name {
                rule = rule.name(name);
            }
            // Reject rules the assembler would refuse before they are stored
            let mut probe = RuleConfig::new();
            probe.add_rule(rule.clone());
            RuleBook::compile(&probe)?;

            let id = proton.add_rule(rule)?;
            println!("Added rule {id}");
        }
        RuleAction::Delete { id } => {
            proton.delete_rule(&id)?;
            println!("Deleted rule {id}");
        }
    }
    Ok(())
}

fn build_rule(
    kind: RuleKind,
    teacher: Option<String>,
    days: Vec<u8>,
    hours: Vec<u8>,
    subjects: Vec<String>,
) -> Result<Rule> {
    let rule = match kind {
        RuleKind::TeacherDays | RuleKind::TeacherHours => {
            let Some(teacher) = teacher else {
                bail!("{kind} rules need --teacher");
            };
            if kind == RuleKind::TeacherDays {
                Rule::teacher_days(teacher, days)
            } else {
                Rule::teacher_hours(teacher, days, hours)
            }
        }
        RuleKind::SubjectGroup | RuleKind::BeforeAfterClass | RuleKind::StackedHours => {
            if subjects.is_empty() {
                bail!("{kind} rules need --subjects");
            }
            match kind {
                RuleKind::SubjectGroup => Rule::subject_group(subjects),
                RuleKind::BeforeAfterClass => Rule::before_after_class(subjects),
                _ => Rule::stacked_hours(subjects),
            }
        }
    };
    Ok(rule)
}

fn cmd_assemble(
    rules: &Path,
    data: &Path,
    settings: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let settings = Settings::load(settings)?;
    let proton = service(rules, load_school(data)?, &settings)?;

    let timetable = proton
        .assemble_timetable()
        .context("Failed to assemble a timetable")?;

    match output {
        Some(path) => {
            write_json(path, &timetable)?;
            let classes = proton.data().classes()?;
            print!("{}", report::timetable(&timetable, &classes));
            println!("Wrote {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&timetable)?),
    }
    Ok(())
}

fn cmd_materialize(
    rules: &Path,
    data: &Path,
    timetable: &Path,
    settings: Option<&Path>,
    output: Option<&Path>,
    publish: bool,
) -> Result<()> {
    let settings = Settings::load(settings)?;
    let mut proton = service(rules, load_school(data)?, &settings)?;

    let content = std::fs::read_to_string(timetable)
        .with_context(|| format!("Failed to read timetable: {}", timetable.display()))?;
    let timetable: Timetable =
        serde_json::from_str(&content).context("Invalid timetable document")?;

    let meetings = proton
        .materialize(&timetable, &settings.calendar)
        .context("Failed to materialize the timetable")?;

    if publish {
        proton.publish(&meetings)?;
        write_json(data, proton.data())?;
    }

    match output {
        Some(path) => {
            write_json(path, &meetings)?;
            print!("{}", report::meetings(&meetings));
            println!("Wrote {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&meetings)?),
    }
    Ok(())
}

fn cmd_substitutes(rules: &Path, data: &Path, meeting: MeetingId) -> Result<()> {
    let proton = service(rules, load_school(data)?, &Settings::default())?;
    let scores = proton
        .recommend_substitutes(meeting)
        .with_context(|| format!("Failed to rank substitutes for meeting {meeting}"))?;
    print!("{}", report::substitutes(&scores));
    Ok(())
}

// ============================================================================
// Files
// ============================================================================

fn load_school(path: &Path) -> Result<SchoolSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read school data: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid school data: {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
