//! remindctl command-line entry point.
//!
//! # Responsibility
//! - Parse commands, load configuration and wire the core services.
//! - Render results as text or JSON and map failures to stable error kinds.

use clap::{ArgGroup, Parser, Subcommand};
use log::{error, info};
use remindctl_core::{
    init_logging, private_resolver, private_signatures, public_resolver, public_signatures,
    AddOutcome, BridgedStore, Capability, ConfigError, Container, ErrorKind, LiveReminder,
    MembershipStatus, MirrorReader, MutationEngine, MutationResult, Reconciled, ReminderService,
    ReminderTarget, RemindctlConfig, Section, SectionService, ServiceError, SubtaskService, Task,
    TypedInvoker,
};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "remindctl", version, about = "Reminder management CLI")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true, env = "REMINDCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Subtask operations
    #[command(subcommand)]
    Subtask(SubtaskCommands),
    /// Section operations
    #[command(subcommand)]
    Section(SectionCommands),
    /// Add a reminder to a list or a section
    #[command(group(ArgGroup::new("target").required(true).args(["list", "section"])))]
    Add {
        title: String,
        #[arg(long)]
        list: Option<String>,
        #[arg(long)]
        section: Option<String>,
    },
    /// Move a reminder to another list
    Move { reminder_id: String, list_id: String },
    /// Show the reconciled task tree
    Tree { list_id: Option<String> },
    /// Probe the undocumented API surface
    Capabilities,
}

#[derive(Subcommand, Debug)]
enum SubtaskCommands {
    /// Create a subtask under a parent reminder
    Create { parent_id: String, title: String },
    /// List subtasks of a parent reminder
    List { parent_id: String },
    /// Rename a subtask
    Update { subtask_id: String, title: Option<String> },
    /// Delete a subtask
    Delete { subtask_id: String },
}

#[derive(Subcommand, Debug)]
enum SectionCommands {
    /// Create a section in a list
    Create { list_id: String, display_name: String },
    /// List sections
    List { list_id: Option<String> },
    /// Rename a section
    Update { section_id: String, display_name: String },
    /// Delete a section
    Delete { section_id: String },
    /// Show lists with their sharing status
    Lists,
    /// Assign a reminder to a section
    Assign {
        reminder_id: String,
        #[arg(required_unless_present = "ungroup")]
        section_id: Option<String>,
        /// Remove the reminder from its section
        #[arg(long, conflicts_with = "section_id")]
        ungroup: bool,
    },
}

/// Failure reported to the user.
struct CliFailure {
    kind: ErrorKind,
    message: String,
}

impl From<ServiceError> for CliFailure {
    fn from(value: ServiceError) -> Self {
        Self {
            kind: value.kind(),
            message: value.to_string(),
        }
    }
}

impl From<ConfigError> for CliFailure {
    fn from(value: ConfigError) -> Self {
        Self {
            kind: value.kind(),
            message: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliFailure {
    fn from(value: serde_json::Error) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            message: format!("cannot encode output: {value}"),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            error!(
                "event=command module=cli status=error error_code={}",
                failure.kind
            );
            eprintln!("error[{}]: {}", failure.kind, failure.message);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliFailure> {
    let config = RemindctlConfig::load(cli.config.as_deref())?;
    if let Err(message) = init_logging(&config.log_level, &config.log_dir, true) {
        // Commands still work without file logs.
        eprintln!("warning: logging disabled: {message}");
    }

    let private = private_resolver(&config.private_library_paths);
    let public = public_resolver(&config.public_library_paths);
    let engine = MutationEngine::new(private, private_signatures());
    let store = BridgedStore::new(TypedInvoker::new(public, public_signatures()));
    let mirror = MirrorReader::new(config.mirror_dir.clone(), config.mirror_extension());
    let out = Output { json: cli.json };
    info!("event=command module=cli status=start");

    match cli.command {
        Commands::Subtask(command) => {
            let service = SubtaskService::new(&store, engine, mirror);
            match command {
                SubtaskCommands::Create { parent_id, title } => {
                    out.mutation(&service.create(&parent_id, &title)?)
                }
                SubtaskCommands::List { parent_id } => out.tasks(&service.list(&parent_id)?),
                SubtaskCommands::Update { subtask_id, title } => {
                    out.reminder(&service.update(&subtask_id, title.as_deref())?)
                }
                SubtaskCommands::Delete { subtask_id } => {
                    service.delete(&subtask_id)?;
                    out.done("deleted", &subtask_id)
                }
            }
        }
        Commands::Section(command) => {
            let service = SectionService::new(&store, engine, mirror);
            match command {
                SectionCommands::Create {
                    list_id,
                    display_name,
                } => out.mutation(&service.create(&list_id, &display_name)?),
                SectionCommands::List { list_id } => {
                    out.sections(&service.list(list_id.as_deref())?)
                }
                SectionCommands::Update {
                    section_id,
                    display_name,
                } => out.mutation(&service.update(&section_id, &display_name)?),
                SectionCommands::Delete { section_id } => {
                    out.mutation(&service.delete(&section_id)?)
                }
                SectionCommands::Lists => out.containers(&service.lists()?),
                SectionCommands::Assign {
                    reminder_id,
                    section_id,
                    ungroup,
                } => {
                    let target = if ungroup { None } else { section_id.as_deref() };
                    out.mutation(&service.assign(&reminder_id, target)?)
                }
            }
        }
        Commands::Add {
            title,
            list,
            section,
        } => {
            let service = ReminderService::new(&store, engine, mirror);
            let target = match (list, section) {
                (_, Some(section)) => ReminderTarget::Section(section),
                (Some(list), None) => ReminderTarget::List(list),
                (None, None) => {
                    return Err(CliFailure {
                        kind: ErrorKind::InvalidInput,
                        message: "either --list or --section is required".to_string(),
                    })
                }
            };
            out.added(&service.add(&title, &target)?)
        }
        Commands::Move {
            reminder_id,
            list_id,
        } => {
            let service = ReminderService::new(&store, engine, mirror);
            out.mutation(&service.move_to_list(&reminder_id, &list_id)?)
        }
        Commands::Tree { list_id } => {
            let service = ReminderService::new(&store, engine, mirror);
            out.tree(&service.tree(list_id.as_deref())?)
        }
        Commands::Capabilities => {
            let service = ReminderService::new(&store, engine, mirror);
            out.capabilities(&service.capabilities())
        }
    }
}

/// Renders results on stdout.
struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<(), CliFailure> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            print!("{}", text());
        }
        Ok(())
    }

    fn mutation(&self, result: &MutationResult) -> Result<(), CliFailure> {
        if result.has_placeholder() {
            eprintln!(
                "warning[{}]: identifier could not be read back; reported id is a local placeholder",
                ErrorKind::IdentityUnresolved
            );
        }
        self.emit(result, || match &result.identity {
            Some(identity) => format!("{} ok id={}\n", result.operation, identity.value),
            None => format!("{} ok\n", result.operation),
        })
    }

    fn done(&self, action: &str, id: &str) -> Result<(), CliFailure> {
        let value = serde_json::json!({ "action": action, "id": id, "success": true });
        self.emit(&value, || format!("{action} {id}\n"))
    }

    fn reminder(&self, reminder: &LiveReminder) -> Result<(), CliFailure> {
        self.emit(reminder, || {
            format!(
                "{} {}\n",
                reminder.id,
                reminder.title.as_deref().unwrap_or("")
            )
        })
    }

    fn added(&self, outcome: &AddOutcome) -> Result<(), CliFailure> {
        if let MembershipStatus::NotConfirmed { kind, message } = &outcome.membership {
            eprintln!("warning[{kind}]: reminder created but section membership not confirmed: {message}");
        }
        self.emit(outcome, || {
            let mut text = format!("added id={}", outcome.reminder.id);
            if let Some(section_id) = &outcome.section_id {
                let _ = write!(text, " section={section_id}");
            }
            text.push('\n');
            text
        })
    }

    fn tasks(&self, tasks: &[Task]) -> Result<(), CliFailure> {
        self.emit(&tasks, || {
            let mut text = String::new();
            for task in tasks {
                render_task(&mut text, task, 0);
            }
            text
        })
    }

    fn tree(&self, tree: &Reconciled) -> Result<(), CliFailure> {
        self.emit(tree, || {
            let mut text = String::new();
            for container in &tree.containers {
                let _ = writeln!(
                    text,
                    "{} ({})",
                    container.title.as_deref().unwrap_or("?"),
                    container.id
                );
                for task in tree
                    .tasks
                    .iter()
                    .filter(|task| task.list_id.as_deref() == Some(container.id.as_str()))
                {
                    render_task(&mut text, task, 1);
                }
            }
            let orphans = tree.tasks.iter().filter(|task| {
                !tree
                    .containers
                    .iter()
                    .any(|container| task.list_id.as_deref() == Some(container.id.as_str()))
            });
            for task in orphans {
                render_task(&mut text, task, 0);
            }
            text
        })
    }

    fn sections(&self, sections: &[Section]) -> Result<(), CliFailure> {
        self.emit(&sections, || {
            let mut text = String::new();
            for section in sections {
                let _ = writeln!(
                    text,
                    "{} {} list={} members={}",
                    section.id,
                    section.display_name,
                    section.list_id.as_deref().unwrap_or("?"),
                    section.member_ids.len()
                );
            }
            text
        })
    }

    fn containers(&self, containers: &[Container]) -> Result<(), CliFailure> {
        self.emit(&containers, || {
            let mut text = String::new();
            for container in containers {
                let _ = writeln!(
                    text,
                    "{} {} sharing={:?} sections={}",
                    container.id,
                    container.title.as_deref().unwrap_or("?"),
                    container.sharing_status,
                    container.section_ids.len()
                );
            }
            text
        })
    }

    fn capabilities(&self, capabilities: &[Capability]) -> Result<(), CliFailure> {
        self.emit(&capabilities, || {
            let mut text = String::new();
            for capability in capabilities {
                if capability.available {
                    let _ = writeln!(text, "ok      {}", capability.symbol);
                } else {
                    let _ = writeln!(
                        text,
                        "missing {} ({})",
                        capability.symbol,
                        capability.reason_text()
                    );
                }
            }
            text
        })
    }
}

fn render_task(text: &mut String, task: &Task, depth: usize) {
    let mark = if task.completed { "x" } else { " " };
    let section = task
        .section_id
        .as_deref()
        .map(|id| format!(" section={id}"))
        .unwrap_or_default();
    let _ = writeln!(
        text,
        "{:indent$}[{mark}] {} ({}){section}",
        "",
        task.title.as_deref().unwrap_or(""),
        task.id,
        indent = depth * 2
    );
    for child in &task.children {
        render_task(text, child, depth + 1);
    }
}
