use std::env;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use easygraph_contracts::chart::ChartConfiguration;
use easygraph_contracts::chat::{help_lines, parse_intent, Attachment, ChatIntent};
use easygraph_contracts::credentials::{mask_api_key, FileCredentialStore};
use easygraph_contracts::events::EventLog;
use easygraph_contracts::projects::{Project, ProjectStore};
use easygraph_engine::{
    load_attachment, render_document, EditorSession, GeminiTransport, RequestComposer,
    TurnOutcome, TurnReport,
};

#[derive(Debug, Parser)]
#[command(
    name = "easygraph-rs",
    version,
    about = "Turn prompts and data files into chart configurations"
)]
struct Cli {
    /// Where projects, the stored key and events live.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[arg(long, global = true)]
    model: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a single turn and write the rendered chart document.
    Generate(GenerateArgs),
    Chat(ChatArgs),
    Projects {
        #[command(subcommand)]
        action: ProjectsCommand,
    },
    Key {
        #[command(subcommand)]
        action: KeyCommand,
    },
    /// Write the chart document of a saved project.
    Render(RenderArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long, default_value = "")]
    prompt: String,
    #[arg(long = "file")]
    files: Vec<PathBuf>,
    #[arg(long)]
    out: Option<PathBuf>,
    /// Continue this saved project and auto-save the turn into it.
    #[arg(long)]
    project: Option<String>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    project: Option<String>,
}

#[derive(Debug, Subcommand)]
enum ProjectsCommand {
    List,
    Show { id: String },
    Delete { id: String },
    Rename { id: String, name: String },
}

#[derive(Debug, Subcommand)]
enum KeyCommand {
    Set { key: String },
    Clear,
    Status,
}

#[derive(Debug, Parser)]
struct RenderArgs {
    #[arg(long)]
    project: String,
    #[arg(long)]
    out: Option<PathBuf>,
}

const DATA_DIR_ENV: &str = "EASYGRAPH_DATA_DIR";
const DEFAULT_DATA_DIR_NAME: &str = ".easygraph";

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("easygraph-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let workspace = Workspace::resolve(cli.data_dir, cli.events, cli.model)?;
    match cli.command {
        Command::Generate(args) => run_generate(&workspace, args),
        Command::Chat(args) => {
            run_chat(&workspace, args)?;
            Ok(0)
        }
        Command::Projects { action } => run_projects(&workspace, action),
        Command::Key { action } => run_key(&workspace, action),
        Command::Render(args) => run_render(&workspace, args),
    }
}

struct Workspace {
    data_dir: PathBuf,
    events: EventLog,
    model: Option<String>,
}

impl Workspace {
    fn resolve(
        data_dir: Option<PathBuf>,
        events: Option<PathBuf>,
        model: Option<String>,
    ) -> Result<Self> {
        let data_dir = resolve_data_dir(data_dir, env::var_os(DATA_DIR_ENV), dirs::home_dir())?;
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
        let events_path = events.unwrap_or_else(|| data_dir.join("events.jsonl"));
        Ok(Self {
            data_dir,
            events: EventLog::for_new_session(events_path),
            model: model
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        })
    }

    fn credentials(&self) -> FileCredentialStore {
        FileCredentialStore::in_dir(&self.data_dir)
    }

    fn projects(&self) -> ProjectStore {
        let store = ProjectStore::in_dir(&self.data_dir);
        if let Some(warning) = store.load_warning() {
            eprintln!("Warning: saved projects could not be read ({warning}); starting empty.");
        }
        store
    }

    fn composer(&self) -> RequestComposer {
        let composer = RequestComposer::new(
            Box::new(GeminiTransport::new()),
            Box::new(self.credentials()),
        )
        .with_events(self.events.clone());
        match &self.model {
            Some(model) => composer.with_model(model.clone()),
            None => composer,
        }
    }

    fn session(&self) -> EditorSession {
        EditorSession::new(self.composer(), self.projects()).with_events(self.events.clone())
    }
}

fn resolve_data_dir(
    flag: Option<PathBuf>,
    env_value: Option<std::ffi::OsString>,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    if let Some(value) = env_value.filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(value));
    }
    match home {
        Some(home) => Ok(home.join(DEFAULT_DATA_DIR_NAME)),
        None => bail!("could not determine a data directory; pass --data-dir or set {DATA_DIR_ENV}"),
    }
}

fn run_generate(workspace: &Workspace, args: GenerateArgs) -> Result<i32> {
    if args.prompt.trim().is_empty() && args.files.is_empty() {
        bail!("generate needs --prompt, --file, or both");
    }
    let attachments = load_attachments(&args.files)?;
    let mut session = workspace.session();
    if let Some(id) = args.project.as_deref() {
        session.load(id)?;
    }

    let report = session.send(args.prompt.trim(), attachments)?;
    print_turn(&report);
    if let TurnOutcome::TransportFailed(_) = report.outcome {
        return Ok(1);
    }
    let Some(chart) = session.chart() else {
        return Ok(1);
    };
    write_document(chart, args.out.as_deref())?;
    Ok(0)
}

fn run_chat(workspace: &Workspace, args: ChatArgs) -> Result<()> {
    let mut session = workspace.session();
    if let Some(id) = args.project.as_deref() {
        let project = session.load(id)?;
        println!("Loaded project {} ({})", project.name, project.id);
    }

    let stdin = io::stdin();
    let mut line = String::new();
    let mut pending: Vec<Attachment> = Vec::new();

    println!(
        "EasyGraph chat started (model {}). Type /help for commands.",
        session.composer().model()
    );

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        match parse_intent(input) {
            ChatIntent::Noop => continue,
            ChatIntent::Help => {
                println!("Commands: {}", help_lines().join(" "));
            }
            ChatIntent::Attach(paths) => {
                if paths.is_empty() {
                    println!("/attach requires at least one path");
                    continue;
                }
                let paths: Vec<PathBuf> = paths.into_iter().map(PathBuf::from).collect();
                match load_attachments(&paths) {
                    Ok(loaded) => {
                        for attachment in &loaded {
                            println!("Attached {} ({})", attachment.name, attachment.mime_type);
                        }
                        pending.extend(loaded);
                    }
                    Err(err) => println!("Attach failed: {err:#}"),
                }
            }
            ChatIntent::Detach => {
                println!("Dropped {} pending attachment(s)", pending.len());
                pending.clear();
            }
            ChatIntent::Save(name) => match session.save_as(&name) {
                Ok(project) => println!("Saved project {} ({})", project.name, project.id),
                Err(err) => println!("Save failed: {err:#}"),
            },
            ChatIntent::New => {
                warn_unsaved(&session);
                session.start_new();
                pending.clear();
                println!("Started a new conversation");
            }
            ChatIntent::Projects => print_projects(session.store().list()),
            ChatIntent::Load(id) => {
                warn_unsaved(&session);
                match session.load(&id) {
                    Ok(project) => println!(
                        "Loaded project {} ({} messages)",
                        project.name,
                        project.messages.len()
                    ),
                    Err(err) => println!("Load failed: {err:#}"),
                }
            }
            ChatIntent::Delete(id) => match session.delete(&id) {
                Ok(true) => println!("Deleted project {id}"),
                Ok(false) => println!("No project with id {id}"),
                Err(err) => println!("Delete failed: {err:#}"),
            },
            ChatIntent::Render(path) => {
                let Some(chart) = session.chart() else {
                    println!("No chart yet");
                    continue;
                };
                let out = path.map(PathBuf::from);
                if let Err(err) = write_document(chart, out.as_deref()) {
                    println!("Render failed: {err:#}");
                }
            }
            ChatIntent::Quit => break,
            ChatIntent::Unknown { command, .. } => {
                println!("Unknown or incomplete command /{command}. Type /help.");
            }
            ChatIntent::Send(text) => {
                let attachments = std::mem::take(&mut pending);
                let report = session.send(&text, attachments)?;
                print_turn(&report);
            }
        }
    }

    warn_unsaved(&session);
    Ok(())
}

fn run_projects(workspace: &Workspace, action: ProjectsCommand) -> Result<i32> {
    let mut session = workspace.session();
    match action {
        ProjectsCommand::List => print_projects(session.store().list()),
        ProjectsCommand::Show { id } => {
            let project = session.load(&id)?;
            println!("{}", serde_json::to_string_pretty(project)?);
        }
        ProjectsCommand::Delete { id } => {
            if !session.delete(&id)? {
                eprintln!("No project with id {id}");
                return Ok(1);
            }
            println!("Deleted project {id}");
        }
        ProjectsCommand::Rename { id, name } => {
            session.rename(&id, &name)?;
            println!("Renamed project {id} to {}", name.trim());
        }
    }
    Ok(0)
}

fn run_key(workspace: &Workspace, action: KeyCommand) -> Result<i32> {
    let store = workspace.credentials();
    match action {
        KeyCommand::Set { key } => {
            store.save(&key)?;
            let stored = store.load().unwrap_or_default();
            println!("Saved custom API key {}", mask_api_key(&stored));
        }
        KeyCommand::Clear => {
            if store.clear()? {
                println!("Cleared custom API key; the default key will be used");
            } else {
                println!("No custom API key stored");
            }
        }
        KeyCommand::Status => {
            if let Some(key) = store.load() {
                println!("Using custom API key {}", mask_api_key(&key));
            } else if workspace.composer().resolve_api_key().is_ok() {
                println!("Using default API key from the environment");
            } else {
                println!("No API key configured");
                return Ok(1);
            }
        }
    }
    Ok(0)
}

fn run_render(workspace: &Workspace, args: RenderArgs) -> Result<i32> {
    let mut session = workspace.session();
    session.load(&args.project)?;
    let Some(chart) = session.chart() else {
        bail!("project {} has no chart yet", args.project);
    };
    write_document(chart, args.out.as_deref())?;
    Ok(0)
}

fn load_attachments(paths: &[PathBuf]) -> Result<Vec<Attachment>> {
    paths.iter().map(|path| load_attachment(path)).collect()
}

fn print_turn(report: &TurnReport) {
    println!("{}", report.reply.content);
    match &report.outcome {
        TurnOutcome::Rendered => {
            if let Some(chart) = report.reply.chart_config.as_ref() {
                println!(
                    "Chart: {} with {} dataset(s) over {} label(s)",
                    chart.chart_type.as_str(),
                    chart.data.datasets.len(),
                    chart.data.labels.len()
                );
            }
        }
        TurnOutcome::Fallback { reason } => {
            eprintln!("Warning: reply was not valid chart JSON ({reason})");
        }
        TurnOutcome::TransportFailed(err) => {
            eprintln!("easygraph-rs error: {err}");
        }
    }
    if report.autosaved {
        println!("Project auto-saved");
    }
}

fn print_projects(projects: &[Project]) {
    if projects.is_empty() {
        println!("No saved projects");
        return;
    }
    for project in projects {
        println!(
            "{}  {}  ({} messages, modified {})",
            project.id,
            project.name,
            project.messages.len(),
            format_millis(project.last_modified)
        );
    }
}

fn warn_unsaved(session: &EditorSession) {
    if session.has_unsaved_changes() && session.project_id().is_none() {
        println!("Note: the current conversation was not saved");
    }
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|ts| ts.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// Writes the renderer document to `out`, or stdout when no path is given.
fn write_document(chart: &ChartConfiguration, out: Option<&Path>) -> Result<()> {
    let document = serde_json::to_string_pretty(&render_document(chart))?;
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, format!("{document}\n"))
                .with_context(|| format!("failed writing {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => println!("{document}"),
    }
    Ok(())
}
