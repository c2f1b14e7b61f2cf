use clap::{Parser, Subcommand};
use reagent::chat::{ChatSession, ChatUpdate};
use reagent::config::{ReconnectMode, ReconnectPolicy};
use reagent::plan::PlanEditError;
use reagent::reducer::ChatVariant;
use reagent::session::{Message, MessageKind};
use reagent::transport::ConnectionState;
use reagent::ws::WsConnector;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "reagent")]
#[command(about = "Reagent CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Chat with the agent over a live connection (interactive). Type /help for commands.
    Chat {
        /// Config file path (default: REAGENT_CONFIG_PATH or ~/.reagent/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Existing session id to continue; omit to start a new session.
        #[arg(long, value_name = "ID")]
        session: Option<String>,

        /// Planning chat: activity feed and execution plans instead of raw ReAct steps.
        #[arg(long)]
        planning: bool,

        /// Reconnect automatically when the connection drops (fixed delay, bounded attempts).
        #[arg(long)]
        auto_reconnect: bool,
    },

    /// List, inspect, save or delete sessions.
    Sessions {
        /// Config file path (default: REAGENT_CONFIG_PATH or ~/.reagent/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        #[command(subcommand)]
        action: SessionsAction,
    },

    /// Browse a session's workspace files and saved outputs.
    Files {
        /// Config file path (default: REAGENT_CONFIG_PATH or ~/.reagent/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        #[command(subcommand)]
        action: FilesAction,
    },
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List all sessions
    List,
    /// Show a session's message history and files
    Show { id: String },
    /// Delete a session
    Delete { id: String },
    /// Force the server to persist a session
    Save { id: String },
}

#[derive(Subcommand)]
enum FilesAction {
    /// List workspace files
    List {
        id: String,
        /// Sub-directory inside the workspace
        #[arg(long, value_name = "DIR")]
        path: Option<String>,
    },
    /// Print a text file
    Read { id: String, path: String },
    /// Download a file
    Download {
        id: String,
        path: String,
        /// Destination (default: the file's name in the current directory)
        #[arg(long, short, value_name = "FILE")]
        out: Option<std::path::PathBuf>,
    },
    /// List saved task outputs
    Outputs { id: String },
    /// Print one saved output
    Output { id: String, name: String },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("reagent {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Chat {
            config,
            session,
            planning,
            auto_reconnect,
        }) => {
            if let Err(e) = run_chat(config, session, planning, auto_reconnect).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Sessions { config, action }) => {
            if let Err(e) = run_sessions(config, action).await {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Files { config, action }) => {
            if let Err(e) = run_files(config, action).await {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn api_client(config_path: Option<std::path::PathBuf>) -> anyhow::Result<reagent::api::ApiClient> {
    let (config, _) = reagent::config::load_config(config_path)?;
    let endpoints = reagent::config::resolve_endpoints(&config)?;
    Ok(reagent::api::ApiClient::new(endpoints))
}

async fn run_sessions(config_path: Option<std::path::PathBuf>, action: SessionsAction) -> anyhow::Result<()> {
    let api = api_client(config_path)?;
    match action {
        SessionsAction::List => {
            let sessions = api.list_sessions().await?;
            if sessions.is_empty() {
                println!("no sessions");
            }
            for s in sessions {
                println!(
                    "{}  updated {}  {} messages  {} files",
                    s.session_id, s.updated_at, s.message_count, s.file_count
                );
            }
        }
        SessionsAction::Show { id } => {
            let detail = api.get_session(&id).await?;
            println!("session {} (created {}, updated {})", detail.session_id, detail.created_at, detail.updated_at);
            for m in &detail.messages {
                println!("[{}] {}: {}", m.timestamp, m.role, m.content);
            }
            if !detail.created_files.is_empty() {
                println!("files: {}", detail.created_files.join(", "));
            }
        }
        SessionsAction::Delete { id } => println!("{}", api.delete_session(&id).await?),
        SessionsAction::Save { id } => println!("{}", api.save_session(&id).await?),
    }
    Ok(())
}

async fn run_files(config_path: Option<std::path::PathBuf>, action: FilesAction) -> anyhow::Result<()> {
    let api = api_client(config_path)?;
    match action {
        FilesAction::List { id, path } => {
            let listing = api.list_files(&id, path.as_deref()).await?;
            for f in listing.files {
                if f.is_directory {
                    println!("{}/", f.path);
                } else {
                    println!("{}  ({} bytes)", f.path, f.size);
                }
            }
        }
        FilesAction::Read { id, path } => {
            let file = api.read_file(&id, &path).await?;
            print!("{}", file.content);
        }
        FilesAction::Download { id, path, out } => {
            let bytes = api.download_file(&id, &path).await?;
            let out = out.unwrap_or_else(|| {
                std::path::Path::new(&path)
                    .file_name()
                    .map(std::path::PathBuf::from)
                    .unwrap_or_else(|| std::path::PathBuf::from("download"))
            });
            tokio::fs::write(&out, &bytes).await?;
            println!("saved {} bytes to {}", bytes.len(), out.display());
        }
        FilesAction::Outputs { id } => {
            for o in api.list_outputs(&id).await? {
                println!("{}  {}  {}", o.filename, o.timestamp, o.task);
            }
        }
        FilesAction::Output { id, name } => {
            let output = api.get_output(&id, &name).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// One line typed at the chat prompt.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Chat(String),
    New,
    Switch(String),
    Stop,
    Suggest(String),
    Plan(String),
    Approve,
    RenameTask { phase: String, task: String, name: String },
    RenameDeliverable { deliverable: String, name: String },
    Pause,
    Resume,
    Reconnect,
    Help,
    Exit,
    Invalid(&'static str),
}

fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(Input::Chat(line.to_string()));
    }
    let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let input = match cmd.to_ascii_lowercase().as_str() {
        "/new" => Input::New,
        "/switch" if rest.is_empty() => Input::Invalid("usage: /switch ID"),
        "/switch" => Input::Switch(rest.to_string()),
        "/stop" => Input::Stop,
        "/suggest" if rest.is_empty() => Input::Invalid("usage: /suggest TEXT"),
        "/suggest" => Input::Suggest(rest.to_string()),
        "/plan" if rest.is_empty() => Input::Invalid("usage: /plan TEXT"),
        "/plan" => Input::Plan(rest.to_string()),
        "/approve" => Input::Approve,
        "/rename-task" => {
            let mut parts = rest.splitn(3, char::is_whitespace);
            match (parts.next(), parts.next(), parts.next().map(str::trim)) {
                (Some(phase), Some(task), Some(name)) if !name.is_empty() => Input::RenameTask {
                    phase: phase.to_string(),
                    task: task.to_string(),
                    name: name.to_string(),
                },
                _ => Input::Invalid("usage: /rename-task PHASE TASK NAME"),
            }
        }
        "/rename-deliverable" => match rest.split_once(char::is_whitespace) {
            Some((id, name)) if !name.trim().is_empty() => Input::RenameDeliverable {
                deliverable: id.to_string(),
                name: name.trim().to_string(),
            },
            _ => Input::Invalid("usage: /rename-deliverable ID NAME"),
        },
        "/pause" => Input::Pause,
        "/resume" => Input::Resume,
        "/reconnect" => Input::Reconnect,
        "/help" => Input::Help,
        "/exit" | "/quit" => Input::Exit,
        _ => Input::Invalid("unknown command; try /help"),
    };
    Some(input)
}

const HELP: &str = "\
  TEXT                         send a message
  /new                         start a new session
  /switch ID                   switch to another session
  /stop                        interrupt the running task
  /suggest TEXT                steer the running task
  /plan TEXT                   ask for an execution plan
  /approve                     approve the proposed plan
  /rename-task PHASE TASK NAME rename a task in the proposed plan and send the edit
  /rename-deliverable ID NAME  rename a deliverable in the proposed project plan
  /pause, /resume              pause or resume plan execution
  /reconnect                   reopen a dropped connection
  /exit                        quit";

async fn run_chat(
    config_path: Option<std::path::PathBuf>,
    session: Option<String>,
    planning: bool,
    auto_reconnect: bool,
) -> anyhow::Result<()> {
    let (config, _) = reagent::config::load_config(config_path)?;
    let endpoints = reagent::config::resolve_endpoints(&config)?;
    let reconnect = match config.connection.reconnect {
        ReconnectMode::Manual if auto_reconnect => ReconnectMode::Auto(ReconnectPolicy::default()),
        mode => mode,
    };
    let variant = if planning {
        ChatVariant::Planning
    } else {
        ChatVariant::Simple
    };

    let mut chat = ChatSession::new(WsConnector, endpoints, reconnect, variant, session);
    chat.sync();
    let mut printed = 0usize;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let Some(input) = parse_input(&line) else { continue };
                if input == Input::Exit {
                    break;
                }
                if dispatch(&mut chat, input) {
                    printed = 0;
                }
                printed = print_new_messages(&chat, printed);
            }
            update = chat.recv() => {
                let Some(update) = update else { break };
                report(&chat, &update);
                printed = print_new_messages(&chat, printed);
            }
        }
    }

    chat.unmount();
    Ok(())
}

fn plan_edited(edited: Option<Result<(), PlanEditError>>) -> bool {
    match edited {
        None => {
            eprintln!("no plan to edit");
            false
        }
        Some(Err(e)) => {
            eprintln!("{}", e);
            false
        }
        Some(Ok(())) => true,
    }
}

/// Apply one prompt command. Returns true when the chat state was reset.
fn dispatch(chat: &mut ChatSession<WsConnector>, input: Input) -> bool {
    let sent = match input {
        Input::Chat(text) => chat.send_chat(text),
        Input::New => return chat.start_new_session(),
        Input::Switch(id) => return chat.select_session(Some(id)),
        Input::Stop => chat.interrupt(),
        Input::Suggest(text) => chat.suggest(text),
        Input::Plan(text) => chat.request_plan(text),
        Input::Approve => chat.approve_plan(),
        Input::RenameTask { phase, task, name } => {
            let edited = chat.edit_plan(|p| p.rename_task(&phase, &task, name));
            if !plan_edited(edited) {
                return false;
            }
            chat.update_plan()
        }
        Input::RenameDeliverable { deliverable, name } => {
            let edited = chat.edit_plan(|p| p.rename_deliverable(&deliverable, name));
            if !plan_edited(edited) {
                return false;
            }
            chat.update_plan()
        }
        Input::Pause => chat.pause_execution(),
        Input::Resume => chat.resume_execution(),
        Input::Reconnect => {
            if !chat.reconnect() {
                eprintln!("nothing to reconnect to");
            }
            return false;
        }
        Input::Help => {
            println!("{}", HELP);
            return false;
        }
        Input::Invalid(usage) => {
            eprintln!("{}", usage);
            return false;
        }
        Input::Exit => return false,
    };
    if !sent {
        eprintln!("not connected ({:?}); nothing was sent", chat.connection());
    }
    false
}

fn report(chat: &ChatSession<WsConnector>, update: &ChatUpdate) {
    match update {
        ChatUpdate::Connection(ConnectionState::Connected) => match chat.selected() {
            Some(id) => println!("* connected to session {}", id),
            None => println!("* connected; waiting for a new session"),
        },
        ChatUpdate::Connection(ConnectionState::Disconnected) => {
            println!("* disconnected (type /reconnect to retry)")
        }
        ChatUpdate::Connection(state) => log::debug!("connection state {:?}", state),
        ChatUpdate::Reconnecting { attempt, delay } => {
            println!("* connection lost; retry {} in {:?}", attempt, delay)
        }
        ChatUpdate::SessionAssigned(id) => println!("* session {}", id),
        ChatUpdate::Applied(kind) => report_planning(chat, kind),
        ChatUpdate::Ignored => {}
    }
}

fn report_planning(chat: &ChatSession<WsConnector>, kind: &str) {
    if chat.variant() != ChatVariant::Planning {
        return;
    }
    let state = chat.state();
    match kind {
        "action" | "activity" | "observation" => {
            if let Some(a) = state.activities.last() {
                println!("  [{:?}] {} ({:?})", a.status, a.tool, a.kind);
            }
        }
        "plan_proposal" | "plan_updated" | "plan_started" | "project_plan_created" | "project_plan_updated" => {
            if let Some(plan) = &state.plan {
                println!("plan: {} ({:?}, {:.0}% done)", plan.title, plan.status, plan.progress() * 100.0);
                for phase in &plan.phases {
                    println!("  {} {}", phase.id, phase.name);
                    for task in &phase.tasks {
                        println!("    {} {} [{:?}]", task.id, task.name, task.status);
                    }
                }
                for d in &plan.deliverables {
                    println!("  {} {} ({})", d.id, d.name, d.output_format);
                    for section in &d.sections {
                        println!("    {} {}", section.id, section.title);
                    }
                }
                if state.awaiting_approval {
                    println!("  /approve to run it, or /rename-task to edit");
                }
            }
        }
        _ => {}
    }
}

fn print_new_messages(chat: &ChatSession<WsConnector>, printed: usize) -> usize {
    let messages = &chat.state().messages;
    let start = printed.min(messages.len());
    for m in &messages[start..] {
        print_message(m);
    }
    messages.len()
}

fn print_message(m: &Message) {
    match m.kind {
        MessageKind::User => {}
        MessageKind::System => println!("* {}", m.content),
        MessageKind::Thought => println!("  (thinking) {}", m.content),
        MessageKind::Action => {
            let params = m
                .params
                .as_ref()
                .map(|p| serde_json::Value::Object(p.clone()).to_string())
                .unwrap_or_default();
            println!("  [{}] {}", m.tool.as_deref().unwrap_or("tool"), params);
        }
        MessageKind::Observation => {
            println!("  => {}", m.content.trim());
            if let Some(f) = &m.file_created {
                println!("  (created {})", f.path);
            }
        }
        MessageKind::Assistant | MessageKind::FinalAnswer => println!("< {}", m.content.trim()),
        MessageKind::Error => eprintln!("! {}", m.content),
    }
}
