//! BasketballIQ CLI
//!
//! Command-line front end for the basketball analytics assistant.
//!
//! # Overview
//!
//! Every command runs against one [`AppState`]. Without `--session` the state
//! lives only for the duration of the command; with `--session <file>` it is
//! loaded before and saved after every command that mutates it, so one-shot
//! commands share a conversation log, custom roster and feedback.
//!
//! Chat replies pass through the topic guard before they are shown or stored.

use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use model_gateway::GeminiProvider;
use player_analytics::{
    chart_series, compare_players, compute_metrics, rank_players, PlayerDraft, PlayerRecord,
    Position, ADVANCED_METRICS,
};
use serde_json::json;
use session_core::export::{export_transcript, EXPORT_FILENAME};
use session_core::settings::DEFAULT_CONFIG_PATH;
use session_core::{
    topic_query, AppState, ChatPipeline, Role, SessionError, Settings, TurnRecord,
    ANALYTICS_TOPICS, FEEDBACK_THANKS, PROGRESS_MESSAGE, SUGGESTED_QUESTIONS,
};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use topic_guard::{FilterOutcome, RecommendationFilter, TopicPolicy};
use tracing::{debug, Level};

/// Output format for results
#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine processing
    Json,
    /// Compact single-line output
    Compact,
}

/// Verbosity level
#[derive(Debug, Clone, ValueEnum)]
enum Verbosity {
    /// Errors only
    Quiet,
    /// Warnings and errors
    Normal,
    /// Chat turns, roster changes and exports
    Verbose,
    /// Debug output including prompts and provider status
    Debug,
}

impl Verbosity {
    fn level(&self) -> Level {
        match self {
            Verbosity::Quiet => Level::ERROR,
            Verbosity::Normal => Level::WARN,
            Verbosity::Verbose => Level::INFO,
            Verbosity::Debug => Level::DEBUG,
        }
    }
}

#[derive(Parser)]
#[command(name = "bbiq")]
#[command(author = "Jonathan D.A. Jewell <jonathan@hyperpolymath.org>")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Basketball analytics assistant with topic-guarded LLM chat")]
#[command(long_about = r#"
BasketballIQ - Basketball Analytics Assistant

OVERVIEW
  Chat with a hosted language model about basketball analytics, coaching
  and sports science. Replies that recommend something off-topic are
  replaced with a redirect back to basketball.

  Player tools compute derived metrics (impact score, true shooting,
  versatility, consistency, overall rating) for built-in sample players
  and players you add.

EXAMPLES
  bbiq ask "How does pace affect offensive rating?"
  bbiq --session game.json chat              # Interactive chat, saved
  bbiq stats "Stephen Curry"                 # Player stats with charts
  bbiq rank --format json                    # Ranked players as JSON
  bbiq compare "LeBron James" "Giannis Antetokounmpo"
  bbiq classify "Who won the game last night?"
  bbiq --session game.json export            # Transcript to PDF

EXIT CODES
  0  Success
  1  Input rejected (off-topic, invalid player, unknown player, bad rating)
  3  Error during execution

MORE INFO
  https://github.com/hyperpolymath/basketball-iq
"#)]
#[command(after_help = r#"
CONFIGURATION
  Settings are read from --config, or .bbiq/settings.json when present.
  Environment variables and flags override the file:
    GEMINI_API_KEY, BBIQ_MODEL, BBIQ_TEMPERATURE, BBIQ_API_BASE

SHELL COMPLETIONS
  Generate completions with:
    bbiq completions bash > /etc/bash_completion.d/bbiq
    bbiq completions zsh > ~/.zfunc/_bbiq
    bbiq completions fish > ~/.config/fish/completions/bbiq.fish
"#)]
struct Cli {
    /// Output verbosity level
    #[arg(short, long, value_enum, default_value = "normal", global = true)]
    verbosity: Verbosity,

    /// Settings file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Session file holding conversation, roster and feedback
    #[arg(short, long, global = true)]
    session: Option<PathBuf>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Model name
    #[arg(short, long, env = "BBIQ_MODEL", global = true)]
    model: Option<String>,

    /// Sampling temperature (0.0 - 1.0)
    #[arg(short, long, env = "BBIQ_TEMPERATURE", global = true)]
    temperature: Option<f32>,

    /// Provider API base URL
    #[arg(long, env = "BBIQ_API_BASE", global = true)]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    ///
    /// Sends the question with the session's conversation history and
    /// prints the (filtered) reply.
    #[command(visible_alias = "a")]
    Ask {
        /// Question text
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Interactive chat
    ///
    /// Lines starting with '/' are commands; type /help to list them.
    Chat,

    /// List, add or remove players
    ///
    /// With no action, lists sample and custom players.
    #[command(visible_alias = "p")]
    Players {
        #[command(subcommand)]
        action: Option<PlayerAction>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text", global = true)]
        format: OutputFormat,
    },

    /// Show stats, charts and derived metrics for one player
    Stats {
        /// Player name (case-insensitive)
        name: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Rank all players by overall rating
    Rank {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Compare players side by side
    Compare {
        /// Player names (at least two)
        #[arg(required = true, num_args = 2..)]
        names: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Check whether text is basketball-related
    ///
    /// Use '-' to read from stdin. Exits 1 when the text is off-topic.
    Classify {
        /// Text to classify
        text: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Run text through the recommendation filter
    ///
    /// Use '-' to read from stdin.
    Filter {
        /// Text to filter
        text: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List suggested questions and analytics topics
    Topics,

    /// Export the conversation to PDF
    Export {
        /// Output file
        #[arg(short, long, default_value = EXPORT_FILENAME)]
        output: PathBuf,
    },

    /// Leave feedback
    Feedback {
        /// Feedback text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        /// Rating from 1 to 5
        #[arg(short, long, default_value_t = DEFAULT_RATING)]
        rating: u8,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    ///
    /// Outputs shell completion scripts to stdout.
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Generate man page
    ///
    /// EXAMPLE
    ///   bbiq man > /usr/local/share/man/man1/bbiq.1
    Man,
}

#[derive(Subcommand)]
enum PlayerAction {
    /// List all players
    List,

    /// Add a custom player
    ///
    /// EXAMPLE
    ///   bbiq players add "Bam Adebayo" --ppg 19.3 --rpg 10.4 --apg 3.9 \
    ///     --fg 52.1 --three 35.7 --ft 75.5 \
    ///     --games 18,22,16,25,19,21,14,20,23,17 --position center
    Add {
        /// Player name
        name: String,
        #[arg(long, default_value = "0")]
        ppg: f64,
        #[arg(long, default_value = "0")]
        rpg: f64,
        #[arg(long, default_value = "0")]
        apg: f64,
        /// Field goal percentage
        #[arg(long, default_value = "0")]
        fg: f64,
        /// Three-point percentage
        #[arg(long, default_value = "0")]
        three: f64,
        /// Free throw percentage
        #[arg(long, default_value = "0")]
        ft: f64,
        /// Points in the last 10 games, comma separated
        #[arg(long, value_delimiter = ',')]
        games: Vec<u32>,
        /// guard, forward or center
        #[arg(long)]
        position: Option<Position>,
    },

    /// Remove a custom player
    Remove {
        /// Player name
        name: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default settings file
    ///
    /// REVERSIBILITY
    ///   Remove with: rm -rf .bbiq/
    Init {
        /// Force overwrite existing settings
        #[arg(short, long)]
        force: bool,
    },

    /// Show effective settings (API key redacted)
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity.level())
        .with_writer(std::io::stderr)
        .init();

    let exit_code = run(cli).await;
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> i32 {
    // Commands that need no settings or session
    match &cli.command {
        Commands::Completions { shell } => {
            generate_completions(*shell);
            return 0;
        }
        Commands::Man => {
            generate_man_page();
            return 0;
        }
        Commands::Config {
            action: ConfigAction::Init { force },
        } => return init_config(cli.config.as_deref(), *force),
        _ => {}
    }

    let settings = match resolve_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to load settings: {}", e);
            return 3;
        }
    };

    let session_options = SessionOptions {
        path: cli.session.clone(),
        override_model: cli.model.is_some(),
        override_temperature: cli.temperature.is_some(),
    };

    match cli.command {
        Commands::Config {
            action: ConfigAction::Show { format },
        } => show_config(&settings, &format),
        Commands::Classify { text, format } => match read_text_arg(text) {
            Ok(text) => classify_text(&settings, &text, &format),
            Err(code) => code,
        },
        Commands::Filter { text, format } => match read_text_arg(text) {
            Ok(text) => filter_text(&settings, &text, &format),
            Err(code) => code,
        },
        Commands::Topics => {
            show_topics();
            0
        }
        command => {
            let mut session = match Session::open(session_options, &settings) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Failed to open session: {}", e);
                    return 3;
                }
            };
            run_session_command(command, &mut session, &settings).await
        }
    }
}

async fn run_session_command(
    command: Commands,
    session: &mut Session,
    settings: &Settings,
) -> i32 {
    match command {
        Commands::Ask { question, format } => {
            let pipeline = match build_pipeline(settings) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Failed to set up chat: {}", e);
                    return 3;
                }
            };
            let code = ask_question(session, &pipeline, &question.join(" "), &format).await;
            session.persist_or(code)
        }
        Commands::Chat => {
            let pipeline = match build_pipeline(settings) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Failed to set up chat: {}", e);
                    return 3;
                }
            };
            let code = chat_loop(session, &pipeline).await;
            session.persist_or(code)
        }
        Commands::Players { action, format } => match action {
            None | Some(PlayerAction::List) => {
                list_players(&session.state, &format);
                0
            }
            Some(PlayerAction::Add {
                name,
                ppg,
                rpg,
                apg,
                fg,
                three,
                ft,
                games,
                position,
            }) => {
                let draft = PlayerDraft {
                    name,
                    ppg,
                    rpg,
                    apg,
                    fg_pct: fg,
                    three_pct: three,
                    ft_pct: ft,
                    games,
                    position,
                };
                let code = add_player(&mut session.state, draft);
                session.persist_or(code)
            }
            Some(PlayerAction::Remove { name }) => {
                let code = remove_player(&mut session.state, &name);
                session.persist_or(code)
            }
        },
        Commands::Stats { name, format } => show_stats(&session.state, &name, &format),
        Commands::Rank { format } => show_rank(&session.state, &format),
        Commands::Compare { names, format } => show_comparison(&session.state, &names, &format),
        Commands::Export { output } => export_chat(&session.state, &output),
        Commands::Feedback { text, rating } => {
            let code = leave_feedback(&mut session.state, &text.join(" "), rating);
            session.persist_or(code)
        }
        // Handled before the session is opened
        Commands::Classify { .. }
        | Commands::Filter { .. }
        | Commands::Topics
        | Commands::Config { .. }
        | Commands::Completions { .. }
        | Commands::Man => 0,
    }
}

// ============ Settings and Session ============

/// File settings, then environment and flag overrides
fn resolve_settings(cli: &Cli) -> Result<Settings, SessionError> {
    let mut settings = Settings::load_or_default(cli.config.as_deref())?;
    if let Some(key) = &cli.api_key {
        settings.api_key = Some(key.clone());
    }
    if let Some(model) = &cli.model {
        settings.model = model.clone();
    }
    if let Some(temperature) = cli.temperature {
        settings.temperature = temperature;
    }
    if let Some(base) = &cli.api_base {
        settings.api_base = base.clone();
    }
    settings.validate()?;
    Ok(settings)
}

fn load_policy(settings: &Settings) -> Result<TopicPolicy, SessionError> {
    match &settings.topic_policy {
        Some(path) => Ok(TopicPolicy::load(path)?),
        None => Ok(TopicPolicy::basketball_default()),
    }
}

fn build_filter(settings: &Settings) -> Result<RecommendationFilter, SessionError> {
    Ok(RecommendationFilter::from_policy(&load_policy(settings)?)?)
}

fn build_pipeline(settings: &Settings) -> Result<ChatPipeline, SessionError> {
    if settings.api_key.is_none() {
        eprintln!("Warning: no Gemini API key configured. Set GEMINI_API_KEY or pass --api-key.");
    }
    let provider = GeminiProvider::with_base_url(
        settings.api_key.clone().unwrap_or_default(),
        settings.api_base.clone(),
    );
    ChatPipeline::new(Box::new(provider), &load_policy(settings)?)
}

struct SessionOptions {
    path: Option<PathBuf>,
    override_model: bool,
    override_temperature: bool,
}

struct Session {
    state: AppState,
    path: Option<PathBuf>,
}

impl Session {
    fn open(options: SessionOptions, settings: &Settings) -> Result<Self, SessionError> {
        let mut state = match &options.path {
            Some(path) => AppState::load_or_new(path, settings)?,
            None => AppState::new(settings),
        };
        // Explicit overrides win over preferences stored in the session
        if options.override_model {
            state.preferences.model = settings.model.clone();
        }
        if options.override_temperature {
            state.set_temperature(settings.temperature)?;
        }
        Ok(Self {
            state,
            path: options.path,
        })
    }

    fn persist(&self) -> Result<(), SessionError> {
        match &self.path {
            Some(path) => self.state.save(path),
            None => Ok(()),
        }
    }

    /// Save, turning a save failure into exit code 3
    fn persist_or(&self, code: i32) -> i32 {
        match self.persist() {
            Ok(()) => code,
            Err(e) => {
                eprintln!("Failed to save session: {}", e);
                3
            }
        }
    }
}

/// Resolve '-' to stdin
fn read_text_arg(text: String) -> Result<String, i32> {
    if text != "-" {
        return Ok(text);
    }
    let mut buffer = String::new();
    match std::io::stdin().read_to_string(&mut buffer) {
        Ok(_) => Ok(buffer),
        Err(e) => {
            eprintln!("Failed to read stdin: {}", e);
            Err(3)
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{}", s);
            0
        }
        Err(e) => {
            eprintln!("Failed to serialize output: {}", e);
            3
        }
    }
}

// ============ Chat ============

async fn run_turn(
    state: &mut AppState,
    pipeline: &ChatPipeline,
    input: &str,
    show_progress: bool,
) -> Result<TurnRecord, SessionError> {
    if show_progress {
        eprint!("{}", PROGRESS_MESSAGE);
        let _ = std::io::stderr().flush();
    }
    let result = state.send_message(pipeline, input).await;
    if show_progress {
        eprint!("\r{}\r", " ".repeat(PROGRESS_MESSAGE.len()));
    }
    result
}

fn last_reply(state: &AppState) -> &str {
    state
        .log()
        .last()
        .filter(|m| m.role == Role::Assistant)
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

async fn ask_question(
    session: &mut Session,
    pipeline: &ChatPipeline,
    question: &str,
    format: &OutputFormat,
) -> i32 {
    let show_progress = matches!(format, OutputFormat::Text);
    let record = match run_turn(&mut session.state, pipeline, question, show_progress).await {
        Ok(r) => r,
        Err(SessionError::EmptyMessage) => {
            eprintln!("Question is empty");
            return 1;
        }
        Err(e) => {
            eprintln!("Error asking question: {}", e);
            return 3;
        }
    };
    let reply = last_reply(&session.state);

    match format {
        OutputFormat::Json => {
            let code = print_json(&json!({ "turn": record, "reply": reply }));
            if code != 0 {
                return code;
            }
        }
        OutputFormat::Compact => {
            let status = match (&record.provider_error, &record.filter_outcome) {
                (Some(_), _) => "ERROR",
                (None, Some(outcome)) if outcome.is_redirected() => "REDIRECTED",
                _ => "OK",
            };
            println!(
                "{} off_topic={} {}",
                status,
                record.off_topic,
                reply.replace('\n', " ")
            );
        }
        OutputFormat::Text => println!("{}", reply),
    }

    if record.provider_error.is_some() {
        3
    } else {
        0
    }
}

const CHAT_HELP: &str = r#"Commands:
  /help                      Show this help
  /clear                     Clear the conversation
  /export [file]             Export the conversation to PDF
  /players                   List players
  /stats <name>              Player stats and charts
  /add <name>|<ppg>|<rpg>|<apg>|<fg%>|<3p%>|<ft%>|<g1,...,g10>[|position]
                             Add a custom player
  /remove <name>             Remove a custom player
  /rank                      Rank players by overall rating
  /compare <name>, <name>... Compare players
  /topics                    List suggested questions and topics
  /topic <n>                 Ask about analytics topic n
  /temp <0.0-1.0>            Set temperature
  /prompt <text>             Replace the system prompt
  /feedback [1-5] <text>     Leave feedback (rating defaults to 5)
  /quit                      Leave the chat"#;

async fn chat_loop(session: &mut Session, pipeline: &ChatPipeline) -> i32 {
    println!("BasketballIQ - your basketball analytics assistant. Type /help for commands.");
    if session.state.log().is_empty() {
        println!("\nTry asking:");
        for question in SUGGESTED_QUESTIONS {
            println!("  - {}", question);
        }
    } else {
        println!("\nResuming conversation ({} messages).", session.state.log().len());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nyou> ");
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("Failed to read input: {}", e);
                return 3;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message = match line.strip_prefix('/') {
            Some(command) => {
                let (name, args) = command
                    .split_once(char::is_whitespace)
                    .map(|(n, a)| (n, a.trim()))
                    .unwrap_or((command, ""));
                match chat_command(session, name, args) {
                    ChatControl::Continue => None,
                    ChatControl::Quit => break,
                    ChatControl::Send(message) => Some(message),
                }
            }
            None => Some(line.to_string()),
        };

        if let Some(message) = message {
            match run_turn(&mut session.state, pipeline, &message, true).await {
                Ok(_) => println!("\nBasketballIQ> {}", last_reply(&session.state)),
                Err(e) => eprintln!("{}", e),
            }
        }

        if let Err(e) = session.persist() {
            eprintln!("Failed to save session: {}", e);
        }
    }
    0
}

enum ChatControl {
    Continue,
    Quit,
    Send(String),
}

fn chat_command(session: &mut Session, name: &str, args: &str) -> ChatControl {
    let state = &mut session.state;
    match name {
        "help" | "h" | "?" => println!("{}", CHAT_HELP),
        "quit" | "exit" | "q" => return ChatControl::Quit,
        "clear" => {
            let removed = state.clear_history();
            println!("Cleared {} messages.", removed);
        }
        "export" => {
            let output = if args.is_empty() { EXPORT_FILENAME } else { args };
            export_chat(state, Path::new(output));
        }
        "players" => list_players(state, &OutputFormat::Text),
        "stats" => {
            show_stats(state, args, &OutputFormat::Text);
        }
        "add" => match parse_player_spec(args) {
            Ok(draft) => {
                add_player(state, draft);
            }
            Err(e) => eprintln!("{}", e),
        },
        "remove" => {
            remove_player(state, args);
        }
        "rank" => {
            show_rank(state, &OutputFormat::Text);
        }
        "compare" => {
            let names: Vec<String> = args
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect();
            show_comparison(state, &names, &OutputFormat::Text);
        }
        "topics" => show_topics(),
        "topic" => {
            let query = args
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(topic_query);
            match query {
                Some(query) => return ChatControl::Send(query),
                None => eprintln!("Pick a topic between 1 and {}", ANALYTICS_TOPICS.len()),
            }
        }
        "temp" => match args.parse::<f32>() {
            Ok(t) => match state.set_temperature(t) {
                Ok(()) => println!("Temperature set to {:.1}", t),
                Err(e) => eprintln!("{}", e),
            },
            Err(_) => eprintln!("Usage: /temp <0.0-1.0>"),
        },
        "prompt" => match state.set_system_prompt(args) {
            Ok(()) => println!("System prompt updated."),
            Err(e) => eprintln!("{}", e),
        },
        "feedback" => {
            let (rating, text) = split_feedback_args(args);
            leave_feedback(state, text, rating);
        }
        other => eprintln!("Unknown command: /{} (try /help)", other),
    }
    ChatControl::Continue
}

const DEFAULT_RATING: u8 = 5;

/// Split `/feedback` arguments into rating and text.
///
/// A leading number is a rating only when it is within 1..=5; otherwise it
/// stays part of the text.
fn split_feedback_args(args: &str) -> (u8, &str) {
    let (first, rest) = args
        .split_once(char::is_whitespace)
        .map(|(first, rest)| (first, rest.trim()))
        .unwrap_or((args, ""));
    match first.parse::<u8>() {
        Ok(rating) if (1..=5).contains(&rating) => (rating, rest),
        _ => (DEFAULT_RATING, args),
    }
}

/// Parse `name|ppg|rpg|apg|fg%|3p%|ft%|g1,...,g10[|position]`
fn parse_player_spec(spec: &str) -> Result<PlayerDraft, String> {
    let fields: Vec<&str> = spec.split('|').map(str::trim).collect();
    if !(8..=9).contains(&fields.len()) {
        return Err(
            "Usage: /add <name>|<ppg>|<rpg>|<apg>|<fg%>|<3p%>|<ft%>|<g1,...,g10>[|position]"
                .to_string(),
        );
    }
    let number = |index: usize, label: &str| -> Result<f64, String> {
        fields[index]
            .parse::<f64>()
            .map_err(|_| format!("{} must be a number (got '{}')", label, fields[index]))
    };
    let games = fields[7]
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(|g| {
            g.parse::<u32>()
                .map_err(|_| format!("game points must be whole numbers (got '{}')", g))
        })
        .collect::<Result<Vec<u32>, String>>()?;
    let position = match fields.get(8) {
        Some(p) if !p.is_empty() => Some(p.parse::<Position>().map_err(|e| e.to_string())?),
        _ => None,
    };

    Ok(PlayerDraft {
        name: fields[0].to_string(),
        ppg: number(1, "PPG")?,
        rpg: number(2, "RPG")?,
        apg: number(3, "APG")?,
        fg_pct: number(4, "FG%")?,
        three_pct: number(5, "3P%")?,
        ft_pct: number(6, "FT%")?,
        games,
        position,
    })
}

// ============ Players ============

fn list_players(state: &AppState, format: &OutputFormat) {
    let roster = state.roster();
    match format {
        OutputFormat::Json => {
            let players: Vec<&PlayerRecord> = roster.all().collect();
            print_json(&players);
        }
        OutputFormat::Compact => {
            let names: Vec<&str> = roster.all().map(|p| p.name.as_str()).collect();
            println!("players={} {}", roster.len(), names.join(", "));
        }
        OutputFormat::Text => {
            println!("=== Players ({}) ===\n", roster.len());
            println!("{:<28} {:>6} {:>6} {:>6}  Position", "Name", "PPG", "RPG", "APG");
            for player in roster.all() {
                let custom = roster.custom().iter().any(|c| c.name == player.name);
                println!(
                    "{:<28} {:>6.1} {:>6.1} {:>6.1}  {}{}",
                    player.name,
                    player.ppg,
                    player.rpg,
                    player.apg,
                    player.position.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
                    if custom { "  (custom)" } else { "" }
                );
            }
        }
    }
}

fn add_player(state: &mut AppState, draft: PlayerDraft) -> i32 {
    match state.add_player(draft) {
        Ok(record) => {
            println!("Added {}.", record.name);
            0
        }
        Err(SessionError::Roster(e)) => {
            eprintln!("{}", e);
            1
        }
        Err(e) => {
            eprintln!("Error adding player: {}", e);
            3
        }
    }
}

fn remove_player(state: &mut AppState, name: &str) -> i32 {
    if state.remove_player(name) {
        println!("Removed {}.", name);
    } else {
        println!("No custom player named '{}'.", name);
    }
    0
}

const BAR_WIDTH: usize = 30;

fn bar(value: f64, max: f64) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let filled = ((value / max) * BAR_WIDTH as f64).round() as usize;
    "█".repeat(filled.min(BAR_WIDTH))
}

fn show_stats(state: &AppState, name: &str, format: &OutputFormat) -> i32 {
    let Some(player) = state.roster().get(name) else {
        eprintln!("Unknown player: {}", name);
        return 1;
    };
    let metrics = compute_metrics(player);
    let charts = chart_series(player);
    debug!(player = %player.name, "computed player metrics");

    match format {
        OutputFormat::Json => {
            return print_json(&json!({
                "player": player,
                "metrics": metrics,
                "charts": charts,
            }))
        }
        OutputFormat::Compact => {
            println!(
                "{} impact={:.1} ts={} overall={}",
                player.name, metrics.impact_score, metrics.true_shooting, metrics.overall_rating
            );
        }
        OutputFormat::Text => {
            println!("=== {} ===\n", player.name);
            if let Some(position) = player.position {
                println!("Position: {}\n", position);
            }

            println!("BASIC STATS");
            let basic_max = charts.basic.iter().map(|(_, v)| *v).fold(0.0, f64::max);
            for (label, value) in &charts.basic {
                println!("  {:<4} {:>5.1} {}", label, value, bar(*value, basic_max));
            }

            println!("\nSHOOTING PERCENTAGES");
            for (label, value) in &charts.shooting {
                println!("  {:<4} {:>5.1} {}", label, value, bar(*value, 100.0));
            }

            println!("\nLAST {} GAMES (points)", charts.trend.len());
            let trend_max = charts.trend.iter().map(|(_, p)| f64::from(*p)).fold(0.0, f64::max);
            for (game, points) in &charts.trend {
                println!("  G{:<3} {:>3} {}", game, points, bar(f64::from(*points), trend_max));
            }

            println!("\nDERIVED METRICS");
            println!("  Impact Score:    {:.1}", metrics.impact_score);
            println!("  True Shooting:   {}", metrics.true_shooting);
            println!("  Versatility:     {:.1}", metrics.versatility);
            println!("  Efficiency:      {:.1}", metrics.efficiency);
            println!("  Overall Rating:  {}", metrics.overall_rating);

            println!("\nSKILL RATINGS");
            let skills = &metrics.skills;
            for (label, value) in [
                ("Scoring", skills.scoring),
                ("Playmaking", skills.playmaking),
                ("Rebounding", skills.rebounding),
                ("Efficiency", skills.efficiency),
            ] {
                println!("  {:<12} {:>5.1} {}", label, value, bar(value, 100.0));
            }
            match skills.consistency.value() {
                Some(c) => println!("  {:<12} {:>5.1} {}", "Consistency", c, bar(c, 100.0)),
                None => println!("  {:<12} {}", "Consistency", skills.consistency),
            }

            println!("\nADVANCED METRICS TO EXPLORE");
            for (metric, description) in ADVANCED_METRICS {
                println!("  {} - {}", metric, description);
            }
        }
    }
    0
}

fn show_rank(state: &AppState, format: &OutputFormat) -> i32 {
    let ranked = rank_players(state.roster().all());
    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = ranked
                .iter()
                .map(|r| {
                    json!({
                        "rank": r.rank,
                        "name": r.record.name,
                        "overall_rating": r.metrics.overall_rating,
                        "impact_score": r.metrics.impact_score,
                    })
                })
                .collect();
            return print_json(&rows);
        }
        OutputFormat::Compact => {
            let entries: Vec<String> = ranked
                .iter()
                .map(|r| format!("{}:{}={}", r.rank, r.record.name, r.metrics.overall_rating))
                .collect();
            println!("{}", entries.join(" "));
        }
        OutputFormat::Text => {
            println!("=== Player Rankings ===\n");
            println!("{:>4}  {:<28} {:>8} {:>8}", "Rank", "Name", "Overall", "Impact");
            for r in &ranked {
                println!(
                    "{:>4}  {:<28} {:>8} {:>8.1}",
                    r.rank,
                    r.record.name,
                    r.metrics.overall_rating.to_string(),
                    r.metrics.impact_score
                );
            }
        }
    }
    0
}

fn show_comparison(state: &AppState, names: &[String], format: &OutputFormat) -> i32 {
    if names.len() < 2 {
        eprintln!("Pick at least two players to compare");
        return 1;
    }
    let mut players = Vec::with_capacity(names.len());
    for name in names {
        match state.roster().get(name) {
            Some(p) => players.push(p),
            None => {
                eprintln!("Unknown player: {}", name);
                return 1;
            }
        }
    }
    let comparison = compare_players(&players);

    match format {
        OutputFormat::Json => return print_json(&comparison),
        OutputFormat::Compact => {
            for row in &comparison.rows {
                let leader = row
                    .leader
                    .map(|i| comparison.players[i].as_str())
                    .unwrap_or("-");
                println!("{}={}", row.label.replace(' ', "_"), leader);
            }
        }
        OutputFormat::Text => {
            println!("=== Player Comparison ===\n");
            print!("{:<16}", "");
            for name in &comparison.players {
                print!(" {:>24}", name);
            }
            println!();
            for row in &comparison.rows {
                print!("{:<16}", row.label);
                for (index, value) in row.values.iter().enumerate() {
                    let marker = if row.leader == Some(index) { "*" } else { " " };
                    print!(" {:>23}{}", value.to_string(), marker);
                }
                println!();
            }
            println!("\n* leader");
        }
    }
    0
}

// ============ Guard ============

fn classify_text(settings: &Settings, text: &str, format: &OutputFormat) -> i32 {
    let filter = match build_filter(settings) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to load topic policy: {}", e);
            return 3;
        }
    };
    let keyword = filter.classifier().matched_keyword(text);

    match format {
        OutputFormat::Json => {
            let code = print_json(&json!({
                "basketball_related": keyword.is_some(),
                "matched_keyword": keyword,
            }));
            if code != 0 {
                return code;
            }
        }
        OutputFormat::Compact => println!(
            "{} keyword={}",
            if keyword.is_some() { "RELATED" } else { "OFF_TOPIC" },
            keyword.unwrap_or("-")
        ),
        OutputFormat::Text => match keyword {
            Some(k) => println!("Basketball-related (matched \"{}\")", k),
            None => println!("Not basketball-related"),
        },
    }

    if keyword.is_some() {
        0
    } else {
        1
    }
}

fn filter_text(settings: &Settings, text: &str, format: &OutputFormat) -> i32 {
    let filter = match build_filter(settings) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to load topic policy: {}", e);
            return 3;
        }
    };
    let (output, outcome) = filter.screen(text.to_string());

    match format {
        OutputFormat::Json => print_json(&json!({ "outcome": outcome, "text": output })),
        OutputFormat::Compact => {
            let status = match &outcome {
                FilterOutcome::Passed => "PASSED".to_string(),
                FilterOutcome::OnTopic { pattern } => format!("ON_TOPIC pattern={}", pattern),
                FilterOutcome::Redirected { pattern } => format!("REDIRECTED pattern={}", pattern),
            };
            println!("{}", status);
            0
        }
        OutputFormat::Text => {
            println!("{}", output);
            0
        }
    }
}

fn show_topics() {
    println!("SUGGESTED QUESTIONS");
    for question in SUGGESTED_QUESTIONS {
        println!("  - {}", question);
    }
    println!("\nANALYTICS TOPICS");
    for (index, topic) in ANALYTICS_TOPICS.iter().enumerate() {
        println!("  {}. {}", index + 1, topic);
    }
}

// ============ Export and Feedback ============

fn export_chat(state: &AppState, output: &Path) -> i32 {
    let bytes = match export_transcript(state.log(), Local::now()) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Failed to export chat: {}", e);
            return 3;
        }
    };
    if let Err(e) = std::fs::write(output, &bytes) {
        eprintln!("Failed to write {}: {}", output.display(), e);
        return 3;
    }
    println!(
        "Exported {} messages to {}",
        state.log().len(),
        output.display()
    );
    0
}

fn leave_feedback(state: &mut AppState, text: &str, rating: u8) -> i32 {
    match state.submit_feedback(text, rating) {
        Ok(_) => {
            println!("{}", FEEDBACK_THANKS);
            0
        }
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    }
}

// ============ Config ============

fn init_config(path: Option<&Path>, force: bool) -> i32 {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    match Settings::write_default(path, force) {
        Ok(()) => {
            println!("Initialized BasketballIQ settings in {}", path.display());
            println!("Set GEMINI_API_KEY or add \"api_key\" to the file to enable chat.");
            0
        }
        Err(SessionError::InvalidSettings(message)) => {
            eprintln!("{}", message);
            1
        }
        Err(e) => {
            eprintln!("Failed to write settings: {}", e);
            3
        }
    }
}

fn show_config(settings: &Settings, format: &OutputFormat) -> i32 {
    let shown = settings.redacted();
    match format {
        OutputFormat::Json => print_json(&shown),
        OutputFormat::Compact => {
            println!(
                "model={} temperature={} api_key={}",
                shown.model,
                shown.temperature,
                if shown.api_key.is_some() { "set" } else { "unset" }
            );
            0
        }
        OutputFormat::Text => {
            println!("=== Settings ===\n");
            println!("Model:        {}", shown.model);
            println!("Temperature:  {}", shown.temperature);
            println!("API base:     {}", shown.api_base);
            println!(
                "API key:      {}",
                shown.api_key.as_deref().unwrap_or("(not set)")
            );
            if let Some(policy) = &shown.topic_policy {
                println!("Topic policy: {}", policy.display());
            }
            println!("\nSystem prompt:\n{}", shown.system_prompt);
            0
        }
    }
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    clap_complete::generate(shell, &mut Cli::command(), "bbiq", &mut std::io::stdout());
}

fn generate_man_page() {
    use clap::CommandFactory;
    let man = clap_mangen::Man::new(Cli::command());
    let mut buffer: Vec<u8> = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        eprintln!("Failed to generate man page: {}", e);
        std::process::exit(3);
    }
    print!("{}", String::from_utf8_lossy(&buffer));
}
