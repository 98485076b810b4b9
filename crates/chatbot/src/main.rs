use std::env;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use log::{LevelFilter, debug, info};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use chatbot::settings::{self, APP_NAME, AppConfig};
use chatbot::store::{ConversationStore, Message, Role};
use chatbot::{ApiClient, ChatApi, ChatSession, StreamTurn, StreamingApiClient, TurnOutcome};
use chatbot_protocol::{AgentType, ConnectionStatus};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "Error: {err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_main(ctx: RuntimeContext, command: Command) -> Result<()> {
    match command {
        Command::Chat(cmd) => handle_chat(&ctx, &mut build_session(&ctx)?, cmd).await,
        Command::Ask(cmd) => handle_ask(&ctx, &mut build_session(&ctx)?, cmd).await,
        Command::History => handle_history(&ctx, &mut build_session(&ctx)?).await,
        Command::Clear => handle_clear(&ctx, &mut build_session(&ctx)?).await,
        Command::Sessions => handle_sessions(&ctx, build_session(&ctx)?.api()).await,
        Command::Info => handle_info(&ctx, build_session(&ctx)?.api()).await,
        Command::Health => handle_health(&ctx, build_session(&ctx)?.api()).await,
        Command::WorkflowTest { query } => {
            handle_workflow_test(&ctx, &mut build_session(&ctx)?, query.as_deref()).await
        }
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    // Completions must not touch the config directory.
    if let Command::Completions { shell } = cli.command {
        return handle_completions(shell);
    }

    let create_config = !matches!(cli.command, Command::Init(_));
    let ctx = RuntimeContext::new(cli.common, create_config)?;
    ctx.init_logging()?;
    debug!("using config {}", ctx.config_file.display());

    async_main(ctx, cli.command)
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Terminal client for the multi-agent chatbot service.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", env = "CHATBOT_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// Backend URL (overrides api.base_url)
    #[arg(long, short = 's', env = "CHATBOT_SERVER_URL", global = true)]
    server: Option<String>,
    /// Continue an existing session instead of starting a new one
    #[arg(long, value_name = "ID", global = true)]
    session: Option<String>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true, conflicts_with = "yaml")]
    json: bool,
    /// Output machine readable YAML
    #[arg(long, global = true)]
    yaml: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
    /// Do not change anything on disk
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,
    /// Emit additional diagnostics for troubleshooting
    #[arg(long = "diagnostics", global = true)]
    diagnostics: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat (Ctrl-C stops the current reply)
    Chat(ChatCommand),
    /// Send one message and print the reply
    Ask(AskCommand),
    /// Show the history of the session given with --session
    History,
    /// Clear the session given with --session on the backend
    Clear,
    /// List sessions active on the backend
    Sessions,
    /// Show backend name, version and agents
    Info,
    /// Check the service and chat health endpoints
    Health,
    /// Run the backend's workflow self-test
    WorkflowTest {
        /// Query to send (defaults to a greeting)
        query: Option<String>,
    },
    /// Create the config file with defaults
    Init(InitCommand),
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ChatCommand {
    /// Wait for complete replies instead of streaming them
    #[arg(long)]
    no_stream: bool,
}

#[derive(Debug, Clone, Args)]
struct AskCommand {
    /// The message to send
    message: String,
    /// Wait for the complete reply instead of streaming it
    #[arg(long)]
    no_stream: bool,
}

#[derive(Debug, Clone, Args)]
struct InitCommand {
    /// Recreate configuration even if it already exists
    #[arg(long = "force")]
    force: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration
    Show,
    /// Print the resolved config file path
    Path,
    /// Regenerate the default configuration file
    Reset,
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    config_file: PathBuf,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts, create_config: bool) -> Result<Self> {
        let config_file = match common.config.clone() {
            Some(path) => {
                let expanded = settings::expand_str_path(&path.to_string_lossy())?;
                if expanded.is_dir() {
                    expanded.join("config.toml")
                } else {
                    expanded
                }
            }
            None => settings::default_config_file()?,
        };

        let mut config = if create_config {
            settings::load_or_init_config(&config_file, common.dry_run)?
        } else {
            settings::load_config(&config_file, &settings::env_prefix())?
        };
        if let Some(ref server) = common.server {
            config.api.base_url = server.trim_end_matches('/').to_string();
        }

        Ok(Self {
            common,
            config_file,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::fmt::writer::BoxMakeWriter;
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Error);
        }

        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("chatbot={level}")));

        // stdout carries the conversation; logs go to stderr or a file.
        let (writer, to_file) = match self.config.logging.file {
            Some(ref path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {path}"))?;
                (BoxMakeWriter::new(Arc::new(file)), true)
            }
            None => (BoxMakeWriter::new(io::stderr), false),
        };

        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = to_file
                || self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(!disable_color)
                        .with_target(self.common.diagnostics)
                        .with_file(self.common.diagnostics)
                        .with_line_number(self.common.diagnostics),
                )
                .try_init()
                .ok();
        }

        // Also init env_logger for compatibility with log crate users
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
        builder.filter_level(self.effective_log_level());
        builder.try_init().ok();

        Ok(())
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.quiet {
            LevelFilter::Error
        } else if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => self
                    .config
                    .logging
                    .level
                    .parse()
                    .unwrap_or(LevelFilter::Warn),
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    fn machine_output(&self) -> bool {
        self.common.json || self.common.yaml
    }

    /// Print `value` as JSON/YAML when requested, otherwise run `text`.
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> Result<()> {
        if self.common.json {
            println!(
                "{}",
                serde_json::to_string_pretty(value).context("serializing output to JSON")?
            );
        } else if self.common.yaml {
            print!(
                "{}",
                serde_yaml::to_string(value).context("serializing output to YAML")?
            );
        } else {
            text();
        }
        Ok(())
    }
}

fn build_session(ctx: &RuntimeContext) -> Result<ChatSession> {
    let api = ApiClient::with_timeout(&ctx.config.api.base_url, ctx.config.api_timeout())?;
    let streamer = StreamingApiClient::new(ctx.config.stream_config())?;
    let store =
        ConversationStore::with_default_agent(ctx.config.ui.locale, &ctx.config.ui.default_agent);

    let mut session = ChatSession::new(Arc::new(api), streamer, store);
    if let Some(ref session_id) = ctx.common.session {
        session.set_session_id(session_id.clone());
    }
    Ok(session)
}

async fn handle_chat(ctx: &RuntimeContext, session: &mut ChatSession, cmd: ChatCommand) -> Result<()> {
    let status = session.refresh_connection().await;
    if !ctx.machine_output() {
        println!("Connection: {status} ({})", ctx.config.api.base_url);
    }
    if ctx.config.ui.show_welcome && !ctx.machine_output() {
        let welcome = session.store_mut().add_welcome_message();
        print_message(&welcome);
    }
    let session_id = session.ensure_session_id();
    info!("chat session {session_id}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if !ctx.machine_output() {
            print!("> ");
            io::stdout().flush().ok();
        }

        let line = tokio::select! {
            line = lines.next_line() => line.context("reading input")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => match session.clear_session().await {
                Ok(response) => {
                    println!("{}", response.message);
                    session.ensure_session_id();
                }
                Err(err) => eprintln!("{err}"),
            },
            "/history" => {
                for message in session.store().messages() {
                    print_message(message);
                }
            }
            text => {
                if cmd.no_stream {
                    match session.send_message(text).await {
                        Ok(message) => print_reply(ctx, &message)?,
                        Err(err) => eprintln!("{err}"),
                    }
                } else {
                    let turn = run_streaming_turn(ctx, session, text).await?;
                    if ctx.machine_output() {
                        print_reply(ctx, &turn.message)?;
                    } else if let TurnOutcome::Failed(err) = turn.outcome {
                        eprintln!("stream failed: {err}");
                    }
                }
            }
        }
    }

    Ok(())
}

async fn handle_ask(ctx: &RuntimeContext, session: &mut ChatSession, cmd: AskCommand) -> Result<()> {
    if cmd.no_stream {
        let message = session.send_message(&cmd.message).await?;
        return print_reply(ctx, &message);
    }

    let turn = run_streaming_turn(ctx, session, &cmd.message).await?;
    if ctx.machine_output() {
        print_reply(ctx, &turn.message)?;
    }
    match turn.outcome {
        TurnOutcome::Failed(err) => Err(anyhow!(err)),
        TurnOutcome::Completed | TurnOutcome::Cancelled => Ok(()),
    }
}

/// Stream one turn, echoing the reply as it grows. Ctrl-C stops the turn.
async fn run_streaming_turn(
    ctx: &RuntimeContext,
    session: &mut ChatSession,
    text: &str,
) -> Result<StreamTurn> {
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let echo = !ctx.machine_output();
    let mut printed = 0usize;
    let mut prefix_shown = false;
    let result = session
        .stream_message(text, &cancel, |message| {
            if !echo {
                return;
            }
            if !prefix_shown {
                print!("{} ", AgentType::emoji_for_label(&message.agent_type));
                prefix_shown = true;
            }
            match message.content.get(printed..) {
                Some(delta) => {
                    print!("{delta}");
                    printed = message.content.len();
                }
                // Content was replaced rather than extended.
                None => {
                    print!("\n{}", message.content);
                    printed = message.content.len();
                }
            }
            io::stdout().flush().ok();
        })
        .await;
    ctrl_c.abort();

    if echo {
        println!();
    }
    let turn = result?;
    debug!("turn finished: {:?}", turn.outcome);
    Ok(turn)
}

async fn handle_history(ctx: &RuntimeContext, session: &mut ChatSession) -> Result<()> {
    require_session(ctx)?;
    let count = session.load_history().await?;
    let messages = session.store().messages();
    ctx.emit(&messages, || {
        if count == 0 {
            println!("No messages in this session.");
        }
        for message in messages {
            print_message(message);
        }
    })
}

async fn handle_clear(ctx: &RuntimeContext, session: &mut ChatSession) -> Result<()> {
    require_session(ctx)?;
    let response = session.clear_session().await?;
    ctx.emit(&response, || println!("{}", response.message))
}

async fn handle_sessions(ctx: &RuntimeContext, api: &dyn ChatApi) -> Result<()> {
    let sessions = api.get_active_sessions().await?;
    ctx.emit(&sessions, || {
        if sessions.sessions.is_empty() {
            println!("No active sessions.");
        }
        for session_id in &sessions.sessions {
            println!("{session_id}");
        }
    })
}

async fn handle_info(ctx: &RuntimeContext, api: &dyn ChatApi) -> Result<()> {
    let service = api.get_service_info().await?;
    ctx.emit(&service, || {
        println!("{} {}", service.name, service.version);
        for agent in &service.agents {
            match agent.parse::<AgentType>() {
                Ok(known) => println!("  {} {:<10} {}", known.emoji(), agent, known.description()),
                Err(_) => println!("  {} {agent}", AgentType::emoji_for_label(agent)),
            }
        }
    })
}

#[derive(Debug, Serialize)]
struct HealthReport {
    service: EndpointHealth,
    chat: EndpointHealth,
}

#[derive(Debug, Serialize)]
struct EndpointHealth {
    status: ConnectionStatus,
    detail: String,
}

impl fmt::Display for EndpointHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.status, self.detail)
    }
}

async fn handle_health(ctx: &RuntimeContext, api: &dyn ChatApi) -> Result<()> {
    let check = |result: chatbot::api::ApiResult<chatbot_protocol::HealthCheckResponse>| match result {
        Ok(health) if health.is_healthy() => EndpointHealth {
            status: ConnectionStatus::Connected,
            detail: format!("{} at {}", health.status, health.timestamp),
        },
        Ok(health) => EndpointHealth {
            status: ConnectionStatus::Disconnected,
            detail: health.status,
        },
        Err(err) => EndpointHealth {
            status: ConnectionStatus::Disconnected,
            detail: err.to_string(),
        },
    };

    let report = HealthReport {
        service: check(api.health_check().await),
        chat: check(api.chat_health_check().await),
    };
    ctx.emit(&report, || {
        println!("service: {}", report.service);
        println!("chat:    {}", report.chat);
    })?;

    if report.service.status == ConnectionStatus::Connected
        && report.chat.status == ConnectionStatus::Connected
    {
        Ok(())
    } else {
        Err(anyhow!("backend at {} is not healthy", ctx.config.api.base_url))
    }
}

async fn handle_workflow_test(
    ctx: &RuntimeContext,
    session: &mut ChatSession,
    query: Option<&str>,
) -> Result<()> {
    let message = session.test_workflow(query).await?;
    print_reply(ctx, &message)
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.config_file.exists() && !cmd.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            ctx.config_file.display()
        ));
    }

    if ctx.common.dry_run {
        info!(
            "dry-run: would write default config to {}",
            ctx.config_file.display()
        );
        return Ok(());
    }

    settings::write_default_config(&ctx.config_file)?;
    println!("wrote {}", ctx.config_file.display());
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => ctx.emit(&ctx.config, || println!("{:#?}", ctx.config)),
        ConfigCommand::Path => {
            println!("{}", ctx.config_file.display());
            Ok(())
        }
        ConfigCommand::Reset => {
            if ctx.common.dry_run {
                info!("dry-run: would reset config at {}", ctx.config_file.display());
                return Ok(());
            }
            settings::write_default_config(&ctx.config_file)
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}

fn require_session(ctx: &RuntimeContext) -> Result<()> {
    if ctx.common.session.is_none() {
        return Err(anyhow!("this command needs --session <ID>"));
    }
    Ok(())
}

fn print_reply(ctx: &RuntimeContext, message: &Message) -> Result<()> {
    ctx.emit(message, || print_message(message))
}

fn print_message(message: &Message) {
    match message.role {
        Role::User => println!("you: {}", message.content),
        Role::Assistant => {
            let marker = if message.error { " !" } else { "" };
            println!(
                "{} [{}]{marker} {}",
                AgentType::emoji_for_label(&message.agent_type),
                message.agent_type,
                message.content
            );
        }
    }
}
