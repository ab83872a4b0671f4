//! Council CLI - hear your inner council talk a challenge through.
//!
//! Generates a council conversation, then plays it turn by turn through
//! backend clips or local speech while printing who is speaking.

mod console;

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use council_core::config::default_config;
use council_core::council::{available_councils, get_council};
use council_core::orchestrator::Snapshot;
use council_core::tts::generate_output_filename;
use council_core::{
    AgentEvent, Config, Council, CouncilBackend, CouncilError, DialogueSource, HttpClipPlayer,
    KokoroSpeech, LlmDialogueSource, LlmSettings, OrchestratorHandle, PersonaId,
    PlaybackOrchestrator, PlaybackState, SpeechResolver, Transcriber, Turn,
};
use serde::Deserialize;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::console::{banner, console_callback, textwrap, RULE_WIDTH};

const DEFAULT_CHALLENGE: &str =
    "I feel torn between work and life and I'm not sure how to move forward.";

#[derive(Parser)]
#[command(
    name = "council",
    version,
    about = "Inner Council - hear your inner voices talk it through",
    long_about = "Plays a conversation between the personas of your inner council, using backend clips, local speech or a silent dwell for each turn."
)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Council to convene (overrides the config file)
    #[arg(long, global = true, value_name = "NAME")]
    council: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a council conversation about a challenge and play it
    Play(PlayArgs),
    /// Replay recorded voice-agent events (JSON lines)
    Replay {
        #[arg(value_name = "EVENTS")]
        events: PathBuf,
    },
    /// List the available councils
    Councils,
}

#[derive(Args)]
struct PlayArgs {
    /// What's on your mind (read from stdin when omitted)
    #[arg(value_name = "CHALLENGE")]
    challenge: Option<String>,

    /// Number of council turns to ask for
    #[arg(short, long, value_name = "TURNS")]
    turns: Option<usize>,

    /// Generate the dialogue with an OpenAI-compatible API instead of the backend
    #[arg(long)]
    direct: bool,

    /// Never fetch or play backend clips
    #[arg(long)]
    no_remote_audio: bool,

    /// Do not use the local speech engine
    #[arg(long)]
    no_local_voice: bool,

    /// Save locally spoken turns to a WAV file
    #[arg(long, value_name = "WAV")]
    record: Option<Option<PathBuf>>,

    /// Keep downloaded clips in this directory
    #[arg(long, value_name = "DIR")]
    keep_clips: Option<PathBuf>,

    /// Print a reset card after the conversation
    #[arg(long)]
    summary: bool,
}

/// One line of a replay file.
#[derive(Debug, Deserialize)]
struct ReplayLine {
    /// Offset from the start of the replay.
    #[serde(default)]
    at_ms: Option<u64>,
    #[serde(flatten)]
    event: AgentEvent,
}

/// Lines typed on stdin, shared by the challenge prompt and playback controls.
struct StdinTranscriber {
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl StdinTranscriber {
    fn spawn() -> Arc<Self> {
        let (sender, lines) = mpsc::unbounded_channel();
        // A plain thread so a pending read never holds up runtime shutdown.
        std::thread::spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if sender.send(line).is_err() {
                    break;
                }
            }
        });
        Arc::new(Self {
            lines: Mutex::new(lines),
        })
    }

    async fn next_line(&self) -> Option<String> {
        self.lines.lock().await.recv().await
    }
}

#[async_trait]
impl Transcriber for StdinTranscriber {
    async fn transcribe(&self) -> Result<String, CouncilError> {
        while let Some(line) = self.next_line().await {
            let line = line.trim();
            if !line.is_empty() {
                return Ok(line.to_string());
            }
        }
        Err(CouncilError::SessionStart("stdin closed".to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let result = run(cli).await;
    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CouncilError> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => default_config(),
    };
    if let Ok(api_base) = env::var("COUNCIL_API_BASE") {
        config.backend.api_base = api_base;
    }
    if let Some(name) = &cli.council {
        config.council.name = name.clone();
    }

    if let Command::Councils = cli.command {
        list_councils();
        return Ok(());
    }

    let council = get_council(&config.council.name).ok_or_else(|| {
        CouncilError::UnknownCouncil(format!(
            "'{}'. Available councils: {}",
            config.council.name,
            available_councils().join(", ")
        ))
    })?;

    match cli.command {
        Command::Play(args) => play(&config, council.as_ref(), args).await,
        Command::Replay { events } => replay(&config, council.as_ref(), &events).await,
        Command::Councils => Ok(()),
    }
}

fn list_councils() {
    println!("{}", "Available councils:".bold());
    for name in available_councils() {
        if let Some(council) = get_council(name) {
            let members = council
                .members()
                .iter()
                .map(|p| p.label())
                .collect::<Vec<_>>()
                .join(", ");
            println!(
                "  {} - {} ({})",
                name.bright_cyan(),
                council.display_name(),
                members.dimmed()
            );
        }
    }
}

fn llm_settings(config: &Config) -> LlmSettings {
    let api_base = env::var("OPENAI_API_BASE")
        .or_else(|_| env::var("OPENAI_BASE_URL"))
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

    let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY not set. API calls may fail.".yellow()
        );
        String::new()
    });

    LlmSettings::new(api_base, api_key, config)
}

async fn play(config: &Config, council: &dyn Council, args: PlayArgs) -> Result<(), CouncilError> {
    let input = StdinTranscriber::spawn();

    let challenge = match args.challenge.clone() {
        Some(challenge) => challenge,
        None => {
            println!("{}", "What's on your mind? (press Enter when done)".bold());
            input.transcribe().await.unwrap_or_else(|e| {
                debug!(error = %e, "no challenge typed, using the default");
                DEFAULT_CHALLENGE.to_string()
            })
        }
    };
    let wanted = args.turns.unwrap_or(config.backend.default_turns).max(1);

    banner(&format!("Inner Council - {}", council.display_name()));
    println!("{} {}", "Challenge:".bold(), challenge.bright_white());
    println!();

    let backend = Arc::new(CouncilBackend::new(&config.backend)?);
    let llm = if args.direct || args.summary {
        Some(LlmDialogueSource::new(
            llm_settings(config),
            council,
            config.prompts.clone(),
        )?)
    } else {
        None
    };

    let mut turns = match (&llm, args.direct) {
        (Some(llm), true) => llm.generate(&challenge, wanted).await?,
        _ => backend.generate(&challenge, wanted).await?,
    };
    if turns.is_empty() {
        return Err(CouncilError::GenerationRequest(
            "No council dialogue returned".to_string(),
        ));
    }
    if args.no_remote_audio {
        for turn in &mut turns {
            turn.audio_ref = None;
        }
    }

    let mut resolver = SpeechResolver::from_config(config);
    if !args.no_remote_audio {
        let mut player = HttpClipPlayer::new(&config.backend)?;
        if let Some(dir) = &args.keep_clips {
            tokio::fs::create_dir_all(dir).await?;
            player = player.with_save_dir(dir.clone());
        }
        resolver = resolver
            .with_player(Arc::new(player))
            .with_clip_source(backend.clone());
    }

    let local = if args.no_local_voice {
        None
    } else {
        match KokoroSpeech::new(config.playback.speech_rate).await {
            Ok(speech) if args.record.is_some() => Some(Arc::new(speech.with_recording())),
            Ok(speech) => Some(Arc::new(speech)),
            Err(e) => {
                warn!(error = %e, "local speech unavailable");
                eprintln!("{}", format!("Local voice unavailable: {}", e).yellow());
                None
            }
        }
    };
    if let Some(local) = &local {
        resolver = resolver.with_local_speech(local.clone());
    }

    let mut transcript = vec![Turn::new(PersonaId::User, challenge.clone())];
    transcript.extend(turns.iter().cloned());

    let orchestrator = PlaybackOrchestrator::new(Arc::new(resolver), council, &config.playback)?
        .with_callback(console_callback());
    let (handle, task) = orchestrator.spawn();
    handle.start(turns)?;

    println!(
        "{}",
        "Controls: Enter or 'p' to pause/resume, 'q' to stop".dimmed()
    );
    println!();
    control_playback(&handle, &input).await?;

    handle.shutdown()?;
    let _ = task.await;

    if let Some(record) = &args.record {
        let path = record
            .clone()
            .unwrap_or_else(|| PathBuf::from(generate_output_filename(&challenge)));
        save_recording(local.as_deref(), &path)?;
    }

    if let Some(llm) = &llm {
        if args.summary {
            print_reset_card(llm, &transcript).await?;
        }
    }

    Ok(())
}

/// Forward typed commands until playback ends or the user quits.
async fn control_playback(
    handle: &OrchestratorHandle,
    input: &StdinTranscriber,
) -> Result<(), CouncilError> {
    loop {
        tokio::select! {
            line = input.next_line() => match line.as_deref().map(str::trim) {
                Some("q") | Some("quit") => {
                    handle.stop()?;
                    println!("{}", "Stopped.".yellow());
                    return Ok(());
                }
                Some("") | Some("p") => handle.toggle_pause()?,
                Some(other) => println!("{}", format!("Unknown command '{}'", other).dimmed()),
                None => {
                    wait_until_done(handle).await?;
                    return Ok(());
                }
            },
            done = wait_until_done(handle) => {
                done?;
                return Ok(());
            }
        }
    }
}

/// Poll until the session is finished or stopped.
async fn wait_until_done(handle: &OrchestratorHandle) -> Result<Snapshot, CouncilError> {
    loop {
        let snapshot = handle.snapshot().await?;
        if matches!(snapshot.state, PlaybackState::Finished | PlaybackState::Idle) {
            return Ok(snapshot);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

fn save_recording(local: Option<&KokoroSpeech>, path: &Path) -> Result<(), CouncilError> {
    let saved = match local {
        Some(speech) => speech.save_recording(path)?,
        None => false,
    };
    if saved {
        println!("{} {}", "Recording saved:".bold(), path.display());
    } else {
        println!(
            "{}",
            "Nothing was spoken locally, so there is no recording.".dimmed()
        );
    }
    Ok(())
}

async fn print_reset_card(llm: &LlmDialogueSource, transcript: &[Turn]) -> Result<(), CouncilError> {
    let card = llm.reset_card(transcript).await?;
    println!();
    println!("{}", "Reset Card".bright_green().bold());
    println!("{}", "─".repeat(RULE_WIDTH).bright_green());
    for line in card.lines() {
        println!("  {}", textwrap(line, RULE_WIDTH - 4));
    }
    println!("{}", "─".repeat(RULE_WIDTH).bright_green());
    Ok(())
}

async fn replay(config: &Config, council: &dyn Council, path: &Path) -> Result<(), CouncilError> {
    let content = tokio::fs::read_to_string(path).await?;
    let lines = parse_replay(&content)
        .map_err(|e| CouncilError::ConfigError(format!("{}: {}", path.display(), e)))?;

    banner(&format!("Inner Council - {} (replay)", council.display_name()));

    // Agent audio is not ours to play; only the highlight schedule runs.
    let resolver = Arc::new(SpeechResolver::from_config(config));
    let orchestrator =
        PlaybackOrchestrator::new(resolver, council, &config.playback)?.with_callback(console_callback());
    let (handle, task) = orchestrator.spawn();

    let started = tokio::time::Instant::now();
    for line in lines {
        if let Some(at_ms) = line.at_ms {
            tokio::time::sleep_until(started + Duration::from_millis(at_ms)).await;
        }
        handle.agent_event(line.event)?;
    }
    wait_until_done(&handle).await?;

    handle.shutdown()?;
    let _ = task.await;
    Ok(())
}

fn parse_replay(content: &str) -> Result<Vec<ReplayLine>, String> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str::<ReplayLine>(line)
                .map_err(|e| format!("line {}: {}", number + 1, e))
        })
        .collect()
}
