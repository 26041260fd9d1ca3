use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use quip_gateway::config::file::load_config_file;
use quip_gateway::relay::save_audio;
use quip_gateway::{ApiServerBuilder, CommentaryRequest, Config, PersonaRegistry, SpeechRequest};

/// Quip - In-character commentary and speech gateway
#[derive(Parser)]
#[command(name = "quip", version, about)]
struct Cli {
    /// Port to listen on (overrides QUIP_PORT and the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List the available personas
    Personas,
    /// Stream commentary for a piece of text to stdout
    Comment {
        /// Persona to speak as
        #[arg(short, long, default_value = "dobby")]
        persona: String,
        /// Text to react to
        text: String,
    },
    /// Synthesize speech for a piece of text into an MP3 file
    Speak {
        /// Persona whose voice to use
        #[arg(short, long, default_value = "dobby")]
        persona: String,
        /// Output file
        #[arg(short, long, default_value = "quip.mp3")]
        out: PathBuf,
        /// Text to speak
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info,quip_gateway=info",
        1 => "info,quip_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Handle subcommands
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Personas => list_personas(),
            Command::Comment { persona, text } => comment(&persona, &text).await,
            Command::Speak { persona, out, text } => speak(&persona, &out, &text).await,
        };
    }

    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.api_server.port = port;
    }
    config.ensure_static_dirs()?;

    tracing::info!(
        port = config.api_server.port,
        commentary_model = %config.commentary.model,
        speech_model = %config.speech.model_id,
        "starting quip gateway"
    );

    let personas = Arc::new(PersonaRegistry::load(config.personas_dir.as_deref())?);
    let server = ApiServerBuilder::from_config(&config, personas)?.build();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    Ok(())
}

/// Print the persona registry
///
/// Needs no API keys, so only the persona directory is resolved.
fn list_personas() -> anyhow::Result<()> {
    let personas_dir = std::env::var("QUIP_PERSONAS_DIR")
        .ok()
        .or(load_config_file().personas_dir)
        .map(PathBuf::from);
    let registry = PersonaRegistry::load(personas_dir.as_deref())?;

    for persona in registry.iter() {
        match &persona.tagline {
            Some(tagline) => println!("{:<12} {} - {tagline}", persona.id, persona.name),
            None => println!("{:<12} {}", persona.id, persona.name),
        }
    }
    Ok(())
}

async fn comment(persona: &str, text: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let personas = Arc::new(PersonaRegistry::load(config.personas_dir.as_deref())?);
    let server = ApiServerBuilder::from_config(&config, personas)?.build();

    let mut stream = server
        .state()
        .commentary
        .relay(&CommentaryRequest::new(text, persona))
        .await?;

    let mut stdout = std::io::stdout();
    while let Some(fragment) = stream.next().await {
        write!(stdout, "{}", fragment?)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}

async fn speak(persona: &str, out: &Path, text: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let personas = Arc::new(PersonaRegistry::load(config.personas_dir.as_deref())?);
    let server = ApiServerBuilder::from_config(&config, personas)?.build();

    let stream = server
        .state()
        .speech
        .stream(&SpeechRequest::new(text, persona))
        .await?;

    let written = save_audio(stream, out).await?;

    println!("Wrote {written} bytes to {}", out.display());
    Ok(())
}
