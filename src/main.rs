mod capture;
mod clipboard;
mod gemini;
mod generate;
mod media;
mod prompt;
mod video;

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgGroup, Parser};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use capture::{FrameSet, SamplerSettings};
use clipboard::{copy_text, CopyOutcome, StagedClipboard, SystemClipboard};
use gemini::{HttpTransport, DEFAULT_ENDPOINT, DEFAULT_MODEL};
use generate::Generator;
use media::MediaInput;

#[derive(Parser)]
#[command(name = "promptsmith")]
#[command(about = "Turn a video, image or keyword into a JSON prompt for AI video generators", long_about = None)]
#[command(group(ArgGroup::new("source").required(true).args(["input", "keyword"])))]
struct Cli {
    /// Video or image to reverse-engineer
    input: Option<PathBuf>,
    /// Expand a keyword instead of analysing media
    #[arg(short, long)]
    keyword: Option<String>,
    /// Google Gemini API key; asked for interactively when omitted
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,
    /// Longest wait for a single video seek
    #[arg(long, default_value_t = 5000)]
    seek_timeout_ms: u64,
    #[arg(long, default_value_t = 80, value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,
    /// Also write the prompt to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Write the frames that were sent as frame_NNNN.jpg into this directory
    #[arg(long)]
    save_frames: Option<PathBuf>,
    /// Copy the prompt to the clipboard
    #[arg(short, long)]
    copy: bool,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("promptsmith={level}")))
        .with_writer(io::stderr)
        .init();
}

fn prompt_for_api_key() -> anyhow::Result<String> {
    eprint!("Google Gemini API key: ");
    io::stderr().flush()?;
    let mut key = String::new();
    io::stdin().lock().read_line(&mut key)?;
    Ok(key.trim().to_owned())
}

fn save_frames(dir: &Path, frames: &FrameSet) -> anyhow::Result<()> {
    fs::create_dir_all(dir)?;
    for (index, frame) in frames.iter().enumerate() {
        let path = dir.join(format!("frame_{:04}.jpg", index));
        fs::write(&path, frame.decode()?)?;
        info!(path = %path.display(), "saved frame");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut input = match (&cli.input, cli.keyword) {
        (Some(path), _) => media::load(path)?,
        (None, Some(keyword)) => MediaInput::Text(keyword),
        (None, None) => anyhow::bail!("Give a media file or --keyword"),
    };
    let credential = match cli.api_key {
        Some(key) => key,
        None => prompt_for_api_key()?,
    };

    let generator = Generator::new(
        HttpTransport::new(&cli.endpoint, &cli.model),
        SamplerSettings {
            seek_timeout: Duration::from_millis(cli.seek_timeout_ms),
            jpeg_quality: cli.jpeg_quality,
        },
    );
    let generation = generator.generate(&credential, &mut input).await?;

    println!("{}", generation.text);
    if let Some(path) = &cli.output {
        fs::write(path, &generation.text)?;
        info!(path = %path.display(), "saved prompt");
    }
    if let Some(dir) = &cli.save_frames {
        save_frames(dir, &generation.frames)?;
    }
    if cli.copy {
        match copy_text(
            &generation.text,
            &SystemClipboard::platform(),
            &StagedClipboard::platform(),
        ) {
            CopyOutcome::Copied(via) => info!(?via, "copied prompt to clipboard"),
            CopyOutcome::Failed { message } => {
                warn!("clipboard copy failed");
                eprintln!("{message}");
            }
        }
    }

    Ok(())
}
