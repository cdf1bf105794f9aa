//! Player CLI: drives the playback core against local audio files.
//!
//! Reads each file fully into memory as an opaque track (the core takes
//! byte buffers, not paths), builds a session on the selected output
//! device, and accepts single-letter transport commands on stdin.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use playback_engine::config::PlaybackConfig;
use playback_engine::device;
use playback_engine::sink::DeviceSinkFactory;
use playback_session::PlaybackSession;
use playback_types::{Playlist, Track};

#[derive(Parser, Debug)]
#[command(name = "player", version)]
struct Args {
    /// Audio files to queue, in playlist order
    paths: Vec<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    device: Option<String>,

    /// Resampler input chunk size in frames
    #[arg(long, default_value_t = 1024)]
    chunk_frames: usize,

    /// Playback callback refill cap (frames)
    #[arg(long, default_value_t = 4096)]
    refill_max_frames: usize,

    /// Queue buffer target in seconds
    #[arg(long, default_value_t = 2.0)]
    buffer_seconds: f32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if args.list_devices {
        let host = cpal::default_host();
        device::list_devices(&host)?;
        return Ok(());
    }

    if args.paths.is_empty() {
        bail!("no tracks given (see --help)");
    }

    let mut tracks = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        let bytes = std::fs::read(path).with_context(|| format!("read {:?}", path))?;
        tracks.push(Track::new(bytes));
    }
    let playlist = Playlist::new(tracks)?;

    let config = PlaybackConfig {
        chunk_frames: args.chunk_frames,
        refill_max_frames: args.refill_max_frames,
        buffer_seconds: args.buffer_seconds,
    };
    let session = Arc::new(PlaybackSession::new(
        playlist,
        Arc::new(DeviceSinkFactory::new(args.device.clone())),
        config,
    ));

    let events = session.subscribe();
    std::thread::spawn(move || {
        for event in events {
            tracing::info!(?event, "session event");
        }
    });

    {
        let session = session.clone();
        let _ = ctrlc::set_handler(move || {
            let _ = session.stop();
            std::process::exit(130);
        });
    }

    session.play()?;
    println!("commands: p=pause r=resume s=stop n=next b=previous g <frame>=seek q=quit");
    println!("(empty line prints the current position)");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        let outcome = match parts.next() {
            Some("p") => session.pause(),
            Some("r") => session.resume(),
            Some("s") => session.stop(),
            Some("n") => session.next(),
            Some("b") => session.previous(),
            Some("g") => match parts.next().and_then(|v| v.parse::<u64>().ok()) {
                Some(frame) => session.seek_to_frame(frame),
                None => {
                    println!("usage: g <frame>");
                    continue;
                }
            },
            Some("q") => break,
            Some(other) => {
                println!("unknown command: {other}");
                continue;
            }
            None => {
                let pos = session.position();
                println!(
                    "track {} frame {} ({:?})",
                    pos.track_index, pos.frame_offset, pos.state
                );
                continue;
            }
        };
        if let Err(e) = outcome {
            tracing::warn!(error = %e, "command failed");
        }
    }

    session.stop()?;
    Ok(())
}
