//! Minimal playback demo: decodes a local file through the engine and writes the resulting
//! PCM to a `.wav` file, since this crate ships no audio-device sink of its own — adapters
//! are an embedder's responsibility (spec §6). Useful as a smoke test and as a worked
//! example of wiring [`liteplayer::player::Player`] with concrete adapters.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use liteplayer::adapter::{SinkAdapter, SourceAdapter};
use liteplayer::config::EngineConfig;
use liteplayer::demux::wav::build_wav_header;
use liteplayer::error::Result;
use liteplayer::events::PlayerState;
use liteplayer::player::Player;

#[derive(Parser, Debug)]
#[command(name = "player-cli", about = "Decode a local audio file to a WAV file")]
struct Args {
    /// Path to the source audio file (wav; mp3/aac/m4a demux but need the
    /// symphonia-codecs feature to actually decode).
    input: PathBuf,

    /// Where to write the decoded PCM, as a WAV file.
    #[arg(short, long, default_value = "out.wav")]
    output: PathBuf,
}

struct FileSource;

impl SourceAdapter for FileSource {
    type Handle = File;

    fn open(&mut self, url: &str, content_pos: u64) -> Option<File> {
        let mut file = File::open(url).ok()?;
        file.seek(SeekFrom::Start(content_pos)).ok()?;
        Some(file)
    }

    fn read(&mut self, handle: &mut File, buf: &mut [u8]) -> Result<usize> {
        Ok(handle.read(buf)?)
    }

    fn filesize(&mut self, handle: &mut File) -> u64 {
        handle.metadata().map(|m| m.len()).unwrap_or(0)
    }

    fn seek(&mut self, handle: &mut File, offset: u64) -> Result<()> {
        handle.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn close(&mut self, _handle: File) {}
}

/// Buffers decoded PCM in memory and writes a WAV file once the sink closes — the engine
/// doesn't know the total sample count up front, so a canonical header can't be streamed.
#[derive(Clone, Default)]
struct WavFileSink {
    path: Arc<PathBuf>,
    format: Arc<Mutex<(u32, u16)>>,
    pcm: Arc<Mutex<Vec<u8>>>,
}

impl WavFileSink {
    fn new(path: PathBuf) -> Self {
        Self { path: Arc::new(path), format: Arc::new(Mutex::new((0, 0))), pcm: Arc::new(Mutex::new(Vec::new())) }
    }
}

impl SinkAdapter for WavFileSink {
    type Handle = ();

    fn open(&mut self, samplerate: u32, channels: u16) -> Option<()> {
        *self.format.lock().unwrap() = (samplerate, channels);
        Some(())
    }

    fn write(&mut self, _handle: &mut (), buf: &[u8]) -> Result<usize> {
        self.pcm.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn close(&mut self, _handle: ()) {
        let (samplerate, channels) = *self.format.lock().unwrap();
        if samplerate == 0 {
            return;
        }
        let pcm = self.pcm.lock().unwrap();
        let header = build_wav_header(samplerate, channels, 16, pcm.len() as u32);
        if let Ok(mut file) = File::create(&*self.path) {
            let _ = file.write_all(&header);
            let _ = file.write_all(&pcm);
        }
    }
}

fn main() {
    liteplayer::logging::init();
    let args = Args::parse();

    let input = args.input.to_string_lossy().into_owned();
    let sink = WavFileSink::new(args.output.clone());

    let player: Arc<Player<FileSource, WavFileSink>> = Arc::new(Player::new(
        EngineConfig::default(),
        || FileSource,
        move || sink.clone(),
    ));

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    player.register_state_listener(Box::new(move |state| {
        tracing::info!(?state, "player state changed");
        if matches!(state, PlayerState::Completed | PlayerState::Error) {
            let _ = done_tx.send(state);
        }
    }));

    if let Err(err) = player.set_data_source(input) {
        eprintln!("set_data_source failed: {err}");
        std::process::exit(1);
    }
    if let Err(err) = player.prepare() {
        eprintln!("prepare failed: {err}");
        std::process::exit(1);
    }
    println!(
        "duration: {:?} ms, available: {} bytes",
        player.get_duration_ms(),
        player.get_available_size()
    );
    if let Err(err) = player.start() {
        eprintln!("start failed: {err}");
        std::process::exit(1);
    }

    match done_rx.recv_timeout(Duration::from_secs(300)) {
        Ok(PlayerState::Completed) => println!("done: wrote {}", args.output.display()),
        Ok(_) => eprintln!("playback ended with an error"),
        Err(_) => eprintln!("timed out waiting for playback to finish"),
    }
}
