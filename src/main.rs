use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use livetalk::Config;
use livetalk::dialogue::{AudioSink, SpeakerSink};
use livetalk::voice::{
    AudioCapture, AudioChunk, AudioPlayback, Classifier, ClassifierBackends, EnergyClassifier,
    EngineEvent, EngineStats, SegmentationEngine, SynthesizedAudio, Utterance, VoicePipeline,
    build_classifier, chunk_queue, read_wav, resample, rms,
};

/// Livetalk - real-time spoken dialogue engine
#[derive(Parser)]
#[command(name = "livetalk", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Segment live microphone audio and print events as JSON lines
    Listen {
        /// Write each utterance to this directory as a WAV file
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
    /// Segment a WAV file offline
    Segment {
        /// Input WAV file
        input: PathBuf,
        /// Write each utterance to this directory as a WAV file
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,livetalk=info",
        1 => "info,livetalk=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
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
    let command = cli.command.unwrap_or(Command::Listen { out_dir: None });

    match command {
        Command::Listen { out_dir } => listen(out_dir.as_deref()).await,
        Command::Segment { input, out_dir } => segment(&input, out_dir.as_deref()),
        Command::TestMic { duration } => test_mic(duration),
        Command::TestSpeaker => test_speaker().await,
    }
}

/// Live capture through the threaded engine
async fn listen(out_dir: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load()?;
    prepare_out_dir(out_dir)?;

    let classifier = build_classifier(&config.vad, ClassifierBackends::default());
    let (mut engine, mut events) = SegmentationEngine::builder(config.vad.clone(), classifier)
        .interruption(config.conversation.enable_interruption)
        .build()?;

    let mut capture = AudioCapture::new(config.vad.sample_rate, config.vad.chunk_size)?;
    engine.start()?;
    capture.start(engine.chunk_sender())?;

    tracing::info!(
        method = %config.vad.method,
        sample_rate = config.vad.sample_rate,
        chunk_size = config.vad.chunk_size,
        "listening, press Ctrl+C to stop"
    );

    let mut written = 0_usize;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                emit(&event, out_dir, &mut written)?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    capture.stop();
    engine.stop();

    println!("{}", serde_json::json!({ "stats": engine.stats().snapshot() }));
    Ok(())
}

/// Offline segmentation of a WAV file
fn segment(input: &Path, out_dir: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load()?;
    prepare_out_dir(out_dir)?;

    let (samples, rate) = read_wav(input)?;
    let samples = if rate == config.vad.sample_rate {
        samples
    } else {
        tracing::info!(from = rate, to = config.vad.sample_rate, "resampling input");
        resample(&samples, rate, config.vad.sample_rate)?
    };

    let classifier = build_classifier(&config.vad, ClassifierBackends::default());
    let mut pipeline = VoicePipeline::new(&config.vad, classifier);

    let mut written = 0_usize;
    let mut chunks = 0_usize;
    for block in samples.chunks_exact(config.vad.chunk_size) {
        chunks += 1;
        for event in pipeline.process(AudioChunk::from_f32(block, config.vad.sample_rate), false) {
            emit(&event, out_dir, &mut written)?;
        }
    }

    tracing::info!(chunks, utterances = written, "segmentation complete");
    Ok(())
}

fn prepare_out_dir(out_dir: Option<&Path>) -> anyhow::Result<()> {
    if let Some(dir) = out_dir {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Print an event as a JSON line, saving utterances when asked
fn emit(event: &EngineEvent, out_dir: Option<&Path>, written: &mut usize) -> anyhow::Result<()> {
    let line = match event {
        EngineEvent::SpeechStarted => serde_json::json!({ "event": "speech_started" }),
        EngineEvent::SpeechEnded => serde_json::json!({ "event": "speech_ended" }),
        EngineEvent::Interrupted => serde_json::json!({ "event": "interrupted" }),
        EngineEvent::UtteranceReady(utterance) => {
            *written += 1;
            let path = match out_dir {
                Some(dir) => Some(save_utterance(dir, *written, utterance)?),
                None => None,
            };
            serde_json::json!({
                "event": "utterance_ready",
                "index": *written,
                "started_at_ms": utterance.started_at.as_millis(),
                "duration_ms": utterance.duration().as_millis(),
                "chunks": utterance.chunks,
                "bytes": utterance.pcm.len(),
                "path": path,
            })
        }
    };

    println!("{line}");
    Ok(())
}

fn save_utterance(dir: &Path, index: usize, utterance: &Utterance) -> anyhow::Result<PathBuf> {
    let path = dir.join(format!("utterance-{index:04}.wav"));
    std::fs::write(&path, utterance.to_wav()?)?;
    tracing::debug!(path = %path.display(), "utterance saved");
    Ok(path)
}

/// Test microphone input
fn test_mic(duration: u64) -> anyhow::Result<()> {
    let config = Config::load()?;

    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let (sender, receiver) = chunk_queue(config.vad.queue_capacity, EngineStats::new());
    let mut capture = AudioCapture::new(config.vad.sample_rate, config.vad.chunk_size)?;
    capture.start(sender)?;

    let mut classifier = EnergyClassifier::new(config.vad.threshold);

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("Speech threshold (RMS): {:.4}", classifier.level());
    println!("---");

    for second in 1..=duration {
        let deadline = Instant::now() + Duration::from_secs(1);
        let mut samples = Vec::new();
        let mut speech_chunks = 0_usize;
        let mut total_chunks = 0_usize;

        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            let Some(chunk) = receiver.recv_timeout(remaining) else {
                break;
            };
            total_chunks += 1;
            if classifier.classify(&chunk).is_speech {
                speech_chunks += 1;
            }
            samples.extend(chunk.normalized());
        }

        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{second:2}s] RMS: {energy:.4} | Peak: {peak:.4} | speech {speech_chunks}/{total_chunks} | [{meter}]"
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sink = SpeakerSink::new(Arc::new(AudioPlayback::new()?));

    let sample_rate = 24_000_u32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    let outcome = sink
        .play(SynthesizedAudio::Pcm {
            samples,
            sample_rate,
        })
        .await?;

    println!("\n---");
    println!("Playback {outcome:?}. If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}
