use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use audioviz_core::gl::GlCall;
use audioviz_core::render::{fullscreen_quad, publish_intent, publish_updates, spectrum_bars};
use audioviz_core::{
    audio, AppConfig, FeatureExtractor, KeyBindings, KeyTable, MappingMatrix, RecordingApi,
    Renderer, ResourceKind,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> audioviz_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, frames } => run_headless(config.as_ref(), frames),
        Commands::DumpConfig => {
            println!("{}", AppConfig::live_defaults().to_json()?);
            Ok(())
        }
    }
}

fn run_headless(config: Option<&PathBuf>, frames: u64) -> audioviz_core::Result<()> {
    let config = match config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::live_defaults(),
    };
    tracing::info!(frames, sample_rate = config.audio.sample_rate, "starting headless run");

    let gl = Arc::new(RecordingApi::new());
    let mut renderer = Renderer::new(gl.clone(), &config)?;
    renderer.add_mesh(fullscreen_quad(renderer.context(), renderer.draw_mode())?)?;
    renderer.add_mesh(spectrum_bars(renderer.context(), 32)?)?;

    let keys = KeyTable::standard();
    let bindings = KeyBindings::resolve(&keys, &config.bindings)?;
    let interval = Duration::from_millis(config.render.frame_interval_ms);
    let stop = Arc::new(AtomicBool::new(false));

    let audio_thread = {
        let queue = renderer.queue();
        let stop = stop.clone();
        let audio_config = config.audio.clone();
        let matrix = MappingMatrix::new(config.mappings.clone());
        thread::spawn(move || {
            let mut extractor = FeatureExtractor::new(audio_config.sample_rate);
            let mut offset = 0;
            while !stop.load(Ordering::Relaxed) {
                // Pulse the tone so onsets show up.
                let amplitude = if (offset / audio_config.block_size) % 8 < 4 { 0.8 } else { 0.1 };
                let block = audio::test_tone(
                    audio_config.sample_rate,
                    110.0,
                    amplitude,
                    offset,
                    audio_config.block_size,
                );
                offset += audio_config.block_size;

                match extractor.process_block(&block) {
                    Ok(frame) => publish_updates(&queue, matrix.evaluate(&frame)),
                    Err(err) => tracing::warn!(error = %err, "feature extraction failed"),
                }
                thread::sleep(interval / 2);
            }
        })
    };

    let input_thread = {
        let queue = renderer.queue();
        let stop = stop.clone();
        // Scripted key presses stand in for a window's event loop.
        let script: Vec<u32> = ["b", "m", "r", "b", "m"]
            .iter()
            .filter_map(|name| keys.code(name))
            .collect();
        thread::spawn(move || {
            for code in script {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                match bindings.intent_for(code) {
                    Some(intent) => publish_intent(&queue, intent),
                    None => tracing::debug!(code, "unbound key"),
                }
                thread::sleep(interval * 5);
            }
        })
    };

    let mut rendered = 0;
    while rendered < frames && renderer.is_running() {
        let stats = renderer.frame()?;
        tracing::debug!(
            frame = rendered,
            executed = stats.drained.executed,
            failed = stats.drained.failed,
            uniforms = stats.uniforms_written,
            "frame complete"
        );
        rendered += 1;
        thread::sleep(interval);
    }

    stop.store(true, Ordering::Relaxed);
    for handle in [audio_thread, input_thread] {
        if handle.join().is_err() {
            tracing::error!("producer thread panicked");
        }
    }
    renderer.shutdown();

    let binds: usize = ResourceKind::ALL
        .iter()
        .map(|kind| gl.bind_calls(*kind).len())
        .sum();
    let uniforms = gl.count(|call| matches!(call, GlCall::Uniform { .. }));
    tracing::info!(
        frames = rendered,
        native_calls = gl.calls().len(),
        binds,
        draws = gl.draw_calls().len(),
        uniforms,
        "headless run finished"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive visualiser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the frame loop against a recording backend with live producers.
    Run {
        /// JSON configuration file; defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of frames to render before shutting down.
        #[arg(short, long, default_value_t = 120)]
        frames: u64,
    },
    /// Print the default configuration as JSON.
    DumpConfig,
}
