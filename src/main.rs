use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;

use wavescope::{QualityPreset, SpectrumAnalyser, TestSignal, VariantManager, Visualizer, VisualizerConfig};

#[derive(Parser)]
#[command(name = "wavescope")]
#[command(about = "Run the visualizer core over a synthetic track and log per-frame state as JSON lines")]
struct Args {
    /// Number of animation frames to simulate
    #[arg(long, default_value = "600")]
    frames: usize,

    /// Simulated display refresh rate
    #[arg(long, default_value = "60")]
    fps: f32,

    /// Quality preset: low, medium or high
    #[arg(long, default_value = "medium")]
    quality: QualityPreset,

    /// Built-in variant name (e.g. "radial-bloom"); ignored when --config is given
    #[arg(long)]
    variant: Option<String>,

    /// JSON config file to load instead of a built-in variant
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sample rate of the synthetic source
    #[arg(long, default_value = "44100")]
    sample_rate: u32,

    /// Analysis window; the frequency frame has half as many bins
    #[arg(long, default_value = "2048")]
    fft_size: usize,

    /// Tempo of the synthetic kick drum
    #[arg(long, default_value = "124")]
    bpm: f32,

    /// Overrides the config seed
    #[arg(long)]
    seed: Option<u64>,

    /// Output file for JSON lines (stdout when omitted)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Write the effective config as JSON and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,

    /// Randomise frame deltas by +-30% to mimic an uneven display clock
    #[arg(long)]
    jitter: bool,

    /// Change quality mid-run, as FRAME:PRESET (e.g. 300:low)
    #[arg(long)]
    switch_quality_at: Option<QualitySwitch>,
}

#[derive(Debug, Clone, Copy)]
struct QualitySwitch {
    frame: usize,
    quality: QualityPreset,
}

impl FromStr for QualitySwitch {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((frame, quality)) = s.split_once(':') else {
            bail!("expected FRAME:PRESET, got '{}'", s);
        };
        Ok(Self {
            frame: frame.trim().parse().context("invalid frame number")?,
            quality: quality.trim().parse()?,
        })
    }
}

#[derive(Serialize)]
struct FrameRecord<'a> {
    frame: usize,
    time: f32,
    energy: f32,
    bass: f32,
    mids: f32,
    highs: f32,
    hue: f32,
    beat_pulse: f32,
    glow: f32,
    camera_offset: [f32; 3],
    bands: &'a [f32],
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = resolve_config(&args)?;
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    if let Some(path) = &args.dump_config {
        config.save_json(path)?;
        info!("Wrote config to {}", path.display());
        return Ok(());
    }

    if !(args.fps > 0.0) {
        bail!("--fps must be positive, got {}", args.fps);
    }
    if !args.bpm.is_finite() {
        bail!("--bpm must be a finite number, got {}", args.bpm);
    }

    let sample_rate = args.sample_rate as f32;
    let mut analyser = SpectrumAnalyser::new(args.fft_size, sample_rate)?;
    let mut signal = TestSignal::new(sample_rate, args.bpm, config.seed);
    let mut viz = Visualizer::init(config.clone(), args.quality, sample_rate);
    let mut clock = StdRng::seed_from_u64(config.seed.wrapping_add(1));

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    info!(
        "Simulating {} frames at {} fps, {} Hz, fft {}, {} bpm",
        args.frames, args.fps, args.sample_rate, args.fft_size, args.bpm
    );

    let mut freq = vec![0u8; analyser.bin_count()];
    let mut wave = vec![0u8; analyser.fft_size()];
    let mut samples = Vec::new();
    let mut stats = RunStats::default();
    let base_dt = 1.0 / args.fps;

    for frame in 0..args.frames {
        if let Some(switch) = args.switch_quality_at {
            if switch.frame == frame {
                viz.set_quality(switch.quality);
            }
        }

        let dt = if args.jitter {
            base_dt * (1.0 + 0.3 * clock.random_range(-1.0f32..1.0))
        } else {
            base_dt
        };

        samples.resize((sample_rate * dt).round() as usize, 0.0);
        signal.fill(&mut samples);
        analyser.push_samples(&samples);
        analyser.frequency_bytes(&mut freq);
        analyser.waveform_bytes(&mut wave);

        let Some(snapshot) = viz.update(&freq, &wave, dt) else {
            break;
        };
        stats.observe(snapshot.audio.energy, snapshot.audio.bass);

        let record = FrameRecord {
            frame,
            time: snapshot.animation.elapsed,
            energy: snapshot.audio.energy,
            bass: snapshot.audio.bass,
            mids: snapshot.audio.mids,
            highs: snapshot.audio.highs,
            hue: snapshot.animation.hue,
            beat_pulse: snapshot.animation.beat_pulse,
            glow: snapshot.animation.glow,
            camera_offset: snapshot.animation.camera_offset.to_array(),
            bands: snapshot.bands,
        };
        serde_json::to_writer(&mut out, &record)?;
        writeln!(out)?;
    }
    out.flush()?;

    info!("=== RUN SUMMARY ===");
    info!("Frames: {}", viz.frames());
    info!("Beat triggers: {}", viz.beat_triggers());
    info!("Mean energy: {:.3}", stats.mean_energy());
    info!("Peak energy: {:.3}, peak bass: {:.3}", stats.peak_energy, stats.peak_bass);

    viz.dispose();
    Ok(())
}

fn resolve_config(args: &Args) -> Result<VisualizerConfig> {
    if let Some(path) = &args.config {
        info!("Loading config from {}", path.display());
        return VisualizerConfig::load_json(path);
    }

    let mut variants = VariantManager::new();
    if let Some(name) = &args.variant {
        let Some(index) = variants.find(name) else {
            let known: Vec<&str> = variants.get_variants().iter().map(|v| v.name.as_str()).collect();
            bail!("unknown variant '{}', expected one of: {}", name, known.join(", "));
        };
        variants.set_current_variant(index);
    }

    let variant = variants.get_current_variant();
    info!("Using variant '{}': {}", variant.name, variant.description);
    Ok(variant.config.clone())
}

#[derive(Default)]
struct RunStats {
    frames: usize,
    energy_sum: f32,
    peak_energy: f32,
    peak_bass: f32,
}

impl RunStats {
    fn observe(&mut self, energy: f32, bass: f32) {
        self.frames += 1;
        self.energy_sum += energy;
        self.peak_energy = self.peak_energy.max(energy);
        self.peak_bass = self.peak_bass.max(bass);
    }

    fn mean_energy(&self) -> f32 {
        self.energy_sum / self.frames.max(1) as f32
    }
}
