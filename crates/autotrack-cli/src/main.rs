use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use autotrack_engine::{doctor as track_doctor, AutoTrack, TrackExport, TrackFeedback, TrackerSettings};
use autotrack_proto::report::{CursorState, StepOutcome, StepReport};
use autotrack_proto::Point;
use autotrack_vision::{ClipSpec, FrameStepper, ImageCoords, ImageSequence};

#[derive(Debug, Parser)]
#[command(name = "autotrack", version, about = "Template-matching feature tracker for image sequences")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check the config, the frames and the key frame without tracking.
    Doctor,
    /// Track from the key frame to the end of the clip and write the trace.
    Run,
    /// List the decoded frames and how the clip maps them to steps.
    Frames,
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    #[serde(default = "default_name")]
    name: String,
    video: VideoCfg,
    #[serde(default)]
    tracker: TrackerSettings,
    key_frame: KeyFrameCfg,
    output: Option<OutputCfg>,
}

fn default_name() -> String {
    "track".into()
}

#[derive(Debug, serde::Deserialize)]
struct VideoCfg {
    frames_dir: String,
    #[serde(flatten)]
    clip: ClipSpec,
    axis: Option<AxisCfg>,
}

/// Reference line for 1-D tracking: `origin` + `angle`, or two `points` on it.
#[derive(Debug, serde::Deserialize)]
struct AxisCfg {
    origin: Option<Point>,
    #[serde(default)]
    angle: f64,
    points: Option<[[f64; 2]; 2]>,
}

impl AxisCfg {
    fn coords(&self) -> Result<ImageCoords> {
        match (self.origin, self.points) {
            (Some(_), Some(_)) => anyhow::bail!("video.axis: set origin/angle or points, not both"),
            (_, Some([a, b])) => {
                anyhow::ensure!(a != b, "video.axis.points must be two distinct points");
                Ok(ImageCoords::through(Point::new(a[0], a[1]), Point::new(b[0], b[1])))
            }
            (origin, None) => Ok(ImageCoords { origin: origin.unwrap_or_default(), angle: self.angle }),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct KeyFrameCfg {
    frame: u32,
    x: f64,
    y: f64,
    mask_x: Option<f64>,
    mask_y: Option<f64>,
}

impl KeyFrameCfg {
    fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    fn mask_center(&self) -> Point {
        Point::new(self.mask_x.unwrap_or(self.x), self.mask_y.unwrap_or(self.y))
    }
}

#[derive(Debug, serde::Deserialize)]
struct OutputCfg {
    trace: String,
}

#[derive(Debug, serde::Serialize)]
struct Trace {
    generated_at: String,
    stall: Option<autotrack_proto::report::StallReport>,
    track: TrackExport,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    Ok(toml::from_str(&s).context("parse config toml")?)
}

fn load_sequence(cfg: &Config) -> Result<ImageSequence> {
    let coords = match &cfg.video.axis {
        Some(axis) => axis.coords()?,
        None => ImageCoords::default(),
    };
    let seq = ImageSequence::load_dir(Path::new(&cfg.video.frames_dir), cfg.video.clip)?;
    Ok(seq.with_coords(coords))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg).await?,
        Command::Run => run(&cfg).await?,
        Command::Frames => frames(&cfg).await?,
    }
    Ok(())
}

async fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    track_doctor::check_settings(&cfg.tracker)?;
    anyhow::ensure!(Path::new(&cfg.video.frames_dir).is_dir(), "video.frames_dir is not a directory");
    anyhow::ensure!(cfg.video.clip.stride >= 1, "video.stride must be >= 1");

    let mut seq = load_sequence(cfg)?;
    let (w, h) = seq.dimensions().context("no frames decoded")?;
    anyhow::ensure!(seq.seek_frame(cfg.key_frame.frame), "key_frame.frame {} is not a step of the clip", cfg.key_frame.frame);
    track_doctor::check_key_frame(&cfg.tracker, cfg.key_frame.position(), w, h)?;
    track_doctor::check_line_mode(&cfg.tracker, &seq.coords(cfg.key_frame.frame), cfg.key_frame.position())?;

    if let Some(out) = &cfg.output {
        let dir = Path::new(&out.trace).parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = dir {
            anyhow::ensure!(dir.is_dir(), "output.trace directory {} missing", dir.display());
        }
    }

    info!("doctor: OK");
    Ok(())
}

async fn frames(cfg: &Config) -> Result<()> {
    let seq = load_sequence(cfg)?;
    let (w, h) = seq.dimensions().context("no frames decoded")?;
    let clip = seq.clip();
    println!("frames={} size={}x{}", seq.frame_count(), w, h);
    println!("clip start={} stride={} reverse={} steps={}", clip.start, clip.stride, clip.reverse, seq.step_count());
    for step in 0..seq.step_count() {
        println!("step {} -> frame {}", step, seq.step_to_frame(step));
    }
    Ok(())
}

/// Logs engine notifications.
struct LogFeedback;

impl TrackFeedback for LogFeedback {
    fn after_key_frame(&mut self, track: &str, frame: u32) {
        debug!(track, frame, "key frame added");
    }

    fn template_set(&mut self, track: &str, frame: u32) {
        debug!(track, frame, "template set");
    }
}

async fn run(cfg: &Config) -> Result<()> {
    info!("run: starting");

    let mut seq = load_sequence(cfg)?;
    anyhow::ensure!(seq.seek_frame(cfg.key_frame.frame), "key_frame.frame {} is not a step of the clip", cfg.key_frame.frame);

    let mut track = AutoTrack::new(cfg.name.clone());
    track.options_mut().apply(cfg.tracker).context("tracker options")?;
    track
        .add_key_frame_with_mask(&seq, cfg.key_frame.position(), cfg.key_frame.mask_center(), &mut LogFeedback)
        .context("set key frame")?;

    // Tracking runs on a blocking worker; reports come back over the channel.
    let (tx, mut rx) = mpsc::channel::<StepReport>(64);
    let worker = tokio::task::spawn_blocking(move || -> Result<AutoTrack> {
        let mut fb = LogFeedback;
        loop {
            let r = track.step(&mut seq, &mut fb)?;
            let done = r.outcome == StepOutcome::EndOfClip || r.state == CursorState::Stalled;
            if tx.blocking_send(r).is_err() || done {
                break;
            }
        }
        Ok(track)
    });

    let (mut accepted, mut possible, mut missed) = (0u32, 0u32, 0u32);
    while let Some(r) = rx.recv().await {
        if r.accepted() {
            accepted += 1;
        }
        match r.outcome {
            StepOutcome::Possible => possible += 1,
            StepOutcome::Missed(_) => missed += 1,
            _ => {}
        }
        if r.ambiguous {
            warn!(frame = r.frame, score = ?r.score, runner_up = ?r.runner_up, "ambiguous match");
        }
        match r.position {
            Some(p) => info!(frame = r.frame, outcome = ?r.outcome, x = p.x, y = p.y, score = ?r.score, "step"),
            None => info!(frame = r.frame, outcome = ?r.outcome, state = ?r.state, misses = r.misses, "step"),
        }
    }

    let track = worker.await.context("tracking worker panicked")??;
    let stall = track.stall();
    match stall {
        Some(s) => warn!(failed_frame = s.failed_frame, last_good_frame = s.last_good_frame, reason = %s.reason, "run: stalled"),
        None => info!("run: reached end of clip"),
    }
    println!(
        "accepted={} (possible={}) missed={} frames={} key_frames={:?}",
        accepted,
        possible,
        missed,
        track.frames().len(),
        track.list_key_frames()
    );

    if let Some(out) = &cfg.output {
        let generated_at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .context("format timestamp")?;
        let trace = Trace { generated_at, stall, track: track.export() };
        let json = serde_json::to_string_pretty(&trace).context("encode trace")?;
        std::fs::write(&out.trace, json).with_context(|| format!("write {}", out.trace))?;
        info!(path = %out.trace, "run: trace written");
    }
    Ok(())
}
