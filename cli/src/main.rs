use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ab_glyph::FontRef;
use nalgebra::Point2;
use overlay_core::{
    geometry::Observation,
    graphic::{AvatarGraphic, EntityInfo},
    overlay::OverlayRegistry,
    surface::{FrameSurface, RgbFrame},
    tracker::TrackerFactory,
};

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "multitrack",
    version,
    about = "Multi-entity overlay tracking demo driver",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulated detection session: a detection thread drives entity
    /// trackers while the main thread renders the overlay.
    Simulate {
        /// Number of detection frames to simulate
        #[arg(long, default_value_t = 240)]
        frames: u32,

        /// Number of simultaneously tracked entities
        #[arg(long, default_value_t = 3)]
        entities: u32,

        /// Capture preview size (detector space)
        #[arg(long, default_value_t = 640)]
        preview_width: u32,
        #[arg(long, default_value_t = 480)]
        preview_height: u32,

        /// Render view size
        #[arg(long, default_value_t = 1280)]
        view_width: u32,
        #[arg(long, default_value_t = 960)]
        view_height: u32,

        /// Mirror horizontally (front-facing capture)
        #[arg(long)]
        mirror: bool,

        /// Output path for the final rendered frame
        #[arg(short, long, default_value = "overlay.png")]
        output: PathBuf,

        /// TTF/OTF font for the annotation labels (labels are skipped without one)
        #[arg(long)]
        font: Option<PathBuf>,

        /// Avatar image for a static remote-participant graphic
        #[arg(long)]
        avatar: Option<PathBuf>,
    },

    /// Render a single observation through the full registry path to PNG.
    Snapshot {
        /// Observation geometry in detector-space pixels
        #[arg(long, default_value_t = 100.0)]
        x: f32,
        #[arg(long, default_value_t = 100.0)]
        y: f32,
        #[arg(long, default_value_t = 50.0)]
        width: f32,
        #[arg(long, default_value_t = 50.0)]
        height: f32,

        #[arg(long, default_value_t = 640)]
        preview_width: u32,
        #[arg(long, default_value_t = 480)]
        preview_height: u32,
        #[arg(long, default_value_t = 1280)]
        view_width: u32,
        #[arg(long, default_value_t = 960)]
        view_height: u32,

        #[arg(long)]
        mirror: bool,

        /// Entity identity label
        #[arg(long, default_value = "FRE955")]
        id: String,

        /// Concurrency/occupancy counter shown in the band
        #[arg(long, default_value_t = 2)]
        count: u32,

        /// Status code (1 nominal, 2 alert, 3 warning)
        #[arg(long, default_value_t = 1)]
        status: i32,

        #[arg(short, long, default_value = "snapshot.png")]
        output: PathBuf,

        #[arg(long)]
        font: Option<PathBuf>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    // Respect RUST_LOG; default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            frames,
            entities,
            preview_width,
            preview_height,
            view_width,
            view_height,
            mirror,
            output,
            font,
            avatar,
        } => cmd_simulate(SimulateArgs {
            frames,
            entities,
            preview_width,
            preview_height,
            view_width,
            view_height,
            mirror,
            output,
            font,
            avatar,
        }),
        Commands::Snapshot {
            x,
            y,
            width,
            height,
            preview_width,
            preview_height,
            view_width,
            view_height,
            mirror,
            id,
            count,
            status,
            output,
            font,
        } => cmd_snapshot(
            Observation::new(x, y, width, height),
            (preview_width, preview_height),
            (view_width, view_height),
            mirror,
            EntityInfo::new(id, count, status),
            output,
            font,
        ),
    }
}

// ── Simulation ────────────────────────────────────────────────────────────────

struct SimulateArgs {
    frames: u32,
    entities: u32,
    preview_width: u32,
    preview_height: u32,
    view_width: u32,
    view_height: u32,
    mirror: bool,
    output: PathBuf,
    font: Option<PathBuf>,
    avatar: Option<PathBuf>,
}

fn cmd_simulate(args: SimulateArgs) -> Result<()> {
    info!("simulated detection session");
    info!("  preview : {}x{}", args.preview_width, args.preview_height);
    info!("  view    : {}x{}", args.view_width, args.view_height);
    info!("  output  : {}", args.output.display());

    let registry = OverlayRegistry::new();
    registry.set_preview_size(args.preview_width, args.preview_height, args.mirror);
    registry.set_view_size(args.view_width, args.view_height);

    // Optional static remote-participant graphic at a fixed anchor.
    if let Some(path) = &args.avatar {
        let avatar = image::open(path)
            .with_context(|| format!("failed to open avatar image: {}", path.display()))?
            .into_rgb8();
        let anchor = Point2::new(args.view_width as f32 * 0.8, args.view_height as f32 * 0.8);
        registry.add(std::sync::Arc::new(AvatarGraphic::new(
            &EntityInfo::new("Sean", 2, 2),
            avatar,
            anchor,
        )));
    }

    let serial = AtomicU32::new(0);
    let factory = TrackerFactory::new(registry.clone(), move |_obs| {
        let n = serial.fetch_add(1, Ordering::Relaxed);
        EntityInfo::new(format!("FRE{:03}", 955 + n), n % 4 + 1, (n % 3 + 1) as i32)
    });

    let font_data = load_font_bytes(args.font.as_deref())?;

    let pb = spinner("Simulating detection…");
    let pb2 = pb.clone();

    let preview_w = args.preview_width as f32;
    let preview_h = args.preview_height as f32;
    let frames = args.frames;
    let entities = args.entities;

    // Detection thread: create trackers, feed per-frame observations, retire
    // every other entity partway through so removals interleave with updates.
    let detection = thread::spawn(move || {
        let trackers: Vec<_> = (0..entities)
            .map(|i| {
                let obs = orbit_observation(i, 0, preview_w, preview_h);
                let tracker = factory.create(&obs);
                tracker.on_new_item(obs);
                tracker
            })
            .collect();

        let retire_at = frames * 2 / 3;
        for frame in 1..frames {
            for (i, tracker) in trackers.iter().enumerate() {
                if frame == retire_at && i % 2 == 1 {
                    tracker.on_missing();
                } else {
                    tracker.on_update(orbit_observation(i as u32, frame, preview_w, preview_h));
                }
            }
            pb2.tick();
            thread::sleep(Duration::from_millis(2));
        }
        trackers.len()
    });

    // Render loop: redraw only when something changed, coalescing bursts of
    // updates into one pass per iteration.
    let mut frame = RgbFrame::black(args.view_width, args.view_height);
    let mut redraws: u64 = 0;
    while !detection.is_finished() {
        if registry.take_redraw_request() {
            render_pass(&registry, &mut frame, font_data.as_deref())?;
            redraws += 1;
        }
        thread::sleep(Duration::from_millis(4));
    }
    let created = detection
        .join()
        .map_err(|_| anyhow::anyhow!("detection thread panicked"))?;

    // Final pass so the output reflects the end state.
    registry.take_redraw_request();
    render_pass(&registry, &mut frame, font_data.as_deref())?;

    save_frame(&frame, &args.output)?;
    pb.finish_with_message("Done.");
    info!(
        created,
        redraws,
        remaining = registry.len(),
        "simulation finished"
    );
    Ok(())
}

/// Detector-space orbit for simulated entity `index` at `frame`.
fn orbit_observation(index: u32, frame: u32, preview_w: f32, preview_h: f32) -> Observation {
    let phase = index as f32 * 2.1;
    let t = frame as f32 * 0.05 + phase;
    let radius_x = preview_w * 0.25;
    let radius_y = preview_h * 0.25;
    let size = 40.0 + 10.0 * index as f32;
    Observation::new(
        preview_w / 2.0 + radius_x * t.cos() - size / 2.0,
        preview_h / 2.0 + radius_y * t.sin() - size / 2.0,
        size,
        size,
    )
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

fn cmd_snapshot(
    observation: Observation,
    preview: (u32, u32),
    view: (u32, u32),
    mirror: bool,
    info: EntityInfo,
    output: PathBuf,
    font: Option<PathBuf>,
) -> Result<()> {
    let registry = OverlayRegistry::new();
    registry.set_preview_size(preview.0, preview.1, mirror);
    registry.set_view_size(view.0, view.1);

    let factory = TrackerFactory::new(registry.clone(), move |_obs| info.clone());
    let tracker = factory.create(&observation);
    tracker.on_new_item(observation);

    let font_data = load_font_bytes(font.as_deref())?;
    let mut frame = RgbFrame::black(view.0, view.1);
    render_pass(&registry, &mut frame, font_data.as_deref())?;
    save_frame(&frame, &output)?;

    info!("snapshot written to {}", output.display());
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn load_font_bytes(path: Option<&std::path::Path>) -> Result<Option<Vec<u8>>> {
    match path {
        Some(p) => {
            let bytes =
                std::fs::read(p).with_context(|| format!("failed to read font: {}", p.display()))?;
            // Validate up front so a bad font fails before the render loop.
            FontRef::try_from_slice(&bytes).context("failed to parse font")?;
            Ok(Some(bytes))
        }
        None => Ok(None),
    }
}

fn render_pass(registry: &OverlayRegistry, frame: &mut RgbFrame, font: Option<&[u8]>) -> Result<()> {
    frame.data.fill(0);
    match font {
        Some(bytes) => {
            let font = FontRef::try_from_slice(bytes).context("failed to parse font")?;
            let mut surface = FrameSurface::with_font(frame, font);
            registry.render(&mut surface);
        }
        None => {
            let mut surface = FrameSurface::new(frame);
            registry.render(&mut surface);
        }
    }
    Ok(())
}

fn save_frame(frame: &RgbFrame, path: &std::path::Path) -> Result<()> {
    image::save_buffer(
        path,
        &frame.data,
        frame.width,
        frame.height,
        image::ExtendedColorType::Rgb8,
    )
    .with_context(|| format!("failed to write {}", path.display()))
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed_precise}]")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}
