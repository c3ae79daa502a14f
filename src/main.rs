//! Seconds Ring
//!
//! Drives the LED ring of a network clock: one color sweep per minute, with
//! saturation and brightness adjustable over HTTP while it runs.
//!
//! ## Architecture
//! - **Animation thread** (std::thread): owns the renderer, waits for cues
//! - **Minute cue thread** (std::thread): signals the gate at each minute
//! - **HTTP server** (tokio/axum): config messages, manual cues, status
//!
//! ## Usage
//! ```sh
//! sudo ./target/release/seconds-ring --port 8080 --brightness 24
//! ```

use clap::Parser;
use seconds_ring::animation::{AnimationStatus, RingAnimator, SystemClock};
use seconds_ring::cue::{CueGate, MinuteTicker};
use seconds_ring::hue::HueGenerator;
use seconds_ring::pixels::{HeadlessRenderer, PixelRenderer};
use seconds_ring::server::{self, AppState};
use seconds_ring::settings::RingSettings;
use seconds_ring::{
    DEFAULT_LAST_PIXEL_SKIP, DEFAULT_RING_SIZE, DEFAULT_STEPS_PER_PIXEL, PanelConfig, RingLayout,
    is_running, setup_signal_handler,
};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Seconds ring animation and HTTP control server
#[derive(Parser)]
#[command(name = "seconds-ring")]
#[command(about = "Minute-by-minute LED seconds ring for a network clock")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Number of LEDs on the ring
    #[arg(long, default_value_t = DEFAULT_RING_SIZE)]
    ring_size: u16,

    /// Fade steps per LED
    #[arg(long, default_value_t = DEFAULT_STEPS_PER_PIXEL)]
    steps_per_pixel: u16,

    /// Length of one sweep in milliseconds
    #[arg(long, default_value = "60000")]
    cycle_ms: u64,

    /// Steps dropped from the last LED so a sweep ends before the next minute
    #[arg(long, default_value_t = DEFAULT_LAST_PIXEL_SKIP)]
    last_pixel_skip: u16,

    /// Initial LED brightness (0-254)
    #[arg(long, default_value = "24", value_parser = clap::value_parser!(u8).range(0..=254))]
    brightness: u8,

    /// Initial LED saturation (0-254)
    #[arg(long, default_value = "242", value_parser = clap::value_parser!(u8).range(0..=254))]
    saturation: u8,

    /// Don't signal at each wall-clock minute; cues only come from the API
    #[arg(long)]
    no_minute_cue: bool,

    /// Log frames instead of driving the LED panel
    #[arg(long)]
    headless: bool,

    /// Number of rows on the LED panel
    #[arg(long, default_value = "64")]
    rows: u32,

    /// Number of columns on the LED panel
    #[arg(long, default_value = "64")]
    cols: u32,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .with_ansi(false) // Disable ANSI color codes for systemd/journald
        .compact()
        .init();

    let args = Args::parse();
    let layout = RingLayout::new(
        args.ring_size,
        args.steps_per_pixel,
        Duration::from_millis(args.cycle_ms),
    )
    .with_last_pixel_skip(args.last_pixel_skip);
    layout.validate()?;

    let panel = PanelConfig::new(args.rows, args.cols);

    tracing::info!("Seconds Ring v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Ring: {} pixels x {} steps, {}ms per frame",
        layout.ring_size,
        layout.steps_per_pixel,
        layout.frame_period().as_millis()
    );
    tracing::info!(
        "Saturation {}, brightness {}",
        args.saturation,
        args.brightness
    );
    tracing::info!("Port: {}", args.port);

    let gate = Arc::new(CueGate::new());
    let settings = Arc::new(RingSettings::new(args.saturation, args.brightness));
    let status = Arc::new(Mutex::new(AnimationStatus::default()));
    let running = setup_signal_handler(gate.clone())?;

    // The renderer is created on the animation thread: the matrix library
    // must stay on the thread that opened it.
    let animation_handle = {
        let gate = gate.clone();
        let settings = settings.clone();
        let status = status.clone();
        let headless = args.headless;
        std::thread::Builder::new()
            .name("seconds-ring".to_string())
            .spawn(move || run_animation(headless, panel, layout, settings, status, &gate))?
    };

    let ticker = if args.no_minute_cue {
        tracing::info!("Minute cue disabled, waiting for POST /api/v1/cue");
        None
    } else {
        Some(MinuteTicker::spawn(gate.clone())?)
    };

    let app_state = AppState {
        gate: gate.clone(),
        settings,
        status,
        layout,
    };
    let app = server::create_router(app_state);

    let addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", args.port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(running))
        .await?;

    // Ctrl+C already closed the gate; make sure of it for any other exit.
    gate.close();
    if let Some(ticker) = ticker {
        ticker.join();
    }

    // The animation finishes its current sweep before it sees the closed
    // gate; don't hold up process exit for it.
    drop(animation_handle);
    tracing::info!("Shut down cleanly.");
    Ok(())
}

#[cfg(feature = "hardware")]
fn run_animation(
    headless: bool,
    panel: PanelConfig,
    layout: RingLayout,
    settings: Arc<RingSettings>,
    status: Arc<Mutex<AnimationStatus>>,
    gate: &CueGate,
) {
    use seconds_ring::render::MatrixRingRenderer;

    if headless {
        let renderer = HeadlessRenderer::new(usize::from(layout.ring_size));
        return animate(renderer, layout, settings, status, gate);
    }

    match MatrixRingRenderer::new(panel, layout.ring_size) {
        Ok(renderer) => animate(renderer, layout, settings, status, gate),
        Err(e) => {
            tracing::error!("Failed to initialize LED matrix: {}", e);
            // Nothing will ever read the gate; make the API refuse cues.
            gate.close();
        }
    }
}

#[cfg(not(feature = "hardware"))]
fn run_animation(
    headless: bool,
    panel: PanelConfig,
    layout: RingLayout,
    settings: Arc<RingSettings>,
    status: Arc<Mutex<AnimationStatus>>,
    gate: &CueGate,
) {
    if !headless {
        tracing::warn!(
            "Built without the 'hardware' feature, logging frames for a {}x{} panel instead",
            panel.cols,
            panel.rows
        );
    }

    let renderer = HeadlessRenderer::new(usize::from(layout.ring_size));
    animate(renderer, layout, settings, status, gate);
}

/// Run the ring on the current thread until the gate closes.
fn animate<R: PixelRenderer>(
    renderer: R,
    layout: RingLayout,
    settings: Arc<RingSettings>,
    status: Arc<Mutex<AnimationStatus>>,
    gate: &CueGate,
) {
    let animator = RingAnimator::new(
        layout,
        renderer,
        SystemClock,
        HueGenerator::from_entropy(),
        settings,
    );
    let mut animator = match animator {
        Ok(animator) => animator.with_status(status),
        Err(e) => {
            tracing::error!("Invalid ring layout: {}", e);
            gate.close();
            return;
        }
    };

    let cycles = animator.run(gate);
    tracing::info!("Animation thread done after {} cycles", cycles);
}

/// Resolve once the Ctrl+C handler clears `running`.
async fn wait_for_shutdown(running: Arc<AtomicBool>) {
    while is_running(&running) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    tracing::info!("Stopping HTTP server");
}
