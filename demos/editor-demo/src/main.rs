//! Editor demo.
//!
//! Opens a window for a stand-in plugin that logs every call it receives,
//! asks for a bigger editor after two seconds, and closes after ten seconds
//! (or when the window system closes the window).
//!
//! Usage: `editor-demo [config.toml]`. Set `RUST_LOG=debug` for the
//! window and idle internals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use berth::prelude::*;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

const RUN_FOR: Duration = Duration::from_secs(10);
const GROW_AFTER_TICKS: u64 = 120;
const GROWN_SIZE: EditorSize = EditorSize::new(640, 420);

/// Stand-in plugin that logs what the host asks of it.
#[derive(Default)]
struct LoggingPlugin {
    ticks: AtomicU64,
    resize_request: Mutex<Option<EditorSize>>,
}

impl EditorBinding for LoggingPlugin {
    fn create_editor_view(&self, parent: NativeHandle) -> BindingResult<bool> {
        log::info!("create_editor_view({parent:?})");
        Ok(true)
    }

    fn close_editor_view(&self) -> BindingResult<()> {
        log::info!(
            "close_editor_view after {} idle ticks",
            self.ticks.load(Ordering::Relaxed)
        );
        Ok(())
    }

    fn resize_editor_view(&self, size: EditorSize) -> BindingResult<()> {
        log::info!("resize_editor_view({size})");
        Ok(())
    }

    fn get_preferred_editor_size(&self) -> Option<EditorSize> {
        None
    }

    fn process_idle(&self) -> BindingResult<()> {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if tick == GROW_AFTER_TICKS {
            log::info!("Requesting editor size {GROWN_SIZE}");
            *self.resize_request.lock() = Some(GROWN_SIZE);
        }
        Ok(())
    }

    fn plugin_display_name(&self) -> Option<String> {
        Some("Logging Plugin".into())
    }

    fn take_resize_request(&self) -> Option<EditorSize> {
        self.resize_request.lock().take()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => EditorConfig::load(path)?,
        None => EditorConfig::default(),
    };
    config.validate()?;

    let Some(engine) = EngineKind::native() else {
        log::error!("No window engine for this platform");
        return Ok(());
    };
    log::info!("Using the {engine} window engine");

    let plugin = Arc::new(LoggingPlugin::default());
    let editor = EditorController::with_config(plugin.clone(), config);
    editor.open_editor(None)?;

    let deadline = Instant::now() + RUN_FOR;
    while editor.is_editor_open() && Instant::now() < deadline {
        run_event_loop_for(Duration::from_millis(50));
    }

    editor.close_editor();
    log::info!(
        "Done after {} idle ticks, editor {}",
        plugin.ticks.load(Ordering::Relaxed),
        editor.state()
    );
    Ok(())
}
