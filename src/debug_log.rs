//! Debug logging for tracing pipeline runs.
//!
//! Enable by setting environment variable: KWDIST_DEBUG_LOG=1
//! Logs are appended to `kwdist-debug.log` in the OS temp directory.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

static ENABLED: AtomicBool = AtomicBool::new(false);
static START_TIME: OnceLock<Instant> = OnceLock::new();
static LOG_FILE: OnceLock<std::sync::Mutex<std::fs::File>> = OnceLock::new();

/// Initialize debug logging. Call once at startup.
pub fn init() {
    if std::env::var("KWDIST_DEBUG_LOG").is_err() {
        return;
    }

    START_TIME.get_or_init(Instant::now);
    let path = std::env::temp_dir().join("kwdist-debug.log");
    let file = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("⚠️  Could not open debug log {}: {e}", path.display());
            return;
        }
    };
    LOG_FILE.get_or_init(|| std::sync::Mutex::new(file));
    ENABLED.store(true, Ordering::SeqCst);
    log("DEBUG", "init", "Debug logging initialized");
}

/// Check if debug logging is enabled.
#[inline]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Log a debug message with timestamp and thread ID.
pub fn log(category: &str, action: &str, detail: &str) {
    if !is_enabled() {
        return;
    }

    let elapsed = START_TIME
        .get()
        .map(|s| s.elapsed().as_millis())
        .unwrap_or(0);
    let thread_id = std::thread::current().id();

    let msg = format!(
        "[{:>8}ms] [{:?}] [{}] {} - {}\n",
        elapsed, thread_id, category, action, detail
    );

    if let Some(file_mutex) = LOG_FILE.get()
        && let Ok(mut file) = file_mutex.lock()
    {
        let _ = file.write_all(msg.as_bytes());
        let _ = file.flush();
    }
}

/// Log a pipeline step. Formats `detail` lazily so disabled logging costs nothing.
#[inline]
pub fn step(category: &str, action: &str, detail: impl FnOnce() -> String) {
    if is_enabled() {
        log(category, action, &detail());
    }
}
