use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;
use std::thread;

/// Opt-in logging for clients and tests. Scheduling events (svar
/// creation, worker spawn/exit, shutdown) log at debug level and carry
/// the emitting thread's name, so interleaved worker output stays
/// readable. Safe to call more than once; later calls are no-ops.
pub fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = Builder::from_default_env()
        .filter_level(LevelFilter::Warn) // Default: only warnings from dependencies
        .filter_module(env!("CARGO_PKG_NAME"), level) // Our crate: use requested level
        .format(|buf, record| {
            let name = env!("CARGO_PKG_NAME");
            let current = thread::current();
            let origin = current.name().unwrap_or("?");
            let line = match record.level() {
                Level::Error => format!(
                    "[{} {} {}] {}",
                    name.cyan(),
                    "ERROR".red(),
                    origin.white(),
                    record.args()
                ),
                Level::Warn => format!(
                    "[{} {} {}] {}",
                    name.cyan(),
                    "WARN".yellow(),
                    origin.white(),
                    record.args()
                ),
                _ => format!("[{} {}] {}", name.cyan(), origin.white(), record.args()),
            };
            writeln!(buf, "{}", line)
        })
        .try_init();
}
