use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};
use log::{LevelFilter, Log, Metadata, Record};

/// Environment variable holding the log level (`error` .. `trace`, or `off`)
pub const LOG_LEVEL_ENV: &str = "LOOKOUT_LOG";

/// Writes records to stderr, one line each.
struct ConsoleLogger {
    level: LevelFilter,
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "{}.{:03} {:<5} [{}] {}",
            now.as_secs(),
            now.subsec_millis(),
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn parse_level(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Install the process logger. Call once from `main`; later calls are ignored.
pub fn setup_logging() {
    let level = parse_level(std::env::var(LOG_LEVEL_ENV).ok().as_deref());
    match log::set_boxed_logger(Box::new(ConsoleLogger { level })) {
        Ok(()) => log::set_max_level(level),
        Err(e) => eprintln!("Logger already initialized: {}", e),
    }
}
