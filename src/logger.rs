use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::exe_dir;

/// Logs to stderr and appends to `log.txt` next to the executable.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init() {
    let path = exe_dir().join("log.txt");
    let file = OpenOptions::new().create(true).append(true).open(&path).ok().map(|mut f| {
        let _ = writeln!(f, "===== kotrans start =====");
        f
    });

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let file_layer = file.map(|f| {
        fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(Mutex::new(f))
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
}
