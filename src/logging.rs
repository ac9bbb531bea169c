use is_terminal::IsTerminal;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize diagnostics on stderr; stdout is reserved for data.
///
/// `--debug` forces the `debug` level; otherwise `RUST_LOG` applies, falling
/// back to `info`.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}
