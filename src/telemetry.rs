//! Telemetry initialization.
//!
//! Controlled by `RETRACE_LOG`:
//! - unset or empty → warnings only, human format, to stderr
//! - `"stderr-json"` → JSON spans/events to stderr (`RUST_LOG` filters, default `info`)
//! - anything else → used as an `EnvFilter` directive, human format to stderr
//!
//! Output always goes to stderr so stdout stays parseable.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Environment variable selecting the telemetry mode.
pub const ENV_VAR: &str = "RETRACE_LOG";

/// Initialize tracing based on `RETRACE_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let setting = std::env::var(ENV_VAR).ok();

    match setting.as_deref() {
        None | Some("") => init_human(EnvFilter::new("warn")),
        Some("stderr-json") => init_json(),
        Some(directive) => {
            let filter = EnvFilter::try_new(directive).unwrap_or_else(|e| {
                eprintln!("warning: ignoring invalid {ENV_VAR}='{directive}': {e}");
                EnvFilter::new("warn")
            });
            init_human(filter);
        }
    }
}

fn init_human(filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init();
}

/// JSON spans/events to stderr via tracing-subscriber's JSON formatter.
fn init_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE),
        )
        .try_init();
}
