//! Diagnostics setup.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the embedding process. [`init_tracing`] writes one bracketed line per
//! event to stderr, [`init_tracing_json`] writes JSON. `RUST_LOG` selects
//! the level, `info` otherwise. Whichever is called first wins.

use std::fmt;
use std::sync::Once;

use tracing::{debug, Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::{LookupSpan, Registry};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static SUBSCRIBER: Once = Once::new();

/// Renders `[COMPONENT] outer/inner - fields`.
///
/// The component is the final segment of the event target in upper case:
/// `sigresolve::resolve::notifier` becomes `NOTIFIER`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketFormat;

impl BracketFormat {
    pub fn component(target: &str) -> String {
        let tail = match target.rfind("::") {
            Some(at) => &target[at + 2..],
            None => target,
        };
        tail.to_ascii_uppercase()
    }
}

impl<S, N> FormatEvent<S, N> for BracketFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "[{}] ", Self::component(event.metadata().target()))?;

        let spans = ctx
            .event_scope()
            .map(|scope| {
                scope
                    .from_root()
                    .map(|span| span.name())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_default();
        if !spans.is_empty() {
            write!(writer, "{spans} - ")?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn install<L>(layer: L, mode: &'static str)
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    SUBSCRIBER.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        // Another subscriber may already be global; keep it.
        let _ = tracing_subscriber::registry()
            .with(layer)
            .with(filter)
            .try_init();
        debug!(mode, "subscriber installed");
    });
}

/// Install the bracketed stderr formatter.
pub fn init_tracing() {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .event_format(BracketFormat);
    install(layer, "text");
}

/// Install a JSON formatter that includes the current span and span list.
pub fn init_tracing_json() {
    let layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_current_span(true)
        .with_span_list(true);
    install(layer, "json");
}

/// `info`-level span wrapping one resolution step.
#[macro_export]
macro_rules! span_trace {
    ($name:expr) => {
        tracing::info_span!($name)
    };
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}

/// Log an error at `error` level and evaluate to it.
#[macro_export]
macro_rules! log_error {
    ($err:expr) => {{
        let err = $err;
        tracing::error!(error = %err, "failure");
        err
    }};
    ($err:expr, $context:expr) => {{
        let err = $err;
        tracing::error!(error = %err, context = $context, "failure");
        err
    }};
}
