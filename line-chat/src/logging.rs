use std::io::{self, IsTerminal};

use tracing_subscriber::{
    EnvFilter, Registry, fmt::MakeWriter, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

const DEFAULT_DIRECTIVE: &str = "info";

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Switches debug logging on and off at runtime.
pub struct LogLevel {
    handle: reload::Handle<EnvFilter, Registry>,
    debug: bool,
}

impl LogLevel {
    /// Enables or disables debug output; `None` flips the current setting.
    /// Returns the new setting.
    pub fn set_debug(&mut self, enabled: Option<bool>) -> Result<bool, reload::Error> {
        let enabled = enabled.unwrap_or(!self.debug);
        let filter = if enabled {
            EnvFilter::new("debug")
        } else {
            default_filter()
        };
        self.handle.reload(filter)?;
        self.debug = enabled;
        Ok(enabled)
    }
}

/// Installs the global subscriber, writing formatted events to `writer`.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Returns `None`
/// if a subscriber was already installed.
pub fn init<W>(writer: W) -> Option<LogLevel>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let (filter, handle) = reload::Layer::new(default_filter());
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(false)
        .with_ansi(io::stdout().is_terminal());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt)
        .try_init()
        .ok()?;

    Some(LogLevel {
        handle,
        debug: false,
    })
}
