use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "webbridge_bridge" => TRACE).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build from level names as they appear in settings. Unparseable
    /// names fall back to INFO (default) or are dropped (overrides).
    pub fn from_names<'a>(
        level: &str,
        modules: impl IntoIterator<Item = (&'a String, &'a String)>,
        json: bool,
    ) -> Self {
        let module_levels = modules
            .into_iter()
            .filter_map(|(module, lvl)| lvl.parse::<Level>().ok().map(|l| (module.clone(), l)))
            .collect();
        Self {
            log_level: level.parse().unwrap_or(Level::INFO),
            module_levels,
            json,
        }
    }

    /// `EnvFilter` directives for this config, e.g. `info,webbridge_bridge=trace`.
    pub fn filter_directives(&self) -> String {
        let mut filter_str = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter_str
    }
}

/// Returned by [`init_telemetry`]; records what was installed.
#[derive(Clone, Debug)]
pub struct TelemetryGuard {
    directives: String,
    installed: bool,
}

impl TelemetryGuard {
    /// Filter directives in effect (RUST_LOG wins when set).
    pub fn directives(&self) -> &str {
        &self.directives
    }

    /// False when another global subscriber was already set.
    pub fn installed(&self) -> bool {
        self.installed
    }
}

/// Initialize the global tracing subscriber. Call once at startup; later
/// calls leave the first subscriber in place.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryGuard {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| config.filter_directives());
    let env_filter = EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("webbridge-telemetry: invalid filter {directives:?}: {e}");
        EnvFilter::new(config.filter_directives())
    });

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let installed = tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
        .is_ok();
    if !installed {
        tracing::warn!("tracing subscriber already installed, keeping it");
    }

    TelemetryGuard {
        directives,
        installed,
    }
}
