// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Process-wide tracing bootstrap.
//!
//! Run-level events (construction, dropouts, completion) log at `info`/`warn`;
//! per-step decoder switches and pulse scheduling sit at `debug`/`trace`, so
//! the default filter keeps long runs quiet.

use std::env::VarError;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

static INITIALISED: OnceLock<()> = OnceLock::new();
static CHROME_GUARD: OnceLock<Mutex<Option<tracing_chrome::FlushGuard>>> = OnceLock::new();

/// Filter directives, in `EnvFilter` syntax. Falls back to `RUST_LOG`.
pub const LOG_ENV: &str = "HOMEOSTAT_LOG";
/// Optional Chrome trace output file.
pub const CHROME_TRACE_ENV: &str = "HOMEOSTAT_TRACE_CHROME";
pub const DEFAULT_DIRECTIVES: &str = "info";

/// Subscriber settings. [`TracingOptions::from_env`] reads the environment;
/// hosts may also build one directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TracingOptions {
    pub directives: String,
    pub chrome_trace: Option<PathBuf>,
    pub ansi: bool,
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self {
            directives: DEFAULT_DIRECTIVES.to_string(),
            chrome_trace: None,
            ansi: std::io::stdout().is_terminal(),
        }
    }
}

impl TracingOptions {
    pub fn from_env() -> Result<Self, InitError> {
        let directives = match read_env(LOG_ENV)? {
            Some(value) => value,
            None => read_env("RUST_LOG")?.unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string()),
        };
        Ok(Self {
            directives,
            chrome_trace: read_env(CHROME_TRACE_ENV)?.map(PathBuf::from),
            ..Self::default()
        })
    }
}

/// Installs the global subscriber from the environment.
pub fn init_tracing() -> Result<(), InitError> {
    init_tracing_with(TracingOptions::from_env()?)
}

/// Installs the global subscriber. Only the first successful call in a
/// process takes effect.
pub fn init_tracing_with(options: TracingOptions) -> Result<(), InitError> {
    let filter = EnvFilter::try_new(&options.directives).map_err(|err| InitError::Directives {
        directives: options.directives.clone(),
        reason: err.to_string(),
    })?;
    INITIALISED
        .set(())
        .map_err(|_| InitError::AlreadyInitialised)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(options.ansi);
    let chrome_layer = options.chrome_trace.map(|path| {
        let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
            .file(path)
            .include_args(true)
            .build();
        let cell = CHROME_GUARD.get_or_init(|| Mutex::new(None));
        if let Ok(mut slot) = cell.lock() {
            *slot = Some(guard);
        }
        layer
    });

    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .with(chrome_layer)
        .init();
    Ok(())
}

/// Flushes and closes the Chrome trace file, if one was opened.
pub fn flush_chrome_trace() {
    if let Some(cell) = CHROME_GUARD.get() {
        if let Ok(mut slot) = cell.lock() {
            slot.take();
        }
    }
}

fn read_env(key: &'static str) -> Result<Option<String>, InitError> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => Ok(Some(raw.trim().to_string())),
        Ok(_) | Err(VarError::NotPresent) => Ok(None),
        Err(source) => Err(InitError::Env { key, source }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("tracing has already been initialised")]
    AlreadyInitialised,
    #[error("failed to read {key}: {source}")]
    Env {
        key: &'static str,
        #[source]
        source: VarError,
    },
    #[error("invalid log directives {directives:?}: {reason}")]
    Directives { directives: String, reason: String },
}
