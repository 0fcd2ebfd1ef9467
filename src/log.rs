//! Global logging switch.
//!
//! The crate logs through the `log` facade, but which backend receives the
//! records depends on how the adapter is embedded: a standalone run wants
//! `env_logger` on stderr, while a DAP session must forward records to the
//! client as `output` events (stdout carries the protocol, see
//! [`crate::session::DapLogger`]). The backend therefore lives in a slot
//! that [`switch`] can re-point at runtime; the session pump switches to the
//! DAP logger as the first thing it does.

use log::{LevelFilter, Log, Metadata, Record};
use std::sync::{Once, RwLock};

static BACKEND: RwLock<Option<Box<dyn Log>>> = RwLock::new(None);
static INSTALL: Once = Once::new();

/// Forwards every record to whatever backend currently sits in the slot.
/// Records arriving while the slot is empty are dropped.
struct Dispatch;

static DISPATCH: Dispatch = Dispatch;

impl Log for Dispatch {
    fn enabled(&self, metadata: &Metadata) -> bool {
        BACKEND
            .read()
            .unwrap()
            .as_ref()
            .is_some_and(|backend| backend.enabled(metadata))
    }

    fn log(&self, record: &Record) {
        if let Some(backend) = BACKEND.read().unwrap().as_ref() {
            if backend.enabled(record.metadata()) {
                backend.log(record);
            }
        }
    }

    fn flush(&self) {
        if let Some(backend) = BACKEND.read().unwrap().as_ref() {
            backend.flush();
        }
    }
}

/// Replace the logging backend and reset the global maximum log level.
///
/// The first call also registers the dispatcher with the `log` facade.
/// Switching is cheap, a session may install its DAP logger and a later
/// session may install another one.
pub fn switch<L: Log + 'static>(logger: L, level_filter: LevelFilter) {
    INSTALL.call_once(|| {
        // fails only if the embedder installed its own global logger first,
        // in which case the slot simply never receives records
        _ = log::set_logger(&DISPATCH);
    });

    *BACKEND.write().unwrap() = Some(Box::new(logger));
    log::set_max_level(level_filter);
}
