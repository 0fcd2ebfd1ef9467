use std::fmt::Write as _;
use std::io::Write;

use log::LevelFilter;
use serde_json::json;

use super::SharedWriter;

/// Logger forwarding records to the DAP client as `output` events.
///
/// Filtering is delegated to an `env_logger` configured from the environment,
/// so `RUST_LOG` keeps working when the adapter runs under an IDE.
pub struct DapLogger<W: Write + Send> {
    inner: env_logger::Logger,
    out: SharedWriter<W>,
}

impl<W: Write + Send> DapLogger<W> {
    pub fn new(out: SharedWriter<W>) -> Self {
        Self {
            inner: env_logger::Logger::from_default_env(),
            out,
        }
    }

    pub fn filter(&self) -> LevelFilter {
        self.inner.filter()
    }
}

impl<W: Write + Send> log::Log for DapLogger<W> {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut output = String::new();
        write!(output, "[{}] ", record.level()).unwrap();
        if let Some(module) = record.module_path() {
            write!(output, "{module} ").unwrap();
        }
        writeln!(output, "{}", record.args()).unwrap();

        self.out.send_event(
            "output",
            Some(json!({ "category": "console", "output": output })),
        );
    }

    fn flush(&self) {}
}
