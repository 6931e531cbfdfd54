use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// JSON-lines trace of layout decisions; one record per line.
///
/// Clones share both the sink and the counters. [`DebugLogger::scoped`]
/// shares only the sink, so each assembly sums its own counts.
#[derive(Clone)]
pub(crate) struct DebugLogger {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    counters: Arc<Mutex<BTreeMap<String, u64>>>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::to_writer(BufWriter::new(file)))
    }

    pub fn to_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            counters: Arc::default(),
        }
    }

    /// Same sink, fresh counters.
    pub fn scoped(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            counters: Arc::default(),
        }
    }

    /// Writes `{"type": kind, ..fields}`; non-object `fields` go under `"data"`.
    pub fn record(&self, kind: &str, fields: Value) {
        let mut object = Map::new();
        object.insert("type".to_string(), Value::String(kind.to_string()));
        match fields {
            Value::Object(map) => object.extend(map),
            Value::Null => {}
            other => {
                object.insert("data".to_string(), other);
            }
        }
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", Value::Object(object));
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut counters) = self.counters.lock() {
            let entry = counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    pub fn emit_summary(&self, context: &str) {
        let counters = match self.counters.lock() {
            Ok(mut counters) => std::mem::take(&mut *counters),
            Err(_) => return,
        };
        let line = json!({
            "type": "debug.summary",
            "context": context,
            "counts": counters,
        });
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{line}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Clone, Default)]
    pub(crate) struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self.0.lock() {
                Ok(mut inner) => inner.write(buf),
                Err(_) => Err(io::Error::other("poisoned")),
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        pub(crate) fn lines(&self) -> Vec<Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    #[test]
    fn records_and_summary_are_json_lines() {
        let buf = SharedBuf::default();
        let logger = DebugLogger::to_writer(buf.clone());
        logger.record("layout.page_start", json!({ "page": 1 }));
        logger.increment("rows", 2);
        logger.increment("rows", 3);
        logger.emit_summary("assemble");
        logger.flush();

        let lines = buf.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "layout.page_start");
        assert_eq!(lines[0]["page"], 1);
        assert_eq!(lines[1]["counts"]["rows"], 5);
        assert_eq!(lines[1]["context"], "assemble");
    }

    #[test]
    fn scoped_loggers_count_separately_into_one_sink() {
        let buf = SharedBuf::default();
        let root = DebugLogger::to_writer(buf.clone());
        let first = root.scoped();
        let second = root.scoped();
        first.increment("rows", 4);
        second.increment("rows", 1);
        first.clone().increment("rows", 2);
        second.emit_summary("second");
        first.emit_summary("first");

        let lines = buf.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["context"], "second");
        assert_eq!(lines[0]["counts"]["rows"], 1);
        assert_eq!(lines[1]["counts"]["rows"], 6);
    }
}
