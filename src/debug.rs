use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const COUNTER_OPERATORS: &str = "content.operators";
pub const COUNTER_UNKNOWN_OPERATORS: &str = "content.unknown_operators";
pub const COUNTER_CACHE_HITS: &str = "glyph.cache_hits";
pub const COUNTER_CACHE_MISSES: &str = "glyph.cache_misses";
pub const COUNTER_DISCARDED_WRITES: &str = "pixels.discarded";
pub const COUNTER_MISSING_GLYPHS: &str = "glyph.missing";

/// JSON-lines diagnostics sink with named counters.
///
/// Cloning shares the underlying writer, so the glyph renderer and the page
/// interpreter can report into one stream.
#[derive(Clone)]
pub struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: Box<dyn Write + Send>,
    counters: HashMap<String, u64>,
}

impl std::fmt::Debug for DebugLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugLogger").finish_non_exhaustive()
    }
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::with_writer(BufWriter::new(file)))
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: Box::new(writer),
                counters: HashMap::new(),
            })),
        }
    }

    pub fn log_json(&self, json: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{json}");
        }
    }

    /// Writes `{"type":kind, key:value...}` with string values escaped.
    pub fn log_event(&self, kind: &str, fields: &[(&str, String)]) {
        let mut json = format!("{{\"type\":\"{}\"", json_escape(kind));
        for (key, value) in fields {
            json.push_str(&format!(",\"{}\":\"{}\"", json_escape(key), json_escape(value)));
        }
        json.push('}');
        self.log_json(&json);
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if amount == 0 {
            return;
        }
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    pub fn counter(&self, key: &str) -> u64 {
        self.inner
            .lock()
            .ok()
            .and_then(|state| state.counters.get(key).copied())
            .unwrap_or(0)
    }

    /// Writes a `debug.summary` record and resets the counters.
    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let mut counters: Vec<(String, u64)> = state.counters.drain().collect();
            counters.sort_by(|a, b| a.0.cmp(&b.0));
            let counts_json = if counters.is_empty() {
                "{}".to_string()
            } else {
                let mut out = String::from("{");
                for (idx, (key, value)) in counters.iter().enumerate() {
                    if idx > 0 {
                        out.push(',');
                    }
                    out.push_str(&format!("\"{}\":{}", json_escape(key), value));
                }
                out.push('}');
                out
            };
            let json = format!(
                "{{\"type\":\"debug.summary\",\"context\":\"{}\",\"counts\":{}}}",
                json_escape(context),
                counts_json
            );
            let _ = writeln!(state.writer, "{json}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

pub(crate) fn json_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn summary_lists_counters_sorted_and_resets() {
        let buf = SharedBuf::default();
        let logger = DebugLogger::with_writer(buf.clone());
        logger.increment(COUNTER_CACHE_MISSES, 2);
        logger.increment(COUNTER_CACHE_HITS, 1);
        logger.increment(COUNTER_CACHE_HITS, 0);
        assert_eq!(logger.counter(COUNTER_CACHE_HITS), 1);

        logger.emit_summary("page \"1\"");
        assert_eq!(logger.counter(COUNTER_CACHE_HITS), 0);

        let text = String::from_utf8(buf.0.lock().expect("buffer").clone()).expect("utf8");
        assert_eq!(
            text.trim_end(),
            "{\"type\":\"debug.summary\",\"context\":\"page \\\"1\\\"\",\
             \"counts\":{\"glyph.cache_hits\":1,\"glyph.cache_misses\":2}}"
        );
    }

    #[test]
    fn events_escape_values() {
        let buf = SharedBuf::default();
        let logger = DebugLogger::with_writer(buf.clone());
        logger.log_event("content.unknown", &[("operator", "a\tb".to_string())]);
        let text = String::from_utf8(buf.0.lock().expect("buffer").clone()).expect("utf8");
        assert_eq!(text, "{\"type\":\"content.unknown\",\"operator\":\"a\\tb\"}\n");
    }
}
