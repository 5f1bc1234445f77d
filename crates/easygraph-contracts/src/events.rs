use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type EventPayload = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warn,
}

impl EventLevel {
    fn as_str(self) -> &'static str {
        match self {
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
        }
    }
}

/// Append-only structured log at `events.jsonl`.
///
/// Every line carries `type`, `level`, `session_id`, `seq` and `ts`; the
/// caller payload is merged last. Clones share the file lock and sequence.
#[derive(Debug, Clone)]
pub struct EventLog {
    inner: Arc<EventLogInner>,
}

#[derive(Debug)]
struct EventLogInner {
    path: PathBuf,
    session_id: String,
    seq: AtomicU64,
    lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventLogInner {
                path: path.into(),
                session_id: session_id.into(),
                seq: AtomicU64::new(0),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn for_new_session(path: impl Into<PathBuf>) -> Self {
        Self::new(path, Uuid::new_v4().to_string())
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn info(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        self.emit(EventLevel::Info, event_type, payload)
    }

    pub fn warn(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        self.emit(EventLevel::Warn, event_type, payload)
    }

    pub fn emit(
        &self,
        level: EventLevel,
        event_type: &str,
        payload: EventPayload,
    ) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert("level".to_string(), Value::String(level.as_str().to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
        event.insert("seq".to_string(), Value::Number(seq.into()));
        let line = serde_json::to_string(&event)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

/// Reads every parseable line back; malformed lines are skipped.
pub fn read_events(path: &Path) -> anyhow::Result<Vec<Value>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .collect())
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
