use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::gallery::{CacheUpdate, GeneratedImage, PersistOutcome};
use crate::generation::GenerationRequest;

pub type EventPayload = Map<String, Value>;

/// Append-only `events.jsonl` journal of generation and gallery activity.
///
/// Each line is one compact JSON object carrying `type`, `session_id` and
/// `ts`, followed by the caller payload (which may override those keys).
#[derive(Debug, Clone)]
pub struct ActivityJournal {
    inner: Arc<JournalInner>,
}

#[derive(Debug)]
struct JournalInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl ActivityJournal {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(JournalInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
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

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("activity journal lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }

    pub fn generation_started(&self, request: &GenerationRequest) -> anyhow::Result<Value> {
        self.emit(
            "generation_started",
            payload(json!({
                "mode": request.mode().label(),
                "prompt": request.display_prompt(),
                "prompt_count": request.submitted_prompts().len(),
                "has_init_image": request.init_image().is_some(),
            })),
        )
    }

    pub fn generation_finished(
        &self,
        image: &GeneratedImage,
        seed: u64,
        finish_reason: &str,
    ) -> anyhow::Result<Value> {
        self.emit(
            "generation_finished",
            payload(json!({
                "image_id": image.id,
                "mode": image.settings.mode.label(),
                "seed": seed,
                "finish_reason": finish_reason,
            })),
        )
    }

    pub fn generation_failed(
        &self,
        request: &GenerationRequest,
        message: &str,
    ) -> anyhow::Result<Value> {
        self.emit(
            "generation_failed",
            payload(json!({
                "mode": request.mode().label(),
                "error": message,
            })),
        )
    }

    pub fn image_cached(&self, image_id: &str, update: &CacheUpdate) -> anyhow::Result<Value> {
        let evicted: Vec<&str> = update.evicted.iter().map(|row| row.id.as_str()).collect();
        self.emit(
            "image_cached",
            payload(json!({
                "image_id": image_id,
                "evicted": evicted,
                "persisted": update.persisted == PersistOutcome::Written,
            })),
        )
    }

    pub fn image_removed(&self, image_id: &str, removed: bool) -> anyhow::Result<Value> {
        self.emit(
            "image_removed",
            payload(json!({"image_id": image_id, "removed": removed})),
        )
    }

    pub fn gallery_cleared(&self) -> anyhow::Result<Value> {
        self.emit("gallery_cleared", EventPayload::new())
    }
}

fn payload(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_default()
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;
    use crate::generation::{GenerationSettings, WeightedPrompt};

    fn read_lines(path: &Path) -> anyhow::Result<Vec<Value>> {
        let content = fs::read_to_string(path)?;
        content
            .lines()
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let journal = ActivityJournal::new(&path, "session-123");

        let mut extra = EventPayload::new();
        extra.insert("image_id".to_string(), Value::String("abc".to_string()));
        let emitted = journal.emit("image_removed", extra)?;

        let lines = read_lines(&path)?;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], emitted);
        assert_eq!(lines[0]["type"], Value::String("image_removed".to_string()));
        assert_eq!(lines[0]["session_id"], Value::String("session-123".to_string()));
        assert_eq!(lines[0]["image_id"], Value::String("abc".to_string()));

        let ts = lines[0]["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn payload_can_override_default_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let journal = ActivityJournal::new(temp.path().join("events.jsonl"), "session-123");

        let mut extra = EventPayload::new();
        extra.insert("type".to_string(), Value::String("override".to_string()));
        let emitted = journal.emit("gallery_cleared", extra)?;
        assert_eq!(emitted["type"], Value::String("override".to_string()));
        Ok(())
    }

    #[test]
    fn generation_events_describe_the_request() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let journal = ActivityJournal::new(&path, "s");
        let request = GenerationRequest::text_to_image(
            vec![WeightedPrompt::new("cat", 1.0), WeightedPrompt::new("", 1.0)],
            GenerationSettings::default(),
        );

        journal.generation_started(&request)?;
        journal.generation_failed(&request, "bad request")?;
        journal.gallery_cleared()?;

        let lines = read_lines(&path)?;
        let types: Vec<&str> = lines
            .iter()
            .filter_map(|row| row["type"].as_str())
            .collect();
        assert_eq!(
            types,
            vec!["generation_started", "generation_failed", "gallery_cleared"]
        );
        assert_eq!(lines[0]["prompt_count"], Value::from(1));
        assert_eq!(lines[0]["has_init_image"], Value::Bool(false));
        assert_eq!(lines[1]["error"], Value::from("bad request"));
        Ok(())
    }

    #[test]
    fn image_cached_lists_evicted_ids() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let journal = ActivityJournal::new(temp.path().join("events.jsonl"), "s");
        let evicted = GeneratedImage::new(
            "data:image/png;base64,AA",
            "old",
            GenerationSettings::default(),
        );
        let update = CacheUpdate {
            evicted: vec![evicted.clone()],
            persisted: PersistOutcome::Discarded,
        };
        let event = journal.image_cached("new", &update)?;
        assert_eq!(event["evicted"], json!([evicted.id]));
        assert_eq!(event["persisted"], Value::Bool(false));
        Ok(())
    }
}
