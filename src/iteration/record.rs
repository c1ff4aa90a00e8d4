use crate::cursor::CursorValue;
use crate::error::{IterationError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Iteration progress persisted with the job between attempts.
///
/// `cursor_position` holds the plain JSON form readable by older consumers.
/// `serialized_cursor_position` holds the tagged [`CursorValue`] form, which
/// keeps the distinction between integers and floats; it is preferred on
/// resume when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationState {
    #[serde(default)]
    pub cursor_position: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialized_cursor_position: Option<serde_json::Value>,
    #[serde(default)]
    pub times_interrupted: u32,
    /// Seconds of in-process execution across all attempts.
    #[serde(default)]
    pub total_time: f64,
}

impl IterationState {
    /// Cursor to resume from; `None` before the first checkpoint.
    pub fn cursor(&self) -> Result<Option<CursorValue>> {
        let cursor = match (&self.serialized_cursor_position, &self.cursor_position) {
            (Some(serialized), _) => serde_json::from_value::<CursorValue>(serialized.clone())?,
            (None, Some(raw)) => CursorValue::from(raw.clone()),
            (None, None) => return Ok(None),
        };
        Ok((!cursor.is_null()).then_some(cursor))
    }

    /// Store a checkpoint. `raw` is the JSON form written to `cursor_position`.
    pub fn store_cursor(&mut self, raw: serde_json::Value, cursor: &CursorValue) -> Result<()> {
        let canonical = serde_json::to_value(cursor)?;
        self.cursor_position = Some(raw);
        self.serialized_cursor_position = Some(canonical);
        Ok(())
    }

    /// Add `elapsed` to the running total, rounded to microseconds.
    pub fn add_elapsed(&mut self, elapsed: Duration) {
        let total = self.total_time + elapsed.as_secs_f64();
        self.total_time = (total * 1_000_000.0).round() / 1_000_000.0;
    }
}

/// The persisted representation of an iteration job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_class: String,
    pub job_id: Uuid,
    #[serde(default)]
    pub arguments: serde_json::Value,
    /// Attempts counted by the host; interruptions give theirs back.
    #[serde(default)]
    pub executions: u32,
    /// Interruption adapter to consult. Falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_adapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_interrupted_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub iteration: IterationState,
}

impl JobRecord {
    pub fn new(job_class: &str, arguments: serde_json::Value) -> Self {
        Self {
            job_class: job_class.to_string(),
            job_id: Uuid::new_v4(),
            arguments,
            executions: 0,
            queue_adapter: None,
            last_interrupted_at: None,
            iteration: IterationState::default(),
        }
    }

    pub fn with_queue_adapter(mut self, adapter: &str) -> Self {
        self.queue_adapter = Some(adapter.to_string());
        self
    }

    pub fn arguments<A: DeserializeOwned>(&self) -> Result<A> {
        serde_json::from_value(self.arguments.clone()).map_err(|e| {
            IterationError::Serialization(format!(
                "invalid arguments for {}: {e}",
                self.job_class
            ))
        })
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_older_records_deserialize_with_defaults() {
        let record = JobRecord::from_json(json!({
            "job_class": "ImportJob",
            "job_id": "9b2c6d7e-7a51-4f0e-9d0c-1f1e5e0d3a11",
            "arguments": {"shop_id": 3},
            "cursor_position": [1, 2]
        }))
        .unwrap();

        assert_eq!(record.iteration.times_interrupted, 0);
        assert_eq!(record.iteration.total_time, 0.0);
        assert_eq!(
            record.iteration.cursor().unwrap(),
            Some(CursorValue::Array(vec![1.into(), 2.into()]))
        );
    }

    #[test]
    fn test_serialized_cursor_is_preferred() {
        let mut state = IterationState::default();
        state
            .store_cursor(json!(3.0), &CursorValue::Float(3.0))
            .unwrap();
        assert_eq!(state.cursor().unwrap(), Some(CursorValue::Float(3.0)));

        state.serialized_cursor_position = None;
        // The plain form alone cannot tell 3.0 from 3.
        assert!(state.cursor().unwrap().is_some());
    }

    #[test]
    fn test_total_time_is_rounded_to_microseconds() {
        let mut state = IterationState::default();
        state.add_elapsed(Duration::from_nanos(1_234_567_891));
        state.add_elapsed(Duration::from_nanos(100));
        assert_eq!(state.total_time, 1.234568);
    }

    #[test]
    fn test_record_round_trips_through_json() {
        let mut record = JobRecord::new("ImportJob", json!({"shop_id": 1})).with_queue_adapter("test");
        record.iteration.times_interrupted = 2;
        let value = record.to_json().unwrap();
        assert_eq!(value["times_interrupted"], json!(2));
        assert_eq!(JobRecord::from_json(value).unwrap(), record);
    }
}
