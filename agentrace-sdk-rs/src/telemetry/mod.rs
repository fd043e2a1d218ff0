//! Span production for agent sessions.
//!
//! A [`SpanRecorder`] hands out [`ActiveSpan`] guards. A guard is closed exactly
//! once: explicitly through [`ActiveSpan::end`] / [`ActiveSpan::finish`], or by
//! `Drop` when the operation it wraps was abandoned (panic, dropped future).
//! Closed spans are exported as [`SpanRecord`]s to the configured [`SpanSink`].
//!
//! Nothing in here returns an error or panics on the caller's path: telemetry
//! degrades silently.

pub mod attributes;
pub mod sink;

pub use sink::{InMemorySpanSink, LogSpanSink, NoopSpanSink, SpanSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

pub type SpanId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Ok,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<usize> for AttributeValue {
    fn from(value: usize) -> Self {
        AttributeValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

/// Identity of a span, used to parent new spans under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanContext {
    pub trace_id: Uuid,
    pub span_id: SpanId,
}

/// A closed span, as delivered to sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub trace_id: Uuid,
    pub span_id: SpanId,
    pub parent_id: Option<SpanId>,
    pub name: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub status: SpanStatus,
    pub exception: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl SpanRecord {
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds().max(0)
    }
}

struct OpenSpan {
    trace_id: Uuid,
    parent_id: Option<SpanId>,
    name: String,
    attributes: BTreeMap<String, AttributeValue>,
    status: Option<SpanStatus>,
    exception: Option<String>,
    start_time: DateTime<Utc>,
}

impl OpenSpan {
    fn close(self, span_id: SpanId, default_status: SpanStatus) -> SpanRecord {
        SpanRecord {
            trace_id: self.trace_id,
            span_id,
            parent_id: self.parent_id,
            name: self.name,
            attributes: self.attributes,
            status: self.status.unwrap_or(default_status),
            exception: self.exception,
            start_time: self.start_time,
            end_time: Utc::now(),
        }
    }
}

struct RecorderInner {
    sink: Arc<dyn SpanSink>,
    open: Mutex<HashMap<SpanId, OpenSpan>>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
}

/// Shared handle to the span store. Cloning is cheap; all clones feed the same sink.
#[derive(Clone)]
pub struct SpanRecorder {
    inner: Arc<RecorderInner>,
}

impl SpanRecorder {
    /// Initializes a recorder exporting to `sink`.
    pub fn configure(sink: impl SpanSink + 'static) -> Self {
        Self::with_sink(Arc::new(sink))
    }

    pub fn with_sink(sink: Arc<dyn SpanSink>) -> Self {
        Self {
            inner: Arc::new(RecorderInner {
                sink,
                open: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn noop() -> Self {
        Self::configure(NoopSpanSink)
    }

    /// Opens a span. Without a parent the span starts a new trace.
    pub fn start_span(&self, name: impl Into<String>, parent: Option<&SpanContext>) -> ActiveSpan {
        let span_id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let trace_id = parent.map(|p| p.trace_id).unwrap_or_else(Uuid::new_v4);
        let context = SpanContext { trace_id, span_id };

        // After shutdown the guard stays usable but records nothing.
        if !self.inner.shut_down.load(Ordering::Acquire) {
            let span = OpenSpan {
                trace_id,
                parent_id: parent.map(|p| p.span_id),
                name: name.into(),
                attributes: BTreeMap::new(),
                status: None,
                exception: None,
                start_time: Utc::now(),
            };
            self.lock_open().insert(span_id, span);
        }

        ActiveSpan {
            recorder: self.clone(),
            context,
            closed: false,
        }
    }

    /// Number of spans started but not yet closed.
    pub fn open_span_count(&self) -> usize {
        self.lock_open().len()
    }

    /// Closes every outstanding span with an error status and flushes the sink.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
        let records: Vec<SpanRecord> = {
            let mut open = self.lock_open();
            let mut drained: Vec<(SpanId, OpenSpan)> = open.drain().collect();
            // Deepest spans were opened last; export children before parents.
            drained.sort_by(|a, b| b.0.cmp(&a.0));
            drained
                .into_iter()
                .map(|(id, mut span)| {
                    span.status = Some(SpanStatus::Error);
                    span.exception
                        .get_or_insert_with(|| "recorder shut down".to_string());
                    span.close(id, SpanStatus::Error)
                })
                .collect()
        };
        for record in &records {
            self.inner.sink.export(record);
        }
        self.inner.sink.flush();
    }

    fn lock_open(&self) -> MutexGuard<'_, HashMap<SpanId, OpenSpan>> {
        self.inner.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, span_id: SpanId, f: impl FnOnce(&mut OpenSpan)) {
        if let Some(span) = self.lock_open().get_mut(&span_id) {
            f(span);
        }
    }

    fn close(&self, span_id: SpanId, default_status: SpanStatus) {
        let records = {
            let mut open = self.lock_open();
            if !open.contains_key(&span_id) {
                return;
            }
            let mut records = Vec::new();
            close_descendants(&mut open, span_id, &mut records);
            if let Some(span) = open.remove(&span_id) {
                records.push(span.close(span_id, default_status));
            }
            records
        };
        for record in &records {
            self.inner.sink.export(record);
        }
    }
}

/// Children still open when their parent closes are force-closed first.
fn close_descendants(
    open: &mut HashMap<SpanId, OpenSpan>,
    parent_id: SpanId,
    records: &mut Vec<SpanRecord>,
) {
    let mut children: Vec<SpanId> = open
        .iter()
        .filter(|(_, span)| span.parent_id == Some(parent_id))
        .map(|(id, _)| *id)
        .collect();
    children.sort_unstable();
    for child_id in children {
        close_descendants(open, child_id, records);
        if let Some(mut span) = open.remove(&child_id) {
            span.exception
                .get_or_insert_with(|| "parent span closed".to_string());
            records.push(span.close(child_id, SpanStatus::Cancelled));
        }
    }
}

/// Guard for one open span.
pub struct ActiveSpan {
    recorder: SpanRecorder,
    context: SpanContext,
    closed: bool,
}

impl ActiveSpan {
    pub fn context(&self) -> SpanContext {
        self.context
    }

    /// Last write wins. Ignored once the span is closed.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        let key = key.into();
        let value = value.into();
        self.recorder.update(self.context.span_id, |span| {
            span.attributes.insert(key, value);
        });
    }

    /// Marks the span failed and captures the error with its source chain.
    pub fn record_error(&self, error: &(dyn std::error::Error + 'static)) {
        let mut detail = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            detail.push_str(": caused by: ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        self.recorder.update(self.context.span_id, |span| {
            span.status = Some(SpanStatus::Error);
            span.exception = Some(detail);
        });
    }

    pub fn mark_cancelled(&self) {
        self.recorder.update(self.context.span_id, |span| {
            span.status = Some(SpanStatus::Cancelled);
            span.exception
                .get_or_insert_with(|| "operation cancelled".to_string());
        });
    }

    /// Closes the span; status is `Ok` unless an error or cancellation was recorded.
    pub fn end(mut self) {
        self.closed = true;
        self.recorder.close(self.context.span_id, SpanStatus::Ok);
    }

    /// Closes the span, recording `Err` values first.
    pub fn finish<T, E>(self, result: &Result<T, E>)
    where
        E: std::error::Error + 'static,
    {
        if let Err(err) = result {
            self.record_error(err);
        }
        self.end();
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.recorder
                .close(self.context.span_id, SpanStatus::Cancelled);
        }
    }
}
