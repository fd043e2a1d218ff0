use super::{SpanId, SpanRecord};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Destination for closed spans. Implementations must not panic.
pub trait SpanSink: Send + Sync {
    fn export(&self, span: &SpanRecord);

    fn flush(&self) {}
}

impl<T: SpanSink + ?Sized> SpanSink for Arc<T> {
    fn export(&self, span: &SpanRecord) {
        (**self).export(span)
    }

    fn flush(&self) {
        (**self).flush()
    }
}

pub struct NoopSpanSink;

impl SpanSink for NoopSpanSink {
    fn export(&self, _span: &SpanRecord) {}
}

/// Keeps closed spans in memory, in closing order.
#[derive(Debug, Clone, Default)]
pub struct InMemorySpanSink {
    spans: Arc<Mutex<Vec<SpanRecord>>>,
}

impl InMemorySpanSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SpanRecord>> {
        self.spans.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn spans(&self) -> Vec<SpanRecord> {
        self.lock().clone()
    }

    pub fn roots(&self) -> Vec<SpanRecord> {
        self.lock()
            .iter()
            .filter(|s| s.parent_id.is_none())
            .cloned()
            .collect()
    }

    pub fn children_of(&self, span_id: SpanId) -> Vec<SpanRecord> {
        self.lock()
            .iter()
            .filter(|s| s.parent_id == Some(span_id))
            .cloned()
            .collect()
    }

    pub fn find(&self, name: &str) -> Vec<SpanRecord> {
        self.lock()
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl SpanSink for InMemorySpanSink {
    fn export(&self, span: &SpanRecord) {
        self.lock().push(span.clone());
    }
}

/// Console exporter: writes every closed span as one structured log event.
pub struct LogSpanSink;

impl SpanSink for LogSpanSink {
    fn export(&self, span: &SpanRecord) {
        let attributes = serde_json::to_string(&span.attributes).unwrap_or_default();
        tracing::info!(
            target: "agentrace::spans",
            trace_id = %span.trace_id,
            span_id = span.span_id,
            parent_id = ?span.parent_id,
            status = ?span.status,
            duration_ms = span.duration_ms(),
            attributes = %attributes,
            "span closed: {}",
            span.name
        );
        if let Some(exception) = &span.exception {
            tracing::debug!(target: "agentrace::spans", span_id = span.span_id, "exception: {}", exception);
        }
    }
}
