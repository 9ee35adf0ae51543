//! Tracing layer persisting task-scoped events to storage

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use spindle_interfaces::{SqlValue, Storage};
use spindle_storage::schema::{dialect_for, insert_log_statement, logs_table_ddl};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;
use uuid::Uuid;

/// Target of the sink's own diagnostics. The layer never persists it.
pub const SINK_TARGET: &str = "spindle_logging::sink";

/// One persisted log line
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub task_id: Uuid,
    pub state_id: Uuid,
    pub level: String,
    pub message: String,
    /// Remaining event fields
    pub data: Value,
    pub logged_at: DateTime<Utc>,
}

impl LogRecord {
    fn into_args(self) -> Vec<SqlValue> {
        vec![
            SqlValue::Uuid(self.task_id),
            SqlValue::Uuid(self.state_id),
            SqlValue::Text(self.level),
            SqlValue::Text(self.message),
            SqlValue::Text(self.data.to_string()),
            SqlValue::Timestamp(Some(self.logged_at)),
        ]
    }
}

/// Span fields kept in the registry's extensions
#[derive(Default)]
struct SpanFields(HashMap<String, Value>);

/// Forwards INFO and higher events raised inside a task span to a writer
pub struct StorageLogLayer {
    sender: mpsc::UnboundedSender<LogRecord>,
}

impl StorageLogLayer {
    /// Spawn a writer on the current runtime and return the layer feeding it
    pub fn new(storage: Arc<dyn Storage>, retention_days: u32) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_log_writer(storage, receiver, retention_days));
        Self { sender }
    }

    /// Layer sending records to an existing channel
    pub fn with_sender(sender: mpsc::UnboundedSender<LogRecord>) -> Self {
        Self { sender }
    }
}

impl<S> Layer<S> for StorageLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = SpanFields::default();
        attrs.record(&mut FieldVisitor(&mut fields.0));
        span.extensions_mut().insert(fields);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            values.record(&mut FieldVisitor(&mut fields.0));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > Level::INFO || metadata.target().starts_with(SINK_TARGET) {
            return;
        }

        let Some(scope) = ctx.event_scope(event) else {
            return;
        };

        let mut task_id = None;
        let mut state_id = None;
        for span in scope {
            let extensions = span.extensions();
            if let Some(SpanFields(fields)) = extensions.get::<SpanFields>() {
                task_id = task_id.or_else(|| uuid_field(fields, "task_id"));
                state_id = state_id.or_else(|| uuid_field(fields, "state_id"));
            }
            if task_id.is_some() && state_id.is_some() {
                break;
            }
        }
        let (Some(task_id), Some(state_id)) = (task_id, state_id) else {
            return;
        };

        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor(&mut fields));
        let message = match fields.remove("message") {
            Some(Value::String(message)) => message,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        let record = LogRecord {
            task_id,
            state_id,
            level: metadata.level().to_string(),
            message,
            data: Value::Object(fields.into_iter().collect::<Map<String, Value>>()),
            logged_at: Utc::now(),
        };

        // The writer is gone once the runtime shuts down
        let _ = self.sender.send(record);
    }
}

fn uuid_field(fields: &HashMap<String, Value>, name: &str) -> Option<Uuid> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Create the `logs` table when the dialect is known, then insert every record
pub async fn run_log_writer(
    storage: Arc<dyn Storage>,
    mut records: mpsc::UnboundedReceiver<LogRecord>,
    retention_days: u32,
) {
    let dialect = dialect_for(storage.name());
    for statement in logs_table_ddl(dialect, retention_days) {
        if let Err(e) = storage.exec(&statement, &[]).await {
            tracing::debug!(target: SINK_TARGET, "Failed to create logs table: {}", e);
        }
    }

    let insert = insert_log_statement(dialect);
    while let Some(record) = records.recv().await {
        if let Err(e) = storage.exec(insert, &record.into_args()).await {
            tracing::debug!(target: SINK_TARGET, "Failed to persist task log: {}", e);
        }
    }
}

/// Collects tracing fields as JSON values
struct FieldVisitor<'a>(&'a mut HashMap<String, Value>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0
            .insert(field.name().to_string(), Value::String(format!("{:?}", value)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_storage::InMemoryStorage;
    use tracing::{debug, info, info_span, warn};
    use tracing_subscriber::layer::SubscriberExt;

    fn capture(f: impl FnOnce()) -> Vec<LogRecord> {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let subscriber =
            tracing_subscriber::registry().with(StorageLogLayer::with_sender(sender));
        tracing::subscriber::with_default(subscriber, f);

        let mut records = Vec::new();
        while let Ok(record) = receiver.try_recv() {
            records.push(record);
        }
        records
    }

    #[test]
    fn test_captures_events_inside_task_span() {
        let task_id = Uuid::new_v4();
        let state_id = Uuid::new_v4();

        let records = capture(|| {
            let span = info_span!("task", scope = "hello", task_id = %task_id, state_id = %state_id);
            let _guard = span.enter();
            info!(count = 3, "Hello, World!");
            debug!("too verbose");
            warn!(target: SINK_TARGET, "own diagnostics");
        });

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.task_id, task_id);
        assert_eq!(record.state_id, state_id);
        assert_eq!(record.level, "INFO");
        assert_eq!(record.message, "Hello, World!");
        assert_eq!(record.data, serde_json::json!({"count": 3}));
    }

    #[test]
    fn test_ignores_events_outside_task_span() {
        let records = capture(|| {
            info!("engine started");
            let span = info_span!("task", task_id = %Uuid::new_v4());
            let _guard = span.enter();
            info!("missing state id");
        });

        assert!(records.is_empty());
    }

    #[test]
    fn test_nested_spans_inherit_ids() {
        let task_id = Uuid::new_v4();
        let state_id = Uuid::new_v4();

        let records = capture(|| {
            let outer = info_span!("task", task_id = %task_id, state_id = %state_id);
            let _outer = outer.enter();
            let inner = info_span!("step", step = 2);
            let _inner = inner.enter();
            tracing::error!("step failed");
        });

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].task_id, task_id);
        assert_eq!(records[0].level, "ERROR");
    }

    #[tokio::test]
    async fn test_writer_creates_table_and_inserts() {
        let storage = InMemoryStorage::with_name("questdb");
        let (sender, receiver) = mpsc::unbounded_channel();

        sender
            .send(LogRecord {
                task_id: Uuid::new_v4(),
                state_id: Uuid::new_v4(),
                level: "INFO".to_string(),
                message: "hi".to_string(),
                data: serde_json::json!({}),
                logged_at: Utc::now(),
            })
            .unwrap();
        drop(sender);

        run_log_writer(Arc::new(storage.clone()), receiver, 7).await;

        let executed = storage.executed();
        assert_eq!(executed.len(), 2);
        assert!(executed[0].query.contains("CREATE TABLE IF NOT EXISTS logs"));
        assert!(executed[1].query.starts_with("INSERT INTO logs"));
        assert_eq!(executed[1].args[4], SqlValue::Text("{}".to_string()));
    }
}
