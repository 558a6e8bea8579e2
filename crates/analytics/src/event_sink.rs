//! Append-only engagement log backed by ClickHouse.
//! Appends only enqueue; a background writer batches rows into the
//! `advertisement_impressions` and `advertisement_clicks` tables.
//! Call [`ClickHouseEventLog::shutdown`] before the runtime stops, or rows
//! still buffered in the writer are lost.

use adserve_core::config::ClickHouseConfig;
use adserve_core::error::{AdServeError, AdServeResult};
use adserve_core::store::EventLog;
use adserve_core::types::{ClickEvent, ImpressionEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const QUEUE_CAPACITY: usize = 100_000;

#[derive(Debug, Clone)]
enum EngagementRow {
    Impression(ImpressionEvent),
    Click(ClickEvent),
}

#[derive(Debug, Serialize)]
struct ImpressionRow<'a> {
    id: Uuid,
    advertisement_id: Uuid,
    viewer_id: Option<Uuid>,
    placement: &'a str,
    context: String,
    created_at: String,
}

#[derive(Debug, Serialize)]
struct ClickRow<'a> {
    id: Uuid,
    advertisement_id: Uuid,
    impression_id: Option<Uuid>,
    viewer_id: Option<Uuid>,
    placement: &'a str,
    context: String,
    created_at: String,
}

impl EngagementRow {
    fn table(&self) -> &'static str {
        match self {
            EngagementRow::Impression(_) => "advertisement_impressions",
            EngagementRow::Click(_) => "advertisement_clicks",
        }
    }

    fn to_json(&self) -> serde_json::Result<String> {
        match self {
            EngagementRow::Impression(e) => serde_json::to_string(&ImpressionRow {
                id: e.id,
                advertisement_id: e.advertisement_id,
                viewer_id: e.viewer_id,
                placement: e.placement.as_str(),
                context: serde_json::to_string(&e.context)?,
                created_at: clickhouse_timestamp(e.created_at),
            }),
            EngagementRow::Click(e) => serde_json::to_string(&ClickRow {
                id: e.id,
                advertisement_id: e.advertisement_id,
                impression_id: e.impression_id,
                viewer_id: e.viewer_id,
                placement: e.placement.as_str(),
                context: serde_json::to_string(&e.context)?,
                created_at: clickhouse_timestamp(e.created_at),
            }),
        }
    }
}

fn clickhouse_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Event log with a background batch writer.
pub struct ClickHouseEventLog {
    sender: mpsc::Sender<EngagementRow>,
    writer: Mutex<Option<WriterHandle>>,
}

struct WriterHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ClickHouseEventLog {
    /// Verify the schema and spawn the background writer.
    pub async fn new(config: &ClickHouseConfig) -> anyhow::Result<Self> {
        if config.flush_interval_ms == 0 {
            let message = "clickhouse.flush_interval_ms must be > 0".to_string();
            return Err(AdServeError::Config(message).into());
        }
        let sink = ClickHouseSink::connect(config).await?;
        let log = Self::spawn(
            sink,
            config.batch_size.max(1),
            Duration::from_millis(config.flush_interval_ms),
        );
        info!("Engagement event log initialized with ClickHouse backend");
        Ok(log)
    }

    fn spawn<S: BatchSink>(sink: S, batch_size: usize, flush_interval: Duration) -> Self {
        let (sender, receiver) = mpsc::channel::<EngagementRow>(QUEUE_CAPACITY);
        let (shutdown, shutdown_rx) = oneshot::channel();
        let writer = BatchWriter {
            sink,
            batch_size,
            flush_interval,
        };
        let task = tokio::spawn(writer.run(receiver, shutdown_rx));
        Self {
            sender,
            writer: Mutex::new(Some(WriterHandle { shutdown, task })),
        }
    }

    /// Flush everything queued so far and wait for the writer to exit.
    /// Later appends are rejected with a store error. Idempotent.
    pub async fn shutdown(&self) {
        let Some(handle) = self.writer.lock().await.take() else {
            return;
        };
        // The writer treats a dropped signal the same as a sent one.
        let _ = handle.shutdown.send(());
        if let Err(e) = handle.task.await {
            error!(error = %e, "Engagement writer task failed during shutdown");
        }
        info!("Engagement event log drained");
    }

    fn enqueue(&self, row: EngagementRow) -> AdServeResult<()> {
        match self.sender.try_send(row) {
            Ok(()) => {
                metrics::counter!("analytics.queued").increment(1);
                Ok(())
            }
            Err(e) => {
                metrics::counter!("analytics.dropped").increment(1);
                warn!("Engagement event dropped: {}", e);
                Err(AdServeError::store(format!("event queue rejected write: {e}")))
            }
        }
    }
}

#[async_trait]
impl EventLog for ClickHouseEventLog {
    async fn append_impression(&self, event: &ImpressionEvent) -> AdServeResult<Uuid> {
        self.enqueue(EngagementRow::Impression(event.clone()))?;
        Ok(event.id)
    }

    async fn append_click(&self, event: &ClickEvent) -> AdServeResult<Uuid> {
        self.enqueue(EngagementRow::Click(event.clone()))?;
        Ok(event.id)
    }
}

/// Destination for flushed batches.
#[async_trait]
trait BatchSink: Send + Sync + 'static {
    async fn insert(&self, table: &'static str, rows: &[String]) -> anyhow::Result<()>;
}

struct ClickHouseSink {
    client: clickhouse::Client,
}

impl ClickHouseSink {
    async fn connect(config: &ClickHouseConfig) -> anyhow::Result<Self> {
        let client = clickhouse::Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        Self::ensure_schema(&client).await?;

        Ok(Self { client })
    }

    async fn ensure_schema(client: &clickhouse::Client) -> anyhow::Result<()> {
        client
            .query(
                "CREATE TABLE IF NOT EXISTS advertisement_impressions (
                    id UUID,
                    advertisement_id UUID,
                    viewer_id Nullable(UUID),
                    placement LowCardinality(String),
                    context String,
                    created_at DateTime64(3)
                ) ENGINE = MergeTree()
                ORDER BY (advertisement_id, created_at)
                PARTITION BY toYYYYMM(created_at)",
            )
            .execute()
            .await?;

        client
            .query(
                "CREATE TABLE IF NOT EXISTS advertisement_clicks (
                    id UUID,
                    advertisement_id UUID,
                    impression_id Nullable(UUID),
                    viewer_id Nullable(UUID),
                    placement LowCardinality(String),
                    context String,
                    created_at DateTime64(3)
                ) ENGINE = MergeTree()
                ORDER BY (advertisement_id, created_at)
                PARTITION BY toYYYYMM(created_at)",
            )
            .execute()
            .await?;

        info!("ClickHouse engagement schema verified");
        Ok(())
    }
}

#[async_trait]
impl BatchSink for ClickHouseSink {
    async fn insert(&self, table: &'static str, rows: &[String]) -> anyhow::Result<()> {
        let insert_sql = format!("INSERT INTO {table} FORMAT JSONEachRow {}", rows.join("\n"));
        self.client.query(&insert_sql).execute().await?;
        Ok(())
    }
}

/// Background writer that batches rows by size or interval.
struct BatchWriter<S> {
    sink: S,
    batch_size: usize,
    flush_interval: Duration,
}

impl<S: BatchSink> BatchWriter<S> {
    async fn run(
        self,
        mut receiver: mpsc::Receiver<EngagementRow>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut buffer: Vec<EngagementRow> = Vec::with_capacity(self.batch_size);
        let mut interval = tokio::time::interval(self.flush_interval);

        loop {
            tokio::select! {
                received = receiver.recv() => match received {
                    Some(row) => {
                        buffer.push(row);
                        if buffer.len() >= self.batch_size {
                            self.flush(&mut buffer).await;
                        }
                    }
                    None => break,
                },
                _ = interval.tick() => {
                    if !buffer.is_empty() {
                        self.flush(&mut buffer).await;
                    }
                }
                _ = &mut shutdown => {
                    receiver.close();
                    while let Some(row) = receiver.recv().await {
                        buffer.push(row);
                    }
                    break;
                }
            }
        }

        self.flush(&mut buffer).await;
        debug!("Engagement queue closed, writer exiting");
    }

    async fn flush(&self, buffer: &mut Vec<EngagementRow>) {
        for (table, rows) in group_by_table(buffer) {
            let count = rows.len();
            debug!(table, count, "Flushing engagement batch");

            match self.sink.insert(table, &rows).await {
                Ok(()) => {
                    metrics::counter!("analytics.flushed").increment(count as u64);
                }
                Err(e) => {
                    metrics::counter!("analytics.flush_errors").increment(1);
                    error!(error = %e, table, count, "Failed to flush engagement batch");
                }
            }
        }
        buffer.clear();
    }
}

/// Serialize buffered rows as NDJSON, grouped by destination table.
fn group_by_table(buffer: &[EngagementRow]) -> BTreeMap<&'static str, Vec<String>> {
    let mut tables: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
    for row in buffer {
        match row.to_json() {
            Ok(json) => tables.entry(row.table()).or_default().push(json),
            Err(e) => warn!(error = %e, "Skipping unserializable engagement row"),
        }
    }
    tables
}
