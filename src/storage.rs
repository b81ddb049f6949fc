// Storage module - delivers charts and metrics to the reporting pipeline
//
// This module is responsible for:
// 1. Defining the sink interface the scheduler publishes through
// 2. Writing JSON lines (stdout by default) for pipe-based consumers
// 3. Inserting metric documents into MongoDB for the database-backed setup

use async_trait::async_trait;
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::{Client, Collection};
use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::collector::{Chart, Metrics};

/// Errors that can occur while publishing to a sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("MongoDB operation failed: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("failed to encode BSON: {0}")]
    Bson(#[from] bson::ser::Error),

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

/// Consumer of the collector's output.
///
/// `publish_charts` is called once before the first cycle, `publish_metrics`
/// once per non-empty metrics map.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Human-readable sink name, for logging.
    fn name(&self) -> &str;

    async fn publish_charts(&self, node_id: &str, charts: &[Chart]) -> Result<(), SinkError>;

    async fn publish_metrics(
        &self,
        node_id: &str,
        timestamp: DateTime<Utc>,
        metrics: &Metrics,
    ) -> Result<(), SinkError>;
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record<'a> {
    Charts {
        node: &'a str,
        charts: &'a [Chart],
    },
    Metrics {
        node: &'a str,
        timestamp: DateTime<Utc>,
        metrics: &'a Metrics,
    },
}

/// Writes one JSON object per line.
///
/// # Output
/// ```json
/// {"type":"charts","node":"ldap-1","charts":[...]}
/// {"type":"metrics","node":"ldap-1","timestamp":"2024-01-15T10:30:00Z","metrics":{"bytes_sent":1024,...}}
/// ```
pub struct JsonLinesSink<W: Write + Send + 'static> {
    writer: Mutex<W>,
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        JsonLinesSink::new(std::io::stdout())
    }
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink {
            writer: Mutex::new(writer),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_record(&self, record: &Record<'_>) -> Result<(), SinkError> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl<W: Write + Send + 'static> MetricSink for JsonLinesSink<W> {
    fn name(&self) -> &str {
        "json-lines"
    }

    async fn publish_charts(&self, node_id: &str, charts: &[Chart]) -> Result<(), SinkError> {
        self.write_record(&Record::Charts {
            node: node_id,
            charts,
        })
    }

    async fn publish_metrics(
        &self,
        node_id: &str,
        timestamp: DateTime<Utc>,
        metrics: &Metrics,
    ) -> Result<(), SinkError> {
        self.write_record(&Record::Metrics {
            node: node_id,
            timestamp,
            metrics,
        })
    }
}

/// MongoDB sink
///
/// Each metrics map becomes one document in `collection`; the chart set is
/// written once to `<collection>_charts`.
///
/// # Document Structure
/// ```json
/// {
///   "node": "ldap-1",
///   "timestamp": "2024-01-15T10:30:00Z",
///   "metrics": { "bytes_sent": 1024, "current_connections": 3, ... }
/// }
/// ```
pub struct MongoSink {
    client: Client,
    database_name: String,
    collection_name: String,
}

impl MongoSink {
    /// Connects to MongoDB and verifies the connection.
    ///
    /// # Arguments
    /// * `connection_string` - MongoDB connection URI (e.g., "mongodb://localhost:27017")
    /// * `database_name` - Database holding the metric collections
    /// * `collection_name` - Collection receiving metric documents
    pub async fn connect(
        connection_string: &str,
        database_name: &str,
        collection_name: &str,
    ) -> Result<Self, SinkError> {
        let client = Client::with_uri_str(connection_string).await?;

        // Verify connection by listing databases (lightweight operation)
        if let Err(e) = client.list_database_names(None, None).await {
            warn!("MongoDB connection verification failed: {}", e);
            return Err(SinkError::Mongo(e));
        }
        info!("Successfully connected to MongoDB");

        Ok(MongoSink {
            client,
            database_name: database_name.to_string(),
            collection_name: collection_name.to_string(),
        })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.client.database(&self.database_name).collection(name)
    }

    fn charts_collection_name(&self) -> String {
        format!("{}_charts", self.collection_name)
    }

    /// Creates a compound index on `node` + `timestamp` for time-series
    /// queries. Optional; slightly slows down inserts.
    pub async fn create_indexes(&self) -> Result<(), SinkError> {
        use mongodb::options::IndexOptions;
        use mongodb::IndexModel;

        info!("Creating indexes for collection '{}'", self.collection_name);

        let index = IndexModel::builder()
            .keys(doc! {
                "node": 1,
                "timestamp": -1
            })
            .options(IndexOptions::builder().name("node_timestamp_idx".to_string()).build())
            .build();

        self.collection(&self.collection_name)
            .create_index(index, None)
            .await
            .map_err(|e| {
                error!(
                    "Failed to create indexes for collection '{}': {}",
                    self.collection_name, e
                );
                SinkError::Mongo(e)
            })?;

        Ok(())
    }
}

/// Builds the document stored for one metrics map.
pub fn metrics_document(node_id: &str, timestamp: DateTime<Utc>, metrics: &Metrics) -> Document {
    let mut values = Document::new();
    for (name, value) in metrics {
        values.insert(name.clone(), *value);
    }

    doc! {
        "node": node_id,
        "timestamp": timestamp,
        "metrics": values,
    }
}

#[async_trait]
impl MetricSink for MongoSink {
    fn name(&self) -> &str {
        "mongodb"
    }

    async fn publish_charts(&self, node_id: &str, charts: &[Chart]) -> Result<(), SinkError> {
        let document = doc! {
            "node": node_id,
            "timestamp": Utc::now(),
            "charts": bson::to_bson(charts)?,
        };

        let name = self.charts_collection_name();
        self.collection(&name).insert_one(document, None).await?;
        debug!("Stored {} chart(s) in collection '{}'", charts.len(), name);
        Ok(())
    }

    async fn publish_metrics(
        &self,
        node_id: &str,
        timestamp: DateTime<Utc>,
        metrics: &Metrics,
    ) -> Result<(), SinkError> {
        let document = metrics_document(node_id, timestamp, metrics);

        let result = self
            .collection(&self.collection_name)
            .insert_one(document, None)
            .await?;

        debug!(
            "Stored metrics with id: {:?} in collection '{}'",
            result.inserted_id, self.collection_name
        );
        Ok(())
    }
}
