#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use exttable::error::EtlResult;
use exttable::store::staging::{MemoryStagingStore, StagingStore, UpsertOutcome};
use exttable::types::{
    DataType, ExternalTableDescriptor, FieldMapping, ListenerResource, ObjectState, PendingRow,
    ResourceId, RowId, SourceColumn, TableId, TableRow, TableType, TargetColumn,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Mapping whose target is the last segment of the dotted source path.
pub fn column(path: &str, data_type: DataType) -> FieldMapping {
    let target = path.rsplit('.').next().unwrap_or(path);

    FieldMapping {
        source: SourceColumn {
            name: path.to_owned(),
            data_type,
            length: None,
            is_key: false,
            key_ordinal: 0,
            is_nullable: true,
            suppressed: false,
        },
        target: TargetColumn {
            name: target.to_owned(),
        },
    }
}

pub fn key_column(path: &str, data_type: DataType) -> FieldMapping {
    let mut mapping = column(path, data_type);
    mapping.source.is_key = true;
    mapping.source.key_ordinal = 1;
    mapping
}

pub fn descriptor(
    id: i64,
    name: &str,
    table_type: TableType,
    field_mappings: Vec<FieldMapping>,
) -> ExternalTableDescriptor {
    ExternalTableDescriptor {
        id: TableId::new(id),
        name: name.to_owned(),
        target_table: format!("{name}_target"),
        table_type,
        field_mappings,
        auto_update_source: None,
        auto_update_interval_minutes: None,
        last_fetched_event_id: None,
        last_run_at: None,
        state: ObjectState::active(),
    }
}

/// Table keyed by `id` with a `name` column.
pub fn people(id: i64, table_type: TableType) -> ExternalTableDescriptor {
    descriptor(
        id,
        &format!("people_{id}"),
        table_type,
        vec![key_column("id", DataType::Integer), column("name", DataType::Text)],
    )
}

pub fn listener(id: i64, location: &str) -> ListenerResource {
    ListenerResource {
        id: ResourceId(id),
        name: format!("listener_{id}"),
        resource_location: location.to_owned(),
        state: ObjectState::active(),
    }
}

/// Staging store delaying writes per table, used to control completion order of batches.
#[derive(Debug, Clone, Default)]
pub struct DelayedStagingStore {
    inner: MemoryStagingStore,
    delays: Arc<HashMap<TableId, Duration>>,
}

impl DelayedStagingStore {
    pub fn new(inner: MemoryStagingStore, delays: impl IntoIterator<Item = (i64, u64)>) -> Self {
        let delays = delays
            .into_iter()
            .map(|(id, millis)| (TableId::new(id), Duration::from_millis(millis)))
            .collect();

        Self {
            inner,
            delays: Arc::new(delays),
        }
    }

    async fn pause(&self, table_id: TableId) {
        if let Some(delay) = self.delays.get(&table_id) {
            tokio::time::sleep(*delay).await;
        }
    }
}

impl StagingStore for DelayedStagingStore {
    async fn create_store(&self, table: &ExternalTableDescriptor) -> EtlResult<()> {
        self.inner.create_store(table).await
    }

    async fn store_exists(&self, table_id: TableId) -> EtlResult<bool> {
        self.inner.store_exists(table_id).await
    }

    async fn get_row_count(&self, table: &ExternalTableDescriptor) -> EtlResult<u64> {
        self.inner.get_row_count(table).await
    }

    async fn add_rows(
        &self,
        table: &ExternalTableDescriptor,
        rows: Vec<PendingRow>,
        loaded_at: DateTime<Utc>,
    ) -> EtlResult<Vec<RowId>> {
        self.pause(table.id).await;
        self.inner.add_rows(table, rows, loaded_at).await
    }

    async fn upsert_rows(
        &self,
        table: &ExternalTableDescriptor,
        rows: Vec<PendingRow>,
        loaded_at: DateTime<Utc>,
    ) -> EtlResult<UpsertOutcome> {
        self.pause(table.id).await;
        self.inner.upsert_rows(table, rows, loaded_at).await
    }

    async fn delete_rows(
        &self,
        table: &ExternalTableDescriptor,
        key_rows: Vec<TableRow>,
    ) -> EtlResult<Vec<RowId>> {
        self.pause(table.id).await;
        self.inner.delete_rows(table, key_rows).await
    }

    async fn delete_store(&self, table_id: TableId) -> EtlResult<()> {
        self.inner.delete_store(table_id).await
    }
}

/// Local HTTP endpoint answering each request with the next scripted JSON body.
///
/// The last body is repeated once the script runs out. Request targets are recorded in arrival
/// order. Responses can be held back by a fixed delay to keep a fetch in flight.
#[derive(Debug, Clone)]
pub struct EventServer {
    pub location: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl EventServer {
    pub async fn start(bodies: Vec<String>) -> Self {
        Self::start_with_delay(bodies, Duration::ZERO).await
    }

    pub async fn start_with_delay(bodies: Vec<String>, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        tokio::spawn(async move {
            let mut served = 0;
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };

                let mut request = Vec::new();
                let mut buffer = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buffer).await {
                        Ok(0) | Err(_) => break,
                        Ok(read) => request.extend_from_slice(&buffer[..read]),
                    }
                }
                let head = String::from_utf8_lossy(&request).into_owned();
                let target = head.split_whitespace().nth(1).unwrap_or_default().to_owned();
                recorded.lock().await.push(target);

                let body = bodies
                    .get(served)
                    .or_else(|| bodies.last())
                    .cloned()
                    .unwrap_or_default();
                served += 1;

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            location: format!("http://{address}/API/Listener/9"),
            requests,
        }
    }

    pub async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
