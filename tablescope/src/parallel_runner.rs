use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use crate::metadata::{MetadataAccess, MetadataConnector};
use crate::{Result, TablescopeError};

type ConnectionPool = Arc<Mutex<Vec<Arc<dyn MetadataAccess>>>>;

/// How a batch of jobs ended.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub(crate) enum Completion {
    Finished,
    Cancelled,
}

/// Runs metadata jobs on a fixed set of connections, one job per connection at a time.
///
/// Results are handed back to the caller's task, so only the caller ever mutates the graph.
#[derive(Clone)]
pub(crate) struct ParallelRunner {
    permits: Arc<Semaphore>,
    connections: ConnectionPool,
}

struct Lease {
    connection: Option<Arc<dyn MetadataAccess>>,
    pool: ConnectionPool,
}

impl Lease {
    fn take(pool: &ConnectionPool) -> Result<Self> {
        let connection = pool
            .lock()
            .map_err(|_| TablescopeError::WorkerPoolClosed)?
            .pop()
            .ok_or(TablescopeError::WorkerPoolClosed)?;

        Ok(Self {
            connection: Some(connection),
            pool: pool.clone(),
        })
    }

    fn connection(&self) -> Option<Arc<dyn MetadataAccess>> {
        self.connection.clone()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Ok(mut pool) = self.pool.lock() {
                pool.push(connection);
            }
        }
    }
}

impl ParallelRunner {
    /// A runner that reuses one existing connection.
    pub fn single(connection: Arc<dyn MetadataAccess>) -> Self {
        Self::from_connections(vec![connection])
    }

    /// Opens `max_parallelism` independent connections.
    #[instrument(skip_all)]
    pub async fn connect(connector: &dyn MetadataConnector, max_parallelism: NonZeroUsize) -> Result<Self> {
        let mut connections = Vec::with_capacity(max_parallelism.get());
        for _ in 0..max_parallelism.get() {
            connections.push(connector.connect().await?);
        }

        debug!("Opened {} metadata connections", connections.len());

        Ok(Self::from_connections(connections))
    }

    fn from_connections(connections: Vec<Arc<dyn MetadataAccess>>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(connections.len())),
            connections: Arc::new(Mutex::new(connections)),
        }
    }

    pub fn parallelism(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs `work` for every job and passes each result to `apply` as it arrives.
    ///
    /// The first error from either side stops the batch and aborts outstanding jobs. Once
    /// `cancellation` fires no new job starts, and the batch ends as soon as running jobs are done.
    pub async fn run<J, T, F, Fut>(
        &self,
        jobs: Vec<J>,
        cancellation: &CancellationToken,
        work: F,
        mut apply: impl FnMut(T) -> Result,
    ) -> Result<Completion>
    where
        J: Send + 'static,
        T: Send + 'static,
        F: Fn(Arc<dyn MetadataAccess>, J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let work = Arc::new(work);
        let mut workers = JoinSet::new();

        for job in jobs {
            let permits = self.permits.clone();
            let pool = self.connections.clone();
            let work = work.clone();
            let cancellation = cancellation.clone();

            workers.spawn(async move {
                let _permit = permits.acquire_owned().await.map_err(|_| TablescopeError::WorkerPoolClosed)?;
                if cancellation.is_cancelled() {
                    return Ok(None);
                }

                let lease = Lease::take(&pool)?;
                let connection = lease.connection().ok_or(TablescopeError::WorkerPoolClosed)?;
                let result = work(connection, job).await?;
                Ok(Some(result))
            });
        }

        // Jobs that already hold a connection finish and are applied, the rest skip themselves.
        while let Some(joined) = workers.join_next().await {
            let result: Result<Option<T>> = joined?;
            if let Some(value) = result? {
                apply(value)?;
            }
        }

        if cancellation.is_cancelled() {
            Ok(Completion::Cancelled)
        } else {
            Ok(Completion::Finished)
        }
    }
}
