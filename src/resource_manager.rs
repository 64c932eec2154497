//! Resource management

use crate::error::DashboardError;

use tokio::sync::{Semaphore, SemaphorePermit};

/// Limits on concurrent Google Sheets API requests, buffered upload bytes and file parsing
/// tasks, each backed by a Tokio Semaphore. A limit that is not configured is not enforced.
#[derive(Debug)]
pub struct ResourceManager {
    /// Concurrent requests to the Google Sheets API.
    sheets_connections: Option<Semaphore>,

    /// Bytes of uploaded file data buffered across all requests.
    memory: Option<Semaphore>,

    /// Capacity of the upload memory pool in bytes.
    total_memory: Option<usize>,

    /// Uploaded files being parsed at once.
    tasks: Option<Semaphore>,
}

/// Upload memory held by one request, grown as file data is read.
///
/// All permits are released when the reservation is dropped.
pub struct MemoryReservation<'a> {
    manager: &'a ResourceManager,
    bytes: usize,
    permit: Option<SemaphorePermit<'a>>,
}

impl MemoryReservation<'_> {
    /// Reserve `bytes` more, waiting for other requests to release memory if necessary.
    ///
    /// Fails without waiting if the request as a whole would exceed the memory pool.
    pub async fn grow(&mut self, bytes: usize) -> Result<(), DashboardError> {
        let requested = self.bytes.saturating_add(bytes);
        self.manager.check_memory(requested)?;
        let more = self.manager.memory(bytes).await?;
        match (self.permit.as_mut(), more) {
            (Some(permit), Some(more)) => permit.merge(more),
            (None, more) => self.permit = more,
            (Some(_), None) => {}
        }
        self.bytes = requested;
        Ok(())
    }

    /// Bytes reserved so far.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl ResourceManager {
    /// Returns a new ResourceManager object.
    pub fn new(
        sheets_connection_limit: Option<usize>,
        memory_limit: Option<usize>,
        task_limit: Option<usize>,
    ) -> Self {
        Self {
            sheets_connections: sheets_connection_limit.map(Semaphore::new),
            memory: memory_limit.map(Semaphore::new),
            total_memory: memory_limit,
            tasks: task_limit.map(Semaphore::new),
        }
    }

    /// Acquire a slot for one Google Sheets API request.
    pub async fn sheets_connection(&self) -> Result<Option<SemaphorePermit>, DashboardError> {
        optional_acquire(&self.sheets_connections, 1).await
    }

    /// Acquire upload memory for `bytes` of file data.
    pub async fn memory(&self, bytes: usize) -> Result<Option<SemaphorePermit>, DashboardError> {
        self.check_memory(bytes)?;
        optional_acquire(&self.memory, bytes).await
    }

    /// Start an empty upload memory reservation.
    pub fn memory_reservation(&self) -> MemoryReservation<'_> {
        MemoryReservation {
            manager: self,
            bytes: 0,
            permit: None,
        }
    }

    /// Acquire a slot for parsing one uploaded file.
    pub async fn task(&self) -> Result<Option<SemaphorePermit>, DashboardError> {
        optional_acquire(&self.tasks, 1).await
    }

    /// Fail if `bytes` could never be granted by the memory pool.
    fn check_memory(&self, bytes: usize) -> Result<(), DashboardError> {
        match self.total_memory {
            Some(total) if bytes > total => Err(DashboardError::InsufficientMemory {
                requested: bytes,
                total,
            }),
            _ => Ok(()),
        }
    }
}

/// Acquire permits on an optional Semaphore, if present.
async fn optional_acquire(
    sem: &Option<Semaphore>,
    n: usize,
) -> Result<Option<SemaphorePermit>, DashboardError> {
    if let Some(sem) = sem {
        sem.acquire_many(n.try_into()?)
            .await
            .map(Some)
            .map_err(|err| err.into())
    } else {
        Ok(None)
    }
}
