/// Single-flight table: at most one computation per key at a time
///
/// The first caller for a key spawns the work onto the runtime and records a
/// shared handle to its result; callers arriving while it runs await the same
/// handle. The work is detached, so it finishes even if every caller goes
/// away, and its entry is removed as soon as it settles.
use crate::error::{ApiError, ApiResult};
use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

type Call<T> = Shared<BoxFuture<'static, ApiResult<T>>>;

pub struct SingleFlight<T: Clone> {
    calls: Arc<DashMap<String, (u64, Call<T>)>>,
    next_id: AtomicU64,
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            calls: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key`, or join the run already in flight
    ///
    /// Returns the result and whether this caller joined an existing run.
    pub async fn run<F>(&self, key: &str, work: F) -> (ApiResult<T>, bool)
    where
        F: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let (call, joined) = match self.calls.entry(key.to_string()) {
            Entry::Occupied(existing) => {
                debug!("Joining in-flight resolution");
                (existing.get().1.clone(), true)
            }
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let call = self.spawn(key.to_string(), id, work);
                slot.insert((id, call.clone()));
                (call, false)
            }
        };

        (call.await, joined)
    }

    /// Number of keys with a run in flight
    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }

    fn spawn<F>(&self, key: String, id: u64, work: F) -> Call<T>
    where
        F: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let calls = Arc::clone(&self.calls);
        let task_calls = Arc::clone(&self.calls);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let result = work.await;
            task_calls.remove_if(&task_key, |_, (entry_id, _)| *entry_id == id);
            result
        });

        async move {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(ApiError::Internal(format!("resolution task failed: {}", e))),
            };
            // Covers a panicked task; a no-op once the task removed itself
            calls.remove_if(&key, |_, (entry_id, _)| *entry_id == id);
            result
        }
        .boxed()
        .shared()
    }
}
