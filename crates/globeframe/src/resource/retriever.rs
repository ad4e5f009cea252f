//! A bounded worker pool that retrieves values by key, one request per key.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Receives the outcome of a retrieval. Called from worker threads, except
/// for rejections which are reported on the requesting thread.
pub trait RetrieverCallback<K, V>: Send + Sync {
    fn retrieval_succeeded(&self, key: &K, value: V);

    fn retrieval_failed(&self, key: &K, error: &Error);

    fn retrieval_rejected(&self, key: &K, reason: &str);
}

/// Produces a value for a key. Runs on a worker thread.
pub type FetchFn<K, O, V> = Arc<dyn Fn(&K, &O) -> Result<V> + Send + Sync>;

/// What [`Retriever::retrieve`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStatus {
    /// A worker will retrieve the key.
    Scheduled,
    /// A retrieval for the key is already in flight.
    Coalesced,
    /// The queue is saturated; the callback was told why.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Maximum retrievals queued or running at once.
    pub max_simultaneous: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_simultaneous: 8,
        }
    }
}

struct Job<K, O, V> {
    key: K,
    options: O,
    callback: Arc<dyn RetrieverCallback<K, V>>,
}

/// Retrieves values on background threads, coalescing requests by key.
pub struct Retriever<K, O, V> {
    sender: async_channel::Sender<Job<K, O, V>>,
    pending: Arc<Mutex<HashSet<K>>>,
    max_simultaneous: usize,
    workers: Vec<JoinHandle<()>>,
}

impl<K, O, V> Retriever<K, O, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    O: Send + 'static,
    V: Send + 'static,
{
    #[must_use]
    pub fn new(config: RetrieverConfig, fetch: FetchFn<K, O, V>) -> Self {
        let max_simultaneous = config.max_simultaneous.max(1);
        let (sender, receiver) = async_channel::bounded::<Job<K, O, V>>(max_simultaneous);
        let pending = Arc::new(Mutex::new(HashSet::new()));

        let workers = (0..config.workers.max(1))
            .filter_map(|index| {
                let receiver = receiver.clone();
                let pending = Arc::clone(&pending);
                let fetch = Arc::clone(&fetch);
                std::thread::Builder::new()
                    .name(format!("globeframe-retriever-{index}"))
                    .spawn(move || worker_loop(&receiver, &pending, &fetch))
                    .inspect_err(|e| tracing::error!("Failed to spawn retrieval worker: {e}"))
                    .ok()
            })
            .collect();

        Self {
            sender,
            pending,
            max_simultaneous,
            workers,
        }
    }

    /// Request a value. At most one retrieval per key is in flight.
    pub fn retrieve(
        &self,
        key: K,
        options: O,
        callback: Arc<dyn RetrieverCallback<K, V>>,
    ) -> RetrievalStatus {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.contains(&key) {
            return RetrievalStatus::Coalesced;
        }
        if pending.len() >= self.max_simultaneous {
            drop(pending);
            callback.retrieval_rejected(&key, "too many simultaneous retrievals");
            return RetrievalStatus::Rejected;
        }
        pending.insert(key.clone());
        let job = Job {
            key: key.clone(),
            options,
            callback: Arc::clone(&callback),
        };
        if let Err(e) = self.sender.try_send(job) {
            pending.remove(&key);
            drop(pending);
            let reason = if e.is_closed() {
                "retriever is shut down"
            } else {
                "retrieval queue is full"
            };
            callback.retrieval_rejected(&key, reason);
            return RetrievalStatus::Rejected;
        }
        RetrievalStatus::Scheduled
    }

    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<K, O, V> Drop for Retriever<K, O, V> {
    fn drop(&mut self) {
        self.sender.close();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!("Retrieval worker panicked");
            }
        }
    }
}

fn worker_loop<K, O, V>(
    receiver: &async_channel::Receiver<Job<K, O, V>>,
    pending: &Mutex<HashSet<K>>,
    fetch: &FetchFn<K, O, V>,
) where
    K: Eq + Hash + Debug,
{
    while let Ok(job) = receiver.recv_blocking() {
        match fetch(&job.key, &job.options) {
            Ok(value) => job.callback.retrieval_succeeded(&job.key, value),
            Err(e) => job.callback.retrieval_failed(&job.key, &e),
        }
        // Released after the callback so a concurrent request either sees the
        // stored result or the pending key.
        pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job.key);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        succeeded: Mutex<Vec<(String, usize)>>,
        failed: Mutex<Vec<String>>,
        rejected: Mutex<Vec<String>>,
        done: Mutex<Option<mpsc::Sender<()>>>,
    }

    impl Recorder {
        fn notify(&self) {
            if let Some(done) = self.done.lock().unwrap().as_ref() {
                let _ = done.send(());
            }
        }
    }

    impl RetrieverCallback<String, usize> for Recorder {
        fn retrieval_succeeded(&self, key: &String, value: usize) {
            self.succeeded.lock().unwrap().push((key.clone(), value));
            self.notify();
        }

        fn retrieval_failed(&self, key: &String, _error: &Error) {
            self.failed.lock().unwrap().push(key.clone());
            self.notify();
        }

        fn retrieval_rejected(&self, key: &String, _reason: &str) {
            self.rejected.lock().unwrap().push(key.clone());
        }
    }

    /// A fetch that blocks until released and counts calls.
    fn gated_fetch(
        calls: Arc<AtomicUsize>,
    ) -> (FetchFn<String, (), usize>, async_channel::Sender<()>) {
        let (release_tx, release_rx) = async_channel::unbounded::<()>();
        let fetch: FetchFn<String, (), usize> = Arc::new(move |key: &String, _: &()| {
            calls.fetch_add(1, Ordering::SeqCst);
            let _ = release_rx.recv_blocking();
            if key.starts_with("bad") {
                Err(Error::Retrieval {
                    key: key.clone(),
                    message: "broken".to_string(),
                })
            } else {
                Ok(key.len())
            }
        });
        (fetch, release_tx)
    }

    #[test]
    fn test_duplicate_requests_are_coalesced() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (fetch, release) = gated_fetch(Arc::clone(&calls));
        let retriever = Retriever::new(RetrieverConfig::default(), fetch);
        let (done_tx, done_rx) = mpsc::channel();
        let recorder = Arc::new(Recorder::default());
        *recorder.done.lock().unwrap() = Some(done_tx);

        // Request the same key twice before the first completes.
        let status = retriever.retrieve("tile".to_string(), (), recorder.clone());
        assert_eq!(status, RetrievalStatus::Scheduled);
        let status = retriever.retrieve("tile".to_string(), (), recorder.clone());
        assert_eq!(status, RetrievalStatus::Coalesced);
        assert!(retriever.is_pending(&"tile".to_string()));

        release.send_blocking(()).unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        drop(retriever);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *recorder.succeeded.lock().unwrap(),
            vec![("tile".to_string(), 4)]
        );
        assert!(recorder.rejected.lock().unwrap().is_empty());
    }

    #[test]
    fn test_saturated_queue_rejects() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (fetch, release) = gated_fetch(Arc::clone(&calls));
        let config = RetrieverConfig {
            workers: 1,
            max_simultaneous: 1,
        };
        let retriever = Retriever::new(config, fetch);
        let recorder = Arc::new(Recorder::default());

        assert_eq!(
            retriever.retrieve("a".to_string(), (), recorder.clone()),
            RetrievalStatus::Scheduled
        );
        assert_eq!(
            retriever.retrieve("b".to_string(), (), recorder.clone()),
            RetrievalStatus::Rejected
        );
        assert_eq!(*recorder.rejected.lock().unwrap(), vec!["b".to_string()]);

        release.send_blocking(()).unwrap();
        drop(retriever);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_reaches_callback_and_clears_pending() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (fetch, release) = gated_fetch(Arc::clone(&calls));
        let retriever = Retriever::new(RetrieverConfig::default(), fetch);
        let (done_tx, done_rx) = mpsc::channel();
        let recorder = Arc::new(Recorder::default());
        *recorder.done.lock().unwrap() = Some(done_tx);

        retriever.retrieve("bad-key".to_string(), (), recorder.clone());
        release.send_blocking(()).unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        drop(retriever);

        assert_eq!(*recorder.failed.lock().unwrap(), vec!["bad-key".to_string()]);
    }
}
