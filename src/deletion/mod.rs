//! Asynchronous batch deletion of short URLs
//!
//! Deletion requests are queued on a bounded channel and handled by a fixed pool of workers,
//! the request that submitted them does not wait for the result. Jobs are best-effort: a
//! failing job is logged and dropped, nothing is retried.

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinSet;

use crate::storage::Storage;

use worker::Worker;

mod worker;

/// Default number of workers
pub const DEFAULT_WORKERS: usize = 10;

/// Default capacity of the job queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default number of tokens handed to storage at once
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Deletion errors
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The pool can not be started with this configuration
    InvalidConfig(&'static str),

    /// A job needs an owner
    MissingOwner,

    /// A job needs at least one token
    EmptyBatch,

    /// The queue is at capacity, try again later
    QueueFull,

    /// The pool is shutting down and takes no new jobs
    ShuttingDown,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidConfig(reason) => write!(f, "Invalid deletion config: {reason}"),
            Error::MissingOwner => write!(f, "Deletion job has no owner"),
            Error::EmptyBatch => write!(f, "Deletion job has no tokens"),
            Error::QueueFull => write!(f, "Deletion queue is full"),
            Error::ShuttingDown => write!(f, "Deletion queue is shutting down"),
        }
    }
}

/// Deletion pool configuration
///
/// Fixed for the lifetime of the pool
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Number of workers
    pub workers: usize,

    /// Number of jobs that can wait in the queue
    pub queue_capacity: usize,

    /// Maximum number of tokens per storage call
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Config {
    fn validate(&self) -> Result<(), Error> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig("at least one worker is needed"));
        }

        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig("queue capacity can not be zero"));
        }

        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk size can not be zero"));
        }

        Ok(())
    }
}

/// A single deletion request: tokens of one user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeletionJob {
    /// The user owning the tokens
    pub user_id: String,

    /// Tokens to delete, in request order
    pub tokens: Vec<String>,
}

/// Owns the deletion queue and its workers
///
/// Cheap to clone, all clones share the same queue
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    /// Producing side of the queue, taken by shutdown to close it
    sender: std::sync::Mutex<Option<mpsc::Sender<DeletionJob>>>,

    /// Running workers, emptied by shutdown
    workers: Mutex<JoinSet<()>>,
}

impl Dispatcher {
    /// Start the workers
    ///
    /// Must be called from within a Tokio runtime
    ///
    /// # Errors
    ///
    /// Will return `Err` when the configuration has no workers or no queue capacity
    pub fn start<S: Storage>(storage: S, config: &Config) -> Result<Self, Error> {
        config.validate()?;

        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = JoinSet::new();
        for id in 0..config.workers {
            let worker = Worker::new(
                id,
                storage.clone(),
                receiver.clone(),
                config.chunk_size,
            );

            workers.spawn(worker.run());
        }

        tracing::info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Deletion workers started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                sender: std::sync::Mutex::new(Some(sender)),
                workers: Mutex::new(workers),
            }),
        })
    }

    /// Queue tokens of a user for deletion
    ///
    /// Never waits: either the job is queued right away, or it is refused
    ///
    /// # Errors
    ///
    /// Will return `Err` when the job is empty, the queue is full or the pool is shutting down
    pub fn submit(&self, user_id: &str, tokens: Vec<String>) -> Result<(), Error> {
        if user_id.is_empty() {
            return Err(Error::MissingOwner);
        }

        if tokens.is_empty() {
            return Err(Error::EmptyBatch);
        }

        let job = DeletionJob {
            user_id: user_id.to_string(),
            tokens,
        };

        // held while sending, shutdown can not close the queue in between
        let sender = self.inner.sender.lock().map_err(|_| Error::ShuttingDown)?;
        let Some(sender) = sender.as_ref() else {
            return Err(Error::ShuttingDown);
        };

        sender.try_send(job).map_err(|err| match err {
            TrySendError::Full(_) => Error::QueueFull,
            TrySendError::Closed(_) => Error::ShuttingDown,
        })
    }

    /// Stop taking jobs and wait for the workers to finish
    ///
    /// Closes the queue, every job accepted before that is still handed to a worker. Workers
    /// still running after `timeout` are aborted. No worker runs anymore once this returns.
    pub async fn shutdown(&self, timeout: Duration) {
        let sender = match self.inner.sender.lock() {
            Ok(mut sender) => sender.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let mut workers = self.inner.workers.lock().await;
        if workers.is_empty() {
            return;
        }

        tracing::info!("Waiting for deletion workers to finish");

        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = workers.join_next().await {
                if let Err(err) = result {
                    tracing::error!("Deletion worker failed: {err}");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = workers.len(),
                "Deletion workers did not finish in {timeout:?}, aborting"
            );

            workers.shutdown().await;
        }

        tracing::info!("Deletion workers stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    use crate::storage;
    use crate::storage::CreateUrlValues;
    use crate::storage::Memory;
    use crate::tests::helper::GatedMemory;
    use crate::urls::ShortUrl;

    use super::*;

    const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

    /// Memory storage that fails every batch containing the `broken` token
    #[derive(Clone)]
    struct FlakyMemory {
        memory: Memory,
        calls: Arc<AtomicUsize>,
    }

    impl Storage for FlakyMemory {
        async fn find_single_url_by_token(&self, token: &str) -> storage::Result<Option<ShortUrl>> {
            self.memory.find_single_url_by_token(token).await
        }

        async fn find_all_urls_by_user(&self, user_id: &str) -> storage::Result<Vec<ShortUrl>> {
            self.memory.find_all_urls_by_user(user_id).await
        }

        async fn create_url(&self, values: &CreateUrlValues<'_>) -> storage::Result<ShortUrl> {
            self.memory.create_url(values).await
        }

        async fn mark_deleted_batch(&self, tokens: &[String], user_id: &str) -> storage::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if tokens.iter().any(|token| token == "broken") {
                return Err(storage::Error::Connection("connection reset".to_string()));
            }

            self.memory.mark_deleted_batch(tokens, user_id).await
        }

        async fn ping(&self) -> storage::Result<()> {
            Ok(())
        }
    }

    async fn create<S: Storage>(storage: &S, token: &str, user_id: &str) {
        storage
            .create_url(&CreateUrlValues {
                token,
                original_url: "https://www.example.com/",
                user_id,
            })
            .await
            .unwrap();
    }

    async fn is_deleted<S: Storage>(storage: &S, token: &str) -> bool {
        storage
            .find_single_url_by_token(token)
            .await
            .unwrap()
            .unwrap()
            .is_deleted()
    }

    fn tokens(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(ToString::to_string).collect()
    }

    fn config(workers: usize, queue_capacity: usize, chunk_size: usize) -> Config {
        Config {
            workers,
            queue_capacity,
            chunk_size,
        }
    }

    #[tokio::test]
    async fn test_deletes_owned_tokens() {
        let memory = Memory::new();
        create(&memory, "abc", "u1").await;
        create(&memory, "def", "u1").await;

        let dispatcher = Dispatcher::start(memory.clone(), &Config::default()).unwrap();

        dispatcher.submit("u1", tokens(&["abc", "def"])).unwrap();
        dispatcher.shutdown(DRAIN_TIMEOUT).await;

        assert!(is_deleted(&memory, "abc").await);
        assert!(is_deleted(&memory, "def").await);
    }

    #[tokio::test]
    async fn test_skips_tokens_of_other_users() {
        let memory = Memory::new();
        create(&memory, "zzz", "u2").await;

        let dispatcher = Dispatcher::start(memory.clone(), &Config::default()).unwrap();

        dispatcher.submit("u1", tokens(&["zzz"])).unwrap();
        dispatcher.shutdown(DRAIN_TIMEOUT).await;

        assert!(!is_deleted(&memory, "zzz").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_disjoint_jobs_are_all_applied() {
        let memory = Memory::new();

        let mut jobs = Vec::new();
        for job in 0..50 {
            let user_id = format!("user-{}", job % 3);

            let mut job_tokens = Vec::new();
            for token in 0..7 {
                let token = format!("token-{job}-{token}");
                create(&memory, &token, &user_id).await;
                job_tokens.push(token);
            }

            jobs.push((user_id, job_tokens));
        }

        let dispatcher = Dispatcher::start(memory.clone(), &config(4, 64, 3)).unwrap();

        for (user_id, job_tokens) in &jobs {
            dispatcher.submit(user_id, job_tokens.clone()).unwrap();
        }

        dispatcher.shutdown(DRAIN_TIMEOUT).await;

        for (_, job_tokens) in &jobs {
            for token in job_tokens {
                assert!(is_deleted(&memory, token).await, "{token} is not deleted");
            }
        }
    }

    #[tokio::test]
    async fn test_overlapping_jobs_converge() {
        let memory = Memory::new();
        create(&memory, "abc", "u1").await;
        create(&memory, "def", "u1").await;

        let dispatcher = Dispatcher::start(memory.clone(), &config(3, 10, 1)).unwrap();

        for _ in 0..5 {
            dispatcher.submit("u1", tokens(&["abc", "def", "abc"])).unwrap();
        }

        dispatcher.shutdown(DRAIN_TIMEOUT).await;

        assert!(is_deleted(&memory, "abc").await);
        assert!(is_deleted(&memory, "def").await);
    }

    #[tokio::test]
    async fn test_full_queue_is_refused_right_away() {
        let storage = GatedMemory::new();
        create(&storage, "abc", "u1").await;

        let dispatcher = Dispatcher::start(storage.clone(), &config(1, 2, 100)).unwrap();

        // the only worker picks up the first job and blocks on it
        dispatcher.submit("u1", tokens(&["abc"])).unwrap();
        storage.wait_for_blocked(1).await;

        // fill the queue
        dispatcher.submit("u1", tokens(&["abc"])).unwrap();
        dispatcher.submit("u1", tokens(&["abc"])).unwrap();

        let started = Instant::now();
        let result = dispatcher.submit("u1", tokens(&["abc"]));
        assert_eq!(Err(Error::QueueFull), result);
        assert!(started.elapsed() < Duration::from_millis(100));

        storage.open();
        dispatcher.shutdown(DRAIN_TIMEOUT).await;

        assert!(is_deleted(&storage, "abc").await);
    }

    #[tokio::test]
    async fn test_failing_chunk_does_not_stop_the_job() {
        let storage = FlakyMemory {
            memory: Memory::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        create(&storage, "abc", "u1").await;
        create(&storage, "def", "u1").await;

        let dispatcher = Dispatcher::start(storage.clone(), &config(1, 10, 1)).unwrap();

        dispatcher
            .submit("u1", tokens(&["abc", "broken", "def"]))
            .unwrap();
        dispatcher.submit("u1", tokens(&["broken"])).unwrap();
        dispatcher.shutdown(DRAIN_TIMEOUT).await;

        assert!(is_deleted(&storage, "abc").await);
        assert!(is_deleted(&storage, "def").await);

        // no retries
        assert_eq!(4, storage.calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_jobs() {
        let memory = Memory::new();
        create(&memory, "abc", "u1").await;

        let dispatcher = Dispatcher::start(memory.clone(), &Config::default()).unwrap();
        dispatcher.shutdown(DRAIN_TIMEOUT).await;

        let result = dispatcher.submit("u1", tokens(&["abc"]));
        assert_eq!(Err(Error::ShuttingDown), result);

        // second shutdown is a no-op
        dispatcher.shutdown(DRAIN_TIMEOUT).await;

        assert!(!is_deleted(&memory, "abc").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_jobs_accepted_while_shutting_down_are_processed() {
        for _ in 0..50 {
            let storage = FlakyMemory {
                memory: Memory::new(),
                calls: Arc::new(AtomicUsize::new(0)),
            };

            let dispatcher = Dispatcher::start(storage.clone(), &config(2, 1000, 100)).unwrap();

            let submitters = (0..3)
                .map(|_| {
                    let dispatcher = dispatcher.clone();

                    std::thread::spawn(move || {
                        let mut accepted = 0_usize;

                        loop {
                            match dispatcher.submit("u1", tokens(&["a"])) {
                                Ok(()) => accepted += 1,
                                Err(Error::QueueFull) => std::thread::yield_now(),
                                Err(Error::ShuttingDown) => return accepted,
                                Err(err) => panic!("unexpected error: {err}"),
                            }
                        }
                    })
                })
                .collect::<Vec<_>>();

            tokio::time::sleep(Duration::from_millis(1)).await;
            dispatcher.shutdown(DRAIN_TIMEOUT).await;

            let accepted = submitters
                .into_iter()
                .map(|submitter| submitter.join().unwrap())
                .sum::<usize>();

            assert_eq!(accepted, storage.calls.load(Ordering::SeqCst));
            assert_eq!(
                Err(Error::ShuttingDown),
                dispatcher.submit("u1", tokens(&["a"]))
            );
        }
    }

    #[tokio::test]
    async fn test_shutdown_aborts_stuck_workers() {
        let storage = GatedMemory::new();
        create(&storage, "abc", "u1").await;

        let dispatcher = Dispatcher::start(storage.clone(), &config(2, 10, 100)).unwrap();

        dispatcher.submit("u1", tokens(&["abc"])).unwrap();
        storage.wait_for_blocked(1).await;

        let started = Instant::now();
        dispatcher.shutdown(Duration::from_millis(50)).await;
        assert!(started.elapsed() < DRAIN_TIMEOUT);

        // opening the gate after shutdown changes nothing, the worker is gone
        storage.open();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!is_deleted(&storage, "abc").await);
        assert_eq!(
            Err(Error::ShuttingDown),
            dispatcher.submit("u1", tokens(&["abc"]))
        );
    }

    #[tokio::test]
    async fn test_invalid_jobs() {
        let dispatcher = Dispatcher::start(Memory::new(), &Config::default()).unwrap();

        assert_eq!(
            Err(Error::MissingOwner),
            dispatcher.submit("", tokens(&["abc"]))
        );
        assert_eq!(Err(Error::EmptyBatch), dispatcher.submit("u1", Vec::new()));

        dispatcher.shutdown(DRAIN_TIMEOUT).await;
    }

    #[tokio::test]
    async fn test_invalid_config() {
        assert!(matches!(
            Dispatcher::start(Memory::new(), &config(0, 10, 10)),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Dispatcher::start(Memory::new(), &config(10, 0, 10)),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Dispatcher::start(Memory::new(), &config(10, 10, 0)),
            Err(Error::InvalidConfig(_))
        ));
    }
}
