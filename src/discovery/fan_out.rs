//! Bounded producer/worker search with a single winner.
//!
//! One producer enqueues tasks onto a bounded channel and is the only owner of
//! the sender, so the channel closes exactly when it returns. A fixed pool of
//! workers drains the channel. The first worker that reports a match stores it
//! and cancels the shared token; every other worker observes the token before
//! each dequeue. The producer is dropped at its next await point, so a match
//! never waits on an endpoint that is still being retried.

use crate::core::domain::{
    error::{IcsError, IcsResult},
    model::cloud_config::DiscoveryConfig,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Terminal state of one search.
#[derive(Debug)]
pub(crate) enum Outcome<R> {
    Found(R),
    /// Nothing matched and at least one task failed; holds the last failure.
    Failed(IcsError),
    Exhausted,
}

struct SearchState<R> {
    done: CancellationToken,
    winner: Mutex<Option<R>>,
    last_error: Mutex<Option<IcsError>>,
}

impl<R> SearchState<R> {
    fn new() -> Self {
        Self {
            done: CancellationToken::new(),
            winner: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    /// Stores `result` unless another worker already won.
    async fn try_win(&self, result: R) -> bool {
        let mut winner = self.winner.lock().await;
        if winner.is_some() {
            return false;
        }
        *winner = Some(result);
        self.done.cancel();
        true
    }

    async fn record_error(&self, err: IcsError) {
        *self.last_error.lock().await = Some(err);
    }
}

/// Producer handle for enqueueing tasks.
pub(crate) struct TaskSink<T, R> {
    sender: mpsc::Sender<T>,
    state: Arc<SearchState<R>>,
}

impl<T, R> TaskSink<T, R> {
    /// Enqueues `task`, waiting while the queue is full.
    ///
    /// Returns `false` once a winner exists or every worker is gone; the
    /// producer should stop enumerating.
    pub async fn push(&self, task: T) -> bool {
        if self.state.done.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.state.done.cancelled() => false,
            sent = self.sender.send(task) => sent.is_ok(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state.done.is_cancelled() || self.sender.is_closed()
    }

    /// Records a failure that happened while enumerating.
    pub async fn record_error(&self, err: IcsError) {
        self.state.record_error(err).await;
    }
}

/// Runs `produce` against a pool of `work` calls.
///
/// `work` answers `Ok(None)` for a miss, which is never recorded as an error.
pub(crate) async fn run<T, R, P, PF, W, WF>(
    discovery: &DiscoveryConfig,
    produce: P,
    work: W,
) -> Outcome<R>
where
    T: Send + 'static,
    R: Send + 'static,
    P: FnOnce(TaskSink<T, R>) -> PF,
    PF: Future<Output = ()> + Send + 'static,
    W: Fn(T) -> WF + Send + Sync + 'static,
    WF: Future<Output = IcsResult<Option<R>>> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(discovery.queue_size.max(1));
    let state = Arc::new(SearchState::new());

    let produce = produce(TaskSink {
        sender,
        state: Arc::clone(&state),
    });
    let done = state.done.clone();
    let producer = tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = done.cancelled() => debug!("Search finished, stopping producer"),
            _ = produce => {}
        }
    });

    let receiver = Arc::new(Mutex::new(receiver));
    let work = Arc::new(work);
    let mut workers = JoinSet::new();
    for worker_id in 0..discovery.pool_size.max(1) {
        let receiver = Arc::clone(&receiver);
        let state = Arc::clone(&state);
        let work = Arc::clone(&work);
        workers.spawn(async move {
            loop {
                let task = {
                    let mut receiver = receiver.lock().await;
                    tokio::select! {
                        biased;
                        _ = state.done.cancelled() => None,
                        task = receiver.recv() => task,
                    }
                };
                let Some(task) = task else {
                    break;
                };

                match work(task).await {
                    Ok(Some(result)) => {
                        if !state.try_win(result).await {
                            debug!(worker_id, "Discarding match found after the search finished");
                        }
                        break;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        debug!(worker_id, error = %err, "Search task failed");
                        state.record_error(err).await;
                    }
                }
            }
        });
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            error!(error = %err, "Search worker aborted");
        }
    }
    // Unblocks a producer still waiting on a full queue.
    drop(receiver);
    if let Err(err) = producer.await {
        error!(error = %err, "Search producer aborted");
    }

    if let Some(result) = state.winner.lock().await.take() {
        return Outcome::Found(result);
    }
    match state.last_error.lock().await.take() {
        Some(err) => Outcome::Failed(err),
        None => Outcome::Exhausted,
    }
}
