use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use log::{debug, error, warn};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::QueueConfig;

type BatchHandler<T> = Arc<dyn Fn(Vec<T>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct Batch<T> {
    items: Vec<T>,
    done: Option<oneshot::Sender<()>>,
}

struct State<T> {
    items: Vec<T>,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever a timer is armed or cancelled, so a timer that already
    /// woke up can tell it lost the race.
    generation: u64,
    worker: Option<JoinHandle<()>>,
    destroyed: bool,
}

struct Inner<T> {
    name: String,
    config: QueueConfig,
    state: Mutex<State<T>>,
    sender: UnboundedSender<Batch<T>>,
}

/// Size/time bounded buffer in front of a batch handler.
///
/// A full queue flushes right away. Otherwise the first item arms a timer of
/// `delay_ms`; later items do not re-arm it, so an item waits at most
/// `delay_ms`. Batches reach the handler one at a time in flush order. A
/// failing batch is logged and dropped.
pub struct BatchQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> BatchQueue<T> {
    pub fn new<F, Fut>(name: impl Into<String>, config: QueueConfig, handler: F) -> Self
    where
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let handler: BatchHandler<T> =
            Arc::new(move |items: Vec<T>| -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(handler(items))
            });
        let (sender, receiver) = unbounded_channel();
        let worker = tokio::spawn(run_worker(name.clone(), receiver, handler));
        BatchQueue {
            inner: Arc::new(Inner {
                name,
                config,
                state: Mutex::new(State {
                    items: vec![],
                    timer: None,
                    generation: 0,
                    worker: Some(worker),
                    destroyed: false,
                }),
                sender,
            }),
        }
    }

    pub fn add(&self, item: T) {
        self.add_all(vec![item]);
    }

    pub fn add_all(&self, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        let mut state = self.inner.state.lock().unwrap();
        if state.destroyed {
            warn!("{}: queue destroyed, dropping {} items", self.inner.name, items.len());
            return;
        }
        state.items.extend(items);
        if state.items.len() >= self.inner.config.queue_size_limit {
            self.inner.flush_locked(&mut state, None);
        } else if state.timer.is_none() {
            state.generation += 1;
            let generation = state.generation;
            let inner = self.inner.clone();
            let delay = Duration::from_millis(self.inner.config.delay_ms);
            state.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                inner.flush_timer(generation);
            }));
        }
    }

    /// Flushes whatever is queued and waits until the handler saw it.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.destroyed {
                return;
            }
            self.inner.flush_locked(&mut state, Some(done));
        }
        let _ = wait.await;
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels the timer, drops queued items and stops the handler task.
    pub fn destroy(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        state.generation += 1;
        if !state.items.is_empty() {
            debug!("{}: destroy drops {} items", self.inner.name, state.items.len());
        }
        state.items.clear();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if let Some(worker) = state.worker.take() {
            worker.abort();
        }
    }
}

impl<T> Inner<T> {
    fn flush_locked(&self, state: &mut State<T>, done: Option<oneshot::Sender<()>>) {
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        let items = std::mem::take(&mut state.items);
        if items.is_empty() && done.is_none() {
            return;
        }
        if self.sender.send(Batch { items, done }).is_err() {
            error!("{}: batch handler is gone", self.name);
        }
    }

    fn flush_timer(&self, generation: u64) {
        let mut state = self.state.lock().unwrap();
        if state.destroyed || state.generation != generation {
            return;
        }
        // The running task is this timer; detach instead of aborting it.
        state.timer = None;
        let items = std::mem::take(&mut state.items);
        if !items.is_empty() && self.sender.send(Batch { items, done: None }).is_err() {
            error!("{}: batch handler is gone", self.name);
        }
    }
}

impl<T> Drop for BatchQueue<T> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.destroyed = true;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            if let Some(worker) = state.worker.take() {
                worker.abort();
            }
        }
    }
}

async fn run_worker<T>(
    name: String,
    mut receiver: UnboundedReceiver<Batch<T>>,
    handler: BatchHandler<T>,
) {
    while let Some(batch) = receiver.recv().await {
        if !batch.items.is_empty() {
            let size = batch.items.len();
            if let Err(err) = handler(batch.items).await {
                error!("{}: dropped batch of {} items: {:?}", name, size, err);
            }
        }
        if let Some(done) = batch.done {
            let _ = done.send(());
        }
    }
}
