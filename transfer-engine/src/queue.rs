//! Priority task queue with a single consumer
//!
//! All balance-mutating work is funneled through one worker task: the
//! mailbox is drained into a priority heap and exactly one task executes
//! at a time, giving linearizable ordering of ledger mutations. Handler
//! failures never escape the worker — each one is caught, classified,
//! and either retried, returned to the caller, or dead-lettered.

use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::metrics::QueueMetrics;
use crate::task::{Task, TaskOutput, TaskPayload};
use async_trait::async_trait;
use chrono::Utc;
use ledger_core::{types::DeadLetter, Ledger};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Executes dequeued tasks. The transfer engine is the production
/// implementation; tests substitute their own.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Execute one task to completion
    async fn execute(&self, task: &Task) -> Result<TaskOutput>;
}

/// Heap entry: priority descending, FIFO within a priority
struct QueuedTask {
    task: Task,
    seq: u64,
    responder: Option<oneshot::Sender<Result<TaskOutput>>>,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.task.priority == other.task.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower sequence (older) first
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Message sent to the queue worker
enum QueueMessage {
    Submit(Box<QueuedTask>),
    Status(oneshot::Sender<QueueStatus>),
    Shutdown,
}

/// Queue status snapshot
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueueStatus {
    /// Tasks waiting in the heap
    pub pending: usize,
    /// Tasks that reached a terminal outcome
    pub completed: u64,
    /// Tasks moved to the dead-letter log
    pub dead_lettered: u64,
}

/// The queue worker (single consumer)
pub struct TaskQueue {
    mailbox: mpsc::Receiver<QueueMessage>,
    heap: BinaryHeap<QueuedTask>,
    executor: Arc<dyn TaskExecutor>,
    ledger: Arc<Ledger>,
    metrics: QueueMetrics,
    next_seq: u64,
    completed: u64,
    dead_lettered: u64,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.heap.len())
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

impl TaskQueue {
    /// Spawn the worker and return a cloneable handle
    pub fn spawn(
        executor: Arc<dyn TaskExecutor>,
        ledger: Arc<Ledger>,
        config: QueueConfig,
    ) -> QueueHandle {
        let (tx, rx) = mpsc::channel(config.capacity);

        let worker = TaskQueue {
            mailbox: rx,
            heap: BinaryHeap::new(),
            executor,
            ledger,
            metrics: QueueMetrics::default(),
            next_seq: 0,
            completed: 0,
            dead_lettered: 0,
        };

        tokio::spawn(async move {
            worker.run().await;
        });

        QueueHandle {
            sender: tx,
            max_retries: config.max_retries,
        }
    }

    /// Worker loop: drain the mailbox, then execute the highest-priority
    /// task; block on the mailbox only when the heap is empty.
    async fn run(mut self) {
        tracing::info!("Task queue worker started");

        loop {
            loop {
                match self.mailbox.try_recv() {
                    Ok(msg) => {
                        if self.handle_message(msg) {
                            return;
                        }
                    }
                    Err(mpsc::error::TryRecvError::Empty)
                    | Err(mpsc::error::TryRecvError::Disconnected) => break,
                }
            }

            if let Some(next) = self.heap.pop() {
                self.metrics.set_depth(self.heap.len());
                self.process(next).await;
            } else {
                match self.mailbox.recv().await {
                    Some(msg) => {
                        if self.handle_message(msg) {
                            return;
                        }
                    }
                    None => {
                        tracing::info!("Task queue mailbox closed, worker stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Returns true on shutdown
    fn handle_message(&mut self, msg: QueueMessage) -> bool {
        match msg {
            QueueMessage::Submit(mut queued) => {
                self.next_seq += 1;
                queued.seq = self.next_seq;
                tracing::debug!(
                    task_id = %queued.task.task_id,
                    task_type = queued.task.payload.kind(),
                    priority = queued.task.priority,
                    "Task enqueued"
                );
                self.heap.push(*queued);
                self.metrics.set_depth(self.heap.len());
                false
            }
            QueueMessage::Status(responder) => {
                let _ = responder.send(QueueStatus {
                    pending: self.heap.len(),
                    completed: self.completed,
                    dead_lettered: self.dead_lettered,
                });
                false
            }
            QueueMessage::Shutdown => {
                tracing::info!(pending = self.heap.len(), "Task queue shutting down");
                true
            }
        }
    }

    async fn process(&mut self, queued: QueuedTask) {
        let QueuedTask {
            task, responder, ..
        } = queued;

        let result = self.executor.execute(&task).await;

        match result {
            Ok(output) => {
                self.completed += 1;
                self.metrics.record_completed();
                if let Some(responder) = responder {
                    let _ = responder.send(Ok(output));
                }
            }
            Err(err) if err.is_retryable() && task.retry_count < task.max_retries => {
                let mut task = task;
                task.retry_count += 1;
                tracing::warn!(
                    task_id = %task.task_id,
                    retry = task.retry_count,
                    max_retries = task.max_retries,
                    error = %err,
                    "Task failed, re-queuing at same priority"
                );
                self.metrics.record_retry();
                self.next_seq += 1;
                self.heap.push(QueuedTask {
                    seq: self.next_seq,
                    task,
                    responder,
                });
            }
            Err(err) if err.is_retryable() => {
                // Retry budget exhausted
                self.dead_letter(&task, &err);
                self.completed += 1;
                if let Some(responder) = responder {
                    let _ = responder.send(Err(Error::RetryExhausted {
                        attempts: task.retry_count + 1,
                        last_error: err.to_string(),
                    }));
                }
            }
            Err(err) => {
                // Synchronous rejection: report to the caller, never retry
                self.completed += 1;
                self.metrics.record_rejected();
                if let Some(responder) = responder {
                    let _ = responder.send(Err(err));
                }
            }
        }
    }

    fn dead_letter(&mut self, task: &Task, err: &Error) {
        let letter = DeadLetter {
            task_id: task.task_id.to_string(),
            task_type: task.payload.kind().to_string(),
            payload: serde_json::to_string(&task.payload).unwrap_or_default(),
            priority: task.priority,
            retry_count: task.retry_count,
            error: err.to_string(),
            failed_at: Utc::now(),
        };

        if let Err(e) = self.ledger.append_dead_letter(&letter) {
            // The letter is also in the log output; losing the persisted
            // copy must not take the worker down.
            tracing::error!(task_id = %task.task_id, error = %e, "Failed to persist dead letter");
        }

        self.dead_lettered += 1;
        self.metrics.record_dead_letter();
    }
}

/// Handle for submitting tasks to the worker
#[derive(Clone)]
pub struct QueueHandle {
    sender: mpsc::Sender<QueueMessage>,
    max_retries: u32,
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle").finish_non_exhaustive()
    }
}

impl QueueHandle {
    /// Submit a task; returns its id and a receiver for the outcome
    pub async fn submit(
        &self,
        payload: TaskPayload,
        priority: u8,
    ) -> Result<(Uuid, oneshot::Receiver<Result<TaskOutput>>)> {
        let task = Task::new(payload, priority, self.max_retries);
        let task_id = task.task_id;
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(QueueMessage::Submit(Box::new(QueuedTask {
                task,
                seq: 0, // assigned by the worker
                responder: Some(tx),
            })))
            .await
            .map_err(|_| Error::Concurrency("Queue mailbox closed".to_string()))?;

        Ok((task_id, rx))
    }

    /// Submit a task and await its outcome
    pub async fn submit_and_wait(&self, payload: TaskPayload, priority: u8) -> Result<TaskOutput> {
        let (_, rx) = self.submit(payload, priority).await?;
        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Queue status
    pub async fn status(&self) -> Result<QueueStatus> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(QueueMessage::Status(tx))
            .await
            .map_err(|_| Error::Concurrency("Queue mailbox closed".to_string()))?;
        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Stop the worker
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(QueueMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Queue mailbox closed".to_string()))
    }
}
