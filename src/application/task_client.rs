use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::{
    api::ApiClient,
    config::PollPolicy,
    domain::{AppError, Task, TaskPhase, TaskStatus, VideoMetadata},
};

/// How a poll sequence begins.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStart {
    Create { source_url: String },
    Resume { task_id: String },
}

/// Work the slot must run after `request_task`. Events produced for this
/// plan must be applied with the same `epoch`.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPlan {
    pub epoch: u64,
    pub start: PollStart,
}

/// Outcome of one step of a poll sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Created(String),
    CreateFailed(AppError),
    Pending { attempt: u32, status: String },
    FetchFailed { attempt: u32, error: String },
    Completed { attempt: u32, metadata: VideoMetadata },
    RetryRequested { attempt: u32 },
    Exhausted { attempts: u32 },
}

/// Task lifecycle for one slot.
///
/// The machine only records intent and applies events; the network side is
/// [`poll_events`]. Every plan bumps the epoch, so events from a cancelled or
/// superseded sequence are discarded by [`TaskClient::apply`].
#[derive(Debug, Clone)]
pub struct TaskClient {
    phase: TaskPhase,
    source_url: Option<String>,
    /// Source url of the last task the backend accepted.
    created_for: Option<String>,
    task_id: Option<String>,
    result: Option<VideoMetadata>,
    error: Option<AppError>,
    attempts: u32,
    max_attempts: u32,
    epoch: u64,
}

impl TaskClient {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            phase: TaskPhase::Idle,
            source_url: None,
            created_for: None,
            task_id: None,
            result: None,
            error: None,
            attempts: 0,
            max_attempts: policy.max_attempts,
            epoch: 0,
        }
    }

    pub fn phase(&self) -> TaskPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase.is_busy()
    }

    pub fn error(&self) -> Option<&AppError> {
        self.error.as_ref()
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn metadata(&self) -> Option<&VideoMetadata> {
        self.result.as_ref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn task(&self) -> Option<Task> {
        let id = self.task_id.clone()?;
        let status = match self.phase {
            TaskPhase::Completed => TaskStatus::Completed,
            TaskPhase::RetryExhausted => TaskStatus::RetryExhausted,
            TaskPhase::Failed => TaskStatus::Failed,
            TaskPhase::Idle | TaskPhase::Creating | TaskPhase::Polling => TaskStatus::Pending,
        };
        Some(Task {
            id,
            source_url: self.source_url.clone().unwrap_or_default(),
            status,
            result: self.result.clone(),
        })
    }

    /// Point the slot at a different source. Anything tied to the previous
    /// source is dropped and in-flight events become stale. Returns whether
    /// the source actually changed.
    pub fn change_source(&mut self, source_url: Option<&str>) -> bool {
        if self.source_url.as_deref() == source_url {
            return false;
        }
        debug!(from = ?self.source_url, to = ?source_url, "source url changed");
        self.epoch += 1;
        self.phase = TaskPhase::Idle;
        self.source_url = source_url.map(str::to_string);
        self.created_for = None;
        self.task_id = None;
        self.result = None;
        self.error = None;
        self.attempts = 0;
        true
    }

    /// Stop whatever sequence is running. Late events are ignored.
    pub fn cancel(&mut self) {
        self.epoch += 1;
        if self.phase.is_busy() {
            self.phase = TaskPhase::Idle;
        }
    }

    /// Decide what submitting `url` should do. `None` means nothing to run:
    /// a sequence is already active for this url, or its result is in.
    pub fn request_task(&mut self, url: &str) -> Option<PollPlan> {
        self.change_source(Some(url));

        if self.phase.is_busy() {
            debug!(%url, "task request ignored, already in flight");
            return None;
        }
        if self.result.is_some() {
            debug!(%url, "task request ignored, result already available");
            return None;
        }

        self.epoch += 1;
        self.error = None;
        self.attempts = 0;

        let resumable = self
            .task_id
            .clone()
            .filter(|_| self.created_for.as_deref() == Some(url));
        let start = match resumable {
            Some(task_id) => {
                info!(%task_id, "resuming poll for existing task");
                self.phase = TaskPhase::Polling;
                PollStart::Resume { task_id }
            }
            None => {
                info!(%url, "creating task");
                self.phase = TaskPhase::Creating;
                self.task_id = None;
                PollStart::Create {
                    source_url: url.to_string(),
                }
            }
        };

        Some(PollPlan {
            epoch: self.epoch,
            start,
        })
    }

    /// Apply an event from the sequence started under `epoch`. Returns
    /// whether the event changed anything.
    pub fn apply(&mut self, epoch: u64, event: TaskEvent) -> bool {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "dropping stale task event");
            return false;
        }

        match (self.phase, event) {
            (TaskPhase::Creating, TaskEvent::Created(task_id)) => {
                self.created_for = self.source_url.clone();
                self.task_id = Some(task_id);
                self.phase = TaskPhase::Polling;
            }
            (TaskPhase::Creating, TaskEvent::CreateFailed(error)) => {
                warn!(%error, "task creation failed");
                self.task_id = None;
                self.error = Some(error);
                self.phase = TaskPhase::Failed;
            }
            (TaskPhase::Polling, TaskEvent::Pending { attempt, .. })
            | (TaskPhase::Polling, TaskEvent::FetchFailed { attempt, .. }) => {
                self.attempts = attempt;
            }
            (TaskPhase::Polling, TaskEvent::Completed { attempt, metadata }) => {
                info!(attempt, name = %metadata.name, "task completed");
                self.attempts = attempt;
                self.result = Some(metadata);
                self.phase = TaskPhase::Completed;
            }
            (TaskPhase::Polling, TaskEvent::RetryRequested { attempt }) => {
                warn!(attempt, "backend asked for resubmission");
                self.task_id = None;
                self.created_for = None;
                self.attempts = self.max_attempts;
                self.error = Some(AppError::Backend);
                self.phase = TaskPhase::Failed;
            }
            (TaskPhase::Polling, TaskEvent::Exhausted { attempts }) => {
                warn!(attempts, "poll attempts exhausted");
                self.attempts = attempts;
                self.error = Some(AppError::TimedOut);
                self.phase = TaskPhase::RetryExhausted;
            }
            (phase, event) => {
                debug!(?phase, ?event, "event does not apply in this phase");
                return false;
            }
        }
        true
    }
}

enum PollRuntimeState {
    Create {
        client: ApiClient,
        source_url: String,
        policy: PollPolicy,
    },
    Tick {
        client: ApiClient,
        task_id: String,
        policy: PollPolicy,
        attempt: u32,
    },
    Finished,
}

/// Run a poll plan against the backend. The stream ends after its first
/// terminal event.
pub fn poll_events(
    client: ApiClient,
    start: PollStart,
    policy: PollPolicy,
) -> BoxStream<'static, TaskEvent> {
    let initial = match start {
        PollStart::Create { source_url } => PollRuntimeState::Create {
            client,
            source_url,
            policy,
        },
        PollStart::Resume { task_id } => PollRuntimeState::Tick {
            client,
            task_id,
            policy,
            attempt: 0,
        },
    };

    stream::unfold(initial, |state| async move {
        match state {
            PollRuntimeState::Create {
                client,
                source_url,
                policy,
            } => match client.create_task(&source_url).await {
                Ok(task_id) => Some((
                    TaskEvent::Created(task_id.clone()),
                    PollRuntimeState::Tick {
                        client,
                        task_id,
                        policy,
                        attempt: 0,
                    },
                )),
                Err(e) => Some((
                    TaskEvent::CreateFailed(AppError::Api(e.to_string())),
                    PollRuntimeState::Finished,
                )),
            },
            PollRuntimeState::Tick {
                client,
                task_id,
                policy,
                attempt,
            } => {
                if attempt >= policy.max_attempts {
                    return Some((
                        TaskEvent::Exhausted { attempts: attempt },
                        PollRuntimeState::Finished,
                    ));
                }

                tokio::time::sleep(policy.interval).await;
                let attempt = attempt + 1;

                let event = match client.fetch_task(&task_id).await {
                    Ok(response) => match (response.status.as_str(), response.result) {
                        ("completed", Some(result)) => TaskEvent::Completed {
                            attempt,
                            metadata: result.into(),
                        },
                        ("retry", _) => TaskEvent::RetryRequested { attempt },
                        (status, _) => TaskEvent::Pending {
                            attempt,
                            status: status.to_string(),
                        },
                    },
                    Err(e) => {
                        warn!(%task_id, attempt, error = %e, "status fetch failed");
                        TaskEvent::FetchFailed {
                            attempt,
                            error: e.to_string(),
                        }
                    }
                };

                let next = match event {
                    TaskEvent::Pending { .. } | TaskEvent::FetchFailed { .. } => {
                        PollRuntimeState::Tick {
                            client,
                            task_id,
                            policy,
                            attempt,
                        }
                    }
                    _ => PollRuntimeState::Finished,
                };
                Some((event, next))
            }
            PollRuntimeState::Finished => None,
        }
    })
    .boxed()
}
