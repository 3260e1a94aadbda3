/// One downloadable encoding/resolution variant reported by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Format {
    pub id: String,
    pub container: String,
    pub video_codec: String,
    pub resolution_label: String,
    /// Zero when the backend could not report a frame rate.
    pub frame_rate: f64,
    pub file_size: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub name: String,
    pub duration_label: String,
    pub formats: Vec<Format>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Completed,
    RetryExhausted,
    Failed,
}

/// A backend task as seen by one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub source_url: String,
    pub status: TaskStatus,
    pub result: Option<VideoMetadata>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailRef {
    pub task_id: String,
    pub status: String,
    pub image_ref: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DownloadProgress {
    pub percent: f64,
    pub file_ref: Option<String>,
}

/// Lifecycle of the task owned by a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskPhase {
    #[default]
    Idle,
    Creating,
    Polling,
    Completed,
    RetryExhausted,
    Failed,
}

impl TaskPhase {
    pub fn is_busy(self) -> bool {
        matches!(self, TaskPhase::Creating | TaskPhase::Polling)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskPhase::Completed | TaskPhase::RetryExhausted | TaskPhase::Failed
        )
    }
}

/// Lifecycle of the progress channel owned by a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadPhase {
    #[default]
    Closed,
    Connecting,
    Streaming,
    Completed,
}

impl DownloadPhase {
    pub fn is_open(self) -> bool {
        matches!(self, DownloadPhase::Connecting | DownloadPhase::Streaming)
    }
}
