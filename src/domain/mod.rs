pub mod error;
pub mod model;

pub use error::{AppError, ParseError};
pub use model::{
    DownloadPhase, DownloadProgress, Format, Task, TaskPhase, TaskStatus, ThumbnailRef,
    VideoMetadata,
};
