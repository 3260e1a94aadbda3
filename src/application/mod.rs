pub mod download_session;
pub mod file_retriever;
pub mod format_selector;
pub mod task_client;
pub mod thumbnail_fetcher;

pub use download_session::{progress_events, ChannelEvent, DownloadSession};
pub use file_retriever::{FileRetriever, RetrievalEvent};
pub use format_selector::{FormatOption, FormatSelector};
pub use task_client::{poll_events, TaskClient, TaskEvent};
pub use thumbnail_fetcher::{fetch_preview, fetch_thumbnail, Preview, ThumbnailFetcher};
