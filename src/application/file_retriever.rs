use std::path::{Path, PathBuf};

use futures::{stream::BoxStream, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::{api::ApiClient, domain::AppError};

#[derive(Debug, Clone)]
pub enum RetrievalEvent {
    /// Fraction written so far (0.0 to 1.0), 0.0 while the size is unknown.
    Progress(f32),
    Completed(PathBuf),
    Failed(AppError),
}

/// Saves finished files served by the backend.
#[derive(Clone)]
pub struct FileRetriever {
    api_client: ApiClient,
}

impl FileRetriever {
    pub fn new(api_client: ApiClient) -> Self {
        Self { api_client }
    }

    /// Where `filename` should be written: inside the configured download
    /// directory, or wherever the user picks. `None` when the user cancels.
    pub async fn target_path(&self, filename: String) -> Option<PathBuf> {
        match &self.api_client.config().download_dir {
            Some(dir) => Some(dir.join(filename)),
            None => choose_save_path(filename).await,
        }
    }

    pub fn retrieve(&self, url: String, path: PathBuf) -> BoxStream<'static, RetrievalEvent> {
        futures::stream::unfold(
            RetrievalState::Start {
                client: self.api_client.clone(),
                url,
                path,
            },
            |state| async move {
                match state {
                    RetrievalState::Start { client, url, path } => {
                        let file = match create_file(&path).await {
                            Ok(file) => file,
                            Err(e) => return Some(fail(AppError::Io(e))),
                        };

                        match client.download_file_stream(&url).await {
                            Ok((total, stream)) => {
                                info!(%url, path = %path.display(), ?total, "retrieving file");
                                Some((
                                    RetrievalEvent::Progress(0.0),
                                    RetrievalState::Writing {
                                        file,
                                        stream: stream.boxed(),
                                        written: 0,
                                        total,
                                        path,
                                    },
                                ))
                            }
                            Err(e) => Some(fail(AppError::Api(e.to_string()))),
                        }
                    }
                    RetrievalState::Writing {
                        mut file,
                        mut stream,
                        written,
                        total,
                        path,
                    } => match stream.next().await {
                        Some(Ok(chunk)) => {
                            if let Err(e) = file.write_all(&chunk).await {
                                return Some(fail(AppError::Io(format!("Write error: {}", e))));
                            }
                            let written = written + chunk.len() as u64;

                            Some((
                                RetrievalEvent::Progress(fraction(written, total)),
                                RetrievalState::Writing {
                                    file,
                                    stream,
                                    written,
                                    total,
                                    path,
                                },
                            ))
                        }
                        Some(Err(e)) => Some(fail(AppError::Api(e.to_string()))),
                        None => {
                            if let Err(e) = file.sync_all().await {
                                return Some(fail(AppError::Io(format!(
                                    "Failed to sync file: {}",
                                    e
                                ))));
                            }
                            info!(path = %path.display(), bytes = written, "file saved");
                            Some((RetrievalEvent::Completed(path), RetrievalState::Finished))
                        }
                    },
                    RetrievalState::Finished => None,
                }
            },
        )
        .boxed()
    }
}

pub async fn choose_save_path(suggested_filename: String) -> Option<PathBuf> {
    rfd::AsyncFileDialog::new()
        .set_file_name(&suggested_filename)
        .save_file()
        .await
        .map(|handle| handle.path().to_path_buf())
}

async fn create_file(path: &Path) -> Result<tokio::fs::File, String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    tokio::fs::File::create(path)
        .await
        .map_err(|e| format!("Failed to create file: {}", e))
}

fn fail(error: AppError) -> (RetrievalEvent, RetrievalState) {
    warn!(%error, "file retrieval failed");
    (RetrievalEvent::Failed(error), RetrievalState::Finished)
}

fn fraction(written: u64, total: Option<u64>) -> f32 {
    match total {
        Some(total) if total > 0 => (written as f32 / total as f32).min(1.0),
        _ => 0.0,
    }
}

enum RetrievalState {
    Start {
        client: ApiClient,
        url: String,
        path: PathBuf,
    },
    Writing {
        file: tokio::fs::File,
        stream: BoxStream<'static, crate::api::Result<bytes::Bytes>>,
        written: u64,
        total: Option<u64>,
        path: PathBuf,
    },
    Finished,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    fn retriever_for(server: &mockito::ServerGuard, dir: &std::path::Path) -> FileRetriever {
        let config = ClientConfig::new(&server.url(), None)
            .unwrap()
            .with_download_dir(dir);
        FileRetriever::new(ApiClient::new(config))
    }

    #[tokio::test]
    async fn test_retrieve_writes_file() {
        let mut server = mockito::Server::new_async().await;
        let body = vec![7u8; 64 * 1024];
        let _mock = server
            .mock("GET", "/videos/a.mp4")
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let retriever = retriever_for(&server, dir.path());

        let path = retriever.target_path("Clip.mp4".to_string()).await.unwrap();
        assert_eq!(path, dir.path().join("Clip.mp4"));

        let url = format!("{}/videos/a.mp4", server.url());
        let events: Vec<RetrievalEvent> = retriever.retrieve(url, path.clone()).collect().await;

        assert!(matches!(events.first(), Some(RetrievalEvent::Progress(p)) if *p == 0.0));
        assert!(matches!(events.last(), Some(RetrievalEvent::Completed(p)) if *p == path));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), body);
    }

    #[tokio::test]
    async fn test_retrieve_missing_file_fails() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/videos/missing.mp4")
            .with_status(404)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let retriever = retriever_for(&server, dir.path());

        let url = format!("{}/videos/missing.mp4", server.url());
        let events: Vec<RetrievalEvent> = retriever
            .retrieve(url, dir.path().join("nested").join("missing.mp4"))
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RetrievalEvent::Failed(AppError::Api(_))));
    }

    #[test]
    fn test_fraction() {
        assert_eq!(fraction(50, Some(100)), 0.5);
        assert_eq!(fraction(50, None), 0.0);
        assert_eq!(fraction(50, Some(0)), 0.0);
    }
}
