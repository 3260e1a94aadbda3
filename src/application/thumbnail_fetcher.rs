use bytes::Bytes;
use tracing::{debug, warn};

use crate::{api::ApiClient, domain::ThumbnailRef};

/// Longest side of a decoded preview, in pixels.
const PREVIEW_SIZE: u32 = 400;

/// Decoded thumbnail, ready to hand to the UI as RGBA.
#[derive(Debug, Clone)]
pub struct Preview {
    pub width: u32,
    pub height: u32,
    pub pixels: Bytes,
}

/// Fetches the thumbnail of a completed task, once per task id.
#[derive(Debug, Clone, Default)]
pub struct ThumbnailFetcher {
    requested_for: Option<String>,
    thumbnail: Option<ThumbnailRef>,
}

impl ThumbnailFetcher {
    /// Claim the single fetch allowed for `task_id`. Returns false when it
    /// was already claimed.
    pub fn begin(&mut self, task_id: &str) -> bool {
        if self.requested_for.as_deref() == Some(task_id) {
            return false;
        }
        self.requested_for = Some(task_id.to_string());
        self.thumbnail = None;
        true
    }

    /// Store the outcome of the fetch claimed for `task_id`.
    pub fn apply(&mut self, task_id: &str, thumbnail: Option<ThumbnailRef>) -> bool {
        if self.requested_for.as_deref() != Some(task_id) {
            debug!(%task_id, "dropping thumbnail for a task this slot moved past");
            return false;
        }
        self.thumbnail = thumbnail;
        true
    }

    pub fn image_ref(&self) -> Option<&str> {
        self.thumbnail.as_ref()?.image_ref.as_deref()
    }

    pub fn reset(&mut self) {
        self.requested_for = None;
        self.thumbnail = None;
    }
}

/// Single attempt at the thumbnail reference. Failures are logged and
/// reported as `None`.
pub async fn fetch_thumbnail(client: ApiClient, task_id: String) -> Option<ThumbnailRef> {
    match client.fetch_thumbnail(&task_id).await {
        Ok(response) => {
            let thumbnail = ThumbnailRef::from(response);
            if thumbnail.image_ref.is_none() {
                debug!(%task_id, status = %thumbnail.status, error = ?thumbnail.error, "thumbnail not ready");
            }
            Some(thumbnail)
        }
        Err(e) => {
            warn!(%task_id, error = %e, "thumbnail fetch failed");
            None
        }
    }
}

/// Download and decode the image behind a thumbnail reference.
pub async fn fetch_preview(client: ApiClient, image_ref: String) -> Option<Preview> {
    let data = match client.fetch_bytes(&image_ref).await {
        Ok(data) => data,
        Err(e) => {
            warn!(%image_ref, error = %e, "thumbnail image fetch failed");
            return None;
        }
    };

    match tokio::task::spawn_blocking(move || decode_preview(&data)).await {
        Ok(Ok(preview)) => Some(preview),
        Ok(Err(e)) => {
            warn!(%image_ref, error = %e, "thumbnail image could not be decoded");
            None
        }
        Err(e) => {
            warn!(%image_ref, error = %e, "thumbnail decode task failed");
            None
        }
    }
}

fn decode_preview(data: &[u8]) -> Result<Preview, image::ImageError> {
    let img = image::load_from_memory(data)?;
    let rgba = img.thumbnail(PREVIEW_SIZE, PREVIEW_SIZE).to_rgba8();
    let (width, height) = rgba.dimensions();

    Ok(Preview {
        width,
        height,
        pixels: Bytes::from(rgba.into_raw()),
    })
}
