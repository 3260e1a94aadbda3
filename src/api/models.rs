use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::{Format, ThumbnailRef, VideoMetadata};

/// Response from `GET /video?url=`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskIdResponse {
    pub task_id: String,
    #[serde(default)]
    pub status: String,
}

/// Response from `GET /video/<task_id>`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletedTaskResponse {
    pub task_id: String,
    pub status: String,
    #[serde(default)]
    pub result: Option<VideoFormatsResponse>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoFormatsResponse {
    pub name: String,
    pub duration_string: String,
    #[serde(default)]
    pub formats: Vec<WireFormat>,
}

/// A format as reported by the backend. `fps` and `filesize` come back as
/// numbers, `"N/A"` or null depending on what the extractor found.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireFormat {
    pub format_id: String,
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub vcodec: String,
    #[serde(default)]
    pub resolution: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub fps: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub filesize: Option<String>,
}

/// Response from `GET /video/thumbnail/<task_id>`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThumbnailUrlResponse {
    pub task_id: String,
    pub status: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Selection sent once the progress channel is open.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DownloadRequest {
    pub task_id: String,
    pub format: String,
}

/// Any message pushed by the server over the progress channel.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChannelMessage {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(rename = "URL", default)]
    pub url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

impl From<WireFormat> for Format {
    fn from(wire: WireFormat) -> Self {
        Self {
            id: wire.format_id,
            container: wire.ext,
            video_codec: wire.vcodec,
            resolution_label: wire.resolution,
            frame_rate: wire.fps.unwrap_or(0.0),
            file_size: wire.filesize.unwrap_or_else(|| "N/A".to_string()),
        }
    }
}

impl From<VideoFormatsResponse> for VideoMetadata {
    fn from(wire: VideoFormatsResponse) -> Self {
        Self {
            name: wire.name,
            duration_label: wire.duration_string,
            formats: wire.formats.into_iter().map(Format::from).collect(),
        }
    }
}

impl From<ThumbnailUrlResponse> for ThumbnailRef {
    fn from(wire: ThumbnailUrlResponse) -> Self {
        Self {
            task_id: wire.task_id,
            status: wire.status,
            image_ref: wire.image_url.filter(|url| !url.is_empty()),
            error: wire.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_completed_task_with_loose_format_fields() {
        let body = json!({
            "task_id": "t1",
            "status": "completed",
            "result": {
                "name": "Clip",
                "duration_string": "3:14",
                "formats": [
                    {"format_id": "137", "ext": "mp4", "vcodec": "avc1.640028",
                     "resolution": "1920x1080", "fps": 30, "filesize": 1048576},
                    {"format_id": "sb0", "ext": "mhtml", "vcodec": "none",
                     "resolution": "audio only", "fps": "N/A", "filesize": null}
                ]
            }
        });
        let response: CompletedTaskResponse = serde_json::from_value(body).unwrap();
        let metadata = VideoMetadata::from(response.result.unwrap());

        assert_eq!(metadata.name, "Clip");
        assert_eq!(metadata.formats[0].frame_rate, 30.0);
        assert_eq!(metadata.formats[0].file_size, "1048576");
        assert_eq!(metadata.formats[1].frame_rate, 0.0);
        assert_eq!(metadata.formats[1].file_size, "N/A");
    }

    #[test]
    fn test_pending_task_has_no_result() {
        let response: CompletedTaskResponse =
            serde_json::from_str(r#"{"task_id":"t1","status":"pending"}"#).unwrap();
        assert!(response.result.is_none());
        assert!(response.error.is_none());
    }

    #[test]
    fn test_channel_message_fields() {
        let done: ChannelMessage = serde_json::from_str(
            r#"{"status":"completed","message":"Video download finished!","URL":"/videos/a.mp4"}"#,
        )
        .unwrap();
        assert_eq!(done.status.as_deref(), Some("completed"));
        assert_eq!(done.url.as_deref(), Some("/videos/a.mp4"));
        assert!(done.progress.is_none());
    }

    #[test]
    fn test_download_request_shape() {
        let request = DownloadRequest {
            task_id: "t1".to_string(),
            format: "137".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"task_id": "t1", "format": "137"})
        );
    }
}
