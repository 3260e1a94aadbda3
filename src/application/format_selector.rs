use std::fmt;

use tracing::debug;

use crate::domain::{Format, VideoMetadata};

/// Whether a backend format may be offered for download.
pub fn is_offered(format: &Format) -> bool {
    !format.video_codec.contains("vp")
        && format.resolution_label != "audio only"
        && format.frame_rate > 10.0
}

/// Entry of the format picker.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatOption {
    pub id: String,
    pub label: String,
}

impl From<&Format> for FormatOption {
    fn from(format: &Format) -> Self {
        Self {
            id: format.id.clone(),
            label: format!(
                "{} {}FPS {} {}",
                format.resolution_label, format.frame_rate, format.video_codec, format.container
            ),
        }
    }
}

impl fmt::Display for FormatOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FormatSelector {
    options: Vec<FormatOption>,
    selected: Option<String>,
}

impl FormatSelector {
    /// Offer the acceptable formats of `metadata`, in backend order.
    pub fn new(metadata: &VideoMetadata) -> Self {
        let options: Vec<FormatOption> = metadata
            .formats
            .iter()
            .filter(|format| is_offered(format))
            .map(FormatOption::from)
            .collect();
        debug!(
            offered = options.len(),
            reported = metadata.formats.len(),
            "format options built"
        );

        Self {
            options,
            selected: None,
        }
    }

    pub fn options(&self) -> &[FormatOption] {
        &self.options
    }

    /// Record the chosen format. An empty or unknown id clears the choice.
    /// Returns whether a format is now chosen.
    pub fn select(&mut self, format_id: &str) -> bool {
        self.selected = self
            .options
            .iter()
            .find(|option| !format_id.is_empty() && option.id == format_id)
            .map(|option| option.id.clone());
        self.selected.is_some()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_option(&self) -> Option<&FormatOption> {
        let id = self.selected.as_deref()?;
        self.options.iter().find(|option| option.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(id: &str, vcodec: &str, resolution: &str, fps: f64) -> Format {
        Format {
            id: id.to_string(),
            container: "mp4".to_string(),
            video_codec: vcodec.to_string(),
            resolution_label: resolution.to_string(),
            frame_rate: fps,
            file_size: "N/A".to_string(),
        }
    }

    fn metadata(formats: Vec<Format>) -> VideoMetadata {
        VideoMetadata {
            name: "Clip".to_string(),
            duration_label: "1:00".to_string(),
            formats,
        }
    }

    #[test]
    fn test_only_acceptable_formats_are_offered() {
        let selector = FormatSelector::new(&metadata(vec![
            format("1", "vp9", "1920x1080", 30.0),
            format("2", "none", "audio only", 30.0),
            format("3", "avc1", "256x144", 5.0),
            format("4", "h264", "1080p", 30.0),
        ]));

        let ids: Vec<&str> = selector.options().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["4"]);
        assert_eq!(selector.options()[0].label, "1080p 30FPS h264 mp4");
    }

    #[test]
    fn test_codec_rule_is_case_sensitive_and_fps_is_strict() {
        assert!(!is_offered(&format("a", "vp09.00.40.08", "1080p", 60.0)));
        assert!(is_offered(&format("b", "VP9", "1080p", 60.0)));
        assert!(!is_offered(&format("c", "avc1", "720p", 10.0)));
        assert!(is_offered(&format("d", "avc1", "720p", 10.5)));
    }

    #[test]
    fn test_backend_order_is_kept() {
        let selector = FormatSelector::new(&metadata(vec![
            format("22", "avc1", "1280x720", 30.0),
            format("137", "avc1", "1920x1080", 30.0),
            format("18", "avc1", "640x360", 30.0),
        ]));
        let ids: Vec<&str> = selector.options().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["22", "137", "18"]);
    }

    #[test]
    fn test_selection() {
        let mut selector = FormatSelector::new(&metadata(vec![
            format("1", "vp9", "1920x1080", 30.0),
            format("4", "h264", "1080p", 30.0),
        ]));
        assert_eq!(selector.selected(), None);

        assert!(selector.select("4"));
        assert!(selector.select("4"));
        assert_eq!(selector.selected(), Some("4"));
        assert_eq!(selector.selected_option().unwrap().id, "4");

        assert!(!selector.select(""));
        assert_eq!(selector.selected(), None);

        // Filtered-out formats cannot be chosen.
        assert!(!selector.select("1"));
        assert_eq!(selector.selected(), None);
    }
}
