use iced::{
    widget::{
        button, column, container, image::Handle, pick_list, progress_bar, row, text,
        text_input, Column, Image, Space,
    },
    Alignment, Element, Length,
};

use crate::application::FormatOption;
use crate::domain::{DownloadPhase, VideoMetadata};

/// State of the thumbnail area of a card.
#[derive(Debug, Clone, Copy)]
pub enum ThumbnailView<'a> {
    Loading,
    Ready(&'a Handle),
    Unavailable,
}

/// Everything a slot card shows, borrowed from the slot for one frame.
pub struct SlotCard<'a> {
    pub url_input: &'a str,
    pub can_submit: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub metadata: Option<&'a VideoMetadata>,
    pub thumbnail: ThumbnailView<'a>,
    pub options: &'a [FormatOption],
    pub selected: Option<&'a FormatOption>,
    pub can_download: bool,
    pub download_phase: DownloadPhase,
    pub percent: f64,
    pub status_message: &'a str,
}

#[derive(Debug, Clone)]
pub enum SlotInput {
    UrlChanged(String),
    FindPressed,
    FormatSelected(FormatOption),
    DownloadPressed,
    Remove,
}

pub fn slot_card(card: SlotCard<'_>) -> Element<'_, SlotInput> {
    let find_label = if card.loading { "Loading..." } else { "Find Video" };
    let header = row![
        text("URL:").size(16),
        Space::new().width(Length::Fill),
        button(text("X").size(14))
            .on_press(SlotInput::Remove)
            .padding([2, 8]),
    ]
    .align_y(Alignment::Center);

    let mut body = column![
        header,
        text_input("www.youtube.com/v=...", card.url_input)
            .on_input(SlotInput::UrlChanged)
            .on_submit(SlotInput::FindPressed)
            .padding(10),
        button(text(find_label))
            .on_press_maybe(card.can_submit.then_some(SlotInput::FindPressed))
            .width(Length::Fill)
            .padding([10, 20]),
    ]
    .spacing(10);

    if let Some(error) = card.error {
        body = body.push(text(error).size(14));
    }

    if let Some(metadata) = card.metadata {
        body = body.push(video_details(
            metadata,
            card.thumbnail,
            card.options,
            card.selected,
            card.can_download,
            card.download_phase,
            card.percent,
        ));
    }

    if !card.status_message.is_empty() {
        body = body.push(text(card.status_message).size(14));
    }

    container(body).padding(20).width(Length::Fill).into()
}

fn video_details<'a>(
    metadata: &'a VideoMetadata,
    thumbnail: ThumbnailView<'a>,
    options: &'a [FormatOption],
    selected: Option<&'a FormatOption>,
    can_download: bool,
    phase: DownloadPhase,
    percent: f64,
) -> Element<'a, SlotInput> {
    let mut info = column![
        text("Video Info:").size(16),
        text(format!("Title: {}", metadata.name)),
        text(format!("Duration: {}", metadata.duration_label)),
        text("Available Formats:"),
        pick_list(options, selected, SlotInput::FormatSelected)
            .placeholder("Select Format")
            .width(Length::Fill),
    ]
    .spacing(6)
    .width(Length::Fill);

    if selected.is_some() {
        let action: Element<'a, SlotInput> = match phase {
            DownloadPhase::Closed => button(text("Download Selected Format"))
                .on_press_maybe(can_download.then_some(SlotInput::DownloadPressed))
                .width(Length::Fill)
                .into(),
            DownloadPhase::Connecting | DownloadPhase::Streaming => {
                progress_bar(0.0..=100.0, percent as f32).into()
            }
            DownloadPhase::Completed => Column::new()
                .push(text("Complete"))
                .push(
                    button(text("Download Selected Format"))
                        .on_press_maybe(can_download.then_some(SlotInput::DownloadPressed))
                        .width(Length::Fill),
                )
                .spacing(6)
                .into(),
        };
        info = info.push(action);
    }

    let thumbnail: Element<'a, SlotInput> = match thumbnail {
        ThumbnailView::Ready(handle) => Image::new(handle.clone())
            .width(Length::Fixed(400.0))
            .into(),
        ThumbnailView::Loading => text("Loading thumbnail...").size(14).into(),
        ThumbnailView::Unavailable => text("No thumbnail").size(14).into(),
    };

    row![info, thumbnail]
    .spacing(10)
    .into()
}
