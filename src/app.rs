use std::path::PathBuf;

use futures::StreamExt;
use iced::widget::{button, column, image::Handle, scrollable, text, Column};
use iced::{task, Element, Length, Task};
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::application::{
    fetch_preview, fetch_thumbnail, poll_events, progress_events, ChannelEvent, DownloadSession,
    FileRetriever, FormatSelector, Preview, RetrievalEvent, TaskClient, TaskEvent,
    ThumbnailFetcher,
};
use crate::config::ClientConfig;
use crate::domain::ThumbnailRef;
use crate::ui::{slot_card, SlotCard, SlotInput, ThumbnailView};
use crate::utils::is_valid_url;

pub struct DownloadApp {
    api_client: ApiClient,
    retriever: FileRetriever,
    slots: Vec<Slot>,
    next_slot_id: usize,
}

impl DownloadApp {
    pub fn new(config: ClientConfig) -> Self {
        let api_client = ApiClient::new(config);
        let retriever = FileRetriever::new(api_client.clone());

        let mut app = Self {
            api_client,
            retriever,
            slots: Vec::new(),
            next_slot_id: 0,
        };
        app.add_slot();
        app
    }

    fn add_slot(&mut self) {
        let id = self.next_slot_id;
        self.next_slot_id += 1;
        self.slots
            .push(Slot::new(id, TaskClient::new(self.api_client.config().poll)));
        debug!(slot = id, "slot added");
    }

    fn remove_slot(&mut self, id: usize) {
        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.id == id) {
            slot.tasks.cancel();
        }
        // Dropping the slot aborts its running streams.
        self.slots.retain(|slot| slot.id != id);
        debug!(slot = id, "slot removed");
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    AddSlot,
    Slot(usize, SlotMessage),
}

#[derive(Debug, Clone)]
pub enum SlotMessage {
    Input(SlotInput),
    Task { epoch: u64, event: TaskEvent },
    ThumbnailFetched {
        task_id: String,
        thumbnail: Option<ThumbnailRef>,
    },
    PreviewDecoded {
        task_id: String,
        preview: Option<Preview>,
    },
    Channel { epoch: u64, event: ChannelEvent },
    /// (Save path, file URL) for the session started under `epoch`
    SaveTargetChosen {
        epoch: u64,
        path: Option<PathBuf>,
        file_url: String,
    },
    Retrieval(RetrievalEvent),
}

/// One download widget: its own task, thumbnail, formats and channel.
struct Slot {
    id: usize,
    url_input: String,
    status_message: String,
    tasks: TaskClient,
    thumbnails: ThumbnailFetcher,
    preview: Option<Handle>,
    /// The thumbnail lookup finished, with or without an image.
    thumbnail_settled: bool,
    formats: FormatSelector,
    session: DownloadSession,
    poll_handle: Option<task::Handle>,
    channel_handle: Option<task::Handle>,
    retrieval_handle: Option<task::Handle>,
}

impl Slot {
    fn new(id: usize, tasks: TaskClient) -> Self {
        Self {
            id,
            url_input: String::new(),
            status_message: String::new(),
            tasks,
            thumbnails: ThumbnailFetcher::default(),
            preview: None,
            thumbnail_settled: false,
            formats: FormatSelector::default(),
            session: DownloadSession::default(),
            poll_handle: None,
            channel_handle: None,
            retrieval_handle: None,
        }
    }

    fn submitted_url(&self) -> Option<&str> {
        let url = self.url_input.trim();
        is_valid_url(url).then_some(url)
    }

    /// Drop everything derived from the current task.
    fn clear_downstream(&mut self) {
        self.poll_handle = None;
        self.channel_handle = None;
        self.retrieval_handle = None;
        self.thumbnails.reset();
        self.preview = None;
        self.thumbnail_settled = false;
        self.formats = FormatSelector::default();
        self.session.reset();
        self.status_message.clear();
    }

    fn update(
        &mut self,
        message: SlotMessage,
        api_client: &ApiClient,
        retriever: &FileRetriever,
    ) -> Task<SlotMessage> {
        match message {
            SlotMessage::Input(input) => self.handle_input(input, api_client),
            SlotMessage::Task { epoch, event } => {
                if !self.tasks.apply(epoch, event) {
                    return Task::none();
                }
                if self.tasks.phase().is_terminal() {
                    self.poll_handle = None;
                    if let Some(task) = self.tasks.task() {
                        info!(
                            slot = self.id,
                            task_id = %task.id,
                            status = ?task.status,
                            attempts = self.tasks.attempts(),
                            "task settled"
                        );
                    }
                }
                let Some(metadata) = self.tasks.metadata() else {
                    return Task::none();
                };
                let Some(task_id) = self.tasks.task_id().map(str::to_string) else {
                    return Task::none();
                };

                self.formats = FormatSelector::new(metadata);
                if !self.thumbnails.begin(&task_id) {
                    return Task::none();
                }
                let client = api_client.clone();
                Task::perform(
                    fetch_thumbnail(client, task_id.clone()),
                    move |thumbnail| SlotMessage::ThumbnailFetched {
                        task_id: task_id.clone(),
                        thumbnail,
                    },
                )
            }
            SlotMessage::ThumbnailFetched { task_id, thumbnail } => {
                if !self.thumbnails.apply(&task_id, thumbnail) {
                    return Task::none();
                }
                let Some(image_ref) = self.thumbnails.image_ref().map(str::to_string) else {
                    self.thumbnail_settled = true;
                    return Task::none();
                };
                Task::perform(
                    fetch_preview(api_client.clone(), image_ref),
                    move |preview| SlotMessage::PreviewDecoded {
                        task_id: task_id.clone(),
                        preview,
                    },
                )
            }
            SlotMessage::PreviewDecoded { task_id, preview } => {
                if self.tasks.task_id() == Some(task_id.as_str()) {
                    self.thumbnail_settled = true;
                    self.preview = preview
                        .map(|p| Handle::from_rgba(p.width, p.height, p.pixels));
                }
                Task::none()
            }
            SlotMessage::Channel { epoch, event } => {
                if !self.session.apply(epoch, event) {
                    return Task::none();
                }
                let name = self
                    .tasks
                    .metadata()
                    .map(|m| m.name.clone())
                    .unwrap_or_default();
                let Some(retrieval) = self.session.retrieval(api_client.config(), &name) else {
                    return Task::none();
                };

                info!(slot = self.id, file = %retrieval.filename, "download ready, saving");
                self.status_message = format!("Saving {}...", retrieval.filename);
                let retriever = retriever.clone();
                let file_url = retrieval.file_url;
                Task::perform(
                    async move { retriever.target_path(retrieval.filename).await },
                    move |path| SlotMessage::SaveTargetChosen {
                        epoch,
                        path,
                        file_url: file_url.clone(),
                    },
                )
            }
            SlotMessage::SaveTargetChosen {
                epoch,
                path,
                file_url,
            } => {
                if epoch != self.session.epoch() {
                    return Task::none();
                }
                let Some(path) = path else {
                    self.status_message = "Save cancelled".to_string();
                    return Task::none();
                };
                self.status_message = format!("Saving to: {}", path.display());
                let (task, handle) = Task::stream(
                    retriever
                        .retrieve(file_url, path)
                        .map(SlotMessage::Retrieval),
                )
                .abortable();
                self.retrieval_handle = Some(handle.abort_on_drop());
                task
            }
            SlotMessage::Retrieval(event) => {
                match event {
                    RetrievalEvent::Progress(fraction) => {
                        self.status_message = format!("Saving: {:.1}%", fraction * 100.0);
                    }
                    RetrievalEvent::Completed(path) => {
                        self.retrieval_handle = None;
                        self.status_message = format!("Saved: {}", path.display());
                    }
                    RetrievalEvent::Failed(e) => {
                        self.retrieval_handle = None;
                        self.status_message = format!("Download failed: {}", e);
                    }
                }
                Task::none()
            }
        }
    }

    fn handle_input(&mut self, input: SlotInput, api_client: &ApiClient) -> Task<SlotMessage> {
        match input {
            SlotInput::UrlChanged(value) => {
                self.url_input = value;
                let source = self.submitted_url().map(str::to_string);
                if self.tasks.change_source(source.as_deref()) {
                    self.clear_downstream();
                }
                Task::none()
            }
            SlotInput::FindPressed => {
                let Some(url) = self.submitted_url().map(str::to_string) else {
                    return Task::none();
                };
                let Some(plan) = self.tasks.request_task(&url) else {
                    return Task::none();
                };

                let epoch = plan.epoch;
                let events = poll_events(api_client.clone(), plan.start, api_client.config().poll)
                    .map(move |event| SlotMessage::Task { epoch, event });
                let (task, handle) = Task::stream(events).abortable();
                self.poll_handle = Some(handle.abort_on_drop());
                task
            }
            SlotInput::FormatSelected(option) => {
                self.formats.select(&option.id);
                Task::none()
            }
            SlotInput::DownloadPressed => {
                let (Some(task_id), Some(format_id)) = (self.tasks.task_id(), self.formats.selected())
                else {
                    return Task::none();
                };
                let Some(plan) = self.session.start(task_id, format_id) else {
                    return Task::none();
                };

                self.status_message.clear();
                let epoch = plan.epoch;
                let events = progress_events(api_client.config().download_channel_url(), plan.request)
                    .map(move |event| SlotMessage::Channel { epoch, event });
                let (task, handle) = Task::stream(events).abortable();
                self.channel_handle = Some(handle.abort_on_drop());
                task
            }
            // Removal is handled by the list.
            SlotInput::Remove => Task::none(),
        }
    }

    fn view(&self) -> Element<'_, SlotInput> {
        slot_card(self.card())
    }

    fn card(&self) -> SlotCard<'_> {
        let thumbnail = match &self.preview {
            Some(handle) => ThumbnailView::Ready(handle),
            None if self.thumbnail_settled => ThumbnailView::Unavailable,
            None => ThumbnailView::Loading,
        };
        let error = self
            .tasks
            .error()
            .or(self.session.error())
            .map(|e| e.to_string());
        let can_download = self
            .formats
            .selected()
            .is_some_and(|format_id| self.session.can_start(format_id));

        SlotCard {
            url_input: &self.url_input,
            can_submit: self.submitted_url().is_some(),
            loading: self.tasks.is_loading(),
            error,
            metadata: self.tasks.metadata(),
            thumbnail,
            options: self.formats.options(),
            selected: self.formats.selected_option(),
            can_download,
            download_phase: self.session.phase(),
            percent: self.session.progress().percent,
            status_message: &self.status_message,
        }
    }
}

pub fn update(app: &mut DownloadApp, message: Message) -> Task<Message> {
    match message {
        Message::AddSlot => {
            app.add_slot();
            Task::none()
        }
        Message::Slot(id, SlotMessage::Input(SlotInput::Remove)) => {
            app.remove_slot(id);
            Task::none()
        }
        Message::Slot(id, slot_message) => {
            let Some(slot) = app.slots.iter_mut().find(|slot| slot.id == id) else {
                debug!(slot = id, "message for a removed slot");
                return Task::none();
            };
            slot.update(slot_message, &app.api_client, &app.retriever)
                .map(move |m| Message::Slot(id, m))
        }
    }
}

pub fn view(app: &DownloadApp) -> Element<'_, Message> {
    let slots = Column::with_children(app.slots.iter().map(|slot| {
        let id = slot.id;
        slot.view()
            .map(move |input| Message::Slot(id, SlotMessage::Input(input)))
    }))
    .spacing(20);

    scrollable(
        column![
            text("Video Downloader").size(32),
            slots,
            button(text("Add Video"))
                .on_press(Message::AddSlot)
                .padding([10, 20]),
        ]
        .spacing(20)
        .padding(20)
        .width(Length::Fill),
    )
    .into()
}
