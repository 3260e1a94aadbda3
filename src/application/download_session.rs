use std::sync::OnceLock;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::{
    api::{models::ChannelMessage, models::DownloadRequest, ProgressChannel},
    config::ClientConfig,
    domain::{AppError, DownloadPhase, DownloadProgress, ParseError},
    utils::download_filename,
};

/// Parse a percentage such as `"55.5%"` into `55.5`. Anything that is not a
/// plain number in `[0, 100]`, optionally followed by `%`, is rejected.
pub fn parse_percentage(raw: &str) -> Result<f64, ParseError> {
    static PERCENT: OnceLock<Option<Regex>> = OnceLock::new();
    let caps = PERCENT
        .get_or_init(|| Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)\s*%?\s*$").ok())
        .as_ref()
        .and_then(|re| re.captures(raw))
        .ok_or_else(|| ParseError::NotANumber(raw.to_string()))?;
    let value: f64 = caps[1]
        .parse()
        .map_err(|_| ParseError::NotANumber(raw.to_string()))?;

    if !(0.0..=100.0).contains(&value) {
        return Err(ParseError::OutOfRange(value));
    }
    Ok(value)
}

/// Meaning of one server message on the progress channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelUpdate {
    Progress(f64),
    Completed { file_ref: String },
    ServerError(String),
}

pub fn parse_channel_message(text: &str) -> Result<ChannelUpdate, ParseError> {
    let message: ChannelMessage =
        serde_json::from_str(text).map_err(|e| ParseError::InvalidMessage(e.to_string()))?;

    if let Some(progress) = message.progress.as_deref() {
        return parse_percentage(progress).map(ChannelUpdate::Progress);
    }

    match message.status.as_deref() {
        Some("completed") => match message.url {
            Some(file_ref) if !file_ref.is_empty() => Ok(ChannelUpdate::Completed { file_ref }),
            _ => Err(ParseError::InvalidMessage(
                "completed without URL".to_string(),
            )),
        },
        Some("error") => Ok(ChannelUpdate::ServerError(
            message
                .message
                .unwrap_or_else(|| "download failed on the server".to_string()),
        )),
        other => Err(ParseError::InvalidMessage(format!(
            "unexpected status {:?}",
            other
        ))),
    }
}

/// What the channel stream reports to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Message(String),
    Closed(Option<String>),
}

/// Session work the slot must run after `start`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    pub epoch: u64,
    pub request: DownloadRequest,
}

/// File to fetch once the backend finished preparing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub file_url: String,
    pub filename: String,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadSession {
    phase: DownloadPhase,
    format_id: Option<String>,
    progress: DownloadProgress,
    error: Option<AppError>,
    epoch: u64,
}

impl DownloadSession {
    pub fn phase(&self) -> DownloadPhase {
        self.phase
    }

    pub fn progress(&self) -> &DownloadProgress {
        &self.progress
    }

    pub fn error(&self) -> Option<&AppError> {
        self.error.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether `start` would open a channel for `format_id`.
    pub fn can_start(&self, format_id: &str) -> bool {
        match self.phase {
            phase if phase.is_open() => false,
            DownloadPhase::Completed => self.format_id.as_deref() != Some(format_id),
            _ => true,
        }
    }

    pub fn start(&mut self, task_id: &str, format_id: &str) -> Option<SessionPlan> {
        if format_id.is_empty() || !self.can_start(format_id) {
            debug!(%task_id, %format_id, phase = ?self.phase, "download start ignored");
            return None;
        }

        self.epoch += 1;
        self.phase = DownloadPhase::Connecting;
        self.format_id = Some(format_id.to_string());
        self.progress = DownloadProgress::default();
        self.error = None;

        Some(SessionPlan {
            epoch: self.epoch,
            request: DownloadRequest {
                task_id: task_id.to_string(),
                format: format_id.to_string(),
            },
        })
    }

    /// Forget everything; events of the running channel become stale.
    pub fn reset(&mut self) {
        self.epoch += 1;
        self.phase = DownloadPhase::Closed;
        self.format_id = None;
        self.progress = DownloadProgress::default();
        self.error = None;
    }

    /// Apply a channel event. Returns true exactly when the session has just
    /// reached `Completed`.
    pub fn apply(&mut self, epoch: u64, event: ChannelEvent) -> bool {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "dropping stale channel event");
            return false;
        }

        match (self.phase, event) {
            (DownloadPhase::Connecting, ChannelEvent::Connected) => {
                self.phase = DownloadPhase::Streaming;
                false
            }
            (DownloadPhase::Connecting | DownloadPhase::Streaming, ChannelEvent::Message(text)) => {
                self.handle_message(&text)
            }
            (DownloadPhase::Connecting | DownloadPhase::Streaming, ChannelEvent::Closed(reason)) => {
                let reason = reason.unwrap_or_else(|| "closed before completion".to_string());
                warn!(%reason, "progress channel ended early");
                self.phase = DownloadPhase::Closed;
                self.error = Some(AppError::Interrupted(reason));
                false
            }
            (phase, event) => {
                debug!(?phase, ?event, "channel event does not apply in this phase");
                false
            }
        }
    }

    fn handle_message(&mut self, text: &str) -> bool {
        match parse_channel_message(text) {
            Ok(ChannelUpdate::Progress(percent)) => {
                self.phase = DownloadPhase::Streaming;
                if percent > self.progress.percent {
                    self.progress.percent = percent;
                }
                false
            }
            Ok(ChannelUpdate::Completed { file_ref }) => {
                info!(%file_ref, "download ready");
                self.progress.percent = 100.0;
                self.progress.file_ref = Some(file_ref);
                self.phase = DownloadPhase::Completed;
                true
            }
            Ok(ChannelUpdate::ServerError(message)) => {
                warn!(%message, "server aborted the download");
                self.phase = DownloadPhase::Closed;
                self.error = Some(AppError::Interrupted(message));
                false
            }
            Err(e) => {
                warn!(error = %e, %text, "dropping malformed channel message");
                false
            }
        }
    }

    /// Where to fetch the finished file from and what to call it.
    pub fn retrieval(&self, config: &ClientConfig, video_name: &str) -> Option<Retrieval> {
        if self.phase != DownloadPhase::Completed {
            return None;
        }
        let file_ref = self.progress.file_ref.as_deref()?;
        Some(Retrieval {
            file_url: config.resolve(file_ref),
            filename: download_filename(video_name, file_ref),
        })
    }
}

enum ChannelRuntimeState {
    Connect {
        endpoint: String,
        request: DownloadRequest,
    },
    Streaming {
        channel: ProgressChannel,
    },
    Finished,
}

/// Open the progress channel and report everything it carries. After the
/// completion message the client closes the channel itself; it never
/// reconnects.
pub fn progress_events(endpoint: String, request: DownloadRequest) -> BoxStream<'static, ChannelEvent> {
    stream::unfold(
        ChannelRuntimeState::Connect { endpoint, request },
        |state| async move {
            match state {
                ChannelRuntimeState::Connect { endpoint, request } => {
                    match ProgressChannel::open(&endpoint, &request).await {
                        Ok(channel) => Some((
                            ChannelEvent::Connected,
                            ChannelRuntimeState::Streaming { channel },
                        )),
                        Err(e) => Some((
                            ChannelEvent::Closed(Some(e.to_string())),
                            ChannelRuntimeState::Finished,
                        )),
                    }
                }
                ChannelRuntimeState::Streaming { mut channel } => match channel.next_text().await {
                    Some(Ok(text)) => {
                        if matches!(
                            parse_channel_message(&text),
                            Ok(ChannelUpdate::Completed { .. }) | Ok(ChannelUpdate::ServerError(_))
                        ) {
                            if let Err(e) = channel.close().await {
                                debug!(error = %e, "closing progress channel failed");
                            }
                            return Some((ChannelEvent::Message(text), ChannelRuntimeState::Finished));
                        }
                        Some((
                            ChannelEvent::Message(text),
                            ChannelRuntimeState::Streaming { channel },
                        ))
                    }
                    Some(Err(e)) => Some((
                        ChannelEvent::Closed(Some(e.to_string())),
                        ChannelRuntimeState::Finished,
                    )),
                    None => Some((ChannelEvent::Closed(None), ChannelRuntimeState::Finished)),
                },
                ChannelRuntimeState::Finished => None,
            }
        },
    )
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    fn started() -> (DownloadSession, SessionPlan) {
        let mut session = DownloadSession::default();
        let plan = session.start("task-1", "137").unwrap();
        session.apply(plan.epoch, ChannelEvent::Connected);
        (session, plan)
    }

    fn message(text: &str) -> ChannelEvent {
        ChannelEvent::Message(text.to_string())
    }

    #[test]
    fn test_parse_percentage() {
        assert_eq!(parse_percentage("55.5%").unwrap(), 55.5);
        assert_eq!(parse_percentage(" 10% ").unwrap(), 10.0);
        assert_eq!(parse_percentage("100").unwrap(), 100.0);
        assert!(matches!(
            parse_percentage("abc%"),
            Err(ParseError::NotANumber(_))
        ));
        assert!(matches!(parse_percentage(""), Err(ParseError::NotANumber(_))));
        assert!(matches!(
            parse_percentage("12.5.1%"),
            Err(ParseError::NotANumber(_))
        ));
        assert!(matches!(
            parse_percentage("150%"),
            Err(ParseError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_progress_then_completion() {
        let (mut session, plan) = started();
        let config = ClientConfig::default();

        assert!(!session.apply(plan.epoch, message(r#"{"progress":"10%"}"#)));
        assert_eq!(session.progress().percent, 10.0);
        assert!(!session.apply(plan.epoch, message(r#"{"status":"downloading","progress":"55.5%"}"#)));
        assert_eq!(session.progress().percent, 55.5);
        assert!(session.apply(
            plan.epoch,
            message(r#"{"status":"completed","URL":"/files/a.mp4"}"#)
        ));

        assert_eq!(session.phase(), DownloadPhase::Completed);
        assert_eq!(session.progress().percent, 100.0);
        let retrieval = session.retrieval(&config, "My Clip").unwrap();
        assert_eq!(retrieval.file_url, "http://127.0.0.1:8000/files/a.mp4");
        assert!(retrieval.filename.ends_with(".mp4"));
        assert_eq!(retrieval.filename, "My Clip.mp4");
    }

    #[test]
    fn test_percent_never_decreases() {
        let (mut session, plan) = started();
        session.apply(plan.epoch, message(r#"{"progress":"40%"}"#));
        session.apply(plan.epoch, message(r#"{"progress":"20%"}"#));
        assert_eq!(session.progress().percent, 40.0);
    }

    #[test]
    fn test_malformed_messages_are_dropped() {
        let (mut session, plan) = started();
        session.apply(plan.epoch, message(r#"{"progress":"30%"}"#));

        for bad in [
            "not json",
            r#"{"progress":"NaN%"}"#,
            r#"{"status":"completed"}"#,
            r#"{"status":"queued"}"#,
        ] {
            assert!(!session.apply(plan.epoch, message(bad)));
        }

        assert_eq!(session.phase(), DownloadPhase::Streaming);
        assert_eq!(session.progress().percent, 30.0);
        assert!(session.error().is_none());
    }

    #[test]
    fn test_duplicate_start_is_refused() {
        let (mut session, _) = started();
        assert!(session.start("task-1", "137").is_none());
        assert!(session.start("task-1", "22").is_none());
    }

    #[test]
    fn test_restart_after_completion_needs_other_format() {
        let (mut session, plan) = started();
        session.apply(
            plan.epoch,
            message(r#"{"status":"completed","URL":"/files/a.mp4"}"#),
        );
        assert!(session.start("task-1", "137").is_none());

        let plan = session.start("task-1", "22").unwrap();
        assert_eq!(session.phase(), DownloadPhase::Connecting);
        assert_eq!(session.progress().percent, 0.0);
        assert_eq!(plan.request.format, "22");
    }

    #[test]
    fn test_early_close_returns_to_closed() {
        let (mut session, plan) = started();
        session.apply(plan.epoch, ChannelEvent::Closed(None));
        assert_eq!(session.phase(), DownloadPhase::Closed);
        assert!(matches!(session.error(), Some(AppError::Interrupted(_))));
        assert!(session.start("task-1", "137").is_some());
    }

    #[test]
    fn test_server_error_message() {
        let (mut session, plan) = started();
        session.apply(
            plan.epoch,
            message(r#"{"status":"error","message":"Invalid task ID/Too soon to make a request."}"#),
        );
        assert_eq!(session.phase(), DownloadPhase::Closed);
        assert_eq!(
            session.error(),
            Some(&AppError::Interrupted(
                "Invalid task ID/Too soon to make a request.".to_string()
            ))
        );
    }

    #[test]
    fn test_reset_makes_events_stale() {
        let (mut session, plan) = started();
        session.reset();
        assert!(!session.apply(plan.epoch, message(r#"{"progress":"50%"}"#)));
        assert_eq!(session.progress().percent, 0.0);
        assert_eq!(session.phase(), DownloadPhase::Closed);
    }

    #[tokio::test]
    async fn test_channel_round_trip_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            let first = ws.next().await.unwrap().unwrap();
            let request: DownloadRequest = serde_json::from_str(first.to_text().unwrap()).unwrap();

            for text in [
                r#"{"status":"downloading","progress":"10%"}"#,
                "garbage",
                r#"{"status":"downloading","progress":"55.5%"}"#,
                r#"{"status":"completed","message":"Video download finished!","URL":"/files/a.mp4"}"#,
            ] {
                ws.send(Message::Text(text.to_string())).await.unwrap();
            }

            let mut client_closed = false;
            while let Some(Ok(frame)) = ws.next().await {
                if frame.is_close() {
                    client_closed = true;
                    break;
                }
            }
            (request, client_closed)
        });

        let mut session = DownloadSession::default();
        let plan = session.start("task-1", "137").unwrap();
        let endpoint = format!("ws://{}/video/download", addr);

        let events: Vec<ChannelEvent> = progress_events(endpoint, plan.request.clone())
            .collect()
            .await;
        let mut completions = 0;
        for event in events {
            if session.apply(plan.epoch, event) {
                completions += 1;
            }
        }

        let (received, client_closed) = server.await.unwrap();
        assert_eq!(received, plan.request);
        assert!(client_closed);
        assert_eq!(completions, 1);
        assert_eq!(session.phase(), DownloadPhase::Completed);
        assert_eq!(session.progress().percent, 100.0);
        assert_eq!(session.progress().file_ref.as_deref(), Some("/files/a.mp4"));
    }

    #[tokio::test]
    async fn test_unreachable_channel_closes_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut session = DownloadSession::default();
        let plan = session.start("task-1", "137").unwrap();
        let events: Vec<ChannelEvent> =
            progress_events(format!("ws://{}/video/download", addr), plan.request)
                .collect()
                .await;

        assert!(matches!(events.as_slice(), [ChannelEvent::Closed(Some(_))]));
        for event in events {
            session.apply(plan.epoch, event);
        }
        assert_eq!(session.phase(), DownloadPhase::Closed);
    }
}
