//! Event streaming for pipeline runs.
//!
//! [`run_pipeline`] turns a run into a stream of [`StreamEvent`]s: one update
//! per merged stage result, at most one error, and always exactly one
//! [`StreamEvent::Done`] as the final item.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};

use crate::graph::Stage;
use crate::outputs::StoryResult;
use crate::scheduler::Scheduler;
use crate::state::{PipelineState, StageEvent};

const EVENT_BUFFER: usize = 16;

/// Name of the SSE event that closes every stream.
pub const DONE_EVENT: &str = "done";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Update(StageEvent),
    Error { message: String, timestamp: DateTime<Utc> },
    Done,
}

fn iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl StreamEvent {
    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error { message: message.into(), timestamp: Utc::now() }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done)
    }

    /// JSON body of a data event; `None` for the sentinel.
    pub fn data(&self) -> Option<Value> {
        match self {
            StreamEvent::Update(event) => {
                let mut payload = event.payload.clone();
                if event.stage == Stage::Story {
                    attach_display(&mut payload);
                }
                Some(json!({
                    "data": { event.stage.as_str(): payload },
                    "timestamp": iso(&event.timestamp),
                }))
            }
            StreamEvent::Error { message, timestamp } => Some(json!({
                "error": message,
                "timestamp": iso(timestamp),
            })),
            StreamEvent::Done => None,
        }
    }

    /// Server-sent-events wire frame.
    pub fn to_sse_frame(&self) -> String {
        match self.data() {
            Some(body) => format!("data: {body}\n\n"),
            None => format!("event: {DONE_EVENT}\ndata: {{}}\n\n"),
        }
    }
}

/// Add a Markdown rendering of a well-formed story under `display`.
fn attach_display(payload: &mut Value) {
    let Ok(story) = serde_json::from_value::<StoryResult>(payload.clone()) else {
        return;
    };
    if let Some(obj) = payload.as_object_mut() {
        obj.insert("display".to_string(), Value::String(story.to_markdown()));
    }
}

/// Run the pipeline in the background and stream its events.
pub fn run_pipeline(scheduler: Arc<Scheduler>, state: PipelineState) -> impl Stream<Item = StreamEvent> + Send + 'static {
    run_pipeline_until(scheduler, state, std::future::pending::<()>())
}

/// Like [`run_pipeline`], but stops emitting updates once `stop` resolves.
/// Stages already running are not interrupted.
pub fn run_pipeline_until<F>(
    scheduler: Arc<Scheduler>,
    state: PipelineState,
    stop: F,
) -> impl Stream<Item = StreamEvent> + Send + 'static
where
    F: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(drive(scheduler, state, stop, tx));
    // The sentinel follows once the driver drops its sender, however it ended.
    ReceiverStream::new(rx).chain(stream::once(async { StreamEvent::Done }))
}

async fn drive<F>(scheduler: Arc<Scheduler>, state: PipelineState, stop: F, tx: mpsc::Sender<StreamEvent>)
where
    F: Future<Output = ()> + Send + 'static,
{
    let (stage_tx, mut stage_rx) = mpsc::channel::<StageEvent>(EVENT_BUFFER);
    let run = tokio::spawn(async move { scheduler.run(state, stage_tx).await });

    tokio::pin!(stop);
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => {
                info!("Pipeline stream cancelled");
                return;
            }
            next = stage_rx.recv() => match next {
                Some(event) => {
                    debug!(stage = %event.stage, "Emitting stage event");
                    if tx.send(StreamEvent::Update(event)).await.is_err() {
                        info!("Stream consumer disconnected");
                        return;
                    }
                }
                None => break,
            },
        }
    }

    let fault = match run.await {
        Ok(Ok(done)) => {
            debug!(report = ?done.report, "Pipeline stream complete");
            None
        }
        Ok(Err(e)) => Some(e.to_string()),
        Err(e) => Some(format!("Pipeline aborted: {e}")),
    };
    if let Some(message) = fault {
        error!(error = %message, "Pipeline fault");
        let _ = tx.send(StreamEvent::error(message)).await;
    }
}
