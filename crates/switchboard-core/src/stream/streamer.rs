//! EventStreamer: turns trace notices into client events.
//!
//! One streamer serves one client connection for one top-level run. It
//! yields events until the root run's `done`. If the hub detached it
//! (client too slow, or gone), it yields one final `error` event so a
//! client that is still reading always sees a terminal event.
//!
//! `replay` rebuilds the same sequence from persisted runs and steps.

use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use switchboard_types::event::RunEvent;
use switchboard_types::run::Run;
use switchboard_types::step::{Step, StepPayload};

use crate::ledger::TraceNotice;

/// Message of the final event sent to a detached stream.
pub const DETACHED_MESSAGE: &str = "event stream detached";

pub struct EventStreamer {
    root_run_id: Uuid,
    rx: mpsc::Receiver<TraceNotice>,
    ended: bool,
}

impl EventStreamer {
    pub fn new(root_run_id: Uuid, rx: mpsc::Receiver<TraceNotice>) -> Self {
        Self {
            root_run_id,
            rx,
            ended: false,
        }
    }

    pub fn root_run_id(&self) -> Uuid {
        self.root_run_id
    }

    /// Next outbound event, or `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        if self.ended {
            return None;
        }
        match self.rx.recv().await {
            Some(notice) => {
                let event = Self::translate(&notice);
                if matches!(event, RunEvent::Done { run_id, .. } if run_id == self.root_run_id) {
                    self.ended = true;
                }
                Some(event)
            }
            None => {
                debug!(root_run_id = %self.root_run_id, "stream detached before run end");
                self.ended = true;
                Some(RunEvent::Error {
                    run_id: self.root_run_id,
                    message: DETACHED_MESSAGE.to_string(),
                })
            }
        }
    }

    /// Consume the streamer as a `Stream` of events.
    pub fn into_stream(self) -> impl Stream<Item = RunEvent> + Send + 'static {
        async_stream::stream! {
            let mut streamer = self;
            while let Some(event) = streamer.next_event().await {
                yield event;
            }
        }
    }

    /// Map one notice to its outbound event.
    pub fn translate(notice: &TraceNotice) -> RunEvent {
        match notice {
            TraceNotice::Appended(step) => Self::event_for_step(step),
            TraceNotice::Finished { run_id, status } => RunEvent::Done {
                run_id: *run_id,
                status: *status,
            },
        }
    }

    /// `model_call -> token`, `error -> error`, everything else `trace`.
    pub fn event_for_step(step: &Step) -> RunEvent {
        match &step.payload {
            StepPayload::ModelCall { text } => RunEvent::Token {
                run_id: step.run_id,
                text: text.clone(),
            },
            StepPayload::Error { message } => RunEvent::Error {
                run_id: step.run_id,
                message: message.clone(),
            },
            StepPayload::ToolCall(_)
            | StepPayload::ToolCallResult(_)
            | StepPayload::Handoff(_) => RunEvent::Trace {
                run_id: step.run_id,
                step: step.clone(),
            },
        }
    }

    /// Events of a single run from its persisted steps.
    ///
    /// A terminal run ends with its `done` event.
    pub fn replay(run: &Run, steps: &[Step]) -> Vec<RunEvent> {
        let mut events: Vec<RunEvent> = steps.iter().map(Self::event_for_step).collect();
        if run.is_terminal() {
            events.push(RunEvent::Done {
                run_id: run.id,
                status: run.status,
            });
        }
        events
    }

    /// Events of a run and its handoff sub-runs, in live order: each
    /// child's events follow the parent's `handoff` step that started it.
    pub fn replay_tree(trace: &RunTrace) -> Vec<RunEvent> {
        let mut events = Vec::new();
        Self::replay_into(trace, &mut events);
        events
    }

    fn replay_into(trace: &RunTrace, events: &mut Vec<RunEvent>) {
        for step in &trace.steps {
            events.push(Self::event_for_step(step));
            if let StepPayload::Handoff(record) = &step.payload {
                if let Some(child) = trace.children.iter().find(|c| c.run.id == record.child_run_id) {
                    Self::replay_into(child, events);
                }
            }
        }
        if trace.run.is_terminal() {
            events.push(RunEvent::Done {
                run_id: trace.run.id,
                status: trace.run.status,
            });
        }
    }
}

/// A persisted run with its steps and its handoff sub-runs.
#[derive(Debug, Clone)]
pub struct RunTrace {
    pub run: Run,
    pub steps: Vec<Step>,
    pub children: Vec<RunTrace>,
}
