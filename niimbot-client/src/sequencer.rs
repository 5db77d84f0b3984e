//! Single-flight command sequencing.
//!
//! One actor task owns the channel, the FIFO queue and the command that is
//! currently on the wire. Callers, the link reader and cleanup all talk to
//! it through one event channel, so queue state is only ever touched by the
//! actor.
//!
//! ```text
//!  enqueue ──┐
//!  inbound ──┼──► events ──► actor ──► channel.write
//!  cleanup ──┘                 │
//!                              └──► oneshot reply per command
//! ```
//!
//! At most one job is active at a time: either a command awaiting its
//! acknowledgement, or a burst of image rows being streamed out.

use crate::channel::Channel;
use crate::error::PrinterError;
use bytes::Bytes;
use niimbot_protocol::{Frame, ProtocolError, Request, ERROR_RESPONSE_TYPE};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

type Reply<T> = oneshot::Sender<Result<T, PrinterError>>;

enum Event {
    Submit(Job),
    Inbound(Bytes),
    Disconnected,
    Cleanup { done: oneshot::Sender<()> },
}

enum Job {
    Command(PendingCommand),
    Lines(LineBurst),
}

impl Job {
    fn fail(self, err: impl Fn() -> PrinterError) {
        match self {
            Job::Command(command) => command.complete(Err(err())),
            Job::Lines(burst) => {
                let _ = burst.done.send(Err(err()));
            }
        }
    }
}

struct PendingCommand {
    id: u64,
    request: Request,
    reply: Reply<Bytes>,
}

impl PendingCommand {
    fn operation(&self) -> &'static str {
        self.request.code.name()
    }

    fn complete(self, result: Result<Bytes, PrinterError>) {
        if let Err(ref e) = result {
            tracing::debug!(id = self.id, op = self.operation(), error = %e, "Command failed");
        }
        // The caller may have given up already
        let _ = self.reply.send(result);
    }

    /// Matches an inbound frame against the expected acknowledgement.
    fn classify(&self, frame: Frame) -> Result<Bytes, PrinterError> {
        let expected = self.request.response_type();
        match frame.frame_type {
            t if t == expected => Ok(frame.payload),
            ERROR_RESPONSE_TYPE => Err(PrinterError::CommandFailed(format!(
                "printer rejected {} ({})",
                self.request.code,
                hex::encode(&frame.payload)
            ))),
            0 => Err(PrinterError::parsing(
                self.operation(),
                "unexpected status 0",
                &frame.payload,
            )),
            other => Err(PrinterError::parsing(
                self.operation(),
                format!(
                    "response type mismatch: got {:#04x}, expected {:#04x}",
                    other, expected
                ),
                &frame.payload,
            )),
        }
    }
}

struct LineBurst {
    frames: Vec<Bytes>,
    delay: Duration,
    done: Reply<()>,
}

enum Active {
    Awaiting {
        command: PendingCommand,
        deadline: Instant,
    },
    Streaming {
        burst: LineBurst,
        next: usize,
        resume_at: Instant,
    },
}

impl Active {
    fn deadline(&self) -> Instant {
        match self {
            Active::Awaiting { deadline, .. } => *deadline,
            Active::Streaming { resume_at, .. } => *resume_at,
        }
    }
}

/// Result of a queued command. Resolves to the acknowledgement payload.
pub struct CommandHandle {
    rx: oneshot::Receiver<Result<Bytes, PrinterError>>,
}

impl Future for CommandHandle {
    type Output = Result<Bytes, PrinterError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(PrinterError::Disconnected)))
    }
}

/// Handle for submitting work to the sequencer actor.
///
/// Clones share the same actor. The actor stops after [`cleanup`], after
/// a disconnect is reported through the [`InboundSink`], or once every
/// handle is dropped.
///
/// [`cleanup`]: Sequencer::cleanup
#[derive(Clone)]
pub struct Sequencer {
    events: mpsc::UnboundedSender<Event>,
    next_id: Arc<AtomicU64>,
}

impl Sequencer {
    /// Starts the actor on the current tokio runtime.
    pub fn spawn<C: Channel + 'static>(channel: C, response_timeout: Duration) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        let actor = Actor {
            channel,
            response_timeout,
            events: rx,
            queue: VecDeque::new(),
            active: None,
        };
        tokio::spawn(actor.run());

        Self {
            events,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Appends a command to the queue.
    ///
    /// The command is on its way as soon as this returns; awaiting the
    /// handle only waits for the outcome. Dropping the handle before the
    /// command is dispatched withdraws it.
    ///
    /// Requests the printer never answers are refused; stream those with
    /// [`Sequencer::send_lines`].
    pub fn enqueue(&self, request: Request) -> Result<CommandHandle, PrinterError> {
        if !request.code.expects_response() {
            return Err(PrinterError::InvalidArgument(format!(
                "{} has no acknowledgement, send it as a line burst",
                request.code
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();

        tracing::debug!(id, op = request.code.name(), "Enqueuing command");
        self.events
            .send(Event::Submit(Job::Command(PendingCommand {
                id,
                request,
                reply,
            })))
            .map_err(|_| PrinterError::NotConnected)?;

        Ok(CommandHandle { rx })
    }

    /// Sends a command and waits for its acknowledgement payload.
    pub async fn send(&self, request: Request) -> Result<Bytes, PrinterError> {
        self.enqueue(request)?.await
    }

    /// Streams encoded frames without waiting for replies.
    ///
    /// The burst takes its turn in the queue like a command and nothing else
    /// is written until the last frame is out. `delay` is slept after every
    /// frame but the last.
    pub async fn send_lines(&self, frames: Vec<Bytes>, delay: Duration) -> Result<(), PrinterError> {
        let (done, rx) = oneshot::channel();

        tracing::debug!(count = frames.len(), "Enqueuing line burst");
        self.events
            .send(Event::Submit(Job::Lines(LineBurst {
                frames,
                delay,
                done,
            })))
            .map_err(|_| PrinterError::NotConnected)?;

        rx.await.unwrap_or(Err(PrinterError::Disconnected))
    }

    /// Returns a sink for bytes received from the printer.
    pub fn inbound_sink(&self) -> InboundSink {
        InboundSink {
            events: self.events.downgrade(),
        }
    }

    /// Fails every queued and in-flight command with
    /// [`PrinterError::Disconnected`] and stops the actor.
    ///
    /// Safe to call repeatedly or after the actor has already stopped.
    pub async fn cleanup(&self) {
        let (done, rx) = oneshot::channel();
        if self.events.send(Event::Cleanup { done }).is_err() {
            return;
        }
        let _ = rx.await;
    }

    /// Returns whether the actor is still accepting work.
    pub fn is_running(&self) -> bool {
        !self.events.is_closed()
    }
}

/// Entry point for bytes arriving from the link.
///
/// Holds no strong reference to the engine; once the sequencer stops,
/// deliveries are dropped.
#[derive(Clone)]
pub struct InboundSink {
    events: mpsc::WeakUnboundedSender<Event>,
}

impl InboundSink {
    /// Hands one candidate frame to the sequencer.
    ///
    /// Returns `false` once the sequencer has stopped.
    pub fn deliver(&self, frame: Bytes) -> bool {
        self.send(Event::Inbound(frame))
    }

    /// Reports that the link went away.
    pub fn disconnected(&self) {
        self.send(Event::Disconnected);
    }

    fn send(&self, event: Event) -> bool {
        match self.events.upgrade() {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }
}

struct Actor<C> {
    channel: C,
    response_timeout: Duration,
    events: mpsc::UnboundedReceiver<Event>,
    queue: VecDeque<Job>,
    active: Option<Active>,
}

impl<C: Channel> Actor<C> {
    async fn run(mut self) {
        tracing::debug!("Sequencer started");

        loop {
            let deadline = self.active.as_ref().map(Active::deadline);

            tokio::select! {
                event = self.events.recv() => match event {
                    Some(Event::Submit(job)) => self.queue.push_back(job),
                    Some(Event::Inbound(raw)) => self.on_inbound(raw),
                    Some(Event::Disconnected) => {
                        tracing::info!("Printer link disconnected");
                        self.shutdown();
                        break;
                    }
                    Some(Event::Cleanup { done }) => {
                        self.shutdown();
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                _ = expire(deadline) => self.on_deadline().await,
            }

            self.dispatch().await;
        }

        tracing::debug!("Sequencer stopped");
    }

    /// Starts queued jobs while nothing is active.
    async fn dispatch(&mut self) {
        while self.active.is_none() {
            let Some(job) = self.queue.pop_front() else {
                return;
            };

            match job {
                Job::Command(command) => self.dispatch_command(command).await,
                Job::Lines(burst) => {
                    if burst.frames.is_empty() {
                        let _ = burst.done.send(Ok(()));
                        continue;
                    }
                    self.active = Some(Active::Streaming {
                        burst,
                        next: 0,
                        resume_at: Instant::now(),
                    });
                }
            }
        }
    }

    async fn dispatch_command(&mut self, command: PendingCommand) {
        if command.reply.is_closed() {
            tracing::debug!(id = command.id, op = command.operation(), "Skipping abandoned command");
            return;
        }

        let encoded = match command.request.encode() {
            Ok(encoded) => encoded.freeze(),
            Err(e) => {
                command.complete(Err(e.into()));
                return;
            }
        };

        tracing::debug!(
            id = command.id,
            op = command.operation(),
            bytes = %hex::encode(&encoded),
            "Dispatching command"
        );

        if let Err(e) = self.channel.write(encoded, true).await {
            command.complete(Err(e));
            return;
        }

        self.active = Some(Active::Awaiting {
            command,
            deadline: Instant::now() + self.response_timeout,
        });
    }

    fn on_inbound(&mut self, raw: Bytes) {
        let command = match self.active.take() {
            Some(Active::Awaiting { command, .. }) => command,
            other => {
                self.active = other;
                tracing::debug!(
                    bytes = %hex::encode(&raw),
                    "Discarding frame with no command awaiting a response"
                );
                return;
            }
        };

        let result = match Frame::decode(&raw) {
            Ok(frame) => command.classify(frame),
            Err(ProtocolError::MalformedFrame { defect, bytes }) => Err(PrinterError::parsing(
                command.operation(),
                defect.to_string(),
                &bytes,
            )),
            Err(e) => Err(e.into()),
        };

        if result.is_ok() {
            tracing::debug!(id = command.id, op = command.operation(), "Command acknowledged");
        } else {
            tracing::warn!(
                id = command.id,
                op = command.operation(),
                bytes = %hex::encode(&raw),
                "Unexpected response"
            );
        }
        command.complete(result);
    }

    async fn on_deadline(&mut self) {
        match self.active.take() {
            Some(Active::Awaiting { command, .. }) => {
                tracing::warn!(
                    id = command.id,
                    op = command.operation(),
                    timeout_ms = self.response_timeout.as_millis() as u64,
                    "Command timed out"
                );
                command.complete(Err(PrinterError::ResponseTimeout));
            }
            Some(Active::Streaming { burst, next, .. }) => self.stream_line(burst, next).await,
            None => {}
        }
    }

    async fn stream_line(&mut self, burst: LineBurst, index: usize) {
        let frame = burst.frames[index].clone();
        if let Err(e) = self.channel.write(frame, false).await {
            tracing::warn!(row = index, error = %e, "Line write failed");
            let _ = burst.done.send(Err(e));
            return;
        }

        let next = index + 1;
        if next == burst.frames.len() {
            tracing::debug!(count = next, "Line burst complete");
            let _ = burst.done.send(Ok(()));
            return;
        }

        self.active = Some(Active::Streaming {
            resume_at: Instant::now() + burst.delay,
            burst,
            next,
        });
    }

    /// Fails all outstanding work and refuses anything submitted later.
    fn shutdown(&mut self) {
        self.events.close();

        let mut failed = 0usize;
        match self.active.take() {
            Some(Active::Awaiting { command, .. }) => {
                command.complete(Err(PrinterError::Disconnected));
                failed += 1;
            }
            Some(Active::Streaming { burst, .. }) => {
                let _ = burst.done.send(Err(PrinterError::Disconnected));
                failed += 1;
            }
            None => {}
        }

        for job in self.queue.drain(..) {
            job.fail(|| PrinterError::Disconnected);
            failed += 1;
        }

        // Submissions that raced with the close
        while let Ok(event) = self.events.try_recv() {
            match event {
                Event::Submit(job) => {
                    job.fail(|| PrinterError::Disconnected);
                    failed += 1;
                }
                Event::Cleanup { done } => {
                    let _ = done.send(());
                }
                Event::Inbound(_) | Event::Disconnected => {}
            }
        }

        tracing::info!(failed, "Sequencer cleaned up");
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
