//! One tokio task per shared document.
//!
//! The actor owns the [`DocumentSession`] and its buffer. Local actions,
//! inbound frames and disconnect notices all arrive on one command channel,
//! so transitions on a document never interleave. Hashing and diffing large
//! documents runs on the blocking pool, and the actor waits for it before
//! reading the next command.

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::protocol::Message;
use super::session::{DocumentSession, Outcome, Role, SessionEvent};
use super::DocumentId;
use crate::buffer::TextBuffer;
use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorSettings {
    pub command_capacity: usize,
    pub event_capacity: usize,
    pub outbound_capacity: usize,
    /// Documents larger than this are hashed and diffed on `spawn_blocking`.
    pub offload_threshold_bytes: usize,
}

impl Default for ActorSettings {
    fn default() -> Self {
        Self {
            command_capacity: 64,
            event_capacity: 256,
            outbound_capacity: 256,
            offload_threshold_bytes: 256 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalAction {
    Start,
    Commit,
    Cancel,
}

enum Step {
    Local(LocalAction),
    Inbound(Message),
    Disconnect,
}

type Reply<T> = oneshot::Sender<T>;
type BufferFn<B> = Box<dyn FnOnce(&mut B) + Send>;

enum Command<B> {
    Local {
        action: LocalAction,
        reply: Reply<Result<Vec<SessionEvent>, SyncError>>,
    },
    Inbound(Bytes),
    Disconnected,
    Role(Reply<Role>),
    Buffer(BufferFn<B>),
    Shutdown(Reply<B>),
}

struct Core<B> {
    session: DocumentSession,
    buffer: B,
}

impl<B: TextBuffer> Core<B> {
    fn step(&mut self, step: Step) -> Result<Outcome, SyncError> {
        match step {
            Step::Local(LocalAction::Start) => self.session.start_local_edit(&self.buffer),
            Step::Local(LocalAction::Commit) => self.session.commit_local_edit(&self.buffer),
            Step::Local(LocalAction::Cancel) => self.session.cancel_local_edit(),
            Step::Inbound(message) => Ok(self.session.handle(message, &mut self.buffer)),
            Step::Disconnect => Ok(self.session.disconnect(&mut self.buffer)),
        }
    }
}

pub struct SessionActor<B> {
    document_id: DocumentId,
    core: Option<Core<B>>,
    commands: mpsc::Receiver<Command<B>>,
    outbound: mpsc::Sender<Bytes>,
    events: broadcast::Sender<SessionEvent>,
    offload_threshold: usize,
}

impl<B> SessionActor<B>
where
    B: TextBuffer + Send + 'static,
{
    /// Spawn the actor. Frames to send to the peer come out of the returned
    /// receiver, in order.
    pub fn spawn(
        session: DocumentSession,
        buffer: B,
        settings: ActorSettings,
    ) -> (SessionHandle<B>, mpsc::Receiver<Bytes>) {
        let (command_tx, command_rx) = mpsc::channel(settings.command_capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(settings.outbound_capacity.max(1));
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let document_id = session.document_id().clone();

        let actor = SessionActor {
            document_id: document_id.clone(),
            core: Some(Core { session, buffer }),
            commands: command_rx,
            outbound: outbound_tx,
            events: events.clone(),
            offload_threshold: settings.offload_threshold_bytes,
        };
        let task = tokio::spawn(actor.run());

        let handle = SessionHandle {
            document_id,
            commands: command_tx,
            events,
            task: std::sync::Arc::new(std::sync::Mutex::new(Some(task))),
        };
        (handle, outbound_rx)
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Local { action, reply } => {
                    let result = self.transition(Step::Local(action), 0).await;
                    let _ = reply.send(result);
                }
                Command::Inbound(raw) => match Message::decode(&raw) {
                    Ok(message) => {
                        tracing::debug!(document = %self.document_id, %message, "received");
                        let _ = self.transition(Step::Inbound(message), raw.len()).await;
                    }
                    Err(err) => {
                        tracing::warn!(document = %self.document_id, %err, "unparseable frame dropped");
                    }
                },
                Command::Disconnected => {
                    let _ = self.transition(Step::Disconnect, 0).await;
                }
                Command::Role(reply) => {
                    if let Some(core) = &self.core {
                        let _ = reply.send(core.session.role());
                    }
                }
                Command::Buffer(f) => {
                    if let Some(core) = &mut self.core {
                        f(&mut core.buffer);
                    }
                }
                Command::Shutdown(reply) => {
                    if let Some(mut core) = self.core.take() {
                        core.session.disconnect(&mut core.buffer);
                        let _ = reply.send(core.buffer);
                    }
                    break;
                }
            }

            if self.core.is_none() {
                break;
            }
        }
        tracing::debug!(document = %self.document_id, "session actor stopped");
    }

    async fn transition(
        &mut self,
        step: Step,
        payload_len: usize,
    ) -> Result<Vec<SessionEvent>, SyncError> {
        let Some(mut core) = self.core.take() else {
            return Err(SyncError::ActorClosed(self.document_id.to_string()));
        };
        let document_id = self.document_id.clone();

        let result = if core.buffer.len_bytes().max(payload_len) > self.offload_threshold {
            tracing::debug!(document = %document_id, "offloading transition");
            match tokio::task::spawn_blocking(move || {
                let result = core.step(step);
                (core, result)
            })
            .await
            {
                Ok((core, result)) => {
                    self.core = Some(core);
                    result
                }
                Err(err) => {
                    tracing::error!(document = %document_id, %err, "transition task failed, stopping actor");
                    return Err(SyncError::ActorClosed(document_id.to_string()));
                }
            }
        } else {
            let result = core.step(step);
            self.core = Some(core);
            result
        };

        let outcome = result?;
        for message in outcome.outbound {
            if self.outbound.send(message.encode()).await.is_err() {
                tracing::warn!(document = %document_id, token = %message.token(), "send failed, outbound closed");
            }
        }
        for event in &outcome.events {
            let _ = self.events.send(event.clone());
        }
        Ok(outcome.events)
    }
}

/// Cloneable front door to a [`SessionActor`].
pub struct SessionHandle<B> {
    document_id: DocumentId,
    commands: mpsc::Sender<Command<B>>,
    events: broadcast::Sender<SessionEvent>,
    task: std::sync::Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl<B> Clone for SessionHandle<B> {
    fn clone(&self) -> Self {
        Self {
            document_id: self.document_id.clone(),
            commands: self.commands.clone(),
            events: self.events.clone(),
            task: self.task.clone(),
        }
    }
}

impl<B> SessionHandle<B>
where
    B: TextBuffer + Send + 'static,
{
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub async fn start_local_edit(&self) -> Result<Vec<SessionEvent>, SyncError> {
        self.local(LocalAction::Start).await
    }

    pub async fn commit_local_edit(&self) -> Result<Vec<SessionEvent>, SyncError> {
        self.local(LocalAction::Commit).await
    }

    pub async fn cancel_local_edit(&self) -> Result<Vec<SessionEvent>, SyncError> {
        self.local(LocalAction::Cancel).await
    }

    /// Hand a raw frame from the transport to the session.
    pub async fn deliver(&self, raw: Bytes) -> Result<(), SyncError> {
        self.command(Command::Inbound(raw)).await
    }

    pub async fn disconnected(&self) -> Result<(), SyncError> {
        self.command(Command::Disconnected).await
    }

    pub async fn role(&self) -> Result<Role, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Role(reply)).await?;
        rx.await.map_err(|_| self.closed())
    }

    pub async fn text(&self) -> Result<String, SyncError> {
        self.with_buffer(|buffer| buffer.text()).await
    }

    /// Run `f` against the buffer on the actor task, e.g. to apply a local
    /// user edit between `start_local_edit` and `commit_local_edit`.
    pub async fn with_buffer<R, F>(&self, f: F) -> Result<R, SyncError>
    where
        F: FnOnce(&mut B) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let job: BufferFn<B> = Box::new(move |buffer| {
            let _ = reply.send(f(buffer));
        });
        self.command(Command::Buffer(job)).await?;
        rx.await.map_err(|_| self.closed())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Stop the actor and take back the buffer, unlocked.
    pub async fn shutdown(&self) -> Result<B, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Shutdown(reply)).await?;
        let buffer = rx.await.map_err(|_| self.closed())?;

        let task = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(task) = task {
            let _ = task.await;
        }
        Ok(buffer)
    }

    async fn local(&self, action: LocalAction) -> Result<Vec<SessionEvent>, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Local { action, reply }).await?;
        rx.await.map_err(|_| self.closed())?
    }

    async fn command(&self, command: Command<B>) -> Result<(), SyncError> {
        self.commands.send(command).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> SyncError {
        SyncError::ActorClosed(self.document_id.to_string())
    }
}
