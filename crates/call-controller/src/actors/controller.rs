//! `CallControllerActor` - owns the roster and drives the control protocol.
//!
//! The actor is the single writer of call state. Four inputs are serialized
//! through its `tokio::select!` loop:
//!
//! - control-channel messages and stream-channel events from the [`PubSub`]
//! - session and lifecycle events from the [`CallTransport`]
//! - API requests from [`CallControllerHandle`]
//! - cancellation
//!
//! Inbound events are drained before API requests, so a request observes
//! every event that was queued before it.
//!
//! Publish failures are logged and counted, never retried or surfaced: the
//! roster is not rolled back and the protocol converges through later
//! session-close events.

use super::hooks::{Hook, Hooks};
use super::messages::{CallMessage, CallState, DialOutcome};
use super::metrics::MailboxMonitor;
use crate::engine::{ControlEngine, Effect};
use crate::errors::CallError;
use crate::observability;
use crate::presence;
use crate::protocol::{
    control_channel, decode, stream_channel, AudioState, ControlMessage, Inbound, Mode,
    VideoState, STREAM_SUFFIX,
};
use crate::roster::{Participant, Roster};
use crate::transport::{
    CallEvent, CallTransport, ChannelEvent, IceProvider, IceServer, PresenceEvent, PubSub,
    SessionRef, TrackKind,
};

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// Channel buffer size for the controller mailbox.
const CONTROLLER_CHANNEL_BUFFER: usize = 256;

/// Channel buffer size for pub/sub events.
const CHANNEL_EVENT_BUFFER: usize = 256;

/// Suggested buffer size for the call-event channel handed to [`CallControllerActor::spawn`].
pub const CALL_EVENT_BUFFER: usize = 256;

/// Handle to a `CallControllerActor`.
#[derive(Clone)]
pub struct CallControllerHandle {
    sender: mpsc::Sender<CallMessage>,
    /// Shared with the actor: handles enqueue, the actor dequeues.
    mailbox: Arc<MailboxMonitor>,
    cancel_token: CancellationToken,
    pubsub: Arc<dyn PubSub>,
    local_number: String,
}

impl CallControllerHandle {
    /// Number of the local peer.
    #[must_use]
    pub fn local_number(&self) -> &str {
        &self.local_number
    }

    /// Fetch ICE servers and dial `number`.
    ///
    /// # Errors
    ///
    /// `CallError::IceCredentials` when the credential fetch fails, in which
    /// case nothing is dialed. `CallError::InvalidArgument` for an empty number.
    pub async fn dial(&self, number: &str) -> Result<DialOutcome, CallError> {
        let number = require_number(number)?;
        self.request(|respond_to| CallMessage::Dial { number, respond_to })
            .await?
    }

    /// Hang up `number`, or everyone when `None`, and tell the affected peers.
    pub async fn hangup(&self, number: Option<&str>) -> Result<(), CallError> {
        let number = number.map(require_number).transpose()?;
        self.request(|respond_to| CallMessage::Hangup { number, respond_to })
            .await
    }

    /// Flip every local audio track and broadcast the new state.
    ///
    /// Returns the resulting enabled flag (`false` when there are no tracks).
    pub async fn toggle_audio(&self) -> Result<bool, CallError> {
        self.request(|respond_to| CallMessage::ToggleAudio { respond_to })
            .await
    }

    /// Flip every local video track and broadcast the new state.
    pub async fn toggle_video(&self) -> Result<bool, CallError> {
        self.request(|respond_to| CallMessage::ToggleVideo { respond_to })
            .await
    }

    /// Open the local stream channel for viewers.
    pub async fn stream(&self) -> Result<(), CallError> {
        self.request(|respond_to| CallMessage::JoinStream {
            name: None,
            announce: false,
            respond_to,
        })
        .await
    }

    /// Subscribe to `name`'s stream channel (own when `None`).
    ///
    /// With a name, also sends `userJoin` to that peer's control channel so the
    /// broadcaster learns of the new viewer.
    pub async fn join_stream(&self, name: Option<&str>) -> Result<(), CallError> {
        let name = name.map(require_number).transpose()?;
        let announce = name.is_some();
        self.request(|respond_to| CallMessage::JoinStream {
            name,
            announce,
            respond_to,
        })
        .await
    }

    /// Unsubscribe from `name`'s stream channel (own when `None`).
    pub async fn leave_stream(&self, name: Option<&str>) -> Result<(), CallError> {
        let name = name.map(require_number).transpose()?;
        self.request(|respond_to| CallMessage::LeaveStream { name, respond_to })
            .await
    }

    /// Send application data.
    ///
    /// In oneway mode the message goes to the active stream channel and is
    /// dropped when there is none. Otherwise it takes the call transport's
    /// data path to `number` (everyone when `None`).
    pub async fn send(&self, message: Value, number: Option<&str>) -> Result<(), CallError> {
        let number = number.map(str::to_string);
        self.request(|respond_to| CallMessage::Send {
            message,
            number,
            respond_to,
        })
        .await
    }

    /// True when someone is subscribed to the `number` channel.
    ///
    /// Transport failures resolve to `false`.
    pub async fn is_online(&self, number: &str) -> bool {
        presence::is_online(self.pubsub.as_ref(), number).await
    }

    /// True when someone is subscribed to `number`'s stream channel.
    pub async fn is_streaming(&self, number: &str) -> bool {
        presence::is_streaming(self.pubsub.as_ref(), number).await
    }

    pub async fn on_ready<F>(&self, callback: F) -> Result<(), CallError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register(Hook::Ready(Box::new(callback))).await
    }

    pub async fn on_unable<F>(&self, callback: F) -> Result<(), CallError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register(Hook::Unable(Box::new(callback))).await
    }

    /// Called for every session event, after the roster has been updated.
    pub async fn on_receive<F>(&self, callback: F) -> Result<(), CallError>
    where
        F: Fn(&SessionRef) + Send + Sync + 'static,
    {
        self.register(Hook::Receive(Box::new(callback))).await
    }

    pub async fn on_video_toggled<F>(&self, callback: F) -> Result<(), CallError>
    where
        F: Fn(&Participant, bool) + Send + Sync + 'static,
    {
        self.register(Hook::VideoToggled(Box::new(callback))).await
    }

    pub async fn on_audio_toggled<F>(&self, callback: F) -> Result<(), CallError>
    where
        F: Fn(&Participant, bool) + Send + Sync + 'static,
    {
        self.register(Hook::AudioToggled(Box::new(callback))).await
    }

    pub async fn on_stream_presence<F>(&self, callback: F) -> Result<(), CallError>
    where
        F: Fn(&PresenceEvent) + Send + Sync + 'static,
    {
        self.register(Hook::StreamPresence(Box::new(callback))).await
    }

    pub async fn on_stream_message<F>(&self, callback: F) -> Result<(), CallError>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.register(Hook::StreamMessage(Box::new(callback))).await
    }

    /// Snapshot of the roster and stream state.
    pub async fn get_state(&self) -> Result<CallState, CallError> {
        self.request(|respond_to| CallMessage::GetState { respond_to })
            .await
    }

    /// Cancel the actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn register(&self, hook: Hook) -> Result<(), CallError> {
        self.request(|respond_to| CallMessage::RegisterHook { hook, respond_to })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> CallMessage,
    ) -> Result<T, CallError> {
        if self.cancel_token.is_cancelled() {
            return Err(CallError::Shutdown);
        }

        let (tx, rx) = oneshot::channel();
        self.mailbox.record_enqueue();
        if let Err(e) = self.sender.send(build(tx)).await {
            self.mailbox.record_rejected();
            return Err(CallError::Internal(format!("channel send failed: {e}")));
        }

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))
    }
}

fn require_number(number: &str) -> Result<String, CallError> {
    let number = number.trim();
    if number.is_empty() {
        return Err(CallError::InvalidArgument(
            "number must not be empty".to_string(),
        ));
    }
    Ok(number.to_string())
}

/// The `CallControllerActor` implementation.
pub struct CallControllerActor {
    /// Local peer number.
    local_number: String,
    /// `<local>-ctrl`.
    control_channel: String,
    /// API requests from handles.
    receiver: mpsc::Receiver<CallMessage>,
    /// Pub/sub events for every channel this actor subscribed to.
    channel_events: mpsc::Receiver<ChannelEvent>,
    /// Sink handed to the pub/sub adapter on subscribe.
    channel_sink: mpsc::Sender<ChannelEvent>,
    /// Session and lifecycle events from the call transport.
    call_events: mpsc::Receiver<CallEvent>,
    call_events_open: bool,
    cancel_token: CancellationToken,
    pubsub: Arc<dyn PubSub>,
    call: Arc<dyn CallTransport>,
    ice: Arc<dyn IceProvider>,
    engine: ControlEngine,
    roster: Roster,
    hooks: Hooks,
    /// Stream channel confirmed by the transport, if any.
    stream_name: Option<String>,
    mailbox: Arc<MailboxMonitor>,
}

impl CallControllerActor {
    /// Spawn the controller actor.
    ///
    /// Returns a handle and the task join handle.
    ///
    /// # Arguments
    ///
    /// * `call` - Call transport; its `local_number` identifies this peer
    /// * `pubsub` - Pub/sub transport for control and stream channels
    /// * `ice` - ICE server source used by every `dial`
    /// * `mode` - Call topology, fixed for the actor's lifetime
    /// * `call_events` - Receiving end of the channel the call transport emits on
    /// * `cancel_token` - Cancellation token
    pub fn spawn(
        call: Arc<dyn CallTransport>,
        pubsub: Arc<dyn PubSub>,
        ice: Arc<dyn IceProvider>,
        mode: Mode,
        call_events: mpsc::Receiver<CallEvent>,
        cancel_token: CancellationToken,
    ) -> (CallControllerHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CONTROLLER_CHANNEL_BUFFER);
        let (channel_sink, channel_events) = mpsc::channel(CHANNEL_EVENT_BUFFER);
        let local_number = call.local_number().to_string();
        let mailbox = Arc::new(MailboxMonitor::new(&local_number));

        let actor = Self {
            local_number: local_number.clone(),
            control_channel: control_channel(&local_number),
            receiver,
            channel_events,
            channel_sink,
            call_events,
            call_events_open: true,
            cancel_token: cancel_token.clone(),
            pubsub: Arc::clone(&pubsub),
            call,
            ice,
            engine: ControlEngine::new(local_number.clone(), mode),
            roster: Roster::new(),
            hooks: Hooks::default(),
            stream_name: None,
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = CallControllerHandle {
            sender,
            mailbox,
            cancel_token,
            pubsub,
            local_number,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "cc.actor.controller", fields(local_number = %self.local_number))]
    async fn run(mut self) {
        info!(
            target: "cc.actor.controller",
            local_number = %self.local_number,
            mode = %self.engine.mode(),
            "CallControllerActor started"
        );

        let control = self.control_channel.clone();
        self.subscribe(&control).await;

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "cc.actor.controller",
                        "CallControllerActor received cancellation signal"
                    );
                    break;
                }

                Some(event) = self.channel_events.recv() => {
                    self.handle_channel_event(event).await;
                }

                event = self.call_events.recv(), if self.call_events_open => {
                    match event {
                        Some(event) => self.handle_call_event(event).await,
                        None => {
                            debug!(
                                target: "cc.actor.controller",
                                "Call transport event channel closed"
                            );
                            self.call_events_open = false;
                        }
                    }
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                        }
                        None => {
                            info!(
                                target: "cc.actor.controller",
                                "CallControllerActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown().await;

        info!(
            target: "cc.actor.controller",
            local_number = %self.local_number,
            roster_size = self.roster.len(),
            messages_processed = self.mailbox.messages_processed(),
            "CallControllerActor stopped"
        );
    }

    /// Handle a single API request.
    async fn handle_message(&mut self, message: CallMessage) {
        match message {
            CallMessage::Dial { number, respond_to } => {
                let result = self.dial(&number).await;
                let _ = respond_to.send(result);
            }

            CallMessage::Hangup { number, respond_to } => {
                self.hangup(number.as_deref()).await;
                let _ = respond_to.send(());
            }

            CallMessage::ToggleAudio { respond_to } => {
                let enabled = self.toggle(TrackKind::Audio).await;
                let _ = respond_to.send(enabled);
            }

            CallMessage::ToggleVideo { respond_to } => {
                let enabled = self.toggle(TrackKind::Video).await;
                let _ = respond_to.send(enabled);
            }

            CallMessage::JoinStream {
                name,
                announce,
                respond_to,
            } => {
                self.join_stream(name.as_deref(), announce).await;
                let _ = respond_to.send(());
            }

            CallMessage::LeaveStream { name, respond_to } => {
                self.leave_stream(name.as_deref()).await;
                let _ = respond_to.send(());
            }

            CallMessage::Send {
                message,
                number,
                respond_to,
            } => {
                self.send(message, number.as_deref()).await;
                let _ = respond_to.send(());
            }

            CallMessage::RegisterHook { hook, respond_to } => {
                debug!(
                    target: "cc.actor.controller",
                    hook = hook.name(),
                    "Hook registered"
                );
                self.hooks.register(hook);
                let _ = respond_to.send(());
            }

            CallMessage::GetState { respond_to } => {
                let _ = respond_to.send(CallState {
                    local_number: self.local_number.clone(),
                    mode: self.engine.mode(),
                    roster: self.roster.numbers(),
                    stream_name: self.stream_name.clone(),
                });
            }
        }
    }

    /// Route an event from a subscribed channel.
    async fn handle_channel_event(&mut self, event: ChannelEvent) {
        if event.channel() == self.control_channel {
            match event {
                ChannelEvent::Connected { channel } => {
                    debug!(
                        target: "cc.actor.controller",
                        channel = %channel,
                        "Control channel subscribed"
                    );
                }
                ChannelEvent::Message { payload, .. } => {
                    self.handle_control_message(&payload).await;
                }
                ChannelEvent::Presence { event, .. } => {
                    trace!(
                        target: "cc.actor.controller",
                        action = ?event.action,
                        occupancy = event.occupancy,
                        "Control channel presence"
                    );
                }
            }
            return;
        }

        if !event.channel().ends_with(STREAM_SUFFIX) {
            debug!(
                target: "cc.actor.controller",
                channel = %event.channel(),
                "Ignoring event for unknown channel"
            );
            return;
        }

        match event {
            ChannelEvent::Connected { channel } => {
                info!(
                    target: "cc.actor.controller",
                    channel = %channel,
                    "Streaming channel connected"
                );
                self.stream_name = Some(channel);
            }
            ChannelEvent::Message { payload, .. } => self.hooks.stream_message(&payload),
            ChannelEvent::Presence { event, .. } => self.hooks.stream_presence(&event),
        }
    }

    async fn handle_control_message(&mut self, payload: &Value) {
        let inbound = match decode(payload) {
            Ok(inbound) => inbound,
            Err(e) => {
                observability::record_control_received("unknown");
                warn!(
                    target: "cc.actor.controller",
                    error = %e,
                    "Dropping undecodable control message"
                );
                return;
            }
        };

        let kind = match &inbound {
            Inbound::Known(message) => message.type_name(),
            Inbound::Unknown { .. } => "unknown",
        };
        observability::record_control_received(kind);
        debug!(target: "cc.actor.controller", kind, "Control message received");

        let effects = self.engine.receive(&mut self.roster, inbound);
        observability::set_roster_size(self.roster.len());
        self.apply_effects(effects).await;
    }

    async fn handle_call_event(&mut self, event: CallEvent) {
        match event {
            CallEvent::Ready => {
                info!(target: "cc.actor.controller", "Call transport ready");
                self.hooks.ready();
            }
            CallEvent::Unable => {
                warn!(target: "cc.actor.controller", "Call transport unable to operate");
                self.hooks.unable();
            }
            CallEvent::Session(session) => {
                let effects = self.engine.session_changed(&mut self.roster, &session);
                observability::set_roster_size(self.roster.len());
                self.apply_effects(effects).await;
                self.hooks.receive(&session);
            }
        }
    }

    /// Carry out the engine's requested side effects in order.
    async fn apply_effects(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Publish { channel, message } => self.publish(&channel, &message).await,
                Effect::MeshDial(number) => {
                    if let Err(e) = self.dial(&number).await {
                        warn!(
                            target: "cc.actor.controller",
                            number = %number,
                            error = %e,
                            "Mesh dial failed"
                        );
                    }
                }
                Effect::AddToStream(number) => {
                    self.place_call(&number, &[]).await;
                }
                Effect::VideoToggled {
                    participant,
                    enabled,
                } => self.hooks.video_toggled(&participant, enabled),
                Effect::AudioToggled {
                    participant,
                    enabled,
                } => self.hooks.audio_toggled(&participant, enabled),
                Effect::CallRequested(_) => {
                    debug!(
                        target: "cc.actor.controller",
                        "userCall received, no handler defined"
                    );
                }
            }
        }
    }

    /// Fetch credentials, then dial. A failed fetch dials nothing.
    #[instrument(skip_all, fields(number = %number))]
    async fn dial(&self, number: &str) -> Result<DialOutcome, CallError> {
        let started = Instant::now();
        let servers = match self.ice.ice_servers().await {
            Ok(servers) => {
                observability::record_ice_fetch("success", started.elapsed());
                servers
            }
            Err(e) => {
                observability::record_ice_fetch("error", started.elapsed());
                observability::record_dial("credentials_failed");
                warn!(
                    target: "cc.actor.controller",
                    number = %number,
                    error = %e,
                    "ICE credential fetch failed, dial aborted"
                );
                return Err(CallError::IceCredentials(e));
            }
        };

        Ok(self.place_call(number, &servers).await)
    }

    async fn place_call(&self, number: &str, servers: &[IceServer]) -> DialOutcome {
        match self.call.dial(number, servers).await {
            Some(session) => {
                observability::record_dial("dialed");
                info!(
                    target: "cc.actor.controller",
                    number = %number,
                    ice_servers = servers.len(),
                    "Dialed"
                );
                DialOutcome::Dialed(session)
            }
            None => {
                observability::record_dial("already_connected");
                debug!(
                    target: "cc.actor.controller",
                    number = %number,
                    "Session already exists, dial skipped"
                );
                DialOutcome::AlreadyConnected
            }
        }
    }

    #[instrument(skip_all)]
    async fn hangup(&mut self, number: Option<&str>) {
        let leave = ControlMessage::UserLeave(self.local_number.clone());
        let oneway = self.engine.mode().is_oneway();

        match number {
            Some(number) => {
                if oneway {
                    self.leave_stream(Some(number)).await;
                }
                self.call.hangup(Some(number)).await;
                self.engine.local_hangup(&mut self.roster, Some(number));
                self.publish(&control_channel(number), &leave).await;
            }
            None => {
                if oneway {
                    self.leave_stream(None).await;
                }
                let announcements = self.engine.publish_to_all(&self.roster, &leave);
                self.call.hangup(None).await;
                self.engine.local_hangup(&mut self.roster, None);
                self.apply_effects(announcements).await;
            }
        }

        observability::set_roster_size(self.roster.len());
        info!(
            target: "cc.actor.controller",
            number = number.unwrap_or("*"),
            roster_size = self.roster.len(),
            "Hung up"
        );
    }

    /// Flip every local track of `kind` and broadcast the resulting state.
    async fn toggle(&self, kind: TrackKind) -> bool {
        let mut enabled = false;
        for track in self.call.local_tracks(kind) {
            let next = !track.enabled();
            track.set_enabled(next);
            enabled = next;
        }

        let user = self.local_number.clone();
        let message = match kind {
            TrackKind::Audio => ControlMessage::UserAudio(AudioState {
                user,
                audio: enabled,
            }),
            TrackKind::Video => ControlMessage::UserVideo(VideoState {
                user,
                video: enabled,
            }),
        };

        debug!(
            target: "cc.actor.controller",
            kind = kind.as_str(),
            enabled,
            recipients = self.roster.len(),
            "Local tracks toggled"
        );

        let effects = self.engine.publish_to_all(&self.roster, &message);
        self.apply_effects(effects).await;
        enabled
    }

    async fn join_stream(&self, name: Option<&str>, announce: bool) {
        let owner = name.unwrap_or(self.local_number.as_str());
        self.subscribe(&stream_channel(owner)).await;

        if let (true, Some(name)) = (announce, name) {
            let join = ControlMessage::UserJoin(self.local_number.clone());
            self.publish(&control_channel(name), &join).await;
        }
    }

    async fn leave_stream(&mut self, name: Option<&str>) {
        let channel = stream_channel(name.unwrap_or(self.local_number.as_str()));
        self.unsubscribe(&channel).await;

        if self.stream_name.as_deref() == Some(channel.as_str()) {
            info!(
                target: "cc.actor.controller",
                channel = %channel,
                "Left streaming channel"
            );
            self.stream_name = None;
        }
    }

    async fn send(&self, message: Value, number: Option<&str>) {
        if self.engine.mode().is_oneway() {
            let Some(channel) = self.stream_name.as_deref() else {
                debug!(
                    target: "cc.actor.controller",
                    "Not streaming, message dropped"
                );
                return;
            };
            if let Err(e) = self.pubsub.publish(channel, message).await {
                observability::record_publish_failure();
                warn!(
                    target: "cc.actor.controller",
                    channel = %channel,
                    error = %e,
                    "Stream publish failed"
                );
            }
            return;
        }

        if let Err(e) = self.call.send(message, number).await {
            warn!(
                target: "cc.actor.controller",
                error = %e,
                "Data send failed"
            );
        }
    }

    async fn publish(&self, channel: &str, message: &ControlMessage) {
        match self.pubsub.publish(channel, message.to_value()).await {
            Ok(()) => {
                observability::record_control_published(message.type_name());
                trace!(
                    target: "cc.actor.controller",
                    channel = %channel,
                    kind = message.type_name(),
                    "Control message published"
                );
            }
            Err(e) => {
                observability::record_publish_failure();
                warn!(
                    target: "cc.actor.controller",
                    channel = %channel,
                    kind = message.type_name(),
                    error = %e,
                    "Control publish failed"
                );
            }
        }
    }

    async fn subscribe(&self, channel: &str) {
        if let Err(e) = self
            .pubsub
            .subscribe(channel, self.channel_sink.clone())
            .await
        {
            warn!(
                target: "cc.actor.controller",
                channel = %channel,
                error = %e,
                "Subscribe failed"
            );
        }
    }

    async fn unsubscribe(&self, channel: &str) {
        if let Err(e) = self.pubsub.unsubscribe(channel).await {
            warn!(
                target: "cc.actor.controller",
                channel = %channel,
                error = %e,
                "Unsubscribe failed"
            );
        }
    }

    /// Leave the control channel and any stream channel.
    async fn shutdown(&mut self) {
        if let Some(stream) = self.stream_name.take() {
            self.unsubscribe(&stream).await;
        }
        let control = self.control_channel.clone();
        self.unsubscribe(&control).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::errors::{IceError, TransportError};
    use crate::transport::MediaTrack;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPubSub {
        subscribed: Mutex<Vec<String>>,
        unsubscribed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PubSub for RecordingPubSub {
        async fn subscribe(
            &self,
            channel: &str,
            _events: mpsc::Sender<ChannelEvent>,
        ) -> Result<(), TransportError> {
            self.subscribed.lock().unwrap().push(channel.to_string());
            Ok(())
        }

        async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
            self.unsubscribed.lock().unwrap().push(channel.to_string());
            Ok(())
        }

        async fn publish(&self, _channel: &str, _message: Value) -> Result<(), TransportError> {
            Ok(())
        }

        async fn occupancy(&self, channel: &str) -> Result<u64, TransportError> {
            if channel.starts_with("down") {
                return Err(TransportError::Presence {
                    channel: channel.to_string(),
                    reason: "timeout".to_string(),
                });
            }
            Ok(u64::from(channel.starts_with("busy")))
        }
    }

    struct IdleCall;

    #[async_trait]
    impl CallTransport for IdleCall {
        fn local_number(&self) -> &str {
            "me"
        }

        async fn dial(&self, _number: &str, _ice_servers: &[IceServer]) -> Option<SessionRef> {
            None
        }

        async fn hangup(&self, _number: Option<&str>) {}

        fn local_tracks(&self, _kind: TrackKind) -> Vec<Arc<dyn MediaTrack>> {
            Vec::new()
        }

        async fn send(&self, _message: Value, _number: Option<&str>) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct NoIce;

    #[async_trait]
    impl IceProvider for NoIce {
        async fn ice_servers(&self) -> Result<Vec<IceServer>, IceError> {
            Err(IceError::Status(503))
        }
    }

    /// ICE provider that holds every fetch until the gate opens.
    struct GatedIce {
        gate: Arc<tokio::sync::Semaphore>,
    }

    #[async_trait]
    impl IceProvider for GatedIce {
        async fn ice_servers(&self) -> Result<Vec<IceServer>, IceError> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| IceError::Configuration("gate closed".to_string()))?;
            Ok(Vec::new())
        }
    }

    fn spawn_actor(
        pubsub: Arc<RecordingPubSub>,
    ) -> (CallControllerHandle, JoinHandle<()>, mpsc::Sender<CallEvent>) {
        let (call_tx, call_rx) = mpsc::channel(CALL_EVENT_BUFFER);
        let (handle, task) = CallControllerActor::spawn(
            Arc::new(IdleCall),
            pubsub,
            Arc::new(NoIce),
            Mode::Group,
            call_rx,
            CancellationToken::new(),
        );
        (handle, task, call_tx)
    }

    #[tokio::test]
    async fn test_spawn_subscribes_and_cancel_unsubscribes() {
        let pubsub = Arc::new(RecordingPubSub::default());
        let (handle, task, _call_tx) = spawn_actor(Arc::clone(&pubsub));

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.local_number, "me");
        assert_eq!(state.mode, Mode::Group);
        assert!(state.roster.is_empty());
        assert!(state.stream_name.is_none());
        assert_eq!(*pubsub.subscribed.lock().unwrap(), vec!["me-ctrl"]);

        handle.cancel();
        assert!(handle.is_cancelled());
        task.await.unwrap();
        assert_eq!(*pubsub.unsubscribed.lock().unwrap(), vec!["me-ctrl"]);
    }

    #[tokio::test]
    async fn test_requests_after_cancel_fail_with_shutdown() {
        let (handle, task, _call_tx) = spawn_actor(Arc::new(RecordingPubSub::default()));
        handle.cancel();
        task.await.unwrap();

        assert!(matches!(handle.get_state().await, Err(CallError::Shutdown)));
    }

    #[tokio::test]
    async fn test_empty_number_is_rejected() {
        let (handle, _task, _call_tx) = spawn_actor(Arc::new(RecordingPubSub::default()));

        assert!(matches!(
            handle.dial("  ").await,
            Err(CallError::InvalidArgument(_))
        ));
        assert!(matches!(
            handle.hangup(Some("")).await,
            Err(CallError::InvalidArgument(_))
        ));
        handle.cancel();
    }

    #[tokio::test]
    async fn test_credential_failure_aborts_dial() {
        let (handle, _task, _call_tx) = spawn_actor(Arc::new(RecordingPubSub::default()));

        let result = handle.dial("555").await;
        assert!(matches!(
            result,
            Err(CallError::IceCredentials(IceError::Status(503)))
        ));
        handle.cancel();
    }

    #[tokio::test]
    async fn test_presence_queries() {
        let (handle, _task, _call_tx) = spawn_actor(Arc::new(RecordingPubSub::default()));

        assert!(handle.is_online("busy").await);
        assert!(!handle.is_online("idle").await);
        assert!(handle.is_streaming("busy").await);
        assert!(!handle.is_streaming("down").await);
        handle.cancel();
    }

    #[tokio::test]
    async fn test_toggle_without_tracks_reports_disabled() {
        let (handle, _task, _call_tx) = spawn_actor(Arc::new(RecordingPubSub::default()));

        assert!(!handle.toggle_audio().await.unwrap());
        assert!(!handle.toggle_video().await.unwrap());
        handle.cancel();
    }

    #[tokio::test]
    async fn test_mailbox_depth_counts_requests_queued_behind_slow_dial() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let (_call_tx, call_rx) = mpsc::channel(CALL_EVENT_BUFFER);
        let (handle, _task) = CallControllerActor::spawn(
            Arc::new(IdleCall),
            Arc::new(RecordingPubSub::default()),
            Arc::new(GatedIce {
                gate: Arc::clone(&gate),
            }),
            Mode::Group,
            call_rx,
            CancellationToken::new(),
        );

        let dials: Vec<_> = ["1", "2", "3", "4"]
            .into_iter()
            .map(|number| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.dial(number).await })
            })
            .collect();

        // The first dial parks the actor in the ICE fetch; the rest queue up.
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while handle.mailbox.current_depth() < 4 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(handle.mailbox.peak_depth() > 1);

        gate.add_permits(4);
        for dial in dials {
            assert!(matches!(
                dial.await.unwrap(),
                Ok(DialOutcome::AlreadyConnected)
            ));
        }

        // The actor dequeues after replying, so give it a moment to catch up.
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while handle.mailbox.messages_processed() < 4 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(handle.mailbox.current_depth(), 0);
        assert_eq!(handle.mailbox.peak_depth(), 4);
        handle.cancel();
    }

    #[tokio::test]
    async fn test_ready_hook_fires_on_call_event() {
        let (handle, _task, call_tx) = spawn_actor(Arc::new(RecordingPubSub::default()));
        let (tx, rx) = oneshot::channel::<()>();
        let tx = Mutex::new(Some(tx));

        handle
            .on_ready(move || {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
            })
            .await
            .unwrap();
        call_tx.send(CallEvent::Ready).await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), rx)
            .await
            .unwrap()
            .unwrap();
        handle.cancel();
    }
}
