//! Shared fixtures for controller tests.

use crate::{MockCallTransport, MockIceProvider, MockPubSub};
use call_controller::actors::{CallControllerActor, CallControllerHandle, CallState};
use call_controller::protocol::{control_channel, ControlMessage, Mode};
use call_controller::transport::IceServer;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// STUN plus TURN descriptors shaped like a credential service reply.
#[must_use]
pub fn test_ice_servers() -> Vec<IceServer> {
    vec![
        IceServer::new("stun:turn1.example.com"),
        IceServer {
            username: Some("user".to_string()),
            credential: Some("pass".to_string()),
            ..IceServer::new("turn:turn1.example.com:3478?transport=udp")
        },
    ]
}

/// A running controller wired to mock collaborators.
///
/// ```rust,ignore
/// let call = TestCall::start("100", Mode::Group).await;
/// call.call.open_session("200").await;
/// call.settle().await;
/// assert_eq!(call.state().await.roster, vec!["200"]);
/// ```
pub struct TestCall {
    pub handle: CallControllerHandle,
    pub task: JoinHandle<()>,
    pub pubsub: MockPubSub,
    pub call: MockCallTransport,
    pub ice: MockIceProvider,
}

impl TestCall {
    /// Start a controller for `local` with no local tracks.
    pub async fn start(local: &str, mode: Mode) -> Self {
        Self::start_with(local, mode, |call| call).await
    }

    /// Start a controller after customizing its call transport.
    pub async fn start_with(
        local: &str,
        mode: Mode,
        customize: impl FnOnce(MockCallTransport) -> MockCallTransport,
    ) -> Self {
        let pubsub = MockPubSub::new();
        let (call, call_events) = MockCallTransport::new(local);
        let call = customize(call);
        let ice = MockIceProvider::new(test_ice_servers());

        let (handle, task) = CallControllerActor::spawn(
            Arc::new(call.clone()),
            Arc::new(pubsub.clone()),
            Arc::new(ice.clone()),
            mode,
            call_events,
            CancellationToken::new(),
        );

        let test_call = Self {
            handle,
            task,
            pubsub,
            call,
            ice,
        };
        test_call.settle().await;
        test_call
    }

    /// Wait until every event queued so far has been handled.
    ///
    /// The controller drains pending events before API requests, so one
    /// request round trip is enough.
    pub async fn settle(&self) {
        self.handle.get_state().await.unwrap();
    }

    pub async fn state(&self) -> CallState {
        self.handle.get_state().await.unwrap()
    }

    /// Deliver `message` on the local control channel and wait for it.
    pub async fn receive_control(&self, message: &ControlMessage) {
        let channel = control_channel(self.handle.local_number());
        self.pubsub.deliver_control(&channel, message).await;
        self.settle().await;
    }

    /// Open sessions with every number in `numbers`, in order.
    pub async fn connect_peers(&self, numbers: &[&str]) {
        for number in numbers {
            self.call.open_session(number).await;
        }
        self.settle().await;
    }

    /// Cancel the controller and wait for it to exit.
    pub async fn shutdown(self) {
        self.handle.cancel();
        self.task.await.unwrap();
    }
}
