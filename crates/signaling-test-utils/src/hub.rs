//! Router harness backed by recording doubles.
//!
//! `TestHub` wires a [`SignalRouter`] to a [`RecordingTransport`], an
//! [`InMemoryRoomDirectory`], [`InMemorySessionPersistence`] and a
//! [`RecordingNotifier`], and keeps handles to all of them so tests can
//! drive the router and then inspect every side effect.

use crate::fixtures::{pid, TestRoom};
use common::types::ParticipantId;
use signaling_service::collaborators::mock::RecordingNotifier;
use signaling_service::collaborators::{InMemoryRoomDirectory, MeetingNotifier, RoomDirectory};
use signaling_service::presence::PresenceRegistry;
use signaling_service::protocol::{ClientMessage, ServerEvent};
use signaling_service::router::{RouterDeps, SignalRouter};
use signaling_service::session::{InMemorySessionPersistence, SessionPersistence, SessionStore};
use signaling_service::transport::mock::RecordingTransport;
use signaling_service::transport::Transport;
use std::sync::Arc;

/// Default screen-share cap used by [`TestHub::new`].
pub const TEST_MAX_CONCURRENT_SCREENS: usize = 4;

pub struct TestHub {
    pub router: Arc<SignalRouter>,
    pub transport: Arc<RecordingTransport>,
    pub directory: Arc<InMemoryRoomDirectory>,
    pub persistence: Arc<InMemorySessionPersistence>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Default for TestHub {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHub {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_screens(TEST_MAX_CONCURRENT_SCREENS)
    }

    #[must_use]
    pub fn with_max_screens(max_concurrent_screens: usize) -> Self {
        let transport = Arc::new(RecordingTransport::new());
        let directory = Arc::new(InMemoryRoomDirectory::new());
        let persistence = Arc::new(InMemorySessionPersistence::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let router = Arc::new(SignalRouter::new(RouterDeps {
            presence: Arc::new(PresenceRegistry::new()),
            store: Arc::new(SessionStore::new()),
            directory: Arc::clone(&directory) as Arc<dyn RoomDirectory>,
            persistence: Arc::clone(&persistence) as Arc<dyn SessionPersistence>,
            notifier: Arc::clone(&notifier) as Arc<dyn MeetingNotifier>,
            transport: Arc::clone(&transport) as Arc<dyn Transport>,
            max_concurrent_screens,
        }));

        Self {
            router,
            transport,
            directory,
            persistence,
            notifier,
        }
    }

    /// Install the room's roles in the directory.
    pub fn install(&self, room: &TestRoom) {
        self.directory.assign_roles(&room.id, room.roles());
    }

    /// Join and panic on failure.
    pub async fn join(&self, room: &TestRoom, participant: &str) -> Vec<ParticipantId> {
        self.router
            .join_room(&room.id, &pid(participant))
            .await
            .expect("join should succeed")
    }

    /// Join every participant in order, then forget the join traffic.
    pub async fn join_all(&self, room: &TestRoom, participants: &[&str]) {
        for participant in participants {
            self.join(room, participant).await;
        }
        self.transport.clear();
    }

    /// Validate and dispatch a client message as `caller` would send it.
    /// A validation failure is answered the way the socket layer answers it.
    pub async fn send(&self, room: &TestRoom, caller: &str, message: ClientMessage) {
        let caller = pid(caller);
        match message.validate(&room.id, &caller) {
            Ok(()) => self.router.dispatch(&room.id, &caller, message).await,
            Err(e) => self.router.send_error(&room.id, &caller, &e),
        }
    }

    #[must_use]
    pub fn kinds_for(&self, participant: &str) -> Vec<&'static str> {
        self.transport.kinds_for(&pid(participant))
    }

    #[must_use]
    pub fn events_for(&self, participant: &str) -> Vec<ServerEvent> {
        self.transport.events_for(&pid(participant))
    }

    /// Sorted recipients of the given event kind.
    #[must_use]
    pub fn recipients_of(&self, kind: &str) -> Vec<ParticipantId> {
        self.transport.recipients_of(kind)
    }

    /// Error codes received by `participant`, in order.
    #[must_use]
    pub fn error_codes_for(&self, participant: &str) -> Vec<i32> {
        self.events_for(participant)
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::Error { code, .. } => Some(code),
                _ => None,
            })
            .collect()
    }
}
