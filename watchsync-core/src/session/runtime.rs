//! Sync session event loop
//!
//! One task owns the controller and therefore the connection state, the echo
//! guard and the player. Player notifications, handle commands, timers and
//! server replies all arrive over channels and are handled one at a time, so
//! no locking is needed around the sync state.
//!
//! The loop itself never waits on the server. Join and check requests run on
//! their own tasks, and the controller's requests go through a delivery task
//! that sends them in order. Every reply comes back as a [`LoopEvent`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::controller::{PauseObserved, PlaybackController, ServerRequest};
use crate::player::{MediaPlayer, PlayState, PlayerEvents};
use crate::poller::{Poller, Reconciliation};
use crate::server::{CheckSnapshot, SessionApi, SessionError, SessionId};

use super::types::{ConnectionStatus, SessionObserver};

type JoinReply = oneshot::Sender<Result<SessionId, SessionError>>;

/// Requests sent from a [`SessionHandle`]
#[derive(Debug)]
enum Command {
    Join { username: String, reply: JoinReply },
    Leave { reply: oneshot::Sender<()> },
}

/// Fired by timer and request tasks back into the loop
#[derive(Debug)]
enum LoopEvent {
    PollDue,
    Polled(Result<CheckSnapshot, SessionError>),
    PlayDeadline {
        video_time: f64,
        deadline_ms: f64,
        generation: u64,
    },
    Joined {
        result: Result<SessionId, SessionError>,
        reply: JoinReply,
    },
    Delivered {
        request: ServerRequest,
        result: Result<(), SessionError>,
    },
}

/// Handle for driving a running [`SyncSession`]. Dropping every handle acts
/// like [`SessionHandle::leave`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Join the session under `username`
    pub async fn join(&self, username: impl Into<String>) -> Result<SessionId, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Join {
                username: username.into(),
                reply,
            })
            .map_err(|_| SessionError::Stopped)?;
        rx.await.map_err(|_| SessionError::Stopped)?
    }

    /// Leave the session (best effort) and stop the loop
    pub async fn leave(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Leave { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Whether the loop has already ended
    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Send the controller's requests one after another, in queue order
async fn deliver<A: SessionApi>(
    api: A,
    mut requests: mpsc::UnboundedReceiver<ServerRequest>,
    events: mpsc::UnboundedSender<LoopEvent>,
) {
    while let Some(request) = requests.recv().await {
        let result = request.send(&api).await;
        if let Err(e) = &result {
            warn!("{} request failed: {}", request.operation(), e);
        }
        // Nobody is listening any more once the loop has left
        let _ = events.send(LoopEvent::Delivered { request, result });
    }
}

/// The synchronization core bound to one player and one server
pub struct SyncSession<A, P> {
    api: A,
    controller: PlaybackController<P>,
    poller: Poller<A>,
    observer: Arc<dyn SessionObserver>,
    player_events: PlayerEvents,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<LoopEvent>,
    events_rx: mpsc::UnboundedReceiver<LoopEvent>,
    /// Open while the delivery task runs
    requests: Option<mpsc::UnboundedSender<ServerRequest>>,
    joining: bool,
    poll_in_flight: bool,
    /// Deadlines armed under an older generation are discarded
    play_generation: u64,
}

impl<A: SessionApi, P: MediaPlayer> SyncSession<A, P> {
    /// Create a session. `player_events` must be the receiving half of the
    /// notifier `player` reports to.
    pub fn new(
        config: &SyncConfig,
        api: A,
        player: P,
        player_events: PlayerEvents,
        observer: Arc<dyn SessionObserver>,
    ) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let session = Self {
            poller: Poller::new(api.clone(), config.poll_interval),
            api,
            controller: PlaybackController::new(player),
            observer,
            player_events,
            commands: command_rx,
            events_tx,
            events_rx,
            requests: None,
            joining: false,
            poll_in_flight: false,
            play_generation: 0,
        };

        (session, SessionHandle { commands: command_tx })
    }

    /// Run until left or until every handle is dropped
    pub async fn run(mut self) {
        info!("Sync session started");

        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        self.requests = Some(requests_tx);
        let delivery = tokio::spawn(deliver(
            self.api.clone(),
            requests_rx,
            self.events_tx.clone(),
        ));

        let leave_reply = loop {
            tokio::select! {
                // Echo notifications must be consumed before anything can
                // set the opposite latch
                biased;

                Some(state) = self.player_events.recv() => {
                    self.on_player_event(state);
                }

                Some(event) = self.events_rx.recv() => {
                    self.on_event(event);
                }

                command = self.commands.recv() => match command {
                    Some(Command::Join { username, reply }) => self.join(username, reply),
                    Some(Command::Leave { reply }) => break Some(reply),
                    None => {
                        debug!("All session handles dropped");
                        break None;
                    }
                },
            }

            self.flush_requests();
        };

        self.leave(delivery).await;
        if let Some(reply) = leave_reply {
            let _ = reply.send(());
        }

        info!("Sync session ended");
    }

    /// Hand queued controller requests to the delivery task
    fn flush_requests(&mut self) {
        let Some(requests) = &self.requests else {
            return;
        };
        for request in self.controller.take_requests() {
            let _ = requests.send(request);
        }
    }

    fn join(&mut self, username: String, reply: JoinReply) {
        if let Some(id) = self.controller.state().active_id() {
            debug!("Already joined as {}", id);
            let _ = reply.send(Ok(id.clone()));
            return;
        }
        if self.joining {
            let _ = reply.send(Err(SessionError::JoinInProgress));
            return;
        }

        self.joining = true;
        self.observer.on_connection_status(ConnectionStatus::Connecting);

        let api = self.api.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = api.join(&username).await;
            let _ = events.send(LoopEvent::Joined { result, reply });
        });
    }

    fn on_joined(&mut self, result: Result<SessionId, SessionError>, reply: JoinReply) {
        self.joining = false;
        match &result {
            Ok(id) => {
                self.controller.joined(id.clone());
                self.observer.on_connection_status(ConnectionStatus::Connected);
            }
            Err(e) => {
                warn!("Join failed: {}", e);
                self.observer
                    .on_connection_status(ConnectionStatus::Failed(e.to_string()));
            }
        }
        let _ = reply.send(result);
    }

    /// Queue the leave request behind everything already queued, then wait
    /// for delivery to drain
    async fn leave(&mut self, delivery: JoinHandle<()>) {
        self.play_generation += 1;
        let left = self.controller.leave();
        self.flush_requests();

        self.requests = None;
        if let Err(e) = delivery.await {
            warn!("Request delivery task failed: {}", e);
        }

        if left {
            info!("Left session");
            self.observer.on_connection_status(ConnectionStatus::Left);
        }
    }

    fn on_player_event(&mut self, state: PlayState) {
        match state {
            PlayState::Playing => {
                // Polling starts once the server accepts the ready
                let observed = self.controller.on_play_observed();
                debug!("Play observed: {:?}", observed);
            }
            PlayState::Paused => {
                if self.controller.on_pause_observed() == PauseObserved::UserPause {
                    // A deadline from before the pause must not resume us
                    self.play_generation += 1;
                }
            }
        }
    }

    fn on_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::PollDue => self.start_poll_cycle(),
            LoopEvent::Polled(fetched) => self.finish_poll_cycle(fetched),
            LoopEvent::PlayDeadline {
                video_time,
                deadline_ms,
                generation,
            } => {
                if generation != self.play_generation {
                    debug!("Discarding stale deadline {}", deadline_ms);
                    return;
                }
                self.controller.schedule_force_play(video_time, deadline_ms);
            }
            LoopEvent::Joined { result, reply } => self.on_joined(result, reply),
            LoopEvent::Delivered { request, result } => self.on_delivered(request, result),
        }
    }

    fn on_delivered(&mut self, request: ServerRequest, result: Result<(), SessionError>) {
        if let ServerRequest::Ready { attempt, .. } = request {
            if self.controller.ready_completed(attempt, &result) {
                self.start_polling();
            }
        }

        if let Err(e) = result {
            self.observer.on_error(e.to_string());
        }
    }

    /// Start the poll loop unless it is already running
    fn start_polling(&mut self) {
        let state = self.controller.state_mut();
        if state.polling {
            debug!("Poll loop already running");
            return;
        }

        state.polling = true;
        info!("Poll loop started");
        self.arm_timer(Duration::ZERO, LoopEvent::PollDue);
    }

    /// Send one check off the loop. At most one is in flight.
    fn start_poll_cycle(&mut self) {
        if !self.controller.state().polling || self.poll_in_flight {
            return;
        }

        self.poll_in_flight = true;
        let fetch = self.poller.fetch();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let _ = events.send(LoopEvent::Polled(fetch.await));
        });
    }

    /// Reconcile and re-arm. A failed fetch skips only the reconciliation.
    fn finish_poll_cycle(&mut self, fetched: Result<CheckSnapshot, SessionError>) {
        self.poll_in_flight = false;
        if !self.controller.state().polling {
            return;
        }

        match self.poller.complete(fetched) {
            Ok(outcome) => {
                self.observer.on_roster(&outcome.clients);
                self.apply(outcome.action);
            }
            Err(e) => {
                warn!(
                    "Poll failed ({} of {} cycles): {}",
                    self.poller.failures(),
                    self.poller.cycles(),
                    e
                );
                self.observer.on_error(e.to_string());
            }
        }

        self.arm_timer(self.poller.interval(), LoopEvent::PollDue);
    }

    fn apply(&mut self, action: Reconciliation) {
        match action {
            Reconciliation::PlayAt {
                video_time,
                deadline_ms,
                delay,
            } => {
                debug!("Play at {:.3}s scheduled in {:?}", video_time, delay);
                self.arm_timer(
                    delay,
                    LoopEvent::PlayDeadline {
                        video_time,
                        deadline_ms,
                        generation: self.play_generation,
                    },
                );
            }
            Reconciliation::Pause => {
                self.play_generation += 1;
                self.controller.force_pause();
            }
        }
    }

    fn arm_timer(&self, delay: Duration, event: LoopEvent) {
        if delay.is_zero() {
            let _ = self.events_tx.send(event);
            return;
        }

        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
    }
}
