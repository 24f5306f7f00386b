//! The actor that owns a device's dataset.
//!
//! Everything that touches the local dataset or the sync flags runs on one task. Network calls,
//! the push reader and the timers run elsewhere and report back as [`Event`]s, so there is never
//! more than one writer.
//!
//! Next to the local dataset the actor keeps `confirmed`: local state minus the edits the authority
//! hasn't acknowledged. Remote datasets are merged into `confirmed`, and the pending edits (whatever
//! `local` has that `confirmed` doesn't) are rebased on top. A plain `merge(local, remote)` would
//! hand every leaf to the remote copy and revert them.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use reconcile::{Dataset, Object, merge_dataset, rebase_dataset, tree, version};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ClientConfig;
use crate::error::SyncError;
use crate::gate::ApplyGate;
use crate::local::LocalStore;
use crate::transport::Transport;

type Mutation = Box<dyn FnOnce(&mut Dataset) + Send>;

enum Command {
    RequestSync,
    ScheduleSync,
    Edit(Mutation),
    SetOnline(bool),
    Snapshot(oneshot::Sender<Dataset>),
    Shutdown,
}

enum Event {
    SyncFinished(Result<Dataset, SyncError>),
    Pushed {
        generation: u64,
        dataset: Dataset,
    },
    PushClosed {
        generation: u64,
        error: Option<SyncError>,
    },
}

/// Handle to the coordinator task. Cheap to clone.
#[derive(Clone)]
pub struct SyncCoordinator {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<Arc<Dataset>>,
}

impl SyncCoordinator {
    /// Load the local dataset and start the coordinator. It starts offline; call
    /// [`set_online`](Self::set_online) to connect.
    pub fn spawn<T: Transport>(
        transport: T,
        store: Box<dyn LocalStore>,
        gate: ApplyGate,
        config: ClientConfig,
    ) -> Result<Self, SyncError> {
        let mut local = store
            .load()
            .inspect_err(|e| log::error!("Failed to load the local dataset: {e}"))?;
        tree::ensure_dataset(&mut local);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(Arc::new(local.clone()));

        let actor = Actor {
            transport: Arc::new(transport),
            store,
            gate,
            config,
            confirmed: local.clone(),
            local,
            sending: None,
            flight_pushes: Vec::new(),
            state: state_tx,
            events: events_tx,
            in_flight: false,
            queued_retry: false,
            online: false,
            debounce_at: None,
            reconnect_at: None,
            push: None,
            push_generation: 0,
        };
        tokio::spawn(actor.run(commands_rx, events_rx));

        Ok(Self {
            commands: commands_tx,
            state: state_rx,
        })
    }

    fn send(&self, command: Command) -> Result<(), SyncError> {
        self.commands.send(command).map_err(|_| SyncError::Shutdown)
    }

    /// Sync now. If a sync is already out, one more runs after it.
    pub fn request_sync(&self) -> Result<(), SyncError> {
        self.send(Command::RequestSync)
    }

    /// Sync after a quiet period. Every call pushes the sync back.
    pub fn schedule_sync(&self) -> Result<(), SyncError> {
        self.send(Command::ScheduleSync)
    }

    pub fn set_online(&self, online: bool) -> Result<(), SyncError> {
        self.send(Command::SetOnline(online))
    }

    /// Change the local dataset, save it and schedule a sync. `edit` must touch whatever it changes,
    /// or the change may lose to an older copy on the authority. Prefer the `edit_*` helpers.
    pub fn edit<F>(&self, edit: F) -> Result<(), SyncError>
    where
        F: FnOnce(&mut Dataset) + Send + 'static,
    {
        self.send(Command::Edit(Box::new(edit)))
    }

    /// Edit a project, creating it if needed, then touch everything in it.
    pub fn edit_project<F>(&self, project_id: impl Into<String>, edit: F) -> Result<(), SyncError>
    where
        F: FnOnce(&mut Object) + Send + 'static,
    {
        let project_id = project_id.into();
        self.edit(move |dataset| {
            let project = dataset.projects.entry(project_id.clone()).or_default();
            edit(project);
            project
                .entry(version::ID)
                .or_insert_with(|| Value::String(project_id));
            tree::touch_project(project, Utc::now());
        })
    }

    /// Edit the corner evidence of a project, then touch all of it.
    pub fn edit_evidence<F>(&self, project_id: impl Into<String>, edit: F) -> Result<(), SyncError>
    where
        F: FnOnce(&mut Vec<Value>) + Send + 'static,
    {
        let project_id = project_id.into();
        self.edit(move |dataset| {
            let evidence = dataset.evidence_mut(&project_id);
            edit(evidence);
            tree::touch_evidence(evidence, Utc::now());
        })
    }

    pub fn edit_settings<F>(&self, edit: F) -> Result<(), SyncError>
    where
        F: FnOnce(&mut Object) + Send + 'static,
    {
        self.edit(move |dataset| {
            edit(&mut dataset.global_settings);
            tree::touch_settings(&mut dataset.global_settings, Utc::now());
        })
    }

    pub async fn snapshot(&self) -> Result<Dataset, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| SyncError::Shutdown)
    }

    /// Sees every version of the local dataset: after edits, sync responses and pushes.
    pub fn subscribe_state(&self) -> watch::Receiver<Arc<Dataset>> {
        self.state.clone()
    }

    pub fn shutdown(&self) -> Result<(), SyncError> {
        self.send(Command::Shutdown)
    }
}

struct Actor<T> {
    transport: Arc<T>,
    store: Box<dyn LocalStore>,
    gate: ApplyGate,
    config: ClientConfig,

    local: Dataset,
    confirmed: Dataset,
    /// The payload of the sync in flight, with pushes received since rebased into it.
    sending: Option<Dataset>,
    /// Pushes received while a sync was in flight, oldest first.
    flight_pushes: Vec<Dataset>,
    state: watch::Sender<Arc<Dataset>>,
    events: mpsc::UnboundedSender<Event>,

    in_flight: bool,
    queued_retry: bool,
    online: bool,
    debounce_at: Option<Instant>,
    reconnect_at: Option<Instant>,
    push: Option<JoinHandle<()>>,
    /// Bumped whenever the push channel is closed, so events from an old channel are ignored.
    push_generation: u64,
}

impl<T: Transport> Actor<T> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                Some(event) = events.recv() => self.on_event(event),
                _ = wait_until(self.debounce_at) => {
                    self.debounce_at = None;
                    self.request_sync();
                }
                _ = wait_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    log::info!("Reopening the push channel");
                    self.open_push();
                }
            }
        }
        self.close_push();
        log::info!("Sync coordinator stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::RequestSync => self.request_sync(),
            Command::ScheduleSync => self.schedule_sync(),
            Command::Edit(edit) => {
                edit(&mut self.local);
                self.persist();
                self.publish();
                self.gate.refresh_pending(self.local.clone());
                self.schedule_sync();
            }
            Command::SetOnline(online) => self.set_online(online),
            Command::Snapshot(reply) => {
                reply.send(self.local.clone()).ok();
            }
            Command::Shutdown => {}
        }
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::SyncFinished(result) => {
                self.in_flight = false;
                let sent = self.sending.take();
                let pushes = std::mem::take(&mut self.flight_pushes);
                match result {
                    Ok(remote) => {
                        log::info!("Sync finished");
                        self.absorb_response(sent, remote, pushes);
                    }
                    Err(e) => log::warn!("Sync failed: {e}"),
                }
                if std::mem::take(&mut self.queued_retry) {
                    self.request_sync();
                }
            }
            Event::Pushed {
                generation,
                dataset,
            } => {
                if generation == self.push_generation {
                    log::debug!("Merging pushed dataset");
                    self.absorb_push(dataset);
                }
            }
            Event::PushClosed { generation, error } => {
                if generation != self.push_generation {
                    return;
                }
                self.push = None;
                match error {
                    Some(e) => log::warn!("Push channel failed: {e}"),
                    None => log::warn!("Push channel closed"),
                }
                if self.online {
                    self.reconnect_at = Some(Instant::now() + self.config.reconnect_delay);
                }
            }
        }
    }

    fn request_sync(&mut self) {
        if self.in_flight {
            log::debug!("Sync already in flight, queueing another");
            self.queued_retry = true;
            return;
        }
        self.in_flight = true;
        log::info!("Starting sync");

        let payload = self.local.clone();
        self.sending = Some(payload.clone());
        let transport = self.transport.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = transport.sync(payload).await;
            events.send(Event::SyncFinished(result)).ok();
        });
    }

    fn schedule_sync(&mut self) {
        self.debounce_at = Some(Instant::now() + self.config.debounce);
    }

    fn set_online(&mut self, online: bool) {
        if online == self.online {
            return;
        }
        self.online = online;
        if online {
            log::info!("Online");
            self.open_push();
            self.request_sync();
        } else {
            log::info!("Offline");
            self.close_push();
            self.reconnect_at = None;
        }
    }

    /// Merge a pushed dataset into local state. Saved, but does not schedule a sync.
    fn absorb_push(&mut self, remote: Dataset) {
        self.fold(&remote);
        if self.in_flight {
            self.flight_pushes.push(remote);
        }
        self.settle();
    }

    /// Merge the authority's answer to `sent`. Everything in `sent` is now acknowledged, so only edits
    /// made after it went out are rebased over the response.
    fn absorb_response(&mut self, sent: Option<Dataset>, remote: Dataset, pushes: Vec<Dataset>) {
        let sent = sent.unwrap_or_else(|| self.confirmed.clone());
        let confirmed = merge_dataset(&sent, &remote);
        self.local = rebase_dataset(&sent, &self.local, &confirmed);
        self.confirmed = confirmed;

        // The authority pushes our own result too. Whatever arrived after that echo is newer than
        // the response; whatever arrived before it is already part of the response.
        if let Some(echo) = pushes.iter().rposition(|push| *push == remote) {
            for push in &pushes[echo + 1..] {
                self.fold(push);
            }
        }
        self.settle();
    }

    fn fold(&mut self, remote: &Dataset) {
        let confirmed = merge_dataset(&self.confirmed, remote);
        self.local = rebase_dataset(&self.confirmed, &self.local, &confirmed);
        if let Some(sending) = self.sending.take() {
            self.sending = Some(rebase_dataset(&self.confirmed, &sending, &confirmed));
        }
        self.confirmed = confirmed;
    }

    fn settle(&self) {
        self.persist();
        self.publish();
        self.gate.submit(self.local.clone());
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.local) {
            log::error!("Failed to save the local dataset: {e}");
        }
    }

    fn publish(&self) {
        self.state.send_replace(Arc::new(self.local.clone()));
    }

    fn open_push(&mut self) {
        self.close_push();
        let generation = self.push_generation;
        let transport = self.transport.clone();
        let events = self.events.clone();

        self.push = Some(tokio::spawn(async move {
            let error = match transport.subscribe().await {
                Ok(mut stream) => {
                    log::info!("Push channel open");
                    loop {
                        match stream.next().await {
                            Some(Ok(dataset)) => {
                                let pushed = Event::Pushed {
                                    generation,
                                    dataset,
                                };
                                if events.send(pushed).is_err() {
                                    return;
                                }
                            }
                            Some(Err(e)) => break Some(e),
                            None => break None,
                        }
                    }
                }
                Err(e) => Some(e),
            };
            events.send(Event::PushClosed { generation, error }).ok();
        }));
    }

    fn close_push(&mut self) {
        self.push_generation += 1;
        if let Some(push) = self.push.take() {
            push.abort();
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
