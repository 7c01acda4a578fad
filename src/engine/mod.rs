mod booking;
mod calendar;
mod error;
mod lifecycle;
mod overlap;
mod queries;
mod search;
mod store;

pub use calendar::month_range;
pub use error::{EngineError, ErrorKind};

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, mpsc, oneshot};
use tracing::{error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::limits::*;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

use store::IntervalStore;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit:
/// take the first append, drain whatever else is already queued, then pay
/// for one fsync and answer every sender with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    let mut deferred: Option<WalCommand> = None;
    loop {
        let cmd = match deferred.take() {
            Some(cmd) => cmd,
            None => match rx.recv().await {
                Some(cmd) => cmd,
                None => break,
            },
        };
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                while let Ok(next) = rx.try_recv() {
                    match next {
                        WalCommand::Append { event, response } => batch.push((event, response)),
                        // Keep ordering: flush what we have, then run it.
                        other => {
                            deferred = Some(other);
                            break;
                        }
                    }
                }
                flush_batch(&mut wal, batch);
            }
            WalCommand::Compact { events, response } => {
                let _ = response.send(wal.compact(&events));
            }
            WalCommand::AppendsSinceCompact { response } => {
                let _ = response.send(wal.appends_since_compact());
            }
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();

    let mut result = Ok(());
    for (event, _) in &batch {
        if let Err(e) = wal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    let result = result.and_then(|()| wal.flush_sync());
    if let Err(e) = &result {
        // Every caller in this batch is told it failed, so none of it may
        // survive on disk or ride along with the next batch.
        error!("WAL flush failed, rolling back {} records: {e}", batch.len());
        if let Err(e) = wal.rollback() {
            error!("WAL rollback failed, refusing further writes: {e}");
        }
    }

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

/// The booking engine: per-room state behind per-room locks, persisted
/// through the WAL. Cheap to share behind an `Arc`.
pub struct Engine {
    store: Arc<IntervalStore>,
    wal_tx: mpsc::Sender<WalCommand>,
    notify: Arc<NotifyHub>,
    clock: Arc<dyn Clock>,
    storage_timeout: Duration,
    /// Held while adding rooms and while snapshotting for compaction.
    catalog: Arc<Mutex<()>>,
}

impl Engine {
    /// Replay `wal_path` and start the WAL writer. Must run inside a Tokio runtime.
    pub fn new(wal_path: PathBuf, clock: Arc<dyn Clock>, storage_timeout: Duration) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(WAL_CHANNEL_CAPACITY);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = IntervalStore::new();
        // Replay into plain room states; nothing else can see them yet.
        let mut rooms: BTreeMap<RoomId, RoomState> = BTreeMap::new();
        for event in &events {
            match event {
                Event::RoomCreated { room } => {
                    rooms
                        .entry(room.id)
                        .or_insert_with(|| RoomState::new(room.clone()));
                }
                Event::SequencesAdvanced {
                    next_reservation_id,
                    next_interval_id,
                } => store.advance_sequences(*next_reservation_id, *next_interval_id),
                other => {
                    let Some(room_id) = other.room_id() else { continue };
                    match rooms.get_mut(&room_id) {
                        Some(rs) => store.apply_event(rs, other),
                        None => warn!("replay: event for unknown room {room_id} skipped"),
                    }
                }
            }
        }
        let room_count = rooms.len();
        for rs in rooms.into_values() {
            store.insert_room_state(rs);
        }
        metrics::gauge!(crate::observability::ROOMS).set(room_count as f64);
        info!(
            "replayed {} events from {}: {room_count} rooms",
            events.len(),
            wal_path.display()
        );

        Ok(Self {
            store: Arc::new(store),
            wal_tx,
            notify: Arc::new(NotifyHub::new()),
            clock,
            storage_timeout,
            catalog: Arc::new(Mutex::new(())),
        })
    }

    /// Open the log under `config.data_dir` with the system clock.
    pub fn open(config: &EngineConfig) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Self::new(config.wal_path(), Arc::new(SystemClock), config.storage_timeout)
    }

    /// Every committed change, in commit order per room.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.notify.subscribe()
    }

    // ── Locking ──────────────────────────────────────────

    /// Exclusive access to one room: the serialization point for every write.
    pub(super) async fn lock_room(
        &self,
        room_id: RoomId,
    ) -> Result<OwnedRwLockWriteGuard<RoomState>, EngineError> {
        let rs = self
            .store
            .get_room(room_id)
            .ok_or(EngineError::UnknownRoom(room_id))?;
        tokio::time::timeout(self.storage_timeout, rs.write_owned())
            .await
            .map_err(|_| self.timed_out("room write lock"))
    }

    pub(super) async fn read_room(
        &self,
        room_id: RoomId,
    ) -> Result<OwnedRwLockReadGuard<RoomState>, EngineError> {
        let rs = self
            .store
            .get_room(room_id)
            .ok_or(EngineError::UnknownRoom(room_id))?;
        tokio::time::timeout(self.storage_timeout, rs.read_owned())
            .await
            .map_err(|_| self.timed_out("room read lock"))
    }

    /// Lock the room owning a reservation. Re-checks under the lock, since a
    /// concurrent delete may have won the race for it.
    pub(super) async fn lock_reservation(
        &self,
        id: ReservationId,
    ) -> Result<OwnedRwLockWriteGuard<RoomState>, EngineError> {
        let room_id = self
            .store
            .room_for_reservation(id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        let guard = self.lock_room(room_id).await?;
        if !guard.reservations.contains_key(&id) {
            return Err(EngineError::ReservationNotFound(id));
        }
        Ok(guard)
    }

    fn timed_out(&self, what: &str) -> EngineError {
        warn!("{what} timed out after {:?}", self.storage_timeout);
        EngineError::Storage(format!("{what} timed out after {:?}", self.storage_timeout))
    }

    // ── Persistence ──────────────────────────────────────

    /// Queue one record for the writer. Bounded by the storage timeout; on
    /// timeout or cancellation nothing has been queued.
    async fn enqueue(&self, event: &Event) -> Result<oneshot::Receiver<io::Result<()>>, EngineError> {
        let (tx, rx) = oneshot::channel();
        let cmd = WalCommand::Append {
            event: event.clone(),
            response: tx,
        };
        self.wal_tx
            .send_timeout(cmd, self.storage_timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => self.timed_out("WAL enqueue"),
                mpsc::error::SendTimeoutError::Closed(_) => {
                    EngineError::Storage("WAL writer shut down".into())
                }
            })?;
        Ok(rx)
    }

    /// Make `event` durable, then run `apply` and notify listeners.
    ///
    /// Once the record is queued the rest runs on its own task, so dropping the
    /// caller's future cannot leave a durable record that memory never saw.
    async fn write_through<T, F>(&self, event: Event, apply: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&IntervalStore, &Event) -> T + Send + 'static,
    {
        let durable = self.enqueue(&event).await?;
        let store = Arc::clone(&self.store);
        let notify = Arc::clone(&self.notify);
        tokio::spawn(async move {
            durable
                .await
                .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
                .map_err(|e| EngineError::Storage(e.to_string()))?;
            let out = apply(&store, &event);
            notify.send(&event);
            Ok(out)
        })
        .await
        .map_err(|e| EngineError::Storage(format!("write task failed: {e}")))?
    }

    /// WAL-append + apply + notify for a room the caller has locked. Hands
    /// the guard back so the caller can read the result.
    pub(super) async fn persist_and_apply(
        &self,
        guard: OwnedRwLockWriteGuard<RoomState>,
        event: Event,
    ) -> Result<OwnedRwLockWriteGuard<RoomState>, EngineError> {
        self.write_through(event, move |store, event| {
            let mut guard = guard;
            store.apply_event(&mut guard, event);
            guard
        })
        .await
    }

    // ── Reference data ───────────────────────────────────

    /// Register a room. Returns `false` if an identical room already exists.
    pub async fn create_room(&self, room: Room) -> Result<bool, EngineError> {
        if room.name.trim().is_empty() {
            return Err(EngineError::MissingField("name"));
        }
        if room.name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("room name too long"));
        }
        let catalog = Arc::clone(&self.catalog).lock_owned().await;
        if let Some(existing) = self.store.get_room(room.id) {
            let guard = existing.read().await;
            return if guard.room.name == room.name {
                Ok(false)
            } else {
                Err(EngineError::RoomExists(room.id))
            };
        }
        if self.store.room_count() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }

        let event = Event::RoomCreated { room: room.clone() };
        self.write_through(event, move |store, _| {
            let _catalog = catalog;
            store.insert_room(room);
            metrics::gauge!(crate::observability::ROOMS).set(store.room_count() as f64);
        })
        .await?;
        Ok(true)
    }

    /// Create every room not yet present. Returns how many were new.
    pub async fn seed_rooms(&self, rooms: &[Room]) -> Result<usize, EngineError> {
        let mut created = 0;
        for room in rooms {
            if self.create_room(room.clone()).await? {
                created += 1;
            }
        }
        if created > 0 {
            info!("seeded {created} rooms");
        }
        Ok(created)
    }

    // ── Compaction ───────────────────────────────────────

    /// Rewrite the WAL as the minimal event list that rebuilds current state.
    ///
    /// Holds the catalogue lock and every room's read lock (ascending id), so
    /// no write is between append and apply while the snapshot is taken.
    pub async fn compact_wal(&self) -> Result<usize, EngineError> {
        let _catalog = self.catalog.lock().await;
        let mut guards = Vec::new();
        for id in self.store.room_ids() {
            guards.push(self.read_room(id).await?);
        }

        let (next_reservation_id, next_interval_id) = self.store.next_ids();
        let mut events = vec![Event::SequencesAdvanced {
            next_reservation_id,
            next_interval_id,
        }];
        for rs in &guards {
            events.push(Event::RoomCreated { room: rs.room.clone() });
            let backing: HashMap<ReservationId, &Interval> = rs
                .intervals
                .iter()
                .filter_map(|i| i.reservation_id().map(|r| (r, i)))
                .collect();
            for reservation in rs.reservations.values() {
                match backing.get(&reservation.id) {
                    Some(&interval) => events.push(Event::ReservationCommitted {
                        reservation: reservation.clone(),
                        interval: interval.clone(),
                    }),
                    None => warn!("compact: reservation {} has no interval", reservation.id),
                }
            }
            let blocks: Vec<Interval> = rs
                .intervals
                .iter()
                .filter(|i| i.is_manual_block())
                .cloned()
                .collect();
            if !blocks.is_empty() {
                events.push(Event::CalendarEdited {
                    room_id: rs.room.id,
                    removed: Vec::new(),
                    added: blocks,
                });
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        drop(guards);
        info!("compacted WAL to {count} events");
        Ok(count)
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
