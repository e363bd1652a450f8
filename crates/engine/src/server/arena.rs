//! Generation checked slots for live server connections.
//!
//! The arena is the single owner of connection state. The I/O task and the sink only hold a
//! [`ConnectionId`]; every transition goes through the arena lock, and a slot's generation
//! is bumped when it is reclaimed so an old id can never reach a new connection.

use crate::error::ServerError;
use crate::message::Response;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    index: u32,
    generation: u32,
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Reading the request.
    Accepted,
    /// Handed to the sink, waiting for it to respond or release.
    Dispatched,
    /// A response is queued or being written.
    Responding,
    /// Released without a response, the socket is about to close.
    ReleasedPending,
    /// Gone, the slot was reclaimed.
    Released,
}

/// What the sink decided, delivered to the I/O task of the connection.
#[derive(Debug)]
pub(crate) enum Reply {
    Respond(Response),
    Release,
}

#[derive(Debug)]
struct ConnectionEntry {
    state: ConnectionState,
    reply: Option<oneshot::Sender<Reply>>,
    cancel: CancellationToken,
    peer_addr: SocketAddr,
    peer_closed: bool,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<ConnectionEntry>,
}

#[derive(Debug, Default)]
struct Slots {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Slots {
    fn entry_mut(&mut self, id: ConnectionId) -> Result<&mut ConnectionEntry, ServerError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(ServerError::stale(id))
    }
}

#[derive(Debug, Default)]
pub(crate) struct ConnectionArena {
    inner: Mutex<Slots>,
}

impl ConnectionArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, peer_addr: SocketAddr, cancel: CancellationToken) -> ConnectionId {
        let entry = ConnectionEntry { state: ConnectionState::Accepted, reply: None, cancel, peer_addr, peer_closed: false };

        let mut slots = self.lock();
        slots.live += 1;
        if let Some(index) = slots.free.pop() {
            let slot = &mut slots.slots[index as usize];
            slot.entry = Some(entry);
            return ConnectionId { index, generation: slot.generation };
        }

        #[allow(clippy::cast_possible_truncation, reason = "more than u32::MAX live connections is not reachable")]
        let index = slots.slots.len() as u32;
        slots.slots.push(Slot { generation: 0, entry: Some(entry) });
        ConnectionId { index, generation: 0 }
    }

    /// Move an accepted connection to the sink, returns where its reply will arrive.
    pub(crate) fn dispatch(&self, id: ConnectionId) -> Result<oneshot::Receiver<Reply>, ServerError> {
        let mut slots = self.lock();
        let entry = slots.entry_mut(id)?;
        if entry.state != ConnectionState::Accepted {
            return Err(ServerError::already_released(id));
        }

        let (sender, receiver) = oneshot::channel();
        entry.state = ConnectionState::Dispatched;
        entry.reply = Some(sender);
        Ok(receiver)
    }

    /// Queue a response for a dispatched connection.
    pub(crate) fn respond(&self, id: ConnectionId, response: Response) -> Result<(), ServerError> {
        self.reply(id, ConnectionState::Responding, Reply::Respond(response))
    }

    /// Give a dispatched connection back without responding.
    pub(crate) fn release(&self, id: ConnectionId) -> Result<(), ServerError> {
        self.reply(id, ConnectionState::ReleasedPending, Reply::Release)
    }

    fn reply(&self, id: ConnectionId, next: ConnectionState, reply: Reply) -> Result<(), ServerError> {
        let mut slots = self.lock();
        let entry = slots.entry_mut(id)?;
        if entry.state != ConnectionState::Dispatched {
            return Err(ServerError::already_released(id));
        }

        entry.state = next;
        if let Some(sender) = entry.reply.take() {
            // the I/O task only goes away once it was cancelled, which frees the slot anyway
            let _ = sender.send(reply);
        }
        Ok(())
    }

    pub(crate) fn mark_peer_closed(&self, id: ConnectionId) {
        if let Ok(entry) = self.lock().entry_mut(id) {
            entry.peer_closed = true;
        }
    }

    /// Returns true if the peer hung up, or the connection no longer exists.
    pub(crate) fn is_peer_closed(&self, id: ConnectionId) -> bool {
        self.lock().entry_mut(id).map_or(true, |entry| entry.peer_closed)
    }

    pub(crate) fn peer_addr(&self, id: ConnectionId) -> Option<SocketAddr> {
        self.lock().entry_mut(id).ok().map(|entry| entry.peer_addr)
    }

    pub(crate) fn state(&self, id: ConnectionId) -> ConnectionState {
        self.lock().entry_mut(id).map_or(ConnectionState::Released, |entry| entry.state)
    }

    /// Reclaim the slot of a finished connection.
    pub(crate) fn remove(&self, id: ConnectionId) {
        let mut slots = self.lock();
        let Some(slot) = slots.slots.get_mut(id.index as usize) else {
            return;
        };
        if slot.generation != id.generation || slot.entry.take().is_none() {
            return;
        }

        slot.generation = slot.generation.wrapping_add(1);
        slots.free.push(id.index);
        slots.live -= 1;
    }

    /// Take every live connection away from its owner and cancel its I/O.
    ///
    /// Returns how many of them were still held by the sink.
    pub(crate) fn force_release_all(&self) -> usize {
        let mut slots = self.lock();
        let mut held_by_sink = 0;
        for entry in slots.slots.iter_mut().filter_map(|slot| slot.entry.as_mut()) {
            if entry.state == ConnectionState::Dispatched {
                held_by_sink += 1;
                entry.state = ConnectionState::ReleasedPending;
                entry.reply.take();
            }
            entry.cancel.cancel();
        }
        held_by_sink
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().live
    }
}
