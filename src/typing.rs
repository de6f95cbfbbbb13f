//! Per-peer typing timers.
//!
//! A peer stays "typing" until `typing_timeout` has passed since its most
//! recent typing indicator. Each peer has at most one live timer; a new
//! indicator aborts the pending one and schedules a fresh one. Expiries are
//! posted back to the session worker, which applies them through
//! [`TypingRegistry::expire`].

use chatcore::types::UserId;
use log::{debug, trace};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingExpired {
    pub peer: UserId,
    pub generation: u64,
}

struct TypingEntry {
    expires_at: Instant,
    generation: u64,
    timer: JoinHandle<()>,
}

pub struct TypingRegistry {
    timeout: Duration,
    entries: HashMap<UserId, TypingEntry>,
    next_generation: u64,
    expired_tx: mpsc::UnboundedSender<TypingExpired>,
}

impl TypingRegistry {
    pub fn new(timeout: Duration) -> (Self, mpsc::UnboundedReceiver<TypingExpired>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let registry = Self {
            timeout,
            entries: HashMap::new(),
            next_generation: 0,
            expired_tx,
        };
        (registry, expired_rx)
    }

    /// Marks `peer` as typing and restarts its countdown. Returns true if the
    /// peer was not typing before.
    pub fn set_typing(&mut self, peer: UserId) -> bool {
        let was_typing = match self.entries.remove(&peer) {
            Some(previous) => {
                previous.timer.abort();
                true
            }
            None => false,
        };

        self.next_generation += 1;
        let generation = self.next_generation;
        let expires_at = Instant::now() + self.timeout;
        let tx = self.expired_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            let _ = tx.send(TypingExpired { peer, generation });
        });

        trace!(target: "Typing", "{peer} typing until {expires_at:?} (generation {generation})");
        self.entries.insert(
            peer,
            TypingEntry {
                expires_at,
                generation,
                timer,
            },
        );
        !was_typing
    }

    /// Drops `peer`'s typing state now. Returns true if it was typing.
    pub fn clear(&mut self, peer: &UserId) -> bool {
        match self.entries.remove(peer) {
            Some(entry) => {
                entry.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Applies a fired timer. Returns true if this expiry ended the peer's
    /// typing state; expiries from superseded timers are ignored.
    pub fn expire(&mut self, expired: TypingExpired) -> bool {
        match self.entries.get(&expired.peer) {
            Some(entry) if entry.generation == expired.generation => {
                self.entries.remove(&expired.peer);
                debug!(target: "Typing", "{} stopped typing", expired.peer);
                true
            }
            Some(_) => {
                trace!(target: "Typing", "Ignoring stale expiry for {}", expired.peer);
                false
            }
            None => false,
        }
    }

    /// Aborts every pending timer without reporting anything.
    pub fn cancel_all(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.timer.abort();
        }
    }

    pub fn is_typing(&self, peer: &UserId) -> bool {
        self.entries.contains_key(peer)
    }

    /// Peer to the instant its typing state lapses.
    pub fn indicators(&self) -> HashMap<UserId, Instant> {
        self.entries
            .iter()
            .map(|(peer, entry)| (*peer, entry.expires_at))
            .collect()
    }
}

impl Drop for TypingRegistry {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
