use crate::sites::IdType;
use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

pub type LockKey = (IdType, String);

/// Waiting for the lock would never end: the holder is itself blocked, directly
/// or through other holders, on a lock the caller already holds. `chain` lists
/// the keys from the requested one back to the caller's own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitCycle {
    pub chain: Vec<LockKey>,
}

#[derive(Default)]
struct LockTable {
    held: HashMap<LockKey, ThreadId>,
    waiting: HashMap<ThreadId, LockKey>,
}

impl LockTable {
    /// Follows holder -> awaited key -> holder from `key` and returns the keys
    /// walked if the walk reaches a key held by `me`.
    fn wait_chain(&self, key: &LockKey, me: ThreadId) -> Option<Vec<LockKey>> {
        let mut chain = vec![key.clone()];
        let mut seen = HashSet::new();
        let mut current = key;
        while let Some(holder) = self.held.get(current) {
            if *holder == me {
                return Some(chain);
            }
            if !seen.insert(*holder) {
                return None;
            }
            current = self.waiting.get(holder)?;
            chain.push(current.clone());
        }
        None
    }
}

/// In-process advisory locks keyed by external identifier. Concurrent
/// acquisitions of one identifier run one after the other; the storage
/// unique constraints still back this up across processes.
///
/// Nested acquisitions run on the caller's thread, so a thread holds the
/// locks of its whole required-resource trail.
#[derive(Default)]
pub struct IdentifierLocks {
    table: Mutex<LockTable>,
    released: Condvar,
}

pub struct IdentifierGuard<'a> {
    locks: &'a IdentifierLocks,
    key: LockKey,
}

impl IdentifierLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until no other guard for the identifier is alive, unless the
    /// wait could never end.
    pub fn lock(&self, id_type: IdType, id_value: &str) -> Result<IdentifierGuard<'_>, WaitCycle> {
        let key = (id_type, id_value.to_string());
        let me = thread::current().id();
        let mut table = self.table.lock().unwrap();
        while table.held.contains_key(&key) {
            if let Some(chain) = table.wait_chain(&key, me) {
                return Err(WaitCycle { chain });
            }
            table.waiting.insert(me, key.clone());
            table = self.released.wait(table).unwrap();
            table.waiting.remove(&me);
        }
        table.held.insert(key.clone(), me);
        Ok(IdentifierGuard { locks: self, key })
    }

    pub fn is_locked(&self, id_type: IdType, id_value: &str) -> bool {
        self.table
            .lock()
            .unwrap()
            .held
            .contains_key(&(id_type, id_value.to_string()))
    }
}

impl Drop for IdentifierGuard<'_> {
    fn drop(&mut self) {
        self.locks.table.lock().unwrap().held.remove(&self.key);
        self.locks.released.notify_all();
    }
}
