//! Generation-tagged memo table with in-flight request sharing.
//!
//! Entries remember the generation they were computed under and only hit
//! while that generation is current. Concurrent lookups of a missing key
//! share one `OnceCell`, so the computation runs at most once per key and
//! generation.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tokio::sync::OnceCell;

/// How a lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Served from a current entry
    Hit,
    /// Waited on another caller's computation
    Joined,
    /// Ran the computation
    Computed,
}

struct Entry<V> {
    generation: u64,
    value: V,
}

enum Start<V> {
    Ready(V),
    Flight(Arc<Flight<V>>),
}

struct Flight<V> {
    generation: u64,
    cell: OnceCell<V>,
}

/// Memo table keyed by `K`.
pub struct MemoTable<K, V> {
    entries: DashMap<K, Entry<V>>,
    in_flight: DashMap<K, Arc<Flight<V>>>,
}

impl<K, V> MemoTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Value for `key` if it was stored under `generation`.
    pub fn get(&self, key: &K, generation: u64) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| entry.generation == generation)
            .map(|entry| entry.value.clone())
    }

    /// Store `value` under `generation` unless a newer entry exists.
    pub fn put(&self, key: K, generation: u64, value: V) {
        match self.entries.entry(key) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().generation <= generation {
                    occupied.insert(Entry { generation, value });
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry { generation, value });
            }
        }
    }

    /// Drop entries older than `generation`.
    pub fn purge_before(&self, generation: u64) {
        self.entries.retain(|_, entry| entry.generation >= generation);
    }

    /// Number of stored entries, current or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `key` as of `generation`, computing it at most once across
    /// concurrent callers of that generation.
    ///
    /// The result is stored only while `generation` is still `current`. A
    /// computation that finishes after the generation moved on, or that was
    /// started for an already stale generation, is returned to everyone
    /// waiting on it but is not stored: values loaded before an invalidation
    /// never answer lookups made after it.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: K,
        generation: u64,
        current: &AtomicU64,
        compute: F,
    ) -> (V, Lookup)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.get(&key, generation) {
            return (value, Lookup::Hit);
        }

        let flight = match self.join_or_start(&key, generation) {
            Start::Ready(value) => return (value, Lookup::Hit),
            Start::Flight(flight) => flight,
        };

        let mut computed = false;
        let value = flight
            .cell
            .get_or_init(|| {
                computed = true;
                compute()
            })
            .await
            .clone();

        if !computed {
            return (value, Lookup::Joined);
        }

        if current.load(Ordering::Acquire) == flight.generation {
            self.put(key.clone(), flight.generation, value.clone());
        }
        self.in_flight
            .remove_if(&key, |_, registered| Arc::ptr_eq(registered, &flight));

        (value, Lookup::Computed)
    }

    /// The flight for `key` at `generation`, registering a new one if needed.
    ///
    /// The stored entry is checked again under the in-flight shard lock: a
    /// flight stores its value before unregistering, so a value finished
    /// between the caller's miss and this call is returned as ready. A
    /// caller older than the registered flight gets an unregistered one.
    fn join_or_start(&self, key: &K, generation: u64) -> Start<V> {
        let fresh = || {
            Arc::new(Flight {
                generation,
                cell: OnceCell::new(),
            })
        };
        match self.in_flight.entry(key.clone()) {
            MapEntry::Occupied(mut occupied) => {
                let registered = occupied.get().generation;
                if registered == generation {
                    Start::Flight(Arc::clone(occupied.get()))
                } else if let Some(value) = self.get(key, generation) {
                    Start::Ready(value)
                } else if registered > generation {
                    Start::Flight(fresh())
                } else {
                    let flight = fresh();
                    occupied.insert(Arc::clone(&flight));
                    Start::Flight(flight)
                }
            }
            MapEntry::Vacant(vacant) => match self.get(key, generation) {
                Some(value) => Start::Ready(value),
                None => Start::Flight(Arc::clone(vacant.insert(fresh()).value())),
            },
        }
    }

    /// Number of registered in-flight computations.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl<K, V> Default for MemoTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
