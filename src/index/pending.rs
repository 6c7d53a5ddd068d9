// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as TokioMutex;

/// Keyed in-flight work. Callers running under the same key are serialized,
/// so the second one finds whatever the first one left in the cache instead
/// of repeating the work. Different keys run concurrently.
pub struct InFlight<K> {
    pending: SyncMutex<Vec<(K, Arc<TokioMutex<()>>)>>,
}

impl<K> Default for InFlight<K> {
    fn default() -> Self {
        Self {
            pending: SyncMutex::new(Vec::with_capacity(8)),
        }
    }
}

impl<K: PartialEq + Clone> InFlight<K> {
    /// Runs `work` once every earlier caller with the same key is done.
    pub async fn run<F, Fut, T>(&self, key: &K, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mutex = {
            let mut pending = self.pending.lock();
            match pending.iter().find(|(k, _)| k == key) {
                Some((_, mutex)) => mutex.clone(),
                None => {
                    let mutex = Arc::new(TokioMutex::new(()));
                    pending.push((key.clone(), mutex.clone()));
                    mutex
                }
            }
        };
        let _release = Release { owner: self, key };
        let _guard = mutex.lock().await;
        work().await
    }

    /// Number of keys with work running or waiting.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drops the key once its last caller is gone, cancelled callers included.
struct Release<'a, K: PartialEq> {
    owner: &'a InFlight<K>,
    key: &'a K,
}

impl<K: PartialEq> Drop for Release<'_, K> {
    fn drop(&mut self) {
        self.owner.pending.lock().retain(|(k, mutex)| {
            // the entry's own Arc plus ours means nobody else is waiting
            k != self.key || Arc::strong_count(mutex) > 2
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let in_flight = Arc::new(InFlight::<u32>::default());
        let running = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let tasks = (0..4).map(|_| {
            let (in_flight, running, overlaps) =
                (in_flight.clone(), running.clone(), overlaps.clone());
            tokio::spawn(async move {
                in_flight
                    .run(&7, || async {
                        if running.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            })
        });
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn different_keys_overlap() {
        let in_flight = InFlight::<u32>::default();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let first = in_flight.run(&1, move || async move {
            rx.await.unwrap();
        });
        let second = in_flight.run(&2, move || async move {
            tx.send(()).unwrap();
        });
        tokio::time::timeout(Duration::from_secs(5), futures::future::join(first, second))
            .await
            .unwrap();
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn cancelled_caller_releases_the_key() {
        let in_flight = InFlight::<u32>::default();
        let stuck = in_flight.run(&1, || std::future::pending::<()>());
        assert!(tokio::time::timeout(Duration::from_millis(10), stuck).await.is_err());
        assert!(in_flight.is_empty());
    }
}
