//! Interchangeable API credentials and the policies that pick among them.

use crate::config::CredentialSelection;
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Supplies one credential per outbound call, or `None` when the pool is empty.
pub trait CredentialPool: Send + Sync {
    fn next_key(&self) -> Option<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Uniform random choice per call.
#[derive(Debug, Clone)]
pub struct RandomPool {
    keys: Vec<String>,
}

impl RandomPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }
}

impl CredentialPool for RandomPool {
    fn next_key(&self) -> Option<String> {
        self.keys.choose(&mut rand::thread_rng()).cloned()
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Cycles through keys in order.
#[derive(Debug)]
pub struct RoundRobinPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl RoundRobinPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl CredentialPool for RoundRobinPool {
    fn next_key(&self) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        self.keys.get(i).cloned()
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

pub fn pool_for(selection: CredentialSelection, keys: Vec<String>) -> Arc<dyn CredentialPool> {
    match selection {
        CredentialSelection::Random => Arc::new(RandomPool::new(keys)),
        CredentialSelection::RoundRobin => Arc::new(RoundRobinPool::new(keys)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<String> {
        vec!["k1".to_string(), "k2".to_string(), "k3".to_string()]
    }

    #[test]
    fn empty_pools_yield_nothing() {
        assert!(RandomPool::new(vec![]).next_key().is_none());
        assert!(RoundRobinPool::new(vec![]).next_key().is_none());
        assert!(RandomPool::new(vec![]).is_empty());
    }

    #[test]
    fn random_pool_only_returns_known_keys() {
        let pool = RandomPool::new(keys());
        for _ in 0..50 {
            let key = pool.next_key().unwrap();
            assert!(keys().contains(&key));
        }
    }

    #[test]
    fn round_robin_cycles_in_order() {
        let pool = RoundRobinPool::new(keys());
        let picked: Vec<String> = (0..4).filter_map(|_| pool.next_key()).collect();
        assert_eq!(picked, vec!["k1", "k2", "k3", "k1"]);
    }

    #[test]
    fn pool_for_honours_selection() {
        let pool = pool_for(CredentialSelection::RoundRobin, keys());
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.next_key().as_deref(), Some("k1"));
        assert_eq!(pool.next_key().as_deref(), Some("k2"));
    }
}
