use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Per-author "do not ask again before" table for trust lookups.
///
/// Bounded: once it grows past `capacity`, expired entries are dropped and
/// then the entries closest to expiry until it fits again.
#[derive(Debug)]
pub struct CooldownTable {
    until: HashMap<String, Instant>,
    window: Duration,
    capacity: usize,
}

impl CooldownTable {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            until: HashMap::new(),
            window,
            capacity: capacity.max(1),
        }
    }

    pub fn is_cooling(&self, author_id: &str, now: Instant) -> bool {
        self.until
            .get(author_id)
            .map_or(false, |until| now < *until)
    }

    /// Starts the cooldown window for `author_id` unless one is still running.
    /// Returns whether the caller may fetch now.
    pub fn try_acquire(&mut self, author_id: &str, now: Instant) -> bool {
        if self.is_cooling(author_id, now) {
            log::debug!("Lookup for {author_id} suppressed by cooldown");
            return false;
        }
        self.until.insert(author_id.to_string(), now + self.window);
        if self.until.len() > self.capacity {
            self.evict(now);
        }
        true
    }

    fn evict(&mut self, now: Instant) {
        self.until.retain(|_, until| *until > now);
        if self.until.len() <= self.capacity {
            return;
        }

        let mut by_expiry: Vec<(Instant, String)> = self
            .until
            .iter()
            .map(|(id, until)| (*until, id.clone()))
            .collect();
        by_expiry.sort();
        let excess = self.until.len() - self.capacity;
        for (_, id) in by_expiry.into_iter().take(excess) {
            self.until.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.until.len()
    }

    pub fn is_empty(&self) -> bool {
        self.until.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_window() {
        let mut table = CooldownTable::new(Duration::from_secs(15), 16);
        let start = Instant::now();

        assert!(table.try_acquire("alice", start));
        assert!(!table.try_acquire("alice", start + Duration::from_secs(5)));
        assert!(table.is_cooling("alice", start + Duration::from_millis(14_999)));
        assert!(!table.is_cooling("alice", start + Duration::from_secs(15)));
        assert!(table.try_acquire("alice", start + Duration::from_secs(15)));
        assert!(table.try_acquire("bob", start + Duration::from_secs(5)));
    }

    #[test]
    fn test_capacity_evicts_expired_first() {
        let mut table = CooldownTable::new(Duration::from_secs(10), 3);
        let start = Instant::now();

        assert!(table.try_acquire("a", start));
        assert!(table.try_acquire("b", start));
        assert!(table.try_acquire("c", start + Duration::from_secs(8)));
        // a and b have expired by now; inserting d trims them.
        assert!(table.try_acquire("d", start + Duration::from_secs(12)));

        assert_eq!(table.len(), 2);
        assert!(table.is_cooling("c", start + Duration::from_secs(12)));
        assert!(table.is_cooling("d", start + Duration::from_secs(12)));
    }

    #[test]
    fn test_capacity_evicts_oldest_when_nothing_expired() {
        let mut table = CooldownTable::new(Duration::from_secs(60), 2);
        let start = Instant::now();

        assert!(table.try_acquire("a", start));
        assert!(table.try_acquire("b", start + Duration::from_secs(1)));
        assert!(table.try_acquire("c", start + Duration::from_secs(2)));

        assert_eq!(table.len(), 2);
        assert!(!table.is_cooling("a", start + Duration::from_secs(3)));
        assert!(table.is_cooling("c", start + Duration::from_secs(3)));
    }
}
