// src/ingest/dedup.rs
use std::collections::HashSet;
use std::sync::Mutex;

/// Run-scoped set of admitted canonical links.
///
/// `admit` is a single test-and-set under one lock, so exactly one of any
/// number of concurrent callers with the same link gets `true`.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: Mutex<HashSet<String>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time a link is seen during this run, false afterwards.
    pub fn admit(&self, link: &str) -> bool {
        self.seen
            .lock()
            .expect("dedup set poisoned")
            .insert(link.to_string())
    }

    pub fn contains(&self, link: &str) -> bool {
        self.seen.lock().expect("dedup set poisoned").contains(link)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().expect("dedup set poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_admit_wins() {
        let d = Deduplicator::new();
        assert!(d.admit("https://a.example/1"));
        assert!(!d.admit("https://a.example/1"));
        assert!(d.admit("https://a.example/2"));
        assert_eq!(d.len(), 2);
        assert!(d.contains("https://a.example/1"));
    }
}
