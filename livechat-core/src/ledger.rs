// ABOUTME: Dedup ledger tracking which message IDs have been surfaced.
// ABOUTME: First page seeds the ledger silently; later pages are diffed against it.

use crate::message::ChatMessage;
use std::collections::{HashSet, VecDeque};

/// Set of already-seen message IDs plus the baseline-seed flag.
///
/// The first successful page on a fresh ledger is backlog, so it is recorded
/// with [`DedupLedger::seed`] and never surfaced. Every later page goes
/// through [`DedupLedger::filter`].
///
/// With a capacity the ledger forgets its oldest IDs first.
#[derive(Debug, Clone, Default)]
pub struct DedupLedger {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: Option<usize>,
    primed: bool,
}

impl DedupLedger {
    /// Unbounded ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger that remembers at most `capacity` IDs
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Record IDs without surfacing them and mark the ledger primed
    pub fn seed<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            self.record(id.into());
        }
        self.primed = true;
    }

    /// Return unseen text messages in server order and record their IDs.
    ///
    /// # Panics
    ///
    /// Panics if called before [`DedupLedger::seed`].
    pub fn filter(&mut self, messages: impl IntoIterator<Item = ChatMessage>) -> Vec<ChatMessage> {
        assert!(self.primed, "DedupLedger::filter called before seed");

        let mut fresh = Vec::new();
        for msg in messages {
            if !msg.is_text() || self.seen.contains(&msg.id) {
                continue;
            }
            self.record(msg.id.clone());
            fresh.push(msg);
        }
        fresh
    }

    /// Seed on the first page, filter afterwards
    pub fn ingest(&mut self, messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        if self.primed {
            self.filter(messages)
        } else {
            self.seed(messages.into_iter().map(|m| m.id));
            Vec::new()
        }
    }

    fn record(&mut self, id: String) {
        if !self.seen.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);

        if let Some(capacity) = self.capacity {
            while self.order.len() > capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.seen.remove(&oldest);
                }
            }
        }
    }
}
