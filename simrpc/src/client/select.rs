//! Selection policies.

use super::Route;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Picks one of several routes answering the same method.
pub trait Selector: Send + Sync + 'static {
    /// Select a route from non-empty `candidates`.
    fn select<'a>(&self, candidates: &[&'a Route]) -> Option<&'a Route>;
}

/// A policy shared between several ends.
impl<S: Selector> Selector for Arc<S> {
    fn select<'a>(&self, candidates: &[&'a Route]) -> Option<&'a Route> {
        (**self).select(candidates)
    }
}

/// Always the first candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstMatch;

impl Selector for FirstMatch {
    fn select<'a>(&self, candidates: &[&'a Route]) -> Option<&'a Route> {
        candidates.first().copied()
    }
}

/// Candidates in turn.
///
/// An end binds to the first route it picks, so a policy owned by a single
/// end only ever picks once. Share one `Arc<RoundRobin>` between ends to
/// spread them over the candidates.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    /// Start from the first candidate.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for RoundRobin {
    fn select<'a>(&self, candidates: &[&'a Route]) -> Option<&'a Route> {
        if candidates.is_empty() {
            return None;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        Some(candidates[i % candidates.len()])
    }
}
