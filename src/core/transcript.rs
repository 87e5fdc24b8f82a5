use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

/// Accumulates recognized speech fragments between cycles. Handles are
/// cheap clones sharing one buffer; `drain` reads and clears under a single
/// lock, so any fragment lands in exactly one snapshot.
#[derive(Clone, Default)]
pub struct TranscriptBuffer {
    fragments: Arc<Mutex<Vec<String>>>,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, fragment: &str) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return;
        }
        lock(&self.fragments).push(fragment.to_string());
    }

    /// Takes everything buffered so far and resets the buffer in one
    /// indivisible step.
    pub fn drain(&self) -> String {
        let taken = std::mem::take(&mut *lock(&self.fragments));
        if !taken.is_empty() {
            debug!(fragments = taken.len(), "transcript drained");
        }
        taken.join("\n")
    }

    pub fn len(&self) -> usize {
        lock(&self.fragments).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock(fragments: &Mutex<Vec<String>>) -> MutexGuard<'_, Vec<String>> {
    fragments.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
