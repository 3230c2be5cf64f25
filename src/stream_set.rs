//! Component F: the collection of a Session's live streams, indexed by
//! id with priority-ordered writable iteration (spec §4.F).

use crate::frame::StreamId;
use crate::stream::Stream;
use std::collections::{BTreeMap, VecDeque};

const PRIORITY_LEVELS: usize = 8;

/// Indexed by id (`BTreeMap`, O(log n) lookup) plus a per-priority FIFO
/// queue of ids used only to pick a fair starting point for the next
/// writable-stream scan; round-robin is achieved by rotating each
/// priority class's queue after it yields a stream.
#[derive(Default)]
pub struct StreamSet {
    streams: BTreeMap<StreamId, Stream>,
    priority_order: [VecDeque<StreamId>; PRIORITY_LEVELS],
    local_count: usize,
    remote_count: usize,
}

impl StreamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stream: Stream) {
        let id = stream.id;
        let priority = stream.priority.min(7) as usize;
        if is_client_initiated(id) {
            self.local_count += 1;
        } else {
            self.remote_count += 1;
        }
        self.priority_order[priority].push_back(id);
        self.streams.insert(id, stream);
    }

    pub fn get(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    pub fn contains(&self, id: StreamId) -> bool {
        self.streams.contains_key(&id)
    }

    /// Removes a fully-closed stream exactly once (spec §3 invariant).
    pub fn remove(&mut self, id: StreamId) -> Option<Stream> {
        let removed = self.streams.remove(&id);
        if removed.is_some() {
            if is_client_initiated(id) {
                self.local_count = self.local_count.saturating_sub(1);
            } else {
                self.remote_count = self.remote_count.saturating_sub(1);
            }
            for queue in &mut self.priority_order {
                queue.retain(|&qid| qid != id);
            }
        }
        removed
    }

    pub fn local_count(&self) -> usize {
        self.local_count
    }

    pub fn remote_count(&self) -> usize {
        self.remote_count
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.streams.keys().copied()
    }

    /// Returns the next writable stream (has data, not write-blocked, open
    /// locally) in priority order (0 first), round-robin within a
    /// priority class so concurrent equal-priority uploads interleave
    /// fairly. Rotates the winning priority class's queue so the next call
    /// starts after it.
    pub fn next_priority_stream(&mut self) -> Option<StreamId> {
        for queue in &mut self.priority_order {
            let len = queue.len();
            for _ in 0..len {
                let id = *queue.front()?;
                queue.rotate_left(1);
                if let Some(stream) = self.streams.get(&id) {
                    if stream.is_writable() {
                        return Some(id);
                    }
                } else {
                    // Stale entry for a removed stream; drop it.
                    queue.pop_back();
                }
            }
        }
        None
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Stream> {
        self.streams.values_mut()
    }
}

fn is_client_initiated(id: StreamId) -> bool {
    id % 2 == 1
}
