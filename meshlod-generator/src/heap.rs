//! Indexed min-heap of vertex collapse costs
//!
//! Keyed by vertex so a cost can be replaced or dropped in O(log n). Equal
//! costs pop in insertion order, which keeps reductions reproducible.

use crate::data::VertexId;
use priority_queue::PriorityQueue;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy)]
struct CostKey {
    cost: f32,
    seq: u64,
}

impl PartialEq for CostKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for CostKey {}

impl PartialOrd for CostKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CostKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: smallest cost first, then oldest entry
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
pub struct CollapseCostHeap {
    queue: PriorityQueue<VertexId, CostKey>,
    next_seq: u64,
}

impl fmt::Debug for CollapseCostHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollapseCostHeap")
            .field("len", &self.queue.len())
            .field("min", &self.peek())
            .finish()
    }
}

impl CollapseCostHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: PriorityQueue::with_capacity(capacity),
            next_seq: 0,
        }
    }

    /// Insert `vertex`, replacing any entry it already has.
    pub fn push(&mut self, vertex: VertexId, cost: f32) {
        let key = CostKey {
            cost,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.queue.remove(&vertex);
        self.queue.push(vertex, key);
    }

    pub fn remove(&mut self, vertex: VertexId) -> Option<f32> {
        self.queue.remove(&vertex).map(|(_, key)| key.cost)
    }

    /// Cheapest vertex and its cost.
    pub fn peek(&self) -> Option<(VertexId, f32)> {
        self.queue.peek().map(|(v, key)| (*v, key.cost))
    }

    pub fn pop(&mut self) -> Option<(VertexId, f32)> {
        self.queue.pop().map(|(v, key)| (v, key.cost))
    }

    pub fn cost_of(&self, vertex: VertexId) -> Option<f32> {
        self.queue.get_priority(&vertex).map(|key| key.cost)
    }

    pub fn contains(&self, vertex: VertexId) -> bool {
        self.queue.get_priority(&vertex).is_some()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
