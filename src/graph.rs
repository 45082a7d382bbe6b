//! Storage for registered [`Conversion`] edges, and the generic shortest
//! path search the fishing planner runs over the Type and Model graphs.

use std::collections::{BinaryHeap, HashMap};

use slotmap::{DefaultKey, SlotMap};

use crate::descriptor::conversion::{Conversion, Edge};
use crate::descriptor::{ConversionRef, FormatRef, ModelRef, TypeRef};
use crate::error::Error;
use crate::registry::Ref;

/// Keeps one adjacency table (outgoing edges + edge-by-pair lookup) per
/// kind of conversion graph (Type, Model) plus a flat pair lookup for the
/// Format graph, which the planner only ever consults for its single-hop
/// shortcut.
#[derive(Default)]
pub(crate) struct ConversionStore {
    slots: SlotMap<DefaultKey, Conversion>,
    type_pairs: HashMap<(DefaultKey, DefaultKey), DefaultKey>,
    type_out: HashMap<DefaultKey, Vec<DefaultKey>>,
    model_pairs: HashMap<(DefaultKey, DefaultKey), DefaultKey>,
    model_out: HashMap<DefaultKey, Vec<DefaultKey>>,
    format_pairs: HashMap<(DefaultKey, DefaultKey), DefaultKey>,
    next_order: u64,
}

impl ConversionStore {
    pub(crate) fn register(
        &mut self,
        edge: Edge,
        kernel: crate::kernel::Kernel,
        cost: Option<u32>,
    ) -> Result<ConversionRef, Error> {
        let cost = cost.unwrap_or(1);
        let (pairs, out, src_key, dst_key) = match edge {
            Edge::Type(s, d) => (&mut self.type_pairs, Some(&mut self.type_out), s.key(), d.key()),
            Edge::Model(s, d) => (&mut self.model_pairs, Some(&mut self.model_out), s.key(), d.key()),
            Edge::Format(s, d) => (&mut self.format_pairs, None, s.key(), d.key()),
        };
        let pair = (src_key, dst_key);

        if let Some(&existing) = pairs.get(&pair) {
            let keep_new = self.slots[existing].cost > cost;
            if !keep_new {
                return Ok(Ref::new(existing));
            }
            let order = self.slots[existing].order;
            self.slots[existing] = Conversion { edge, kernel, cost, order };
            return Ok(Ref::new(existing));
        }

        let order = self.next_order;
        self.next_order += 1;
        let key = self.slots.insert(Conversion { edge, kernel, cost, order });
        pairs.insert(pair, key);
        if let Some(out) = out {
            out.entry(src_key).or_default().push(dst_key);
        }
        Ok(Ref::new(key))
    }

    pub(crate) fn conversion(&self, r: ConversionRef) -> &Conversion {
        &self.slots[r.key()]
    }

    pub(crate) fn format_shortcut(&self, src: FormatRef, dst: FormatRef) -> Option<ConversionRef> {
        self.format_pairs
            .get(&(src.key(), dst.key()))
            .map(|&k| Ref::new(k))
    }

    pub(crate) fn type_path(&self, src: TypeRef, dst: TypeRef) -> Option<Vec<ConversionRef>> {
        shortest_path(&self.type_out, &self.type_pairs, &self.slots, src.key(), dst.key())
    }

    pub(crate) fn model_path(&self, src: ModelRef, dst: ModelRef) -> Option<Vec<ConversionRef>> {
        shortest_path(&self.model_out, &self.model_pairs, &self.slots, src.key(), dst.key())
    }
}

#[derive(Clone)]
struct Candidate {
    cost: u64,
    edges: u32,
    first_order: u64,
    node: DefaultKey,
    path: Vec<DefaultKey>,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        (self.cost, self.edges, self.first_order) == (other.cost, other.edges, other.first_order)
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        // Reversed: BinaryHeap is a max-heap, and we want the least-cost,
        // fewest-edges, earliest-first-registered candidate out first.
        (other.cost, other.edges, other.first_order).cmp(&(self.cost, self.edges, self.first_order))
    }
}

/// Dijkstra over a graph whose edges are stored as a `(src,dst) ->
/// conversion` map plus outgoing adjacency, visited once a node's minimal
/// `(cost, edge_count, first_edge_order)` tuple is finalized.
///
/// Ties are broken deterministically: lowest total cost, then fewest edges,
/// then the path whose first edge was registered earliest.
fn shortest_path(
    out: &HashMap<DefaultKey, Vec<DefaultKey>>,
    pairs: &HashMap<(DefaultKey, DefaultKey), DefaultKey>,
    conversions: &SlotMap<DefaultKey, Conversion>,
    start: DefaultKey,
    goal: DefaultKey,
) -> Option<Vec<ConversionRef>> {
    if start == goal {
        return Some(Vec::new());
    }

    let mut best: HashMap<DefaultKey, (u64, u32, u64)> = HashMap::new();
    let mut heap = BinaryHeap::new();
    heap.push(Candidate {
        cost: 0,
        edges: 0,
        first_order: u64::MAX,
        node: start,
        path: Vec::new(),
    });

    while let Some(current) = heap.pop() {
        if current.node == goal {
            return Some(
                current
                    .path
                    .into_iter()
                    .map(Ref::new)
                    .collect(),
            );
        }
        let key = (current.cost, current.edges, current.first_order);
        if let Some(&seen) = best.get(&current.node) {
            if seen <= key && current.node != start {
                continue;
            }
        }
        best.insert(current.node, key);

        let Some(neighbors) = out.get(&current.node) else {
            continue;
        };
        for &next in neighbors {
            let Some(&edge_key) = pairs.get(&(current.node, next)) else {
                continue;
            };
            let edge = &conversions[edge_key];
            let mut path = current.path.clone();
            path.push(edge_key);
            let first_order = if current.path.is_empty() {
                edge.order
            } else {
                current.first_order
            };
            heap.push(Candidate {
                cost: current.cost + u64::from(edge.cost),
                edges: current.edges + 1,
                first_order,
                node: next,
                path,
            });
        }
    }
    None
}
