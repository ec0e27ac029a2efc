use crate::ids::NodeId;
use crate::node::Node;

/// Arena-based storage for nodes.
/// Uses a `Vec<Option<Node>>` indexed by `NodeId` for O(1) lookups. Handles
/// are allocated here: index 0 is reserved (nil), freed slots go on a free
/// list, and reuse bumps the slot generation so stale handles miss.
pub struct NodeArena {
    slots: Vec<Option<Node>>,
    generations: Vec<u32>,
    free: Vec<u32>,
    live: u32,
}

impl NodeArena {
    /// Create a new empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Create a new arena with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            generations: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Insert a node, allocating its handle. The handle is written into the
    /// node's `id` field before storage so `node.id()` always matches the
    /// slot it lives in.
    pub fn insert(&mut self, mut node: Node) -> NodeId {
        let (idx, generation) = match self.free.pop() {
            Some(idx) => (idx as usize, self.generations[idx as usize]),
            None => {
                self.slots.push(None);
                self.generations.push(0);
                (self.slots.len() - 1, 0)
            }
        };

        if self.slots[idx].is_some() {
            panic!("NodeArena::insert: free-list slot already occupied (index={})", idx + 1);
        }

        // NodeId 0 is reserved (nil), so slot 0 maps to NodeId index 1
        let id = NodeId::from_parts((idx + 1) as u32, generation);
        node.id = id;
        self.slots[idx] = Some(node);
        self.live += 1;
        id
    }

    #[inline]
    fn slot_index(&self, id: NodeId) -> Option<usize> {
        let index = id.index();
        if index == 0 {
            return None; // NodeId 0 is reserved (nil)
        }
        let idx = (index as usize) - 1;
        if idx >= self.slots.len() || self.generations[idx] != id.generation() {
            return None;
        }
        Some(idx)
    }

    /// Get a reference to the node (if the handle is live).
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        let idx = self.slot_index(id)?;
        self.slots[idx].as_ref()
    }

    /// Get a mutable reference to the node (if the handle is live).
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let idx = self.slot_index(id)?;
        self.slots[idx].as_mut()
    }

    /// Remove a node, freeing its slot. The slot generation is bumped
    /// immediately so the removed handle (and any copies) go stale.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let idx = self.slot_index(id)?;
        let out = self.slots[idx].take()?;
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.free.push(idx as u32);
        self.live -= 1;
        Some(out)
    }

    /// Get the number of live nodes in the arena.
    #[inline]
    pub fn len(&self) -> usize {
        self.live as usize
    }

    /// Check if the arena is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Check if a handle refers to a live node.
    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.slot_index(id)
            .map_or(false, |idx| self.slots[idx].is_some())
    }

    /// Iterate over all live nodes (non-None slots).
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.as_ref()
                .map(|node| (NodeId::from_parts((idx + 1) as u32, self.generations[idx]), node))
        })
    }

    /// Iterate mutably over all live nodes (non-None slots).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (NodeId, &mut Node)> {
        let generations = &self.generations;
        self.slots.iter_mut().enumerate().filter_map(move |(idx, slot)| {
            slot.as_mut()
                .map(|node| (NodeId::from_parts((idx + 1) as u32, generations[idx]), node))
        })
    }

    /// Get all live handles in the arena.
    pub fn keys(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.as_ref()
                .map(|_| NodeId::from_parts((idx + 1) as u32, self.generations[idx]))
        })
    }

    /// Get all live nodes in the arena.
    pub fn values(&self) -> impl Iterator<Item = &Node> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }

    /// Get mutable references to all live nodes in the arena.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.slots.iter_mut().filter_map(|slot| slot.as_mut())
    }
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_assigns_matching_handle() {
        let mut arena = NodeArena::new();
        let id = arena.insert(Node::new());
        assert_eq!(id.index(), 1);
        assert_eq!(id.generation(), 0);
        assert_eq!(arena.get(id).unwrap().id(), id);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn remove_leaves_hole_and_reuses_slot() {
        let mut arena = NodeArena::new();
        let a = arena.insert(Node::new());
        let b = arena.insert(Node::new());
        assert!(arena.remove(a).is_some());
        assert_eq!(arena.len(), 1);
        assert!(arena.get(a).is_none());
        assert!(arena.contains(b));

        let c = arena.insert(Node::new());
        // Slot reused with a bumped generation
        assert_eq!(c.index(), a.index());
        assert_eq!(c.generation(), a.generation() + 1);
    }

    #[test]
    fn stale_handle_misses_after_reuse() {
        let mut arena = NodeArena::new();
        let a = arena.insert(Node::new());
        arena.remove(a);
        let b = arena.insert(Node::new());
        assert!(arena.get(a).is_none());
        assert!(arena.get(b).is_some());
        assert!(!arena.contains(a));
    }

    #[test]
    fn nil_handle_never_resolves() {
        let mut arena = NodeArena::new();
        arena.insert(Node::new());
        assert!(arena.get(NodeId::nil()).is_none());
        assert!(arena.remove(NodeId::nil()).is_none());
    }

    #[test]
    fn iteration_yields_live_handles() {
        let mut arena = NodeArena::new();
        let a = arena.insert(Node::new());
        let b = arena.insert(Node::new());
        let c = arena.insert(Node::new());
        arena.remove(b);

        let keys: Vec<NodeId> = arena.keys().collect();
        assert_eq!(keys, vec![a, c]);
        for (id, node) in arena.iter() {
            assert_eq!(node.id(), id);
        }
    }
}
