//! The two halves of lexical addressing.
//!
//! `Environment` is the compile-time half: a stack of blocks of variable
//! names mirroring the lexical nesting being analyzed. It resolves names to
//! (depth, index) coordinates and is discarded once analysis is done.
//!
//! `Activation` is the run-time half: one instantiation of a lexical block's
//! variable storage, linked to the activation of the lexically enclosing
//! block. The two are only meaningful together: an Activation chain built by
//! the same sequence of extensions the Environment saw makes every coordinate
//! a two-hop O(1) fetch. Every `extend` must be paired with exactly one
//! `pop`, or coordinates baked into already-analyzed code go stale.

use crate::value::{ActivationId, Value};

/// Compile-time mirror of lexical nesting. Not heap-allocated; the innermost
/// block is last.
pub struct Environment {
    blocks: Vec<Vec<String>>,
}

impl Environment {
    /// A fresh environment has one empty block: the global scope.
    pub fn new() -> Environment {
        Environment {
            blocks: vec![Vec::new()],
        }
    }

    /// Push a new block for a lambda's parameters (and scanned-ahead internal
    /// definitions).
    pub fn extend(&mut self, names: Vec<String>) {
        self.blocks.push(names);
    }

    /// Remove the innermost block. Callers pair every `extend` with exactly
    /// one `pop`; `Heap::with_extended_env` enforces the pairing.
    pub fn pop(&mut self) {
        debug_assert!(self.blocks.len() > 1, "popped the global block");
        self.blocks.pop();
    }

    /// Add a name to the innermost block and return its (0, index)
    /// coordinate. Defining a name already present in the block returns the
    /// existing coordinate, so repeated definitions reuse one slot.
    pub fn define(&mut self, name: &str) -> (u32, u32) {
        let block = self.blocks.last_mut().expect("environment has no blocks");
        let index = match block.iter().position(|n| n == name) {
            Some(index) => index,
            None => {
                block.push(name.to_string());
                block.len() - 1
            }
        };
        (0, index as u32)
    }

    /// Add a name to the outermost (global) block regardless of current
    /// nesting, returning its coordinate relative to the innermost block.
    pub fn define_global(&mut self, name: &str) -> (u32, u32) {
        let depth = (self.blocks.len() - 1) as u32;
        let block = &mut self.blocks[0];
        let index = match block.iter().position(|n| n == name) {
            Some(index) => index,
            None => {
                block.push(name.to_string());
                block.len() - 1
            }
        };
        (depth, index as u32)
    }

    /// Resolve a name to (depth, index), searching innermost-to-outermost.
    /// Shadowing is by nearest enclosing block.
    pub fn lookup(&self, name: &str) -> Option<(u32, u32)> {
        for (depth, block) in self.blocks.iter().rev().enumerate() {
            if let Some(index) = block.iter().position(|n| n == name) {
                return Some((depth as u32, index as u32));
            }
        }
        None
    }
}

impl Default for Environment {
    fn default() -> Environment {
        Environment::new()
    }
}

/// Run-time storage for one lexical block: a slot per variable plus the link
/// to the enclosing activation. A `None` slot is a variable whose definition
/// has not run yet (a forward-referenced global). Slots never shrink; the
/// whole record is reclaimed only by the collector once unreachable.
#[derive(Default)]
pub struct Activation {
    slots: Vec<Option<Value>>,
    parent: Option<ActivationId>,
}

impl Activation {
    pub fn new(values: Vec<Value>, parent: Option<ActivationId>) -> Activation {
        Activation {
            slots: values.into_iter().map(Some).collect(),
            parent,
        }
    }

    pub fn parent(&self) -> Option<ActivationId> {
        self.parent
    }

    /// Read a local slot. `None` for out-of-range or not-yet-defined slots.
    pub fn fetch(&self, index: u32) -> Option<Value> {
        self.slots.get(index as usize).copied().flatten()
    }

    /// Mutate an existing slot in place. Returns false if the slot does not
    /// exist or was never defined.
    pub fn update(&mut self, index: u32, value: Value) -> bool {
        match self.slots.get_mut(index as usize) {
            Some(slot @ Some(_)) => {
                *slot = Some(value);
                true
            }
            _ => false,
        }
    }

    /// Set a slot directly, growing the slot vector if the coordinate is past
    /// the end. Used by `define` for internal and global definitions.
    pub fn define(&mut self, index: u32, value: Value) {
        let index = index as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(value);
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The defined slot values, for tracing.
    pub fn slot_values(&self) -> impl Iterator<Item = Value> + '_ {
        self.slots.iter().copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::heap::Heap;

    #[test]
    fn lookup_finds_nearest_enclosing_block() {
        let mut env = Environment::new();
        env.define("x");
        env.define("y");
        env.extend(vec!["a".to_string(), "x".to_string()]);

        // Inner x shadows the global one.
        assert_eq!(env.lookup("x"), Some((0, 1)));
        assert_eq!(env.lookup("a"), Some((0, 0)));
        assert_eq!(env.lookup("y"), Some((1, 1)));
        assert_eq!(env.lookup("z"), None);

        env.pop();
        assert_eq!(env.lookup("x"), Some((0, 0)));
        assert_eq!(env.lookup("a"), None);
    }

    #[test]
    fn define_reuses_existing_slot() {
        let mut env = Environment::new();
        let first = env.define("x");
        let second = env.define("x");
        assert_eq!(first, second);
    }

    #[test]
    fn define_global_reaches_past_nesting() {
        let mut env = Environment::new();
        env.extend(vec!["a".to_string()]);
        env.extend(vec!["b".to_string()]);
        let (depth, index) = env.define_global("g");
        assert_eq!(depth, 2);
        assert_eq!(index, 0);
        // From the global scope itself the same name is at depth 0.
        env.pop();
        env.pop();
        assert_eq!(env.lookup("g"), Some((0, 0)));
    }

    #[test]
    fn coordinates_fetch_the_bound_value() {
        let mut env = Environment::new();
        let mut heap = Heap::new();

        let (_, x_index) = env.define("x");
        let base = heap
            .allocate_activation(vec![], None)
            .expect("fresh heap cannot be full");
        heap.define_slot(base, x_index, Value::Integer(1));

        env.extend(vec!["x".to_string(), "y".to_string()]);
        let inner = heap
            .extend_activation(base, vec![Value::Integer(2), Value::Integer(3)])
            .expect("fresh heap cannot be full");

        let (depth, index) = env.lookup("x").expect("x is bound");
        assert_eq!(heap.fetch(inner, depth, index), Some(Value::Integer(2)));
        let (depth, index) = env.lookup("y").expect("y is bound");
        assert_eq!(heap.fetch(inner, depth, index), Some(Value::Integer(3)));

        env.pop();
        let (depth, index) = env.lookup("x").expect("x is bound globally");
        assert_eq!(heap.fetch(base, depth, index), Some(Value::Integer(1)));
    }

    /// Encode a (block, position) pair as a distinct integer so fetches can
    /// be checked against the model.
    fn slot_tag(block: usize, position: usize) -> Value {
        Value::Integer((block * 100 + position) as i64)
    }

    proptest! {
        /// For any nesting of blocks over a small name pool, `lookup`
        /// coordinates applied to the mirrored activation chain fetch the
        /// value bound in the nearest enclosing block that holds the name.
        #[test]
        fn lookup_agrees_with_mirrored_activations(
            blocks in prop::collection::vec(
                prop::sample::subsequence(vec![0usize, 1, 2, 3, 4], 1..=4),
                1..5,
            )
        ) {
            let names = ["a", "b", "c", "d", "e"];
            let mut env = Environment::new();
            let mut heap = Heap::new();

            // Global block via define; nested blocks via extend, with the
            // activation chain built in lockstep.
            let mut innermost = heap
                .allocate_activation(vec![], None)
                .expect("fresh heap cannot be full");
            for (position, &name) in blocks[0].iter().enumerate() {
                let (_, index) = env.define(names[name]);
                heap.define_slot(innermost, index, slot_tag(0, position));
            }
            for (block_number, block) in blocks.iter().enumerate().skip(1) {
                let block_names: Vec<String> =
                    block.iter().map(|&n| names[n].to_string()).collect();
                let values: Vec<Value> = (0..block.len())
                    .map(|position| slot_tag(block_number, position))
                    .collect();
                env.extend(block_names);
                innermost = heap
                    .extend_activation(innermost, values)
                    .expect("fresh heap cannot be full");
            }

            for (name_number, &name) in names.iter().enumerate() {
                // The model: nearest enclosing block containing the name.
                let expected = blocks
                    .iter()
                    .enumerate()
                    .rev()
                    .find_map(|(block_number, block)| {
                        block
                            .iter()
                            .position(|&n| n == name_number)
                            .map(|position| slot_tag(block_number, position))
                    });

                match env.lookup(name) {
                    Some((depth, index)) => {
                        prop_assert_eq!(heap.fetch(innermost, depth, index), expected);
                    }
                    None => prop_assert_eq!(expected, None),
                }
            }
        }
    }
}
