//! The garbage-collected heap.
//!
//! All Scheme data that outlives a single expression lives here: cons cells,
//! strings (and interned symbols, which are strings), activations, and user
//! procedures, each in its own `Arena`. Values hold index handles into the
//! arenas, so the heap is the sole owner of the data and the collector can
//! enumerate every object of a kind.
//!
//! Collection is stop-the-world mark-sweep. The root set is the explicit
//! root table (scoped `Rooted` guards plus `add_root` pins) together with
//! the static roots: the global activation and the interned control-flow
//! symbols. Any handle that must stay valid across a call that might
//! allocate must be rooted first; a plain handle is only safe between two
//! points that cannot allocate.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::arena::Arena;
use crate::environment::{Activation, Environment};
use crate::error::{SchemeError, SchemeResult};
use crate::eval::{Arity, MeaningRef};
use crate::primitives;
use crate::value::{ActivationId, ConsId, ProcedureId, StringId, Value};

/// A single cons cell. Mutable in place via `set-car!` / `set-cdr!`.
#[derive(Default, Clone, Copy)]
pub struct Cons {
    pub car: Value,
    pub cdr: Value,
}

/// A user lambda: its arity, its analyzed body, and the activation captured
/// at definition time (lexical scope). The options are `None` only for a
/// freshly swept slot; a reachable procedure always has both.
pub struct Procedure {
    pub arity: Arity,
    pub body: Option<MeaningRef>,
    pub act: Option<ActivationId>,
}

impl Default for Procedure {
    fn default() -> Procedure {
        Procedure {
            arity: Arity::Exact(0),
            body: None,
            act: None,
        }
    }
}

/// Uniform collector view of the four heap-allocatable kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GcThing {
    Cons(ConsId),
    String(StringId),
    Activation(ActivationId),
    Procedure(ProcedureId),
}

impl GcThing {
    /// The heap object a value references, if any. Immediates return `None`.
    pub fn of_value(value: Value) -> Option<GcThing> {
        match value {
            Value::Pair(id) => Some(GcThing::Cons(id)),
            Value::String(id) | Value::Symbol(id) => Some(GcThing::String(id)),
            Value::Procedure(id) => Some(GcThing::Procedure(id)),
            Value::EmptyList
            | Value::Integer(_)
            | Value::Boolean(_)
            | Value::Character(_)
            | Value::Primitive(_) => None,
        }
    }
}

/// The explicit root table. Shared between the heap and the `Rooted` guards
/// so a guard can release its slot on drop without borrowing the heap.
#[derive(Default)]
pub struct RootSet {
    slots: Vec<Option<GcThing>>,
    free: Vec<u32>,
}

impl RootSet {
    fn insert(&mut self, thing: GcThing) -> u32 {
        if let Some(slot) = self.free.pop() {
            self.slots[slot as usize] = Some(thing);
            return slot;
        }
        self.slots.push(Some(thing));
        (self.slots.len() - 1) as u32
    }

    fn remove(&mut self, slot: u32) {
        self.slots[slot as usize] = None;
        self.free.push(slot);
    }

    fn replace(&mut self, slot: u32, thing: GcThing) {
        self.slots[slot as usize] = Some(thing);
    }

    fn iter(&self) -> impl Iterator<Item = GcThing> + '_ {
        self.slots.iter().copied().flatten()
    }
}

/// Something a `Rooted` guard can pin: a `Copy` handle-carrying type that
/// knows which heap object (if any) it references.
pub trait Rootable: Copy {
    fn gc_referent(self) -> Option<GcThing>;
}

impl Rootable for Value {
    fn gc_referent(self) -> Option<GcThing> {
        GcThing::of_value(self)
    }
}

impl Rootable for ActivationId {
    fn gc_referent(self) -> Option<GcThing> {
        Some(GcThing::Activation(self))
    }
}

/// A scoped root: pins its target against collection for its lifetime.
/// Construction pushes the target onto the root table, destruction pops it
/// on every exit path, `emplace` swaps the target, and cloning re-roots.
/// Targets with no heap referent occupy no slot.
pub struct Rooted<T: Rootable> {
    set: Rc<RefCell<RootSet>>,
    slot: Option<u32>,
    target: T,
}

pub type RootedValue = Rooted<Value>;
pub type RootedActivation = Rooted<ActivationId>;

impl<T: Rootable> Rooted<T> {
    pub fn new(heap: &Heap, target: T) -> Rooted<T> {
        let slot = target
            .gc_referent()
            .map(|thing| heap.roots.borrow_mut().insert(thing));
        Rooted {
            set: Rc::clone(&heap.roots),
            slot,
            target,
        }
    }

    pub fn get(&self) -> T {
        self.target
    }

    /// Re-point this root: unroots the old target and roots the new one.
    pub fn emplace(&mut self, target: T) {
        match (self.slot, target.gc_referent()) {
            (Some(slot), Some(thing)) => self.set.borrow_mut().replace(slot, thing),
            (Some(slot), None) => {
                self.set.borrow_mut().remove(slot);
                self.slot = None;
            }
            (None, Some(thing)) => self.slot = Some(self.set.borrow_mut().insert(thing)),
            (None, None) => {}
        }
        self.target = target;
    }
}

impl<T: Rootable> Clone for Rooted<T> {
    fn clone(&self) -> Rooted<T> {
        let slot = self
            .target
            .gc_referent()
            .map(|thing| self.set.borrow_mut().insert(thing));
        Rooted {
            set: Rc::clone(&self.set),
            slot,
            target: self.target,
        }
    }
}

impl<T: Rootable> Drop for Rooted<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot {
            self.set.borrow_mut().remove(slot);
        }
    }
}

impl<T: Rootable + fmt::Debug> fmt::Debug for Rooted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rooted({:?})", self.target)
    }
}

/// A pin created by `Heap::add_root`, released with `Heap::drop_root`. For
/// handles that must survive across an operation boundary where no scope
/// can hold a `Rooted` guard.
#[derive(Clone, Copy, Debug)]
pub struct RootHandle {
    slot: Option<u32>,
}

/// The interned symbols the analyzer consults on every form, plus the
/// `unspecified` result value. Static roots: never collected.
struct StaticSymbols {
    quote: StringId,
    if_: StringId,
    begin: StringId,
    define: StringId,
    set_bang: StringId,
    lambda: StringId,
    unspecified: StringId,
}

impl StaticSymbols {
    fn all(&self) -> [StringId; 7] {
        [
            self.quote,
            self.if_,
            self.begin,
            self.define,
            self.set_bang,
            self.lambda,
            self.unspecified,
        ]
    }
}

/// Per-arena slot counts, for observing collection behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaCounts {
    pub cons: usize,
    pub strings: usize,
    pub activations: usize,
    pub procedures: usize,
}

const DEFAULT_ARENA_CAPACITY: usize = 4096;
const DEFAULT_MAX_OBJECTS: usize = 1 << 22;

/// Trigger a collection after this many allocations even if no arena is
/// full, so long-lived garbage does not pile up between full-arena events.
const GC_PRESSURE_THRESHOLD: usize = 64 * 1024;

pub struct Heap {
    cons_cells: Arena<Cons>,
    strings: Arena<String>,
    activations: Arena<Activation>,
    procedures: Arena<Procedure>,

    /// Interned symbol names. Symbol equality is handle equality because two
    /// identical names always map to the same heap string while either is
    /// alive. Entries whose string dies are pruned at collection.
    symbol_table: FxHashMap<String, StringId>,

    roots: Rc<RefCell<RootSet>>,
    statics: StaticSymbols,
    global_activation: ActivationId,

    /// The compile-time environment, kept on the heap so analysis and
    /// allocation share one context and `with_extended_env` can pair every
    /// extend with its pop.
    pub environment: Environment,

    /// Per-arena cap on live objects; arenas double toward it when a
    /// collection leaves them full.
    max_objects: usize,
    allocations_since_gc: usize,
    gc_threshold: usize,
}

/// Collect when the pressure counter trips or the target arena is full; if
/// the arena is still full afterwards, grow it toward the cap or fail.
macro_rules! ensure_space {
    ($heap:expr, $arena:ident) => {
        $heap.increase_gc_pressure();
        if $heap.$arena.is_full() {
            $heap.collect_garbage();
            if $heap.$arena.is_full() {
                let doubled = ($heap.$arena.capacity() * 2).min($heap.max_objects);
                if doubled <= $heap.$arena.capacity() {
                    return Err(SchemeError::OutOfMemory);
                }
                debug!(
                    arena = stringify!($arena),
                    new_capacity = doubled,
                    "arena full after collection, growing"
                );
                $heap.$arena.grow(doubled);
            }
        }
    };
}

impl Heap {
    pub fn new() -> Heap {
        Heap::with_capacity(DEFAULT_MAX_OBJECTS)
    }

    /// A heap whose arenas may grow up to `max_objects` live objects each.
    pub fn with_capacity(max_objects: usize) -> Heap {
        let initial = DEFAULT_ARENA_CAPACITY.min(max_objects.max(64));

        let mut strings = Arena::new(initial);
        let mut symbol_table = FxHashMap::default();
        let mut intern = |name: &str| -> StringId {
            let id = StringId(
                strings
                    .allocate(name.to_string())
                    .expect("fresh string arena cannot be full"),
            );
            symbol_table.insert(name.to_string(), id);
            id
        };
        let statics = StaticSymbols {
            quote: intern("quote"),
            if_: intern("if"),
            begin: intern("begin"),
            define: intern("define"),
            set_bang: intern("set!"),
            lambda: intern("lambda"),
            unspecified: intern("unspecified"),
        };

        let mut activations = Arena::new(initial);
        let global_activation = ActivationId(
            activations
                .allocate(Activation::default())
                .expect("fresh activation arena cannot be full"),
        );

        let mut heap = Heap {
            cons_cells: Arena::new(initial),
            strings,
            activations,
            procedures: Arena::new(initial),
            symbol_table,
            roots: Rc::new(RefCell::new(RootSet::default())),
            statics,
            global_activation,
            environment: Environment::new(),
            max_objects,
            allocations_since_gc: 0,
            gc_threshold: GC_PRESSURE_THRESHOLD,
        };

        primitives::install(&mut heap);
        heap
    }

    /// The activation backing the global scope.
    pub fn global_activation(&self) -> ActivationId {
        self.global_activation
    }

    // ========================================================================
    // Static symbols
    // ========================================================================

    pub fn quote_symbol(&self) -> Value {
        Value::Symbol(self.statics.quote)
    }

    pub fn if_symbol(&self) -> Value {
        Value::Symbol(self.statics.if_)
    }

    pub fn begin_symbol(&self) -> Value {
        Value::Symbol(self.statics.begin)
    }

    pub fn define_symbol(&self) -> Value {
        Value::Symbol(self.statics.define)
    }

    pub fn set_bang_symbol(&self) -> Value {
        Value::Symbol(self.statics.set_bang)
    }

    pub fn lambda_symbol(&self) -> Value {
        Value::Symbol(self.statics.lambda)
    }

    /// The value `define` and `set!` evaluate to.
    pub fn unspecified_symbol(&self) -> Value {
        Value::Symbol(self.statics.unspecified)
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Allocate a cons cell. `car` and `cdr` must be rooted by the caller if
    /// they reference the heap: allocation may collect.
    pub fn allocate_cons(&mut self, car: Value, cdr: Value) -> SchemeResult<ConsId> {
        ensure_space!(self, cons_cells);
        self.cons_cells.allocate(Cons { car, cdr }).map(ConsId)
    }

    pub fn allocate_string(&mut self, contents: String) -> SchemeResult<StringId> {
        ensure_space!(self, strings);
        self.strings.allocate(contents).map(StringId)
    }

    pub fn allocate_activation(
        &mut self,
        values: Vec<Value>,
        parent: Option<ActivationId>,
    ) -> SchemeResult<ActivationId> {
        ensure_space!(self, activations);
        self.activations
            .allocate(Activation::new(values, parent))
            .map(ActivationId)
    }

    /// Create a child activation with one slot per supplied value. Called
    /// once per procedure application; `parent` is the procedure's
    /// closed-over activation, not the caller's.
    pub fn extend_activation(
        &mut self,
        parent: ActivationId,
        values: Vec<Value>,
    ) -> SchemeResult<ActivationId> {
        self.allocate_activation(values, Some(parent))
    }

    pub fn allocate_procedure(&mut self, procedure: Procedure) -> SchemeResult<ProcedureId> {
        ensure_space!(self, procedures);
        self.procedures.allocate(procedure).map(ProcedureId)
    }

    /// Intern a symbol name: identical names share one heap string, making
    /// symbol equality a handle comparison.
    pub fn get_or_create_symbol(&mut self, name: &str) -> SchemeResult<Value> {
        if let Some(&id) = self.symbol_table.get(name) {
            return Ok(Value::Symbol(id));
        }
        let id = self.allocate_string(name.to_string())?;
        self.symbol_table.insert(name.to_string(), id);
        Ok(Value::Symbol(id))
    }

    // ========================================================================
    // Data access
    // ========================================================================

    pub fn car(&self, id: ConsId) -> Value {
        self.cons_cells.get(id.0).car
    }

    pub fn cdr(&self, id: ConsId) -> Value {
        self.cons_cells.get(id.0).cdr
    }

    pub fn set_car(&mut self, id: ConsId, value: Value) {
        self.cons_cells.get_mut(id.0).car = value;
    }

    pub fn set_cdr(&mut self, id: ConsId, value: Value) {
        self.cons_cells.get_mut(id.0).cdr = value;
    }

    pub fn string(&self, id: StringId) -> &str {
        self.strings.get(id.0)
    }

    /// The name of an interned symbol. Same storage as `string`.
    pub fn symbol_name(&self, id: StringId) -> &str {
        self.strings.get(id.0)
    }

    pub fn procedure(&self, id: ProcedureId) -> &Procedure {
        self.procedures.get(id.0)
    }

    pub fn activation(&self, id: ActivationId) -> &Activation {
        self.activations.get(id.0)
    }

    /// Build a proper list from a slice of values. The elements must be
    /// rooted by the caller; the partial list is rooted internally.
    pub fn list(&mut self, values: &[Value]) -> SchemeResult<Value> {
        let mut result = RootedValue::new(self, Value::EmptyList);
        for &value in values.iter().rev() {
            let id = self.allocate_cons(value, result.get())?;
            result.emplace(Value::Pair(id));
        }
        Ok(result.get())
    }

    /// Collect a proper list into a Vec. `None` if the value is not a proper
    /// list.
    pub fn list_to_vec(&self, value: Value) -> Option<Vec<Value>> {
        let mut items = Vec::new();
        let mut current = value;
        loop {
            match current {
                Value::EmptyList => return Some(items),
                Value::Pair(id) => {
                    items.push(self.car(id));
                    current = self.cdr(id);
                }
                _ => return None,
            }
        }
    }

    // ========================================================================
    // Activation chain operations
    // ========================================================================

    fn activation_at(&self, act: ActivationId, depth: u32) -> ActivationId {
        let mut current = act;
        for _ in 0..depth {
            current = self
                .activations
                .get(current.0)
                .parent()
                .expect("activation chain shorter than its static depth");
        }
        current
    }

    /// Walk `depth` parent links, then read the indexed slot. `None` if the
    /// slot's definition has not run.
    pub fn fetch(&self, act: ActivationId, depth: u32, index: u32) -> Option<Value> {
        let target = self.activation_at(act, depth);
        self.activations.get(target.0).fetch(index)
    }

    /// Walk `depth` parent links, then mutate the indexed slot in place.
    /// Returns false if the slot was never defined.
    pub fn update(&mut self, act: ActivationId, depth: u32, index: u32, value: Value) -> bool {
        let target = self.activation_at(act, depth);
        self.activations.get_mut(target.0).update(index, value)
    }

    /// Set a slot in the given activation directly, used by `define`.
    pub fn define_slot(&mut self, act: ActivationId, index: u32, value: Value) {
        self.activations.get_mut(act.0).define(index, value);
    }

    /// Push a new environment block, run `body`, and pop the block on every
    /// exit path, keeping the extend/pop pairing that coordinates depend on.
    pub fn with_extended_env<T>(
        &mut self,
        names: Vec<String>,
        body: impl FnOnce(&mut Heap) -> SchemeResult<T>,
    ) -> SchemeResult<T> {
        self.environment.extend(names);
        let result = body(self);
        self.environment.pop();
        result
    }

    // ========================================================================
    // Roots
    // ========================================================================

    /// Pin a value outside the scoped-rooting mechanism. Pair with
    /// `drop_root`.
    pub fn add_root(&mut self, value: Value) -> RootHandle {
        RootHandle {
            slot: GcThing::of_value(value).map(|thing| self.roots.borrow_mut().insert(thing)),
        }
    }

    pub fn drop_root(&mut self, handle: RootHandle) {
        if let Some(slot) = handle.slot {
            self.roots.borrow_mut().remove(slot);
        }
    }

    // ========================================================================
    // Collection
    // ========================================================================

    fn increase_gc_pressure(&mut self) {
        self.allocations_since_gc += 1;
        if self.allocations_since_gc >= self.gc_threshold {
            self.collect_garbage();
        }
    }

    /// The heap objects `thing` directly references.
    pub fn trace(&self, thing: GcThing) -> Vec<GcThing> {
        let mut children = Vec::new();
        match thing {
            GcThing::Cons(id) => {
                let cell = self.cons_cells.get(id.0);
                children.extend(GcThing::of_value(cell.car));
                children.extend(GcThing::of_value(cell.cdr));
            }
            GcThing::String(_) => {}
            GcThing::Activation(id) => {
                let act = self.activations.get(id.0);
                for value in act.slot_values() {
                    children.extend(GcThing::of_value(value));
                }
                if let Some(parent) = act.parent() {
                    children.push(GcThing::Activation(parent));
                }
            }
            GcThing::Procedure(id) => {
                let procedure = self.procedures.get(id.0);
                if let Some(body) = &procedure.body {
                    body.trace(&mut children);
                }
                if let Some(act) = procedure.act {
                    children.push(GcThing::Activation(act));
                }
            }
        }
        children
    }

    fn mark_thing(&mut self, thing: GcThing, worklist: &mut Vec<GcThing>) {
        let first_visit = match thing {
            GcThing::Cons(id) => self.cons_cells.mark(id.0),
            GcThing::String(id) => self.strings.mark(id.0),
            GcThing::Activation(id) => self.activations.mark(id.0),
            GcThing::Procedure(id) => self.procedures.mark(id.0),
        };
        if first_visit {
            worklist.push(thing);
        }
    }

    /// Stop-the-world mark-sweep over all four arenas.
    pub fn collect_garbage(&mut self) {
        self.cons_cells.clear_marks();
        self.strings.clear_marks();
        self.activations.clear_marks();
        self.procedures.clear_marks();

        let mut worklist: Vec<GcThing> = Vec::new();

        let rooted: Vec<GcThing> = self.roots.borrow().iter().collect();
        for thing in rooted {
            self.mark_thing(thing, &mut worklist);
        }
        self.mark_thing(GcThing::Activation(self.global_activation), &mut worklist);
        for id in self.statics.all() {
            self.mark_thing(GcThing::String(id), &mut worklist);
        }

        while let Some(thing) = worklist.pop() {
            let children = self.trace(thing);
            for child in children {
                self.mark_thing(child, &mut worklist);
            }
        }

        // Interned names whose string died would dangle; drop them so the
        // next interning of the name starts fresh.
        let strings = &self.strings;
        self.symbol_table.retain(|_, id| strings.is_marked(id.0));

        let swept = ArenaCounts {
            cons: self.cons_cells.sweep(),
            strings: self.strings.sweep(),
            activations: self.activations.sweep(),
            procedures: self.procedures.sweep(),
        };
        debug!(
            cons = swept.cons,
            strings = swept.strings,
            activations = swept.activations,
            procedures = swept.procedures,
            "collection finished"
        );

        self.allocations_since_gc = 0;
    }

    /// Free-slot counts per arena.
    pub fn free_counts(&self) -> ArenaCounts {
        ArenaCounts {
            cons: self.cons_cells.free_count(),
            strings: self.strings.free_count(),
            activations: self.activations.free_count(),
            procedures: self.procedures.free_count(),
        }
    }

    /// Live-slot counts per arena (accurate right after a collection).
    pub fn live_counts(&self) -> ArenaCounts {
        ArenaCounts {
            cons: self.cons_cells.live_count(),
            strings: self.strings.live_count(),
            activations: self.activations.live_count(),
            procedures: self.procedures.live_count(),
        }
    }
}

impl Default for Heap {
    fn default() -> Heap {
        Heap::new()
    }
}
