use std::fmt;

use crate::error::SchemeResult;
use crate::heap::Heap;

/// Index into the cons-cell arena. This is the GC handle for a pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsId(pub u32);

/// Index into the string arena. Symbols are interned strings, so a symbol
/// carries a `StringId` too.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringId(pub u32);

/// Index into the activation arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivationId(pub u32);

/// Index into the procedure arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcedureId(pub u32);

/// The fundamental Scheme value. Copy semantics — heap-referencing tags carry
/// an index handle, not the data itself, so equality on them is identity
/// (same heap object), while immediates compare by value.
#[derive(Clone, Copy, PartialEq)]
pub enum Value {
    EmptyList,
    Pair(ConsId),
    String(StringId),
    Symbol(StringId),
    Integer(i64),
    Boolean(bool),
    Character(char),
    Procedure(ProcedureId),
    Primitive(Primitive),
}

/// The function signature for primitive procedures. Arguments are rooted by
/// the caller for the duration of the call.
pub type PrimitiveFunction = fn(&mut Heap, &[Value]) -> SchemeResult<Value>;

/// A built-in procedure: a plain function reference with a name for printing.
/// No heap allocation and no closure; identity is by function pointer.
#[derive(Clone, Copy)]
pub struct Primitive {
    pub name: &'static str,
    pub func: PrimitiveFunction,
}

impl PartialEq for Primitive {
    fn eq(&self, other: &Primitive) -> bool {
        self.func as usize == other.func as usize
    }
}

impl Eq for Primitive {}

impl Value {
    pub fn is_empty_list(self) -> bool {
        matches!(self, Value::EmptyList)
    }

    pub fn is_pair(self) -> bool {
        matches!(self, Value::Pair(_))
    }

    pub fn is_symbol(self) -> bool {
        matches!(self, Value::Symbol(_))
    }

    pub fn as_pair(self) -> Option<ConsId> {
        match self {
            Value::Pair(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_symbol(self) -> Option<StringId> {
        match self {
            Value::Symbol(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_integer(self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(i),
            _ => None,
        }
    }

    /// Returns true if this value is an atom (anything but a pair).
    pub fn is_atom(self) -> bool {
        !self.is_pair()
    }

    /// Scheme truthiness: everything except `#f` is true.
    pub fn is_truthy(self) -> bool {
        self != Value::Boolean(false)
    }
}

impl Default for Value {
    fn default() -> Value {
        Value::EmptyList
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::EmptyList => write!(f, "EmptyList"),
            Value::Pair(id) => write!(f, "Pair({})", id.0),
            Value::String(id) => write!(f, "String({})", id.0),
            Value::Symbol(id) => write!(f, "Symbol({})", id.0),
            Value::Integer(i) => write!(f, "Integer({})", i),
            Value::Boolean(b) => write!(f, "Boolean({})", b),
            Value::Character(c) => write!(f, "Character({:?})", c),
            Value::Procedure(id) => write!(f, "Procedure({})", id.0),
            Value::Primitive(p) => write!(f, "Primitive({})", p.name),
        }
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Primitive({})", self.name)
    }
}

impl fmt::Debug for ConsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsId({})", self.0)
    }
}

impl fmt::Debug for StringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StringId({})", self.0)
    }
}

impl fmt::Debug for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActivationId({})", self.0)
    }
}

impl fmt::Debug for ProcedureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcedureId({})", self.0)
    }
}
