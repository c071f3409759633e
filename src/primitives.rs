//! The built-in procedure table.
//!
//! Primitives are plain function references: no heap allocation and no
//! closure. They receive their arguments already evaluated and rooted by
//! the caller, so a primitive that allocates only needs to root its own
//! intermediate values.

use crate::error::{SchemeError, SchemeResult};
use crate::heap::Heap;
use crate::printer;
use crate::value::{Primitive, PrimitiveFunction, Value};

fn cons(heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    if let &[car, cdr] = args {
        let id = heap.allocate_cons(car, cdr)?;
        Ok(Value::Pair(id))
    } else {
        Err(wrong_args("2", args))
    }
}

fn car(heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    if let &[pair] = args {
        match pair.as_pair() {
            Some(id) => Ok(heap.car(id)),
            None => Err(type_mismatch(heap, "car of a non-pair", pair)),
        }
    } else {
        Err(wrong_args("1", args))
    }
}

fn cdr(heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    if let &[pair] = args {
        match pair.as_pair() {
            Some(id) => Ok(heap.cdr(id)),
            None => Err(type_mismatch(heap, "cdr of a non-pair", pair)),
        }
    } else {
        Err(wrong_args("1", args))
    }
}

fn set_car(heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    if let &[pair, value] = args {
        match pair.as_pair() {
            Some(id) => {
                heap.set_car(id, value);
                Ok(heap.unspecified_symbol())
            }
            None => Err(type_mismatch(heap, "set-car! of a non-pair", pair)),
        }
    } else {
        Err(wrong_args("2", args))
    }
}

fn set_cdr(heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    if let &[pair, value] = args {
        match pair.as_pair() {
            Some(id) => {
                heap.set_cdr(id, value);
                Ok(heap.unspecified_symbol())
            }
            None => Err(type_mismatch(heap, "set-cdr! of a non-pair", pair)),
        }
    } else {
        Err(wrong_args("2", args))
    }
}

fn list(heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    heap.list(args)
}

fn print(heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    for &value in args {
        println!("{}", printer::print_val(value, heap));
    }
    Ok(heap.unspecified_symbol())
}

fn null_question(_heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    if let &[value] = args {
        Ok(Value::Boolean(value.is_empty_list()))
    } else {
        Err(wrong_args("1", args))
    }
}

fn pair_question(_heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    if let &[value] = args {
        Ok(Value::Boolean(value.is_pair()))
    } else {
        Err(wrong_args("1", args))
    }
}

fn atom_question(_heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    if let &[value] = args {
        Ok(Value::Boolean(value.is_atom()))
    } else {
        Err(wrong_args("1", args))
    }
}

fn symbol_question(_heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    if let &[value] = args {
        Ok(Value::Boolean(value.is_symbol()))
    } else {
        Err(wrong_args("1", args))
    }
}

fn string_question(_heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    if let &[value] = args {
        Ok(Value::Boolean(matches!(value, Value::String(_))))
    } else {
        Err(wrong_args("1", args))
    }
}

fn number_question(_heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    if let &[value] = args {
        Ok(Value::Boolean(matches!(value, Value::Integer(_))))
    } else {
        Err(wrong_args("1", args))
    }
}

fn procedure_question(_heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    if let &[value] = args {
        Ok(Value::Boolean(matches!(
            value,
            Value::Procedure(_) | Value::Primitive(_)
        )))
    } else {
        Err(wrong_args("1", args))
    }
}

fn eq_question(_heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    if let &[a, b] = args {
        Ok(Value::Boolean(a == b))
    } else {
        Err(wrong_args("2", args))
    }
}

fn add(heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    let (a, b) = two_integers(heap, "+", args)?;
    Ok(Value::Integer(a + b))
}

fn subtract(heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    let (a, b) = two_integers(heap, "-", args)?;
    Ok(Value::Integer(a - b))
}

fn multiply(heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    let (a, b) = two_integers(heap, "*", args)?;
    Ok(Value::Integer(a * b))
}

fn divide(heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    let (a, b) = two_integers(heap, "/", args)?;
    if b == 0 {
        return Err(SchemeError::TypeMismatch("division by zero".to_string()));
    }
    Ok(Value::Integer(a / b))
}

fn number_equal(heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    let (a, b) = two_integers(heap, "=", args)?;
    Ok(Value::Boolean(a == b))
}

fn less_than(heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    let (a, b) = two_integers(heap, "<", args)?;
    Ok(Value::Boolean(a < b))
}

fn greater_than(heap: &mut Heap, args: &[Value]) -> SchemeResult<Value> {
    let (a, b) = two_integers(heap, ">", args)?;
    Ok(Value::Boolean(a > b))
}

fn two_integers(heap: &Heap, operator: &str, args: &[Value]) -> SchemeResult<(i64, i64)> {
    if let &[a, b] = args {
        match (a.as_integer(), b.as_integer()) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(SchemeError::TypeMismatch(format!(
                "{} expects integers, found {} and {}",
                operator,
                printer::print_val(a, heap),
                printer::print_val(b, heap)
            ))),
        }
    } else {
        Err(wrong_args("2", args))
    }
}

fn wrong_args(expected: &str, args: &[Value]) -> SchemeError {
    SchemeError::WrongArgumentCount {
        expected: expected.to_string(),
        got: args.len(),
    }
}

fn type_mismatch(heap: &Heap, what: &str, value: Value) -> SchemeError {
    SchemeError::TypeMismatch(format!("{}: {}", what, printer::print_val(value, heap)))
}

const PRIMITIVES: &[(&str, PrimitiveFunction)] = &[
    ("cons", cons),
    ("car", car),
    ("cdr", cdr),
    ("set-car!", set_car),
    ("set-cdr!", set_cdr),
    ("list", list),
    ("print", print),
    ("null?", null_question),
    ("pair?", pair_question),
    ("atom?", atom_question),
    ("symbol?", symbol_question),
    ("string?", string_question),
    ("number?", number_question),
    ("procedure?", procedure_question),
    ("eq?", eq_question),
    ("+", add),
    ("-", subtract),
    ("*", multiply),
    ("/", divide),
    ("=", number_equal),
    ("<", less_than),
    (">", greater_than),
];

/// Install every primitive into the global environment and activation.
/// Called once, before any user evaluation.
pub fn install(heap: &mut Heap) {
    let global = heap.global_activation();
    for &(name, func) in PRIMITIVES {
        let (depth, index) = heap.environment.define(name);
        debug_assert_eq!(depth, 0, "primitives are defined on the global activation");
        heap.define_slot(global, index, Value::Primitive(Primitive { name, func }));
    }
}

// TESTS -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::eval::evaluate_source;

    fn eval_str(heap: &mut Heap, source: &str) -> SchemeResult<Value> {
        evaluate_source(heap, source)
    }

    #[test]
    fn cons_car_cdr() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(&mut heap, "(car (cons 1 2))"),
            Ok(Value::Integer(1))
        );
        assert_eq!(
            eval_str(&mut heap, "(cdr (cons 1 2))"),
            Ok(Value::Integer(2))
        );
        assert!(matches!(
            eval_str(&mut heap, "(car 1)"),
            Err(SchemeError::TypeMismatch(_))
        ));
    }

    #[test]
    fn list_builds_a_proper_list() {
        let mut heap = Heap::new();
        let value = eval_str(&mut heap, "(list 1 2 3)").unwrap();
        let items = heap.list_to_vec(value).unwrap();
        assert_eq!(
            items,
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
        );
        assert_eq!(eval_str(&mut heap, "(list)"), Ok(Value::EmptyList));
    }

    #[test]
    fn mutation_in_place() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(
                &mut heap,
                "(define p (cons 1 2)) (set-car! p 10) (car p)"
            ),
            Ok(Value::Integer(10))
        );
        assert_eq!(
            eval_str(&mut heap, "(set-cdr! p 20) (cdr p)"),
            Ok(Value::Integer(20))
        );
    }

    #[test]
    fn type_predicates() {
        let mut heap = Heap::new();
        assert_eq!(eval_str(&mut heap, "(null? '())"), Ok(Value::Boolean(true)));
        assert_eq!(
            eval_str(&mut heap, "(null? '(1))"),
            Ok(Value::Boolean(false))
        );
        assert_eq!(
            eval_str(&mut heap, "(pair? '(1))"),
            Ok(Value::Boolean(true))
        );
        assert_eq!(eval_str(&mut heap, "(atom? 1)"), Ok(Value::Boolean(true)));
        assert_eq!(
            eval_str(&mut heap, "(atom? '(1))"),
            Ok(Value::Boolean(false))
        );
        assert_eq!(
            eval_str(&mut heap, "(symbol? 'foo)"),
            Ok(Value::Boolean(true))
        );
        assert_eq!(
            eval_str(&mut heap, "(number? 3)"),
            Ok(Value::Boolean(true))
        );
        assert_eq!(
            eval_str(&mut heap, "(string? \"s\")"),
            Ok(Value::Boolean(true))
        );
        assert_eq!(
            eval_str(&mut heap, "(procedure? car)"),
            Ok(Value::Boolean(true))
        );
        assert_eq!(
            eval_str(&mut heap, "(procedure? (lambda (x) x))"),
            Ok(Value::Boolean(true))
        );
    }

    #[test]
    fn eq_is_identity_for_heap_objects() {
        let mut heap = Heap::new();
        // Interned symbols are the same object; separately built pairs are
        // not, even with equal contents.
        assert_eq!(
            eval_str(&mut heap, "(eq? 'a 'a)"),
            Ok(Value::Boolean(true))
        );
        assert_eq!(
            eval_str(&mut heap, "(eq? (cons 1 2) (cons 1 2))"),
            Ok(Value::Boolean(false))
        );
        assert_eq!(
            eval_str(&mut heap, "(define p (cons 1 2)) (eq? p p)"),
            Ok(Value::Boolean(true))
        );
        assert_eq!(eval_str(&mut heap, "(eq? 1 1)"), Ok(Value::Boolean(true)));
        assert_eq!(
            eval_str(&mut heap, "(eq? car car)"),
            Ok(Value::Boolean(true))
        );
        assert_eq!(
            eval_str(&mut heap, "(eq? car cdr)"),
            Ok(Value::Boolean(false))
        );
    }

    #[test]
    fn arithmetic_and_comparison() {
        let mut heap = Heap::new();
        assert_eq!(eval_str(&mut heap, "(+ 2 3)"), Ok(Value::Integer(5)));
        assert_eq!(eval_str(&mut heap, "(- 2 3)"), Ok(Value::Integer(-1)));
        assert_eq!(eval_str(&mut heap, "(* 6 7)"), Ok(Value::Integer(42)));
        assert_eq!(eval_str(&mut heap, "(/ 7 2)"), Ok(Value::Integer(3)));
        assert_eq!(eval_str(&mut heap, "(= 2 2)"), Ok(Value::Boolean(true)));
        assert_eq!(eval_str(&mut heap, "(< 1 2)"), Ok(Value::Boolean(true)));
        assert_eq!(eval_str(&mut heap, "(> 1 2)"), Ok(Value::Boolean(false)));
        assert!(matches!(
            eval_str(&mut heap, "(/ 1 0)"),
            Err(SchemeError::TypeMismatch(_))
        ));
        assert!(matches!(
            eval_str(&mut heap, "(+ 1 'a)"),
            Err(SchemeError::TypeMismatch(_))
        ));
    }
}
