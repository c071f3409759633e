use crate::heap::Heap;
use crate::value::Value;

/// Print a value to a string the reader can take back, except procedures and
/// primitives, which print as opaque forms.
pub fn print_val(value: Value, heap: &Heap) -> String {
    let mut out = String::new();
    print_inner(value, heap, &mut out, 0);
    out
}

fn print_inner(value: Value, heap: &Heap, out: &mut String, depth: usize) {
    // Cyclic structures are reachable through set-car!/set-cdr!.
    if depth > 1000 {
        out.push_str("...");
        return;
    }

    match value {
        Value::EmptyList => out.push_str("()"),
        Value::Integer(i) => out.push_str(&i.to_string()),
        Value::Boolean(true) => out.push_str("#t"),
        Value::Boolean(false) => out.push_str("#f"),
        Value::Character(c) => {
            out.push_str("#\\");
            match c {
                '\n' => out.push_str("newline"),
                ' ' => out.push_str("space"),
                '\t' => out.push_str("tab"),
                c => out.push(c),
            }
        }
        Value::String(id) => print_string(heap.string(id), out),
        Value::Symbol(id) => out.push_str(heap.symbol_name(id)),
        Value::Procedure(_) => out.push_str("#<procedure>"),
        Value::Primitive(p) => {
            out.push_str("#<primitive ");
            out.push_str(p.name);
            out.push('>');
        }
        Value::Pair(id) => {
            // (quote x) -> 'x
            let car = heap.car(id);
            let cdr = heap.cdr(id);
            if car == heap.quote_symbol() {
                if let Value::Pair(cdr_id) = cdr {
                    if heap.cdr(cdr_id).is_empty_list() {
                        out.push('\'');
                        print_inner(heap.car(cdr_id), heap, out, depth + 1);
                        return;
                    }
                }
            }

            out.push('(');
            print_inner(car, heap, out, depth + 1);
            let mut current = cdr;
            let mut length = 0;
            loop {
                match current {
                    Value::EmptyList => break,
                    Value::Pair(id) => {
                        length += 1;
                        if length > 1000 {
                            out.push_str(" ...");
                            break;
                        }
                        out.push(' ');
                        print_inner(heap.car(id), heap, out, depth + 1);
                        current = heap.cdr(id);
                    }
                    _ => {
                        out.push_str(" . ");
                        print_inner(current, heap, out, depth + 1);
                        break;
                    }
                }
            }
            out.push(')');
        }
    }
}

fn print_string(contents: &str, out: &mut String) {
    out.push('"');
    for c in contents.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
}

// TESTS -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::reader;

    fn read_str(heap: &mut Heap, source: &str) -> Value {
        let (value, _) = reader::read_one_at(source, 0, heap)
            .unwrap()
            .expect("input has one expression");
        value.get()
    }

    #[test]
    fn prints_atoms() {
        let heap = Heap::new();
        assert_eq!(print_val(Value::Integer(42), &heap), "42");
        assert_eq!(print_val(Value::Integer(-5), &heap), "-5");
        assert_eq!(print_val(Value::Boolean(true), &heap), "#t");
        assert_eq!(print_val(Value::Boolean(false), &heap), "#f");
        assert_eq!(print_val(Value::Character('x'), &heap), "#\\x");
        assert_eq!(print_val(Value::Character('\n'), &heap), "#\\newline");
        assert_eq!(print_val(Value::EmptyList, &heap), "()");
    }

    #[test]
    fn prints_lists() {
        let mut heap = Heap::new();
        let value = read_str(&mut heap, "(1 (2 3) 4)");
        assert_eq!(print_val(value, &heap), "(1 (2 3) 4)");

        let value = read_str(&mut heap, "(1 2 . 3)");
        assert_eq!(print_val(value, &heap), "(1 2 . 3)");

        let value = read_str(&mut heap, "'foo");
        assert_eq!(print_val(value, &heap), "'foo");
    }

    #[test]
    fn round_trips_representative_values() {
        // Print then re-read: immediates compare by value, heap objects
        // re-read to equal structure.
        let sources = [
            "42",
            "-42",
            "#t",
            "#f",
            "#\\a",
            "#\\newline",
            "\"a\\nb\"",
            "foo",
            "(1 2 3)",
            "(1 . 2)",
            "(1 2 . 3)",
            "(a (b (c)) d)",
            "()",
        ];
        let mut heap = Heap::new();
        for source in sources {
            let first = read_str(&mut heap, source);
            let printed = print_val(first, &heap);
            let second = read_str(&mut heap, &printed);
            assert_eq!(
                print_val(second, &heap),
                printed,
                "round-trip changed {}",
                source
            );
            // Symbols re-read to the very same heap object.
            if first.is_symbol() {
                assert_eq!(first, second);
            }
        }
    }

    #[test]
    fn deep_nesting_is_truncated_not_overflowed() {
        let mut heap = Heap::new();
        let mut current = Value::EmptyList;
        for _ in 0..2000 {
            let rooted = crate::heap::RootedValue::new(&heap, current);
            let id = heap.allocate_cons(Value::Integer(1), rooted.get()).unwrap();
            current = Value::Pair(id);
        }
        // No stack overflow; the tail prints as a flat list so this is
        // mostly exercising the nested-car guard.
        let _ = print_val(current, &heap);
    }

    #[test]
    fn cyclic_structures_terminate() {
        let mut heap = Heap::new();
        let id = heap
            .allocate_cons(Value::Integer(1), Value::EmptyList)
            .unwrap();
        heap.set_cdr(id, Value::Pair(id));
        let printed = print_val(Value::Pair(id), &heap);
        assert!(printed.contains("..."));
    }
}
