//! Two-phase evaluation: syntactic analysis, then execution.
//!
//! A form is never interpreted directly. `analyze` walks it once and
//! produces a `Meaning` — everything that can be known statically, such as
//! which special form it is and the (depth, index) coordinate of every
//! variable it mentions. Evaluating the meaning is then just execution: a
//! loop body or a recursive procedure pays the analysis cost once, no
//! matter how many times it runs.
//!
//! Execution bounds native stack growth with a trampoline. Evaluating a
//! meaning in a non-tail position recurses normally, but a tail position —
//! the branches of `if`, the last form of a body, the application of a user
//! procedure — returns a `Trampoline::Thunk` carrying the next (meaning,
//! activation) pair instead of recursing. The top-level drive loop keeps
//! replacing its pair until a `Trampoline::Value` appears, so unbounded
//! tail recursion runs in constant native stack space.
//!
//! Quoted constants inside a meaning are held as rooted values: a meaning
//! can live across any number of collections (a procedure body does), and
//! its constants must survive every one of them.

use std::rc::Rc;

use crate::error::{SchemeError, SchemeResult};
use crate::heap::{GcThing, Heap, Procedure, RootedActivation, RootedValue};
use crate::printer;
use crate::reader;
use crate::value::{ActivationId, Value};

/// Parameter count for a procedure: exact, or a minimum with the surplus
/// collected into a rest list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    Exact(u32),
    AtLeast(u32),
}

/// Meanings are shared: a thunk and the procedure that owns the body both
/// reference the same analysis result.
pub type MeaningRef = Rc<Meaning>;

/// The statically-known payload of one analyzed form.
#[derive(Debug, Clone)]
pub enum MeaningData {
    /// The quoted (or self-evaluating) value.
    Quotation(RootedValue),

    /// A variable reference, resolved to (depth, index). The name is kept
    /// for error reporting only.
    Reference(u32, u32, String),

    /// Bind slot `index` of the innermost activation to the value of the
    /// given meaning.
    Definition(u32, u32, MeaningRef),

    /// Assign the slot at (depth, index) to the value of the given meaning.
    SetVariable(u32, u32, String, MeaningRef),

    /// Condition, consequent, and alternative.
    Conditional(MeaningRef, MeaningRef, MeaningRef),

    /// Evaluate the first for its effect, then continue with the second in
    /// tail position.
    Sequence(MeaningRef, MeaningRef),

    /// Arity and body of a lambda.
    Lambda(Arity, MeaningRef),

    /// Operator and operands.
    Invocation(MeaningRef, Vec<MeaningRef>),
}

#[derive(Debug)]
pub struct Meaning {
    data: MeaningData,
}

/// The tail-call continuation: either a final value, or the next
/// (meaning, activation) pair to drive.
#[derive(Debug)]
pub enum Trampoline {
    Value(Value),
    Thunk(MeaningRef, ActivationId),
}

// ============================================================================
// Meaning constructors
// ============================================================================

impl Meaning {
    fn new(data: MeaningData) -> MeaningRef {
        Rc::new(Meaning { data })
    }

    pub fn new_quotation(heap: &Heap, value: Value) -> MeaningRef {
        Meaning::new(MeaningData::Quotation(RootedValue::new(heap, value)))
    }

    fn new_reference(depth: u32, index: u32, name: String) -> MeaningRef {
        Meaning::new(MeaningData::Reference(depth, index, name))
    }

    fn new_definition(depth: u32, index: u32, value: MeaningRef) -> MeaningRef {
        Meaning::new(MeaningData::Definition(depth, index, value))
    }

    fn new_set_variable(depth: u32, index: u32, name: String, value: MeaningRef) -> MeaningRef {
        Meaning::new(MeaningData::SetVariable(depth, index, name, value))
    }

    fn new_conditional(
        condition: MeaningRef,
        consequent: MeaningRef,
        alternative: MeaningRef,
    ) -> MeaningRef {
        Meaning::new(MeaningData::Conditional(condition, consequent, alternative))
    }

    fn new_sequence(first: MeaningRef, rest: MeaningRef) -> MeaningRef {
        Meaning::new(MeaningData::Sequence(first, rest))
    }

    fn new_lambda(arity: Arity, body: MeaningRef) -> MeaningRef {
        Meaning::new(MeaningData::Lambda(arity, body))
    }

    fn new_invocation(operator: MeaningRef, operands: Vec<MeaningRef>) -> MeaningRef {
        Meaning::new(MeaningData::Invocation(operator, operands))
    }

    /// The heap objects this meaning's constants reference, recursively.
    /// Used by procedure tracing.
    pub fn trace(&self, out: &mut Vec<GcThing>) {
        match &self.data {
            MeaningData::Quotation(value) => out.extend(GcThing::of_value(value.get())),
            MeaningData::Reference(..) => {}
            MeaningData::Definition(_, _, value) => value.trace(out),
            MeaningData::SetVariable(_, _, _, value) => value.trace(out),
            MeaningData::Conditional(condition, consequent, alternative) => {
                condition.trace(out);
                consequent.trace(out);
                alternative.trace(out);
            }
            MeaningData::Sequence(first, rest) => {
                first.trace(out);
                rest.trace(out);
            }
            MeaningData::Lambda(_, body) => body.trace(out),
            MeaningData::Invocation(operator, operands) => {
                operator.trace(out);
                for operand in operands {
                    operand.trace(out);
                }
            }
        }
    }
}

// ============================================================================
// Execution
// ============================================================================

impl Meaning {
    /// Evaluate no further than the next tail position.
    fn evaluate_step(&self, heap: &mut Heap, act: &RootedActivation) -> SchemeResult<Trampoline> {
        match &self.data {
            MeaningData::Quotation(value) => Ok(Trampoline::Value(value.get())),

            MeaningData::Reference(depth, index, name) => heap
                .fetch(act.get(), *depth, *index)
                .map(Trampoline::Value)
                .ok_or_else(|| SchemeError::UnresolvedVariable(name.clone())),

            MeaningData::Definition(depth, index, value) => {
                debug_assert_eq!(
                    *depth, 0,
                    "definitions always target the innermost activation"
                );
                let value = value.evaluate(heap, act)?;
                heap.define_slot(act.get(), *index, value);
                Ok(Trampoline::Value(heap.unspecified_symbol()))
            }

            MeaningData::SetVariable(depth, index, name, value) => {
                let value = value.evaluate(heap, act)?;
                if heap.update(act.get(), *depth, *index, value) {
                    Ok(Trampoline::Value(heap.unspecified_symbol()))
                } else {
                    Err(SchemeError::UnresolvedVariable(name.clone()))
                }
            }

            MeaningData::Conditional(condition, consequent, alternative) => {
                let test = condition.evaluate(heap, act)?;
                let branch = if test.is_truthy() {
                    consequent
                } else {
                    alternative
                };
                Ok(Trampoline::Thunk(Rc::clone(branch), act.get()))
            }

            MeaningData::Sequence(first, rest) => {
                first.evaluate(heap, act)?;
                Ok(Trampoline::Thunk(Rc::clone(rest), act.get()))
            }

            MeaningData::Lambda(arity, body) => {
                let id = heap.allocate_procedure(Procedure {
                    arity: *arity,
                    body: Some(Rc::clone(body)),
                    act: Some(act.get()),
                })?;
                Ok(Trampoline::Value(Value::Procedure(id)))
            }

            MeaningData::Invocation(operator, operands) => {
                let operator_value = operator.evaluate(heap, act)?;
                let operator_value = RootedValue::new(heap, operator_value);
                let mut arguments = Vec::with_capacity(operands.len());
                for operand in operands {
                    let value = operand.evaluate(heap, act)?;
                    arguments.push(RootedValue::new(heap, value));
                }
                apply(heap, &operator_value, &arguments)
            }
        }
    }

    /// Evaluate completely, driving the trampoline until a value is
    /// produced. Native recursion is spent only on non-tail positions.
    pub fn evaluate(
        self: &Rc<Self>,
        heap: &mut Heap,
        act: &RootedActivation,
    ) -> SchemeResult<Value> {
        let mut meaning = Rc::clone(self);
        let mut act = act.clone();
        loop {
            match meaning.evaluate_step(heap, &act)? {
                Trampoline::Value(value) => return Ok(value),
                Trampoline::Thunk(next_meaning, next_act) => {
                    meaning = next_meaning;
                    act.emplace(next_act);
                }
            }
        }
    }
}

/// Apply an operator to already-evaluated arguments. The caller keeps the
/// operator and every argument rooted for the duration of the call.
pub fn apply(
    heap: &mut Heap,
    operator: &RootedValue,
    arguments: &[RootedValue],
) -> SchemeResult<Trampoline> {
    match operator.get() {
        Value::Primitive(primitive) => {
            let values: Vec<Value> = arguments.iter().map(|a| a.get()).collect();
            (primitive.func)(heap, &values).map(Trampoline::Value)
        }

        Value::Procedure(id) => {
            let procedure = heap.procedure(id);
            let arity = procedure.arity;
            let body = procedure
                .body
                .clone()
                .expect("applied an uninitialized procedure");
            let closed_over = procedure
                .act
                .expect("applied an uninitialized procedure");

            let closed_over = RootedActivation::new(heap, closed_over);
            let (values, rest_guard) = bind_arguments(heap, arity, arguments)?;
            let act = heap.extend_activation(closed_over.get(), values)?;
            drop(rest_guard);
            Ok(Trampoline::Thunk(body, act))
        }

        value => Err(SchemeError::NotAProcedure(printer::print_val(value, heap))),
    }
}

/// Check arity and build the slot vector for the callee's activation. A
/// variadic procedure's surplus arguments become a fresh list; its guard is
/// returned so the list stays rooted until the activation holds it.
fn bind_arguments(
    heap: &mut Heap,
    arity: Arity,
    arguments: &[RootedValue],
) -> SchemeResult<(Vec<Value>, Option<RootedValue>)> {
    match arity {
        Arity::Exact(count) => {
            if arguments.len() != count as usize {
                return Err(SchemeError::WrongArgumentCount {
                    expected: count.to_string(),
                    got: arguments.len(),
                });
            }
            Ok((arguments.iter().map(|a| a.get()).collect(), None))
        }
        Arity::AtLeast(count) => {
            let count = count as usize;
            if arguments.len() < count {
                return Err(SchemeError::WrongArgumentCount {
                    expected: format!("at least {}", count),
                    got: arguments.len(),
                });
            }
            let surplus: Vec<Value> = arguments[count..].iter().map(|a| a.get()).collect();
            let rest = heap.list(&surplus)?;
            let rest = RootedValue::new(heap, rest);
            let mut values: Vec<Value> = arguments[..count].iter().map(|a| a.get()).collect();
            values.push(rest.get());
            Ok((values, Some(rest)))
        }
    }
}

// ============================================================================
// Syntactic analysis
// ============================================================================

/// Analyze a form into its meaning: self-evaluating literals and quotations
/// become constants, variable references are resolved to coordinates, the
/// special forms get their own shapes, and everything else is an
/// application.
pub fn analyze(heap: &mut Heap, form: &RootedValue) -> SchemeResult<MeaningRef> {
    match form.get() {
        Value::Integer(_)
        | Value::Boolean(_)
        | Value::Character(_)
        | Value::String(_)
        | Value::Primitive(_)
        | Value::Procedure(_) => Ok(Meaning::new_quotation(heap, form.get())),

        Value::Symbol(id) => {
            let name = heap.symbol_name(id).to_string();
            let (depth, index) = match heap.environment.lookup(&name) {
                Some(coordinate) => coordinate,
                // A global referenced before its definition: give it a slot
                // now and check for a value when the reference runs.
                None => heap.environment.define_global(&name),
            };
            Ok(Meaning::new_reference(depth, index, name))
        }

        Value::EmptyList => Err(SchemeError::MalformedForm {
            form: "application",
            message: "cannot evaluate the empty list".to_string(),
        }),

        Value::Pair(id) => {
            let head = heap.car(id);
            if head == heap.quote_symbol() {
                analyze_quoted(heap, form)
            } else if head == heap.define_symbol() {
                analyze_definition(heap, form)
            } else if head == heap.set_bang_symbol() {
                analyze_set(heap, form)
            } else if head == heap.lambda_symbol() {
                analyze_lambda(heap, form)
            } else if head == heap.if_symbol() {
                analyze_conditional(heap, form)
            } else if head == heap.begin_symbol() {
                analyze_sequence(heap, form)
            } else {
                analyze_invocation(heap, form)
            }
        }
    }
}

fn malformed(form: &'static str, message: impl Into<String>) -> SchemeError {
    SchemeError::MalformedForm {
        form,
        message: message.into(),
    }
}

fn proper_list_items(
    heap: &Heap,
    form: &RootedValue,
    name: &'static str,
) -> SchemeResult<Vec<Value>> {
    heap.list_to_vec(form.get())
        .ok_or_else(|| malformed(name, "expected a proper list"))
}

fn analyze_quoted(heap: &mut Heap, form: &RootedValue) -> SchemeResult<MeaningRef> {
    let items = proper_list_items(heap, form, "quote")?;
    if items.len() != 2 {
        return Err(malformed(
            "quote",
            format!("expected one datum, found {}", items.len() - 1),
        ));
    }
    Ok(Meaning::new_quotation(heap, items[1]))
}

fn analyze_definition(heap: &mut Heap, form: &RootedValue) -> SchemeResult<MeaningRef> {
    let items = proper_list_items(heap, form, "define")?;
    if items.len() < 3 {
        return Err(malformed("define", "expected a name and a value"));
    }

    // (define (name . params) body...) binds a lambda.
    if let Value::Pair(header) = items[1] {
        let name = match heap.car(header).as_symbol() {
            Some(id) => heap.symbol_name(id).to_string(),
            None => return Err(malformed("define", "can only define symbols")),
        };
        let params = heap.cdr(header);
        let lambda = analyze_lambda_parts(heap, params, &items[2..])?;
        let (depth, index) = heap.environment.define(&name);
        return Ok(Meaning::new_definition(depth, index, lambda));
    }

    if items.len() != 3 {
        return Err(malformed("define", "expected a name and a value"));
    }
    let name = match items[1].as_symbol() {
        Some(id) => heap.symbol_name(id).to_string(),
        None => return Err(malformed("define", "can only define symbols")),
    };
    let value_form = RootedValue::new(heap, items[2]);
    let value = analyze(heap, &value_form)?;
    let (depth, index) = heap.environment.define(&name);
    Ok(Meaning::new_definition(depth, index, value))
}

fn analyze_set(heap: &mut Heap, form: &RootedValue) -> SchemeResult<MeaningRef> {
    let items = proper_list_items(heap, form, "set!")?;
    if items.len() != 3 {
        return Err(malformed("set!", "expected a variable and a value"));
    }
    let name = match items[1].as_symbol() {
        Some(id) => heap.symbol_name(id).to_string(),
        None => return Err(malformed("set!", "can only set! symbols")),
    };
    let value_form = RootedValue::new(heap, items[2]);
    let value = analyze(heap, &value_form)?;
    let (depth, index) = match heap.environment.lookup(&name) {
        Some(coordinate) => coordinate,
        // Assigning a global that may be defined later; the assignment
        // fails at run time if it never is.
        None => heap.environment.define_global(&name),
    };
    Ok(Meaning::new_set_variable(depth, index, name, value))
}

fn analyze_lambda(heap: &mut Heap, form: &RootedValue) -> SchemeResult<MeaningRef> {
    let items = proper_list_items(heap, form, "lambda")?;
    if items.len() < 3 {
        return Err(malformed("lambda", "expected a parameter list and a body"));
    }
    analyze_lambda_parts(heap, items[1], &items[2..])
}

fn analyze_lambda_parts(
    heap: &mut Heap,
    params: Value,
    body: &[Value],
) -> SchemeResult<MeaningRef> {
    let (arity, mut names) = parse_parameters(heap, params)?;

    // Internal definitions get slots in the same block as the parameters,
    // so scan ahead for them before analyzing the body.
    for &form in body {
        if let Some(name) = internal_definition_name(heap, form) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }

    let body_forms: Vec<Value> = body.to_vec();
    let body_meaning = heap.with_extended_env(names, |heap| {
        let mut meanings = Vec::with_capacity(body_forms.len());
        for &form in &body_forms {
            let form = RootedValue::new(heap, form);
            meanings.push(analyze(heap, &form)?);
        }
        Ok(make_sequence(meanings))
    })?;

    Ok(Meaning::new_lambda(arity, body_meaning))
}

fn parse_parameters(heap: &Heap, params: Value) -> SchemeResult<(Arity, Vec<String>)> {
    let mut names = Vec::new();
    let mut current = params;
    loop {
        match current {
            Value::EmptyList => return Ok((Arity::Exact(names.len() as u32), names)),
            Value::Symbol(id) => {
                // A dotted (or bare-symbol) tail collects surplus arguments.
                let required = names.len() as u32;
                names.push(heap.symbol_name(id).to_string());
                return Ok((Arity::AtLeast(required), names));
            }
            Value::Pair(id) => {
                match heap.car(id) {
                    Value::Symbol(param) => names.push(heap.symbol_name(param).to_string()),
                    _ => return Err(malformed("lambda", "parameters must be symbols")),
                }
                current = heap.cdr(id);
            }
            _ => return Err(malformed("lambda", "improper parameter list")),
        }
    }
}

/// The name an internal `(define ...)` body form binds, if the form is one.
fn internal_definition_name(heap: &Heap, form: Value) -> Option<String> {
    let id = form.as_pair()?;
    if heap.car(id) != heap.define_symbol() {
        return None;
    }
    let rest = heap.cdr(id).as_pair()?;
    match heap.car(rest) {
        Value::Symbol(name) => Some(heap.symbol_name(name).to_string()),
        Value::Pair(header) => heap
            .car(header)
            .as_symbol()
            .map(|name| heap.symbol_name(name).to_string()),
        _ => None,
    }
}

fn analyze_conditional(heap: &mut Heap, form: &RootedValue) -> SchemeResult<MeaningRef> {
    let items = proper_list_items(heap, form, "if")?;
    if items.len() != 4 {
        return Err(malformed(
            "if",
            "expected a condition, a consequent, and an alternative",
        ));
    }
    let condition_form = RootedValue::new(heap, items[1]);
    let condition = analyze(heap, &condition_form)?;
    let consequent_form = RootedValue::new(heap, items[2]);
    let consequent = analyze(heap, &consequent_form)?;
    let alternative_form = RootedValue::new(heap, items[3]);
    let alternative = analyze(heap, &alternative_form)?;
    Ok(Meaning::new_conditional(condition, consequent, alternative))
}

fn analyze_sequence(heap: &mut Heap, form: &RootedValue) -> SchemeResult<MeaningRef> {
    let items = proper_list_items(heap, form, "begin")?;
    if items.len() < 2 {
        return Err(malformed("begin", "expected at least one body form"));
    }
    let mut meanings = Vec::with_capacity(items.len() - 1);
    for &item in &items[1..] {
        let item = RootedValue::new(heap, item);
        meanings.push(analyze(heap, &item)?);
    }
    Ok(make_sequence(meanings))
}

fn analyze_invocation(heap: &mut Heap, form: &RootedValue) -> SchemeResult<MeaningRef> {
    let items = proper_list_items(heap, form, "application")?;
    let mut meanings = Vec::with_capacity(items.len());
    for &item in &items {
        let item = RootedValue::new(heap, item);
        meanings.push(analyze(heap, &item)?);
    }
    let operator = meanings.remove(0);
    Ok(Meaning::new_invocation(operator, meanings))
}

/// Chain body meanings so every form but the last runs for its effect and
/// the last stays in tail position.
fn make_sequence(mut meanings: Vec<MeaningRef>) -> MeaningRef {
    let mut result = meanings.pop().expect("a body has at least one form");
    while let Some(first) = meanings.pop() {
        result = Meaning::new_sequence(first, result);
    }
    result
}

// ============================================================================
// Entry points
// ============================================================================

/// Analyze and evaluate a form in the global environment.
pub fn evaluate(heap: &mut Heap, form: &RootedValue) -> SchemeResult<Value> {
    let meaning = analyze(heap, form)?;
    let global = RootedActivation::new(heap, heap.global_activation());
    meaning.evaluate(heap, &global)
}

/// Evaluate every form in a source string, returning the last value or the
/// first error.
pub fn evaluate_source(heap: &mut Heap, source: &str) -> SchemeResult<Value> {
    let mut result = RootedValue::new(heap, heap.unspecified_symbol());
    let mut position = 0;
    while let Some((form, next)) = reader::read_one_at(source, position, heap)? {
        position = next;
        let value = evaluate(heap, &form)?;
        result.emplace(value);
    }
    Ok(result.get())
}

/// Evaluate every top-level form in a file, returning the last value or the
/// first error.
pub fn evaluate_file(heap: &mut Heap, path: &str) -> SchemeResult<Value> {
    let source = std::fs::read_to_string(path)
        .map_err(|error| SchemeError::Io(format!("could not read {}: {}", path, error)))?;
    evaluate_source(heap, &source)
}

// TESTS -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn eval_str(heap: &mut Heap, source: &str) -> SchemeResult<Value> {
        evaluate_source(heap, source)
    }

    #[test]
    fn literals_self_evaluate() {
        let mut heap = Heap::new();
        assert_eq!(eval_str(&mut heap, "42"), Ok(Value::Integer(42)));
        assert_eq!(eval_str(&mut heap, "#t"), Ok(Value::Boolean(true)));
        assert_eq!(eval_str(&mut heap, "#\\a"), Ok(Value::Character('a')));
    }

    #[test]
    fn quotation_returns_the_datum() {
        let mut heap = Heap::new();
        let value = eval_str(&mut heap, "(quote (1 2))").unwrap();
        let items = heap.list_to_vec(value).unwrap();
        assert_eq!(items, vec![Value::Integer(1), Value::Integer(2)]);

        let symbol = eval_str(&mut heap, "'foo").unwrap();
        assert_eq!(symbol, heap.get_or_create_symbol("foo").unwrap());
    }

    #[test]
    fn conditional_takes_both_branches() {
        let mut heap = Heap::new();
        assert_eq!(eval_str(&mut heap, "(if #t 1 2)"), Ok(Value::Integer(1)));
        assert_eq!(eval_str(&mut heap, "(if #f 1 2)"), Ok(Value::Integer(2)));
        // Everything but #f is true.
        assert_eq!(eval_str(&mut heap, "(if 0 1 2)"), Ok(Value::Integer(1)));
        assert_eq!(eval_str(&mut heap, "(if '() 1 2)"), Ok(Value::Integer(1)));
    }

    #[test]
    fn two_armed_if_is_malformed() {
        let mut heap = Heap::new();
        assert!(matches!(
            eval_str(&mut heap, "(if #t 1)"),
            Err(SchemeError::MalformedForm { form: "if", .. })
        ));
    }

    #[test]
    fn sequence_returns_the_last_value() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(&mut heap, "(begin 1 2 3)"),
            Ok(Value::Integer(3))
        );
    }

    #[test]
    fn define_then_reference() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(&mut heap, "(define x 2) x"),
            Ok(Value::Integer(2))
        );
        // Redefinition reuses the slot.
        assert_eq!(
            eval_str(&mut heap, "(define x 3) x"),
            Ok(Value::Integer(3))
        );
    }

    #[test]
    fn set_mutates_an_existing_binding() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(&mut heap, "(define x 2) (set! x 5) x"),
            Ok(Value::Integer(5))
        );
    }

    #[test]
    fn set_of_an_undefined_variable_fails() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(&mut heap, "(set! x 5)"),
            Err(SchemeError::UnresolvedVariable("x".to_string()))
        );
        // And it did not silently define x.
        assert_eq!(
            eval_str(&mut heap, "x"),
            Err(SchemeError::UnresolvedVariable("x".to_string()))
        );
    }

    #[test]
    fn reference_before_definition_fails_at_run_time() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(&mut heap, "never-defined"),
            Err(SchemeError::UnresolvedVariable("never-defined".to_string()))
        );
    }

    #[test]
    fn forward_reference_resolves_once_defined() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(
                &mut heap,
                "(define (f) (g)) (define (g) 7) (f)"
            ),
            Ok(Value::Integer(7))
        );
    }

    #[test]
    fn lambda_application_binds_parameters() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(&mut heap, "((lambda (a b) (+ a b)) 2 3)"),
            Ok(Value::Integer(5))
        );
    }

    #[test]
    fn closures_capture_their_definition_environment() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(
                &mut heap,
                "(define (make-adder n) (lambda (m) (+ n m)))
                 (define add3 (make-adder 3))
                 (add3 4)"
            ),
            Ok(Value::Integer(7))
        );
    }

    #[test]
    fn closures_share_mutable_state() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(
                &mut heap,
                "(define (make-counter)
                   (define count 0)
                   (lambda () (set! count (+ count 1)) count))
                 (define tick (make-counter))
                 (tick)
                 (tick)
                 (tick)"
            ),
            Ok(Value::Integer(3))
        );
    }

    #[test]
    fn internal_definitions_are_in_scope() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(
                &mut heap,
                "(define (factorial n)
                   (define (iterate n acc)
                     (if (= n 0) acc (iterate (- n 1) (* n acc))))
                   (iterate n 1))
                 (factorial 5)"
            ),
            Ok(Value::Integer(120))
        );
    }

    #[test]
    fn parameters_shadow_globals() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(&mut heap, "(define x 1) (define (f x) x) (f 2)"),
            Ok(Value::Integer(2))
        );
        assert_eq!(eval_str(&mut heap, "x"), Ok(Value::Integer(1)));
    }

    #[test]
    fn deep_tail_recursion_runs_in_constant_stack() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(
                &mut heap,
                "(define (f n) (if (= n 0) 0 (f (- n 1))))
                 (f 100000)"
            ),
            Ok(Value::Integer(0))
        );
    }

    #[test]
    fn non_tail_recursion_still_works_at_moderate_depth() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(
                &mut heap,
                "(define (sum n) (if (= n 0) 0 (+ n (sum (- n 1)))))
                 (sum 1000)"
            ),
            Ok(Value::Integer(500500))
        );
    }

    #[test]
    fn variadic_procedures_collect_surplus_arguments() {
        let mut heap = Heap::new();
        let value = eval_str(
            &mut heap,
            "(define (f a . rest) (cons a rest)) (f 1 2 3)",
        )
        .unwrap();
        let items = heap.list_to_vec(value).unwrap();
        assert_eq!(
            items,
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
        );

        let value = eval_str(&mut heap, "(define (g . all) all) (g)").unwrap();
        assert_eq!(value, Value::EmptyList);
    }

    #[test]
    fn wrong_argument_count_is_reported() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(&mut heap, "((lambda (a) a) 1 2)"),
            Err(SchemeError::WrongArgumentCount {
                expected: "1".to_string(),
                got: 2
            })
        );
        assert_eq!(
            eval_str(&mut heap, "(define (f a . rest) a) (f)"),
            Err(SchemeError::WrongArgumentCount {
                expected: "at least 1".to_string(),
                got: 0
            })
        );
    }

    #[test]
    fn applying_a_non_procedure_fails() {
        let mut heap = Heap::new();
        assert_eq!(
            eval_str(&mut heap, "(1 2)"),
            Err(SchemeError::NotAProcedure("1".to_string()))
        );
    }

    #[test]
    fn definitions_evaluate_to_the_unspecified_symbol() {
        let mut heap = Heap::new();
        let value = eval_str(&mut heap, "(define x 1)").unwrap();
        assert_eq!(value, heap.unspecified_symbol());
    }

    #[test]
    fn evaluation_survives_collections_mid_flight() {
        let mut heap = Heap::new();
        // Every iteration allocates an activation, so a long loop crosses
        // the GC pressure threshold many times over.
        assert_eq!(
            eval_str(
                &mut heap,
                "(define (build n acc)
                   (if (= n 0) acc (build (- n 1) (cons n acc))))
                 (define result (build 50000 '()))
                 (car result)"
            ),
            Ok(Value::Integer(1))
        );
    }
}
