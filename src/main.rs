use clap::{crate_version, App, Arg};
use rustyline::error::ReadlineError;
use rustyline::Editor;
use tracing_subscriber::EnvFilter;

use schemer::error::{SchemeError, SchemeResult};
use schemer::eval;
use schemer::heap::{Heap, RootedValue};
use schemer::printer;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let matches = App::new("schemer")
        .version(crate_version!())
        .about("Interpreter for a small Scheme with a precise mark-sweep heap")
        .arg(
            Arg::with_name("FILES")
                .help("Source files to evaluate in order")
                .multiple(true)
                .index(1),
        )
        .arg(
            Arg::with_name("EXPR")
                .short("e")
                .long("expr")
                .value_name("FORM")
                .takes_value(true)
                .help("Evaluate a single expression and print its result"),
        )
        .get_matches();

    let mut heap = Heap::new();

    if let Some(source) = matches.value_of("EXPR") {
        match eval::evaluate_source(&mut heap, source) {
            Ok(value) => println!("{}", printer::print_val(value, &heap)),
            Err(error) => {
                eprintln!("error: {}", error);
                std::process::exit(1);
            }
        }
        return;
    }

    if let Some(files) = matches.values_of("FILES") {
        for path in files {
            if let Err(error) = eval::evaluate_file(&mut heap, path) {
                eprintln!("{}: error: {}", path, error);
                std::process::exit(1);
            }
        }
        return;
    }

    run_repl(&mut heap);
}

/// Interactive REPL: accumulate lines until parens balance, then evaluate.
fn run_repl(heap: &mut Heap) {
    println!("schemer {}", crate_version!());

    let mut rl = Editor::<()>::new();
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "> " } else { "  " };
        match rl.readline(prompt) {
            Ok(line) => {
                buffer.push_str(&line);
                buffer.push('\n');
                if !parens_balanced(&buffer) {
                    continue;
                }

                let input = std::mem::take(&mut buffer);
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                rl.add_history_entry(input);
                eval_and_print(heap, input);
            }
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(error) => {
                eprintln!("read error: {}", error);
                break;
            }
        }
    }
}

/// True when every `(` has its `)` (ignoring strings is good enough for
/// interactive use).
fn parens_balanced(input: &str) -> bool {
    let mut depth: i32 = 0;
    for c in input.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
    }
    depth <= 0
}

fn eval_and_print(heap: &mut Heap, input: &str) {
    match evaluate_forms(heap, input) {
        Ok(values) => {
            for value in &values {
                // Definitions evaluate to the unspecified symbol; the REPL
                // stays quiet about them.
                if value.get() != heap.unspecified_symbol() {
                    println!("{}", printer::print_val(value.get(), heap));
                }
            }
        }
        Err(error @ SchemeError::OutOfMemory) => {
            eprintln!("fatal: {}", error);
            std::process::exit(1);
        }
        Err(error) => eprintln!("error: {}", error),
    }
}

/// Evaluate every form in the input, keeping each value rooted so the REPL
/// can print all of them, not just the last.
fn evaluate_forms(heap: &mut Heap, input: &str) -> SchemeResult<Vec<RootedValue>> {
    let mut values = Vec::new();
    let mut position = 0;
    while let Some((form, next)) = schemer::reader::read_one_at(input, position, heap)? {
        position = next;
        let value = eval::evaluate(heap, &form)?;
        values.push(RootedValue::new(heap, value));
    }
    Ok(values)
}
