//! S-expression reader: parses source text into heap-allocated value trees.
//!
//! Every value the reader hands back is rooted, so a caller can interleave
//! reading with evaluation (and hence collection) freely.

use crate::error::{SchemeError, SchemeResult};
use crate::heap::{Heap, RootedValue};
use crate::value::Value;

pub struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
    heap: &'a mut Heap,
}

/// Read one expression starting at `pos` in `input`. Returns the rooted
/// value and the position after it, or `None` at end of input. This form
/// exists so callers can alternate reading and evaluating without holding
/// the heap borrow across both.
pub fn read_one_at(
    input: &str,
    pos: usize,
    heap: &mut Heap,
) -> SchemeResult<Option<(RootedValue, usize)>> {
    let mut reader = Reader {
        input: input.as_bytes(),
        pos,
        heap,
    };
    match reader.read()? {
        Some(value) => {
            let next = reader.pos;
            Ok(Some((value, next)))
        }
        None => Ok(None),
    }
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a str, heap: &'a mut Heap) -> Reader<'a> {
        Reader {
            input: input.as_bytes(),
            pos: 0,
            heap,
        }
    }

    /// Read one expression. Returns None at end of input.
    pub fn read(&mut self) -> SchemeResult<Option<RootedValue>> {
        self.skip_whitespace_and_comments();
        if self.pos >= self.input.len() {
            return Ok(None);
        }
        let value = self.read_expr()?;
        Ok(Some(value))
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while let Some(byte) = self.peek() {
                if byte == b' ' || byte == b'\t' || byte == b'\n' || byte == b'\r' {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            if self.peek() == Some(b';') {
                while let Some(byte) = self.peek() {
                    if byte == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn read_expr(&mut self) -> SchemeResult<RootedValue> {
        self.skip_whitespace_and_comments();
        let byte = self
            .peek()
            .ok_or_else(|| SchemeError::Read("unexpected end of input".to_string()))?;

        match byte {
            b'(' => self.read_list(),
            b')' => Err(SchemeError::Read("unexpected ')'".to_string())),
            b'\'' => self.read_quote(),
            b'"' => self.read_string(),
            b'#' => self.read_hash(),
            _ => self.read_word(),
        }
    }

    /// Read a list: `(a b c)`, `(a . b)`, or `(a b . c)`.
    fn read_list(&mut self) -> SchemeResult<RootedValue> {
        self.advance(); // consume '('

        let mut elements: Vec<RootedValue> = Vec::new();
        let mut tail: Option<RootedValue> = None;

        loop {
            self.skip_whitespace_and_comments();
            match self.peek() {
                None => return Err(SchemeError::Read("unterminated list".to_string())),
                Some(b')') => {
                    self.advance();
                    break;
                }
                Some(b'.') if self.is_dot_at(self.pos) => {
                    if elements.is_empty() {
                        return Err(SchemeError::Read(
                            "a dotted tail needs a preceding element".to_string(),
                        ));
                    }
                    self.advance();
                    tail = Some(self.read_expr()?);
                    self.skip_whitespace_and_comments();
                    if self.peek() != Some(b')') {
                        return Err(SchemeError::Read(
                            "expected ')' after a dotted tail".to_string(),
                        ));
                    }
                    self.advance();
                    break;
                }
                Some(_) => elements.push(self.read_expr()?),
            }
        }

        // Build from the rear so every partial list stays rooted.
        let mut result = match tail {
            Some(tail) => tail,
            None => RootedValue::new(self.heap, Value::EmptyList),
        };
        for element in elements.iter().rev() {
            let id = self.heap.allocate_cons(element.get(), result.get())?;
            result.emplace(Value::Pair(id));
        }
        Ok(result)
    }

    /// True if the byte at `pos` is a standalone `.`, not the start of a
    /// symbol like `...` or a number like `.5`.
    fn is_dot_at(&self, pos: usize) -> bool {
        self.input[pos] == b'.'
            && self
                .input
                .get(pos + 1)
                .map(|&next| is_delimiter(next))
                .unwrap_or(true)
    }

    /// `'x` reads as `(quote x)`.
    fn read_quote(&mut self) -> SchemeResult<RootedValue> {
        self.advance(); // consume '\''
        let quoted = self.read_expr()?;
        let quote = self.heap.quote_symbol();
        let inner = self.heap.allocate_cons(quoted.get(), Value::EmptyList)?;
        let mut result = RootedValue::new(self.heap, Value::Pair(inner));
        let outer = self.heap.allocate_cons(quote, result.get())?;
        result.emplace(Value::Pair(outer));
        Ok(result)
    }

    fn read_string(&mut self) -> SchemeResult<RootedValue> {
        self.advance(); // consume '"'
        let mut contents = String::new();
        loop {
            match self.advance() {
                None => return Err(SchemeError::Read("unterminated string".to_string())),
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(b'n') => contents.push('\n'),
                    Some(b't') => contents.push('\t'),
                    Some(b'r') => contents.push('\r'),
                    Some(b'\\') => contents.push('\\'),
                    Some(b'"') => contents.push('"'),
                    other => {
                        return Err(SchemeError::Read(format!(
                            "unknown string escape: {:?}",
                            other.map(|b| b as char)
                        )))
                    }
                },
                Some(byte) => contents.push(byte as char),
            }
        }
        let id = self.heap.allocate_string(contents)?;
        Ok(RootedValue::new(self.heap, Value::String(id)))
    }

    /// `#t`, `#f`, and `#\` characters.
    fn read_hash(&mut self) -> SchemeResult<RootedValue> {
        self.advance(); // consume '#'
        match self.advance() {
            Some(b't') => Ok(RootedValue::new(self.heap, Value::Boolean(true))),
            Some(b'f') => Ok(RootedValue::new(self.heap, Value::Boolean(false))),
            Some(b'\\') => self.read_character(),
            other => Err(SchemeError::Read(format!(
                "unknown # syntax: {:?}",
                other.map(|b| b as char)
            ))),
        }
    }

    fn read_character(&mut self) -> SchemeResult<RootedValue> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if is_delimiter(byte) && self.pos > start {
                break;
            }
            self.pos += 1;
        }
        let token = &self.input[start..self.pos];
        let character = match token {
            b"newline" => '\n',
            b"space" => ' ',
            b"tab" => '\t',
            [byte] => *byte as char,
            _ => {
                return Err(SchemeError::Read(format!(
                    "unknown character name: {}",
                    String::from_utf8_lossy(token)
                )))
            }
        };
        Ok(RootedValue::new(self.heap, Value::Character(character)))
    }

    /// An integer or a symbol.
    fn read_word(&mut self) -> SchemeResult<RootedValue> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if is_delimiter(byte) {
                break;
            }
            self.pos += 1;
        }
        let token = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        if token.is_empty() {
            return Err(SchemeError::Read("unexpected end of input".to_string()));
        }

        if let Ok(integer) = token.parse::<i64>() {
            return Ok(RootedValue::new(self.heap, Value::Integer(integer)));
        }

        let symbol = self.heap.get_or_create_symbol(&token)?;
        Ok(RootedValue::new(self.heap, symbol))
    }
}

fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b' ' | b'\t' | b'\n' | b'\r' | b'(' | b')' | b'"' | b';' | b'\''
    )
}

// TESTS -----------------------------------------------------------------------
