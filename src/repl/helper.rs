//! Rustyline helper: completion over ground bindings and a validator that
//! keeps reading input until parentheses balance.

use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Context, Helper};

pub struct KernelHelper {
    bindings: Vec<String>,
}

impl KernelHelper {
    pub fn new(bindings: Vec<String>) -> Self {
        KernelHelper { bindings }
    }
}

fn word_start(line: &str, pos: usize) -> usize {
    line[..pos]
        .rfind(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '"'))
        .map(|i| i + 1)
        .unwrap_or(0)
}

/// Paren balance of the input so far, ignoring strings and comments.
/// Negative means too many closers; the parser will report that itself.
fn paren_balance(input: &str) -> i32 {
    let mut depth = 0;
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '"' => {
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            chars.next();
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    depth
}

impl Completer for KernelHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = word_start(line, pos);
        let prefix = &line[start..pos];
        if prefix.is_empty() {
            return Ok((start, Vec::new()));
        }
        let candidates = self
            .bindings
            .iter()
            .filter(|name| name.starts_with(prefix))
            .map(|name| Pair {
                display: name.clone(),
                replacement: name.clone(),
            })
            .collect();
        Ok((start, candidates))
    }
}

impl Hinter for KernelHelper {
    type Hint = String;
}

impl Highlighter for KernelHelper {}

impl Validator for KernelHelper {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        if paren_balance(ctx.input()) > 0 {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

impl Helper for KernelHelper {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paren_balance() {
        assert_eq!(paren_balance("(a (b c)"), 1);
        assert_eq!(paren_balance("(a (b c))"), 0);
        assert_eq!(paren_balance("\"(((\""), 0);
        assert_eq!(paren_balance("; ((( comment\n(f"), 1);
    }

    #[test]
    fn test_word_start() {
        assert_eq!(word_start("(foo ba", 7), 5);
        assert_eq!(word_start("foo", 3), 0);
    }
}
