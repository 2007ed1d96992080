//! Edge probability expressions such as `log(n)/n` or `1 - 1/sqrt(n)`.
//!
//! Grammar (lowest precedence first):
//!
//! ```text
//! expr  := term (('+' | '-') term)*
//! term  := unary (('*' | '/') unary)*
//! unary := '-' unary | power
//! power := atom ('^' unary)?
//! atom  := number | 'n' | func '(' expr ')' | '(' expr ')'
//! func  := 'log' | 'log2' | 'log10' | 'sqrt'
//! ```
//!
//! `log` is the natural logarithm.

use roundsim_core::{SimError, SimResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    Open,
    Close,
}

fn syntax(msg: impl Into<String>) -> SimError {
    SimError::Configuration(format!("probability expression: {}", msg.into()))
}

fn tokenize(input: &str) -> SimResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    let exponent_sign = (d == '-' || d == '+')
                        && matches!(input[..i].chars().last(), Some('e' | 'E'));
                    if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exponent_sign {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &input[start..end];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| syntax(format!("bad number '{text}'")))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_alphanumeric() {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(input[start..end].to_string()));
            }
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push(Token::Op(c));
                chars.next();
            }
            '(' => {
                tokens.push(Token::Open);
                chars.next();
            }
            ')' => {
                tokens.push(Token::Close);
                chars.next();
            }
            other => return Err(syntax(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    n: f64,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, ops: &[char]) -> Option<char> {
        let op = match self.peek() {
            Some(Token::Op(c)) if ops.contains(c) => *c,
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn expr(&mut self) -> SimResult<f64> {
        let mut value = self.term()?;
        while let Some(op) = self.eat_op(&['+', '-']) {
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> SimResult<f64> {
        let mut value = self.unary()?;
        while let Some(op) = self.eat_op(&['*', '/']) {
            let rhs = self.unary()?;
            value = if op == '*' { value * rhs } else { value / rhs };
        }
        Ok(value)
    }

    fn unary(&mut self) -> SimResult<f64> {
        if self.eat_op(&['-']).is_some() {
            return Ok(-self.unary()?);
        }
        self.power()
    }

    fn power(&mut self) -> SimResult<f64> {
        let base = self.atom()?;
        if self.eat_op(&['^']).is_some() {
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> SimResult<f64> {
        match self.next() {
            Some(Token::Number(v)) => Ok(v),
            Some(Token::Ident(name)) if name == "n" => Ok(self.n),
            Some(Token::Ident(name)) => {
                let f: fn(f64) -> f64 = match name.as_str() {
                    "log" => f64::ln,
                    "log2" => f64::log2,
                    "log10" => f64::log10,
                    "sqrt" => f64::sqrt,
                    _ => return Err(syntax(format!("unknown identifier '{name}'"))),
                };
                let arg = self.parenthesized()?;
                Ok(f(arg))
            }
            Some(Token::Open) => {
                self.pos -= 1;
                self.parenthesized()
            }
            Some(other) => Err(syntax(format!("unexpected token {other:?}"))),
            None => Err(syntax("unexpected end of input")),
        }
    }

    fn parenthesized(&mut self) -> SimResult<f64> {
        if self.next() != Some(Token::Open) {
            return Err(syntax("expected '('"));
        }
        let value = self.expr()?;
        if self.next() != Some(Token::Close) {
            return Err(syntax("expected ')'"));
        }
        Ok(value)
    }
}

/// Evaluate `input` with the variable `n` bound to `n`.
pub fn evaluate(input: &str, n: usize) -> SimResult<f64> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
        n: n as f64,
    };
    if parser.tokens.is_empty() {
        return Err(syntax("empty expression"));
    }
    let value = parser.expr()?;
    if let Some(extra) = parser.peek() {
        return Err(syntax(format!("trailing input at {extra:?}")));
    }
    Ok(value)
}

/// Evaluate `input` as an edge probability, which must land in `[0, 1]`.
pub fn probability(input: &str, n: usize) -> SimResult<f64> {
    let p = evaluate(input, n)?;
    if !p.is_finite() || !(0.0..=1.0).contains(&p) {
        return Err(SimError::Validation(format!(
            "probability '{input}' evaluates to {p} for n = {n}, outside [0, 1]"
        )));
    }
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_precedence() {
        assert_eq!(evaluate("1 + 2 * 3", 0).unwrap(), 7.0);
        assert_eq!(evaluate("(1 + 2) * 3", 0).unwrap(), 9.0);
        assert_eq!(evaluate("2 ^ 3 ^ 2", 0).unwrap(), 512.0);
        assert_eq!(evaluate("-2 ^ 2", 0).unwrap(), -4.0);
        assert_eq!(evaluate("8 / 4 / 2", 0).unwrap(), 1.0);
        assert_eq!(evaluate("1 - -1", 0).unwrap(), 2.0);
    }

    #[test]
    fn test_variable_and_functions() {
        assert!(close(evaluate("log(n)/n", 100).unwrap(), 100f64.ln() / 100.0));
        assert_eq!(evaluate("log2(n)", 1024).unwrap(), 10.0);
        assert!(close(evaluate("log10(n)", 1000).unwrap(), 3.0));
        assert_eq!(evaluate("1/sqrt(n)", 16).unwrap(), 0.25);
        assert!(close(evaluate("1e-3 * n", 500).unwrap(), 0.5));
    }

    #[test]
    fn test_probability_range() {
        assert_eq!(probability("0.0", 10).unwrap(), 0.0);
        assert_eq!(probability("1", 10).unwrap(), 1.0);
        assert!(matches!(probability("n", 10), Err(SimError::Validation(_))));
        assert!(matches!(probability("-0.5", 10), Err(SimError::Validation(_))));
        assert!(matches!(probability("1/0", 10), Err(SimError::Validation(_))));
        assert!(matches!(probability("log(0)", 10), Err(SimError::Validation(_))));
    }

    #[test]
    fn test_malformed_expressions() {
        for bad in ["", "1 +", "(1", "1)", "foo(2)", "log 2", "2 $ 3", "1 2"] {
            assert!(
                matches!(evaluate(bad, 1), Err(SimError::Configuration(_))),
                "{bad:?} should not parse"
            );
        }
    }
}
