//! Power formula expression trees.
//!
//! Formulas are small arithmetic trees over the supply voltage, die temperature, elapsed
//! simulated time, and counters named relative to the owning component. Trees are built either
//! with the operator overloads on [`Expr`] or by parsing text:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | primary
//! primary := number | 'min' '(' expr ',' expr ')' | 'max' '(' expr ',' expr ')'
//!          | ident | '(' expr ')'
//! ```
//!
//! `voltage`, `temp`/`temperature`, and `simSeconds`/`elapsed_seconds` are environment
//! variables; any other identifier (letters, digits, `_`, `.`, `::`) is a counter suffix.

use std::fmt;
use std::ops;

use crate::common::error::PowerError;

/// Arithmetic expression over the power environment and component counters.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal.
    Const(f64),
    /// Supply voltage in volts.
    Voltage,
    /// Die temperature in degrees Celsius.
    Temperature,
    /// Elapsed simulated seconds.
    Elapsed,
    /// Counter suffix, resolved as `<component path>.<suffix>`.
    Counter(String),
    /// Sum.
    Add(Box<Expr>, Box<Expr>),
    /// Difference.
    Sub(Box<Expr>, Box<Expr>),
    /// Product.
    Mul(Box<Expr>, Box<Expr>),
    /// Quotient.
    Div(Box<Expr>, Box<Expr>),
    /// Smaller operand.
    Min(Box<Expr>, Box<Expr>),
    /// Larger operand.
    Max(Box<Expr>, Box<Expr>),
}

/// Values an expression is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerEnvironment {
    /// Supply voltage in volts.
    pub voltage: f64,
    /// Die temperature in degrees Celsius.
    pub temperature: f64,
    /// Elapsed simulated seconds.
    pub elapsed_seconds: f64,
}

impl PowerEnvironment {
    /// Rejects non-finite values, negative voltage, and non-positive elapsed time.
    ///
    /// # Errors
    ///
    /// Returns [`PowerError::InvalidEnvironment`].
    pub fn check(&self) -> Result<(), PowerError> {
        if !self.voltage.is_finite() || self.voltage < 0.0 {
            return Err(PowerError::InvalidEnvironment(format!(
                "voltage {} is not usable",
                self.voltage
            )));
        }
        if !self.temperature.is_finite() {
            return Err(PowerError::InvalidEnvironment(
                "temperature is not finite".to_string(),
            ));
        }
        if !self.elapsed_seconds.is_finite() || self.elapsed_seconds <= 0.0 {
            return Err(PowerError::InvalidEnvironment(format!(
                "elapsed time {} must be positive",
                self.elapsed_seconds
            )));
        }
        Ok(())
    }
}

impl Expr {
    /// Literal constructor.
    pub const fn c(value: f64) -> Self {
        Self::Const(value)
    }

    /// Counter constructor.
    pub fn counter(suffix: impl Into<String>) -> Self {
        Self::Counter(suffix.into())
    }

    /// `min(self, other)`.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self::Min(Box::new(self), Box::new(other))
    }

    /// `max(self, other)`.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self::Max(Box::new(self), Box::new(other))
    }

    /// `voltage * voltage`.
    pub fn voltage_squared() -> Self {
        Self::Voltage * Self::Voltage
    }

    /// Counter suffixes referenced anywhere in the tree, in first-use order.
    pub fn counters(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_counters(&mut out);
        out
    }

    fn collect_counters<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Counter(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Self::Add(a, b)
            | Self::Sub(a, b)
            | Self::Mul(a, b)
            | Self::Div(a, b)
            | Self::Min(a, b)
            | Self::Max(a, b) => {
                a.collect_counters(out);
                b.collect_counters(out);
            }
            Self::Const(_) | Self::Voltage | Self::Temperature | Self::Elapsed => {}
        }
    }

    /// Evaluates the tree.
    ///
    /// Counters are looked up through `counter`; an unresolved counter evaluates to NaN, so
    /// callers check [`counters`](Self::counters) first.
    pub fn eval(&self, env: &PowerEnvironment, counter: &dyn Fn(&str) -> Option<f64>) -> f64 {
        match self {
            Self::Const(v) => *v,
            Self::Voltage => env.voltage,
            Self::Temperature => env.temperature,
            Self::Elapsed => env.elapsed_seconds,
            Self::Counter(name) => counter(name).unwrap_or(f64::NAN),
            Self::Add(a, b) => a.eval(env, counter) + b.eval(env, counter),
            Self::Sub(a, b) => a.eval(env, counter) - b.eval(env, counter),
            Self::Mul(a, b) => a.eval(env, counter) * b.eval(env, counter),
            Self::Div(a, b) => a.eval(env, counter) / b.eval(env, counter),
            Self::Min(a, b) => a.eval(env, counter).min(b.eval(env, counter)),
            Self::Max(a, b) => a.eval(env, counter).max(b.eval(env, counter)),
        }
    }

    /// Parses a textual formula.
    ///
    /// # Errors
    ///
    /// Returns [`PowerError::Parse`] describing the first unexpected token.
    pub fn parse(input: &str) -> Result<Self, PowerError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            input,
            tokens,
            pos: 0,
        };
        let expr = parser.expr()?;
        match parser.peek() {
            None => Ok(expr),
            Some(tok) => Err(parser.error(format!("unexpected {tok}"))),
        }
    }
}

macro_rules! binary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl ops::$trait for Expr {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self {
                Self::$variant(Box::new(self), Box::new(rhs))
            }
        }
    };
}

binary_op!(Add, add, Add);
binary_op!(Sub, sub, Sub);
binary_op!(Mul, mul, Mul);
binary_op!(Div, div, Div);

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(v) => write!(f, "{v:?}"),
            Self::Voltage => f.write_str("voltage"),
            Self::Temperature => f.write_str("temp"),
            Self::Elapsed => f.write_str("simSeconds"),
            Self::Counter(name) => f.write_str(name),
            Self::Add(a, b) => write!(f, "({a} + {b})"),
            Self::Sub(a, b) => write!(f, "({a} - {b})"),
            Self::Mul(a, b) => write!(f, "({a} * {b})"),
            Self::Div(a, b) => write!(f, "({a} / {b})"),
            Self::Min(a, b) => write!(f, "min({a}, {b})"),
            Self::Max(a, b) => write!(f, "max({a}, {b})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "number {n}"),
            Self::Ident(s) => write!(f, "'{s}'"),
            Self::Op(c) => write!(f, "'{c}'"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, PowerError> {
    let err = |reason: String| PowerError::Parse {
        input: input.to_string(),
        reason,
    };
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                i += 1;
                if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse()
                .map_err(|_| err(format!("bad number '{text}'")))?;
            tokens.push(Token::Number(value));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '.' | ':'))
            {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if matches!(c, '+' | '-' | '*' | '/' | '(' | ')' | ',') {
            tokens.push(Token::Op(c));
            i += 1;
        } else {
            return Err(err(format!("unexpected character '{c}'")));
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: String) -> PowerError {
        PowerError::Parse {
            input: self.input.to_string(),
            reason,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, op: char) -> Result<(), PowerError> {
        match self.next() {
            Some(Token::Op(c)) if c == op => Ok(()),
            Some(tok) => Err(self.error(format!("expected '{op}', found {tok}"))),
            None => Err(self.error(format!("expected '{op}', found end of input"))),
        }
    }

    fn expr(&mut self) -> Result<Expr, PowerError> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = if op == '+' { lhs + rhs } else { lhs - rhs };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, PowerError> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = if op == '*' { lhs * rhs } else { lhs / rhs };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, PowerError> {
        if self.peek() == Some(&Token::Op('-')) {
            self.pos += 1;
            return Ok(Expr::c(0.0) - self.unary()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, PowerError> {
        match self.next() {
            Some(Token::Number(v)) => Ok(Expr::Const(v)),
            Some(Token::Op('(')) => {
                let inner = self.expr()?;
                self.expect(')')?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "min" | "max" => {
                    self.expect('(')?;
                    let a = self.expr()?;
                    self.expect(',')?;
                    let b = self.expr()?;
                    self.expect(')')?;
                    Ok(if name == "min" { a.min(b) } else { a.max(b) })
                }
                "voltage" => Ok(Expr::Voltage),
                "temp" | "temperature" => Ok(Expr::Temperature),
                "simSeconds" | "elapsed_seconds" => Ok(Expr::Elapsed),
                _ => Ok(Expr::Counter(name)),
            },
            Some(tok) => Err(self.error(format!("unexpected {tok}"))),
            None => Err(self.error("unexpected end of input".to_string())),
        }
    }
}
