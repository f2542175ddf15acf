//! `calculate` tool: a small arithmetic expression evaluator.
//!
//! Supports `+ - * /`, powers with `^` or `**`, parentheses, implicit
//! multiplication (`2pi`, `3(1+2)`), the functions `sqrt sin cos tan log ln
//! log10 exp abs` and the constants `pi` and `e`. `log` is the natural
//! logarithm.

use async_trait::async_trait;

use super::Tool;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CalcError {
    #[error("carácter inesperado '{0}'")]
    UnexpectedChar(char),
    #[error("número inválido '{0}'")]
    InvalidNumber(String),
    #[error("símbolo desconocido '{0}'")]
    UnknownSymbol(String),
    #[error("se esperaba '{0}'")]
    Expected(&'static str),
    #[error("expresión incompleta")]
    UnexpectedEnd,
    #[error("división por cero")]
    DivisionByZero,
    #[error("el resultado no es un número real")]
    NotReal,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Pow,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                let n = raw.parse().map_err(|_| CalcError::InvalidNumber(raw))?;
                tokens.push(Token::Num(n));
            }
            c if c.is_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Pow);
                i += 2;
            }
            _ => {
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' | '×' => Token::Star,
                    '/' | '÷' => Token::Slash,
                    '^' => Token::Pow,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    other => return Err(CalcError::UnexpectedChar(other)),
                });
                i += 1;
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, token: &Token, label: &'static str) -> Result<(), CalcError> {
        match self.next() {
            Some(ref t) if t == token => Ok(()),
            _ => Err(CalcError::Expected(label)),
        }
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut acc = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    acc += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    acc -= self.term()?;
                }
                _ => return Ok(acc),
            }
        }
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut acc = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    acc *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    acc /= rhs;
                }
                // implicit multiplication
                Some(Token::Num(_) | Token::Ident(_) | Token::LParen) => {
                    acc *= self.power()?;
                }
                _ => return Ok(acc),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.primary()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, CalcError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let v = self.expr()?;
                self.expect(&Token::RParen, ")")?;
                Ok(v)
            }
            Some(Token::Ident(name)) => self.identifier(&name),
            Some(_) => Err(CalcError::Expected("un número")),
            None => Err(CalcError::UnexpectedEnd),
        }
    }

    fn identifier(&mut self, name: &str) -> Result<f64, CalcError> {
        let lower = name.to_lowercase();
        let func: Option<fn(f64) -> f64> = match lower.as_str() {
            "sqrt" => Some(f64::sqrt),
            "sin" => Some(f64::sin),
            "cos" => Some(f64::cos),
            "tan" => Some(f64::tan),
            "log" | "ln" => Some(f64::ln),
            "log10" => Some(f64::log10),
            "exp" => Some(f64::exp),
            "abs" => Some(f64::abs),
            _ => None,
        };

        if let Some(f) = func {
            self.expect(&Token::LParen, "(")?;
            let arg = self.expr()?;
            self.expect(&Token::RParen, ")")?;
            return Ok(f(arg));
        }

        match lower.as_str() {
            "pi" => Ok(std::f64::consts::PI),
            "e" => Ok(std::f64::consts::E),
            _ => Err(CalcError::UnknownSymbol(name.to_string())),
        }
    }
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(CalcError::UnexpectedEnd);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if let Some(tok) = parser.peek() {
        return Err(match tok {
            Token::RParen => CalcError::UnexpectedChar(')'),
            _ => CalcError::Expected("fin de la expresión"),
        });
    }
    if !value.is_finite() {
        return Err(CalcError::NotReal);
    }
    Ok(value)
}

/// Render whole numbers without a fractional part.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CalculateTool;

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Calcula expresiones matemáticas. Soporta: +, -, *, /, **, sqrt, sin, cos, tan, log, etc. \
         Ejemplos: '2 + 2', 'sqrt(16)', 'sin(pi/2)', '2^3', 'log(100)'"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Expresión matemática a evaluar"
                }
            },
            "required": ["expression"]
        })
    }

    async fn call(&self, args: serde_json::Value) -> anyhow::Result<String> {
        let expression = args
            .get("expression")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        Ok(match evaluate(expression) {
            Ok(value) => format!("Resultado: {}", format_number(value)),
            Err(e) => format!("Error al calcular: {e}"),
        })
    }
}
