use std::cmp::Ordering;
use std::collections::HashMap;

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_until, take_while, take_while1},
    character::complete::{anychar, char, digit0, digit1, one_of, satisfy},
    combinator::{all_consuming, map, map_opt, map_parser, opt, recognize, value},
    error::{context, VerboseError},
    multi::{fold_many0, many0},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use regex::Regex;
use serde_json::{Number, Value};
use thiserror::Error;

use super::path::{get_path, is_identifier_char, is_path, parse_path};
use super::template;

/// Read access to variables for expression and template resolution.
pub trait VariableLookup {
    /// Resolve a variable path such as `row.amount`; `None` when unset.
    fn lookup(&self, path: &str) -> Option<Value>;
}

impl VariableLookup for HashMap<String, Value> {
    fn lookup(&self, path: &str) -> Option<Value> {
        let (root, segments) = parse_path(path)?;
        get_path(self.get(&root)?, &segments).cloned()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("unexpected character '{ch}' at position {pos} in `{expr}`")]
    UnexpectedChar { expr: String, ch: char, pos: usize },
    #[error("unknown operator '{op}' in `{expr}`")]
    UnknownOperator { expr: String, op: String },
    #[error("unexpected token '{token}' in `{expr}`")]
    UnexpectedToken { expr: String, token: String },
    #[error("unexpected end of expression `{0}`")]
    UnexpectedEnd(String),
    #[error("unterminated string literal in `{0}`")]
    UnterminatedString(String),
    #[error("invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },
    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: String,
        left: String,
        right: String,
    },
    #[error("division by zero")]
    DivisionByZero,
}

type ExprResult<T> = Result<T, ExpressionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Operator {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Rem,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "contains")]
    Contains,
    #[strum(serialize = "matches")]
    Matches,
}

impl Operator {
    fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::Eq
                | Operator::Ne
                | Operator::Lt
                | Operator::Le
                | Operator::Gt
                | Operator::Ge
                | Operator::In
                | Operator::Contains
                | Operator::Matches
        )
    }
}

const OPERATOR_CHARS: &str = "=!<>&|+-*/%~^";

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(Value),
    Str(String),
    Ident(String),
    Ref(String),
    Op(Operator),
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Literal(v) => v.to_string(),
            Token::Str(s) => format!("'{}'", s),
            Token::Ident(name) => name.clone(),
            Token::Ref(path) => format!("{{{{{}}}}}", path),
            Token::Op(op) => op.to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    /// String literal that itself carries `{{ }}` placeholders.
    Template(String),
    /// Bare identifier; falls back to its own name when unresolved.
    Ident(String),
    /// `{{ }}` reference; `null` when unresolved.
    Ref(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(Operator, Box<Expr>, Box<Expr>),
}

/// A parsed expression, reusable across evaluations.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> ExprResult<Self> {
        let tokens = tokenize(source)?;
        let root = Parser {
            tokens,
            pos: 0,
            source,
        }
        .parse()?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, scope: &dyn VariableLookup) -> ExprResult<Value> {
        eval(&self.root, scope)
    }

    /// Whether every bare identifier and reference names a bound variable.
    pub fn is_fully_bound(&self, scope: &dyn VariableLookup) -> bool {
        is_bound(&self.root, scope)
    }
}

fn is_bound(expr: &Expr, scope: &dyn VariableLookup) -> bool {
    match expr {
        Expr::Literal(_) | Expr::Template(_) => true,
        Expr::Ident(path) => scope.lookup(path).is_some(),
        Expr::Ref(inner) if is_path(inner) => scope.lookup(inner).is_some(),
        Expr::Ref(inner) => Expression::parse(inner).is_ok_and(|e| e.is_fully_bound(scope)),
        Expr::Not(inner) | Expr::Neg(inner) => is_bound(inner, scope),
        Expr::And(left, right) | Expr::Or(left, right) | Expr::Binary(_, left, right) => {
            is_bound(left, scope) && is_bound(right, scope)
        }
    }
}

/// Parse and evaluate `source` in one go.
pub fn evaluate(source: &str, scope: &dyn VariableLookup) -> ExprResult<Value> {
    Expression::parse(source)?.evaluate(scope)
}

pub fn evaluate_bool(source: &str, scope: &dyn VariableLookup) -> ExprResult<bool> {
    evaluate(source, scope).map(|v| is_truthy(&v))
}

/// `false`, `null`, `0`, `""`, `"false"`, `[]` and `{}` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Human-readable rendering used for template substitution and string
/// comparison: strings are unquoted, everything else is compact JSON.
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

type ParserResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

fn is_operator_char(c: char) -> bool {
    OPERATOR_CHARS.contains(c)
}

fn tokenize(expr: &str) -> ExprResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut remaining = expr.trim_start();

    while !remaining.is_empty() {
        match parse_token(remaining) {
            Ok((rest, parsed)) => {
                tokens.extend(parsed);
                remaining = rest.trim_start();
            }
            Err(_) => return Err(unrecognized(expr, remaining)),
        }
    }

    Ok(tokens)
}

fn parse_token(input: &str) -> ParserResult<Vec<Token>> {
    alt((
        map(
            alt((
                parse_reference,
                parse_string,
                parse_number,
                parse_word,
                parse_paren,
            )),
            |token| vec![token],
        ),
        map(parse_operator_run, |ops| ops.into_iter().map(Token::Op).collect::<Vec<_>>()),
    ))(input)
}

/// Turn a tokenizer failure at `remaining` into a diagnostic.
fn unrecognized(expr: &str, remaining: &str) -> ExpressionError {
    if remaining.starts_with("{{") {
        return ExpressionError::UnexpectedEnd(expr.to_string());
    }
    match remaining.chars().next() {
        Some('"' | '\'') => ExpressionError::UnterminatedString(expr.to_string()),
        Some(c) if is_operator_char(c) => ExpressionError::UnknownOperator {
            expr: expr.to_string(),
            op: remaining.chars().take_while(|c| is_operator_char(*c)).collect(),
        },
        Some(ch) => ExpressionError::UnexpectedChar {
            expr: expr.to_string(),
            ch,
            pos: expr[..expr.len() - remaining.len()].chars().count(),
        },
        None => ExpressionError::UnexpectedEnd(expr.to_string()),
    }
}

fn parse_reference(input: &str) -> ParserResult<Token> {
    context(
        "reference",
        map(delimited(tag("{{"), take_until("}}"), tag("}}")), |inner: &str| {
            Token::Ref(inner.trim().to_string())
        }),
    )(input)
}

fn quoted<'a>(quote: char, stop: &'static str) -> impl FnMut(&'a str) -> ParserResult<'a, String> {
    delimited(
        char(quote),
        fold_many0(
            alt((
                map(is_not(stop), str::to_string),
                preceded(
                    char('\\'),
                    alt((
                        value("\n".to_string(), char('n')),
                        value("\t".to_string(), char('t')),
                        map(anychar, String::from),
                    )),
                ),
            )),
            String::new,
            |mut acc, fragment| {
                acc.push_str(&fragment);
                acc
            },
        ),
        char(quote),
    )
}

fn parse_string(input: &str) -> ParserResult<Token> {
    context(
        "string literal",
        map(alt((quoted('\'', "\\'"), quoted('"', "\\\""))), Token::Str),
    )(input)
}

fn parse_number(input: &str) -> ParserResult<Token> {
    context(
        "number literal",
        map_opt(
            recognize(pair(
                alt((
                    recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                    recognize(pair(char('.'), digit1)),
                )),
                opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
            )),
            |text: &str| number_value(text).map(Token::Literal),
        ),
    )(input)
}

fn parse_word(input: &str) -> ParserResult<Token> {
    context(
        "identifier",
        map(
            recognize(pair(
                satisfy(|c: char| c.is_ascii_alphabetic() || c == '_' || c == '$'),
                take_while(|c: char| is_identifier_char(c) || c == '.' || c == '[' || c == ']'),
            )),
            |word: &str| match word {
                "true" => Token::Literal(Value::Bool(true)),
                "false" => Token::Literal(Value::Bool(false)),
                "null" => Token::Literal(Value::Null),
                "and" => Token::Op(Operator::And),
                "or" => Token::Op(Operator::Or),
                "not" => Token::Op(Operator::Not),
                "in" => Token::Op(Operator::In),
                "contains" => Token::Op(Operator::Contains),
                "matches" => Token::Op(Operator::Matches),
                _ => Token::Ident(word.to_string()),
            },
        ),
    )(input)
}

fn parse_paren(input: &str) -> ParserResult<Token> {
    alt((value(Token::LParen, char('(')), value(Token::RParen, char(')'))))(input)
}

fn parse_operator(input: &str) -> ParserResult<Operator> {
    context(
        "operator",
        alt((
            // two-character operators first so the longest match wins
            value(Operator::Eq, tag("==")),
            value(Operator::Ne, tag("!=")),
            value(Operator::Le, tag("<=")),
            value(Operator::Ge, tag(">=")),
            value(Operator::And, tag("&&")),
            value(Operator::Or, tag("||")),
            value(Operator::Matches, tag("=~")),
            value(Operator::Lt, tag("<")),
            value(Operator::Gt, tag(">")),
            value(Operator::Not, tag("!")),
            value(Operator::Add, tag("+")),
            value(Operator::Sub, tag("-")),
            value(Operator::Mul, tag("*")),
            value(Operator::Div, tag("/")),
            value(Operator::Rem, tag("%")),
        )),
    )(input)
}

fn parse_prefix_operator(input: &str) -> ParserResult<Operator> {
    alt((value(Operator::Not, char('!')), value(Operator::Sub, char('-'))))(input)
}

/// A run of operator characters. Only the first operator may be binary;
/// anything after it must be a prefix `!` or `-`.
fn parse_operator_run(input: &str) -> ParserResult<Vec<Operator>> {
    context(
        "operator run",
        map_parser(
            take_while1(is_operator_char),
            all_consuming(map(
                pair(parse_operator, many0(parse_prefix_operator)),
                |(first, rest)| std::iter::once(first).chain(rest).collect::<Vec<_>>(),
            )),
        ),
    )(input)
}

fn number_value(text: &str) -> Option<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::from(i));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn parse(mut self) -> ExprResult<Expr> {
        let expr = self.parse_or()?;
        if let Some(token) = self.tokens.get(self.pos) {
            return Err(self.unexpected(token));
        }
        Ok(expr)
    }

    fn peek_op(&self) -> Option<Operator> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn unexpected(&self, token: &Token) -> ExpressionError {
        ExpressionError::UnexpectedToken {
            expr: self.source.to_string(),
            token: token.describe(),
        }
    }

    fn parse_or(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_and()?;
        while self.peek_op() == Some(Operator::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_not()?;
        while self.peek_op() == Some(Operator::And) {
            self.pos += 1;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ExprResult<Expr> {
        if self.peek_op() == Some(Operator::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> ExprResult<Expr> {
        let left = self.parse_additive()?;
        match self.peek_op() {
            Some(op) if op.is_comparison() => {
                self.pos += 1;
                let right = self.parse_additive()?;
                if let Some(next) = self.peek_op().filter(|op| op.is_comparison()) {
                    return Err(self.unexpected(&Token::Op(next)));
                }
                Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
            }
            _ => Ok(left),
        }
    }

    fn parse_additive(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_term()?;
        while let Some(op @ (Operator::Add | Operator::Sub)) = self.peek_op() {
            self.pos += 1;
            let right = self.parse_term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_unary()?;
        while let Some(op @ (Operator::Mul | Operator::Div | Operator::Rem)) = self.peek_op() {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ExprResult<Expr> {
        match self.peek_op() {
            Some(Operator::Sub) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some(Operator::Not) => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> ExprResult<Expr> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ExpressionError::UnexpectedEnd(self.source.to_string()))?;
        self.pos += 1;
        match token {
            Token::Literal(value) => Ok(Expr::Literal(value)),
            Token::Str(s) if s.contains("{{") => Ok(Expr::Template(s)),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Ident(name) => Ok(Expr::Ident(name)),
            Token::Ref(path) => Ok(Expr::Ref(path)),
            Token::LParen => {
                let inner = self.parse_or()?;
                match self.tokens.get(self.pos) {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    Some(other) => Err(self.unexpected(other)),
                    None => Err(ExpressionError::UnexpectedEnd(self.source.to_string())),
                }
            }
            other => Err(self.unexpected(&other)),
        }
    }
}

fn eval(expr: &Expr, scope: &dyn VariableLookup) -> ExprResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Template(text) => Ok(Value::String(template::resolve_template(text, scope))),
        Expr::Ident(path) => Ok(scope
            .lookup(path)
            .unwrap_or_else(|| Value::String(path.clone()))),
        Expr::Ref(inner) => {
            if is_path(inner) {
                Ok(scope.lookup(inner).unwrap_or(Value::Null))
            } else {
                evaluate(inner, scope)
            }
        }
        Expr::Not(inner) => Ok(Value::Bool(!is_truthy(&eval(inner, scope)?))),
        Expr::Neg(inner) => {
            let value = eval(inner, scope)?;
            match as_number(&value) {
                Some(Num::Int(i)) => Ok(i
                    .checked_neg()
                    .map(Value::from)
                    .unwrap_or_else(|| float_value(-(i as f64)))),
                Some(Num::Float(f)) => Ok(float_value(-f)),
                None => Err(ExpressionError::TypeMismatch {
                    op: "-".to_string(),
                    left: "nothing".to_string(),
                    right: type_name(&value).to_string(),
                }),
            }
        }
        Expr::And(left, right) => {
            if !is_truthy(&eval(left, scope)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(is_truthy(&eval(right, scope)?)))
        }
        Expr::Or(left, right) => {
            if is_truthy(&eval(left, scope)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(is_truthy(&eval(right, scope)?)))
        }
        Expr::Binary(op, left, right) => {
            let left = eval(left, scope)?;
            let right = eval(right, scope)?;
            apply_binary(*op, &left, &right)
        }
    }
}

fn apply_binary(op: Operator, left: &Value, right: &Value) -> ExprResult<Value> {
    match op {
        Operator::Eq => Ok(Value::Bool(loose_eq(left, right))),
        Operator::Ne => Ok(Value::Bool(!loose_eq(left, right))),
        Operator::Lt => Ok(Value::Bool(compare(left, right) == Ordering::Less)),
        Operator::Le => Ok(Value::Bool(compare(left, right) != Ordering::Greater)),
        Operator::Gt => Ok(Value::Bool(compare(left, right) == Ordering::Greater)),
        Operator::Ge => Ok(Value::Bool(compare(left, right) != Ordering::Less)),
        Operator::In => Ok(Value::Bool(contains(right, left))),
        Operator::Contains => Ok(Value::Bool(contains(left, right))),
        Operator::Matches => {
            let pattern = display(right);
            let regex = Regex::new(&pattern).map_err(|e| ExpressionError::InvalidRegex {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            Ok(Value::Bool(regex.is_match(&display(left))))
        }
        Operator::Add => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => Ok(arithmetic(op, a, b)?),
            _ => match (left, right) {
                (Value::Array(a), Value::Array(b)) => {
                    Ok(Value::Array(a.iter().chain(b.iter()).cloned().collect()))
                }
                _ => Ok(Value::String(format!("{}{}", display(left), display(right)))),
            },
        },
        Operator::Sub | Operator::Mul | Operator::Div | Operator::Rem => {
            match (as_number(left), as_number(right)) {
                (Some(a), Some(b)) => arithmetic(op, a, b),
                _ => Err(ExpressionError::TypeMismatch {
                    op: op.to_string(),
                    left: type_name(left).to_string(),
                    right: type_name(right).to_string(),
                }),
            }
        }
        // logical operators are parsed into And/Or/Not nodes
        Operator::And | Operator::Or | Operator::Not => Err(ExpressionError::TypeMismatch {
            op: op.to_string(),
            left: type_name(left).to_string(),
            right: type_name(right).to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn looks_numeric(s: &str) -> bool {
    !s.is_empty()
        && s.chars().any(|c| c.is_ascii_digit())
        && s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
}

fn as_number(value: &Value) -> Option<Num> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Num::Int)
            .or_else(|| n.as_f64().map(Num::Float)),
        Value::String(s) => {
            let s = s.trim();
            if !looks_numeric(s) {
                return None;
            }
            s.parse::<i64>()
                .map(Num::Int)
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(Num::Float))
        }
        _ => None,
    }
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn arithmetic(op: Operator, a: Num, b: Num) -> ExprResult<Value> {
    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        let exact = match op {
            Operator::Add => x.checked_add(y),
            Operator::Sub => x.checked_sub(y),
            Operator::Mul => x.checked_mul(y),
            Operator::Div => {
                if y == 0 {
                    return Err(ExpressionError::DivisionByZero);
                }
                if x % y == 0 {
                    x.checked_div(y)
                } else {
                    None
                }
            }
            Operator::Rem => {
                if y == 0 {
                    return Err(ExpressionError::DivisionByZero);
                }
                x.checked_rem(y)
            }
            _ => None,
        };
        if let Some(result) = exact {
            return Ok(Value::from(result));
        }
    }

    let (x, y) = (a.as_f64(), b.as_f64());
    let result = match op {
        Operator::Add => x + y,
        Operator::Sub => x - y,
        Operator::Mul => x * y,
        Operator::Div | Operator::Rem if y == 0.0 => return Err(ExpressionError::DivisionByZero),
        Operator::Div => x / y,
        Operator::Rem => x % y,
        other => {
            return Err(ExpressionError::TypeMismatch {
                op: other.to_string(),
                left: "number".to_string(),
                right: "number".to_string(),
            })
        }
    };
    Ok(float_value(result))
}

/// Equality with numeric coercion when both sides look numeric, and string
/// comparison when either side is a string.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a.as_f64() == b.as_f64();
    }
    match (left, right) {
        (Value::String(_), _) | (_, Value::String(_)) => display(left) == display(right),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Ordering {
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal);
    }
    display(left).cmp(&display(right))
}

fn contains(container: &Value, item: &Value) -> bool {
    match container {
        Value::Array(items) => items.iter().any(|v| loose_eq(v, item)),
        Value::Object(map) => map.contains_key(&display(item)),
        Value::String(s) => s.contains(&display(item)),
        _ => false,
    }
}
