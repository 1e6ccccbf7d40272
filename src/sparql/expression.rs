//! Expression evaluation
//!
//! Evaluation returns `Err` for every SPARQL expression error (unbound
//! variable, type mismatch, invalid lexical form). Callers decide what an
//! error means: a FILTER drops the solution, BIND and SELECT expressions
//! leave the variable unbound, ORDER BY treats the key as unbound.

use crate::rdf::{vocab, Literal, NamedNode, RdfTerm};
use crate::sparql::ast::{BinaryOp, CastTarget, Expression, Function, UnaryOp};
use crate::sparql::executor::{planner, ExecutionError, ExecutionResult, QueryContext, Solution};
use regex::RegexBuilder;
use std::cmp::Ordering;
use tracing::trace;

const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

fn type_error(message: impl Into<String>) -> ExecutionError {
    ExecutionError::TypeError(message.into())
}

/// Evaluate a FILTER condition; errors count as false
pub fn filter_passes(expression: &Expression, row: &Solution, ctx: &QueryContext<'_>) -> bool {
    match evaluate(expression, row, ctx).and_then(|term| effective_boolean_value(&term)) {
        Ok(value) => value,
        Err(e) => {
            trace!("Filter dropped solution: {}", e);
            false
        }
    }
}

/// Evaluate an expression against one solution
pub fn evaluate(
    expression: &Expression,
    row: &Solution,
    ctx: &QueryContext<'_>,
) -> ExecutionResult<RdfTerm> {
    match expression {
        Expression::Variable(name) => ctx
            .variables
            .slot(name)
            .and_then(|slot| row.get(slot))
            .cloned()
            .ok_or_else(|| ExecutionError::VariableNotFound(name.clone())),
        Expression::Constant(term) => Ok(term.clone()),
        Expression::Binary { left, op, right } => match op {
            BinaryOp::Or => {
                let l = evaluate(left, row, ctx).and_then(|t| effective_boolean_value(&t));
                if matches!(l, Ok(true)) {
                    return Ok(Literal::from_bool(true).into());
                }
                let r = evaluate(right, row, ctx).and_then(|t| effective_boolean_value(&t));
                match (l, r) {
                    (_, Ok(true)) => Ok(Literal::from_bool(true).into()),
                    (Ok(false), Ok(false)) => Ok(Literal::from_bool(false).into()),
                    (Err(e), _) | (_, Err(e)) => Err(e),
                    _ => Ok(Literal::from_bool(false).into()),
                }
            }
            BinaryOp::And => {
                let l = evaluate(left, row, ctx).and_then(|t| effective_boolean_value(&t));
                if matches!(l, Ok(false)) {
                    return Ok(Literal::from_bool(false).into());
                }
                let r = evaluate(right, row, ctx).and_then(|t| effective_boolean_value(&t));
                match (l, r) {
                    (_, Ok(false)) => Ok(Literal::from_bool(false).into()),
                    (Ok(true), Ok(true)) => Ok(Literal::from_bool(true).into()),
                    (Err(e), _) | (_, Err(e)) => Err(e),
                    _ => Ok(Literal::from_bool(true).into()),
                }
            }
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                let l = evaluate(left, row, ctx)?;
                let r = evaluate(right, row, ctx)?;
                compare(*op, &l, &r).map(|b| Literal::from_bool(b).into())
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                let l = numeric_operand(&evaluate(left, row, ctx)?)?;
                let r = numeric_operand(&evaluate(right, row, ctx)?)?;
                arithmetic(*op, l, r).map(Numeric::into_term)
            }
        },
        Expression::Unary { op, expr } => {
            let value = evaluate(expr, row, ctx)?;
            match op {
                UnaryOp::Not => Ok(Literal::from_bool(!effective_boolean_value(&value)?).into()),
                UnaryOp::Plus => Ok(numeric_operand(&value)?.into_term()),
                UnaryOp::Minus => match numeric_operand(&value)? {
                    Numeric::Integer(i) => i
                        .checked_neg()
                        .map(|n| Numeric::Integer(n).into_term())
                        .ok_or_else(|| type_error("integer overflow")),
                    Numeric::Decimal(d) => Ok(Numeric::Decimal(-d).into_term()),
                    Numeric::Double(d) => Ok(Numeric::Double(-d).into_term()),
                },
            }
        }
        Expression::In {
            expr,
            list,
            negated,
        } => {
            let needle = evaluate(expr, row, ctx)?;
            let mut error = None;
            for item in list {
                match evaluate(item, row, ctx).and_then(|v| compare(BinaryOp::Eq, &needle, &v)) {
                    Ok(true) => return Ok(Literal::from_bool(!negated).into()),
                    Ok(false) => {}
                    Err(e) => error = Some(e),
                }
            }
            match error {
                Some(e) => Err(e),
                None => Ok(Literal::from_bool(*negated).into()),
            }
        }
        Expression::Exists { pattern, negated } => {
            let mut plan = planner::plan_group(pattern, row.clone(), ctx.variables)?;
            let found = plan.next(ctx)?.is_some();
            Ok(Literal::from_bool(found != *negated).into())
        }
        Expression::Function { function, args } => call(*function, args, row, ctx),
    }
}

/// SPARQL effective boolean value
pub fn effective_boolean_value(term: &RdfTerm) -> ExecutionResult<bool> {
    let RdfTerm::Literal(literal) = term else {
        return Err(type_error(format!("no boolean value for {}", term)));
    };
    if literal.is_simple() {
        return Ok(!literal.value().is_empty());
    }
    let datatype = literal.datatype_iri();
    if datatype == vocab::XSD_BOOLEAN {
        // invalid lexical forms are false
        return Ok(matches!(literal.value(), "true" | "1"));
    }
    if is_numeric_datatype(datatype) {
        return Ok(match Numeric::from_literal(literal) {
            Some(Numeric::Integer(i)) => i != 0,
            Some(Numeric::Decimal(d)) | Some(Numeric::Double(d)) => d != 0.0 && !d.is_nan(),
            None => false,
        });
    }
    Err(type_error(format!("no boolean value for {}", literal)))
}

// Numbers

#[derive(Debug, Clone, Copy, PartialEq)]
enum Numeric {
    Integer(i64),
    Decimal(f64),
    Double(f64),
}

fn is_numeric_datatype(datatype: &str) -> bool {
    datatype
        .strip_prefix(XSD)
        .is_some_and(|local| numeric_kind(local).is_some())
}

/// 0 integer family, 1 decimal, 2 floating point
fn numeric_kind(local: &str) -> Option<u8> {
    match local {
        "integer" | "int" | "long" | "short" | "byte" | "nonNegativeInteger"
        | "positiveInteger" | "negativeInteger" | "nonPositiveInteger" | "unsignedLong"
        | "unsignedInt" | "unsignedShort" | "unsignedByte" => Some(0),
        "decimal" => Some(1),
        "double" | "float" => Some(2),
        _ => None,
    }
}

impl Numeric {
    fn from_literal(literal: &Literal) -> Option<Numeric> {
        let local = literal.datatype_iri().strip_prefix(XSD)?;
        let text = literal.value().trim();
        match numeric_kind(local)? {
            0 => text.parse().ok().map(Numeric::Integer),
            1 => parse_decimal(text).map(Numeric::Decimal),
            _ => parse_double(text).map(Numeric::Double),
        }
    }

    fn from_term(term: &RdfTerm) -> Option<Numeric> {
        term.as_literal().and_then(Numeric::from_literal)
    }

    fn rank(self) -> u8 {
        match self {
            Numeric::Integer(_) => 0,
            Numeric::Decimal(_) => 1,
            Numeric::Double(_) => 2,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Numeric::Integer(i) => i as f64,
            Numeric::Decimal(d) | Numeric::Double(d) => d,
        }
    }

    fn into_term(self) -> RdfTerm {
        let (lexical, datatype) = match self {
            Numeric::Integer(i) => (i.to_string(), vocab::XSD_INTEGER),
            Numeric::Decimal(d) => (format_decimal(d), vocab::XSD_DECIMAL),
            Numeric::Double(d) => (format_double(d), vocab::XSD_DOUBLE),
        };
        Literal::new_typed_literal(lexical, NamedNode::new_unchecked(datatype)).into()
    }

    fn compare(self, other: Numeric) -> Option<Ordering> {
        match (self, other) {
            (Numeric::Integer(a), Numeric::Integer(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

fn parse_decimal(text: &str) -> Option<f64> {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-')) {
        return None;
    }
    text.parse::<f64>().ok().filter(|d| d.is_finite())
}

fn parse_double(text: &str) -> Option<f64> {
    match text {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ if text.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => None,
        _ => text.parse().ok(),
    }
}

fn format_decimal(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

fn format_double(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "INF" } else { "-INF" }.to_string()
    } else {
        format!("{:E}", value)
    }
}

fn numeric_operand(term: &RdfTerm) -> ExecutionResult<Numeric> {
    Numeric::from_term(term).ok_or_else(|| type_error(format!("{} is not a number", term)))
}

fn arithmetic(op: BinaryOp, left: Numeric, right: Numeric) -> ExecutionResult<Numeric> {
    let overflow = || type_error("integer overflow");
    let rank = left.rank().max(right.rank());
    match (rank, op) {
        (0, BinaryOp::Div) | (1, _) => {
            let (a, b) = (left.as_f64(), right.as_f64());
            let value = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ if b == 0.0 => return Err(type_error("division by zero")),
                _ => a / b,
            };
            Ok(Numeric::Decimal(value))
        }
        (0, _) => {
            let (Numeric::Integer(a), Numeric::Integer(b)) = (left, right) else {
                return Err(type_error("integer operands expected"));
            };
            let value = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                _ => a.checked_mul(b),
            };
            value.map(Numeric::Integer).ok_or_else(overflow)
        }
        _ => {
            let (a, b) = (left.as_f64(), right.as_f64());
            Ok(Numeric::Double(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ => a / b,
            }))
        }
    }
}

// Comparison

/// How a term takes part in comparisons
enum Value<'a> {
    Numeric(Numeric),
    String { value: &'a str, language: Option<&'a str> },
    Boolean(bool),
    Other(&'a Literal),
    Iri(&'a str),
    Blank(&'a str),
}

impl<'a> Value<'a> {
    fn of(term: &'a RdfTerm) -> Value<'a> {
        match term {
            RdfTerm::NamedNode(n) => Value::Iri(n.as_str()),
            RdfTerm::BlankNode(b) => Value::Blank(b.as_str()),
            RdfTerm::Literal(literal) => {
                if literal.is_plain() {
                    return Value::String {
                        value: literal.value(),
                        language: literal.language(),
                    };
                }
                if literal.datatype_iri() == vocab::XSD_BOOLEAN {
                    match literal.value() {
                        "true" | "1" => return Value::Boolean(true),
                        "false" | "0" => return Value::Boolean(false),
                        _ => {}
                    }
                }
                match Numeric::from_literal(literal) {
                    Some(n) => Value::Numeric(n),
                    None => Value::Other(literal),
                }
            }
        }
    }
}

/// Apply a comparison operator
///
/// A literal compared with an IRI or blank node is a type error for every
/// operator. IRIs and blank nodes only support `=` and `!=`.
pub fn compare(op: BinaryOp, left: &RdfTerm, right: &RdfTerm) -> ExecutionResult<bool> {
    let equality = matches!(op, BinaryOp::Eq | BinaryOp::Ne);
    let ordering = match (Value::of(left), Value::of(right)) {
        (Value::Numeric(a), Value::Numeric(b)) => a.compare(b),
        (
            Value::String { value: a, language: la },
            Value::String { value: b, language: lb },
        ) => {
            if la == lb {
                Some(a.cmp(b))
            } else if equality {
                None
            } else {
                return Err(type_error("cannot order strings with different languages"));
            }
        }
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(&b)),
        (Value::Iri(a), Value::Iri(b)) | (Value::Blank(a), Value::Blank(b)) if equality => {
            Some(if a == b { Ordering::Equal } else { Ordering::Less })
        }
        (Value::Iri(_), Value::Blank(_)) | (Value::Blank(_), Value::Iri(_)) if equality => None,
        (Value::Iri(_) | Value::Blank(_), Value::Iri(_) | Value::Blank(_)) => {
            return Err(type_error("IRIs and blank nodes cannot be ordered"))
        }
        (Value::Iri(_) | Value::Blank(_), _) | (_, Value::Iri(_) | Value::Blank(_)) => {
            return Err(type_error(format!(
                "cannot compare {} with {}",
                left, right
            )))
        }
        (Value::Other(a), Value::Other(b)) if a.datatype_iri() == b.datatype_iri() => {
            Some(a.value().cmp(b.value()))
        }
        _ if equality => None,
        _ => {
            return Err(type_error(format!(
                "cannot compare {} with {}",
                left, right
            )))
        }
    };

    // `None` means incomparable but different (or NaN)
    Ok(match op {
        BinaryOp::Eq => ordering == Some(Ordering::Equal),
        BinaryOp::Ne => ordering != Some(Ordering::Equal),
        BinaryOp::Lt => ordering == Some(Ordering::Less),
        BinaryOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        BinaryOp::Gt => ordering == Some(Ordering::Greater),
        BinaryOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        _ => return Err(type_error("not a comparison operator")),
    })
}

/// Total order used by ORDER BY: unbound < blank nodes < IRIs < literals
pub fn order_terms(left: Option<&RdfTerm>, right: Option<&RdfTerm>) -> Ordering {
    fn rank(term: Option<&RdfTerm>) -> u8 {
        match term {
            None => 0,
            Some(RdfTerm::BlankNode(_)) => 1,
            Some(RdfTerm::NamedNode(_)) => 2,
            Some(RdfTerm::Literal(_)) => 3,
        }
    }

    match (left, right) {
        (Some(RdfTerm::BlankNode(a)), Some(RdfTerm::BlankNode(b))) => a.as_str().cmp(b.as_str()),
        (Some(RdfTerm::NamedNode(a)), Some(RdfTerm::NamedNode(b))) => a.as_str().cmp(b.as_str()),
        (Some(RdfTerm::Literal(a)), Some(RdfTerm::Literal(b))) => order_literals(a, b),
        _ => rank(left).cmp(&rank(right)),
    }
}

fn order_literals(a: &Literal, b: &Literal) -> Ordering {
    // numbers, then booleans, then strings, then everything else
    fn family(literal: &Literal) -> u8 {
        if Numeric::from_literal(literal).is_some() {
            0
        } else if literal.datatype_iri() == vocab::XSD_BOOLEAN {
            1
        } else if literal.is_plain() {
            2
        } else {
            3
        }
    }

    let by_value = match (Numeric::from_literal(a), Numeric::from_literal(b)) {
        (Some(Numeric::Integer(x)), Some(Numeric::Integer(y))) => x.cmp(&y),
        (Some(x), Some(y)) => x.as_f64().total_cmp(&y.as_f64()),
        _ => family(a).cmp(&family(b)).then_with(|| a.value().cmp(b.value())),
    };
    by_value
        .then_with(|| a.datatype_iri().cmp(b.datatype_iri()))
        .then_with(|| a.language().cmp(&b.language()))
        .then_with(|| a.value().cmp(b.value()))
}

// Built-in functions

fn string_literal(term: &RdfTerm) -> ExecutionResult<&Literal> {
    match term {
        RdfTerm::Literal(literal) if literal.is_plain() => Ok(literal),
        other => Err(type_error(format!("{} is not a string literal", other))),
    }
}

fn simple_literal(term: &RdfTerm) -> ExecutionResult<&str> {
    match term {
        RdfTerm::Literal(literal) if literal.is_simple() => Ok(literal.value()),
        other => Err(type_error(format!("{} is not a simple literal", other))),
    }
}

/// String result keeping the language tag of `like`
fn string_like(value: String, like: &Literal) -> ExecutionResult<RdfTerm> {
    match like.language() {
        Some(language) => Literal::new_language_tagged_literal(value, language)
            .map(RdfTerm::from)
            .map_err(|e| type_error(e.to_string())),
        None => Ok(Literal::new_simple_literal(value).into()),
    }
}

/// Argument pair of CONTAINS / STRSTARTS / STRENDS
fn compatible_strings<'t>(a: &'t RdfTerm, b: &'t RdfTerm) -> ExecutionResult<(&'t str, &'t str)> {
    let (a, b) = (string_literal(a)?, string_literal(b)?);
    match b.language() {
        Some(language) if a.language() != Some(language) => {
            Err(type_error("incompatible language tags"))
        }
        _ => Ok((a.value(), b.value())),
    }
}

fn call(
    function: Function,
    args: &[Expression],
    row: &Solution,
    ctx: &QueryContext<'_>,
) -> ExecutionResult<RdfTerm> {
    // functions that do not evaluate all of their arguments
    match function {
        Function::Bound => {
            let bound = match args.first() {
                Some(Expression::Variable(name)) => ctx
                    .variables
                    .slot(name)
                    .is_some_and(|slot| row.is_bound(slot)),
                _ => return Err(type_error("BOUND expects a variable")),
            };
            return Ok(Literal::from_bool(bound).into());
        }
        Function::If => {
            let [condition, then, otherwise] = args else {
                return Err(type_error("IF expects three arguments"));
            };
            let condition = effective_boolean_value(&evaluate(condition, row, ctx)?)?;
            return evaluate(if condition { then } else { otherwise }, row, ctx);
        }
        Function::Coalesce => {
            return args
                .iter()
                .find_map(|arg| evaluate(arg, row, ctx).ok())
                .ok_or_else(|| type_error("COALESCE found no bound value"));
        }
        _ => {}
    }

    let values = args
        .iter()
        .map(|arg| evaluate(arg, row, ctx))
        .collect::<ExecutionResult<Vec<_>>>()?;
    let arg = |i: usize| {
        values
            .get(i)
            .ok_or_else(|| type_error(format!("missing argument {}", i + 1)))
    };
    let boolean = |b: bool| Ok(RdfTerm::from(Literal::from_bool(b)));

    match function {
        Function::Str => match arg(0)? {
            RdfTerm::NamedNode(n) => Ok(Literal::new_simple_literal(n.as_str()).into()),
            RdfTerm::Literal(l) => Ok(Literal::new_simple_literal(l.value()).into()),
            RdfTerm::BlankNode(_) => Err(type_error("STR of a blank node")),
        },
        Function::Lang => match arg(0)? {
            RdfTerm::Literal(l) => Ok(Literal::new_simple_literal(l.language().unwrap_or("")).into()),
            other => Err(type_error(format!("LANG of {}", other))),
        },
        Function::LangMatches => {
            let tag = simple_literal(arg(0)?)?;
            let range = simple_literal(arg(1)?)?;
            boolean(lang_matches(tag, range))
        }
        Function::Datatype => match arg(0)? {
            RdfTerm::Literal(l) => Ok(l.datatype().into()),
            other => Err(type_error(format!("DATATYPE of {}", other))),
        },
        Function::SameTerm => boolean(arg(0)? == arg(1)?),
        Function::IsIri => boolean(arg(0)?.is_named_node()),
        Function::IsBlank => boolean(arg(0)?.is_blank_node()),
        Function::IsLiteral => boolean(arg(0)?.is_literal()),
        Function::IsNumeric => boolean(Numeric::from_term(arg(0)?).is_some()),
        Function::Regex => {
            let text = string_literal(arg(0)?)?.value();
            let pattern = simple_literal(arg(1)?)?;
            let flags = match values.get(2) {
                Some(flags) => simple_literal(flags)?,
                None => "",
            };
            boolean(regex_matches(text, pattern, flags)?)
        }
        Function::Contains => {
            let (a, b) = compatible_strings(arg(0)?, arg(1)?)?;
            boolean(a.contains(b))
        }
        Function::StrStarts => {
            let (a, b) = compatible_strings(arg(0)?, arg(1)?)?;
            boolean(a.starts_with(b))
        }
        Function::StrEnds => {
            let (a, b) = compatible_strings(arg(0)?, arg(1)?)?;
            boolean(a.ends_with(b))
        }
        Function::StrLen => {
            let length = string_literal(arg(0)?)?.value().chars().count();
            Ok(Literal::from_integer(length as i64).into())
        }
        Function::UCase => {
            let literal = string_literal(arg(0)?)?;
            string_like(literal.value().to_uppercase(), literal)
        }
        Function::LCase => {
            let literal = string_literal(arg(0)?)?;
            string_like(literal.value().to_lowercase(), literal)
        }
        Function::Concat => {
            let mut text = String::new();
            let mut language: Option<Option<&str>> = None;
            for value in &values {
                let literal = string_literal(value)?;
                text.push_str(literal.value());
                language = match language {
                    None => Some(literal.language()),
                    Some(l) if l == literal.language() => Some(l),
                    Some(_) => Some(None),
                };
            }
            match language.flatten() {
                Some(l) => Literal::new_language_tagged_literal(text, l)
                    .map(RdfTerm::from)
                    .map_err(|e| type_error(e.to_string())),
                None => Ok(Literal::new_simple_literal(text).into()),
            }
        }
        Function::Abs => match numeric_operand(arg(0)?)? {
            Numeric::Integer(i) => i
                .checked_abs()
                .map(|n| Numeric::Integer(n).into_term())
                .ok_or_else(|| type_error("integer overflow")),
            Numeric::Decimal(d) => Ok(Numeric::Decimal(d.abs()).into_term()),
            Numeric::Double(d) => Ok(Numeric::Double(d.abs()).into_term()),
        },
        Function::Cast(target) => cast(target, arg(0)?),
        Function::Bound | Function::If | Function::Coalesce => {
            Err(type_error("unreachable lazy function"))
        }
    }
}

fn lang_matches(tag: &str, range: &str) -> bool {
    if range == "*" {
        return !tag.is_empty();
    }
    let tag = tag.to_ascii_lowercase();
    let range = range.to_ascii_lowercase();
    tag == range || tag.strip_prefix(&range).is_some_and(|rest| rest.starts_with('-'))
}

fn regex_matches(text: &str, pattern: &str, flags: &str) -> ExecutionResult<bool> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => return Err(type_error(format!("unsupported regex flag '{}'", other))),
        };
    }
    let regex = builder
        .build()
        .map_err(|e| ExecutionError::RuntimeError(format!("invalid regex: {}", e)))?;
    Ok(regex.is_match(text))
}

fn cast(target: CastTarget, term: &RdfTerm) -> ExecutionResult<RdfTerm> {
    let literal = match term {
        RdfTerm::NamedNode(n) if target == CastTarget::String => {
            return Ok(Literal::new_simple_literal(n.as_str()).into())
        }
        RdfTerm::Literal(l) if l.language().is_none() => l,
        other => return Err(type_error(format!("cannot cast {}", other))),
    };
    let source = Value::of(term);
    let text = literal.value().trim();
    let invalid = || type_error(format!("cannot cast {} to {:?}", literal, target));

    match target {
        CastTarget::String => Ok(Literal::new_simple_literal(literal.value()).into()),
        CastTarget::Boolean => {
            let value = match source {
                Value::Boolean(b) => b,
                Value::Numeric(Numeric::Integer(i)) => i != 0,
                Value::Numeric(n) => n.as_f64() != 0.0 && !n.as_f64().is_nan(),
                Value::String { .. } => match text {
                    "true" | "1" => true,
                    "false" | "0" => false,
                    _ => return Err(invalid()),
                },
                _ => return Err(invalid()),
            };
            Ok(Literal::from_bool(value).into())
        }
        CastTarget::Integer => {
            let value = match source {
                Value::Numeric(Numeric::Integer(i)) => i,
                Value::Numeric(n) => {
                    let f = n.as_f64().trunc();
                    if !f.is_finite() || f.abs() >= 9.2e18 {
                        return Err(invalid());
                    }
                    f as i64
                }
                Value::Boolean(b) => i64::from(b),
                Value::String { .. } => text.parse().map_err(|_| invalid())?,
                _ => return Err(invalid()),
            };
            Ok(Numeric::Integer(value).into_term())
        }
        CastTarget::Decimal => {
            let value = match source {
                Value::Numeric(n) => Some(n.as_f64()).filter(|f| f.is_finite()),
                Value::Boolean(b) => Some(if b { 1.0 } else { 0.0 }),
                Value::String { .. } => parse_decimal(text),
                _ => None,
            };
            value
                .map(|d| Numeric::Decimal(d).into_term())
                .ok_or_else(invalid)
        }
        CastTarget::Double => {
            let value = match source {
                Value::Numeric(n) => Some(n.as_f64()),
                Value::Boolean(b) => Some(if b { 1.0 } else { 0.0 }),
                Value::String { .. } => parse_double(text),
                _ => None,
            };
            value
                .map(|d| Numeric::Double(d).into_term())
                .ok_or_else(invalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::{BlankNode, TripleStore};
    use crate::sparql::executor::VariableTable;

    fn lit(value: &str, datatype: &str) -> RdfTerm {
        Literal::new_typed_literal(value, NamedNode::new_unchecked(datatype)).into()
    }

    fn int(i: i64) -> RdfTerm {
        Literal::from_integer(i).into()
    }

    fn simple(s: &str) -> RdfTerm {
        Literal::new_simple_literal(s).into()
    }

    fn iri(s: &str) -> RdfTerm {
        NamedNode::new_unchecked(s).into()
    }

    fn eval_str(expr: &str) -> ExecutionResult<RdfTerm> {
        let query = crate::sparql::parse_query(&format!("SELECT ?r WHERE {{ BIND({} AS ?r) }}", expr))
            .unwrap();
        let crate::sparql::ast::PatternElement::Bind { expression, .. } = &query.pattern.elements[0]
        else {
            panic!("expected BIND");
        };
        let store = TripleStore::new();
        let variables = VariableTable::from_query(&query);
        let ctx = QueryContext::new(&store, &variables);
        evaluate(expression, &Solution::new(variables.len()), &ctx)
    }

    #[test]
    fn test_numeric_comparison_across_types() {
        assert!(compare(BinaryOp::Eq, &int(2), &lit("2.0", vocab::XSD_DECIMAL)).unwrap());
        assert!(compare(BinaryOp::Lt, &int(2), &lit("2.5E0", vocab::XSD_DOUBLE)).unwrap());
        assert!(!compare(BinaryOp::Eq, &lit("NaN", vocab::XSD_DOUBLE), &lit("NaN", vocab::XSD_DOUBLE)).unwrap());
    }

    #[test]
    fn test_literal_against_iri_is_an_error() {
        let a = simple("x");
        let b = iri("http://example.org/x");
        for op in [BinaryOp::Eq, BinaryOp::Ne, BinaryOp::Lt] {
            assert!(compare(op, &a, &b).is_err());
        }
        let blank: RdfTerm = BlankNode::new_unchecked("b").into();
        assert!(!compare(BinaryOp::Eq, &b, &blank).unwrap());
        assert!(compare(BinaryOp::Lt, &b, &iri("http://example.org/y")).is_err());
    }

    #[test]
    fn test_string_comparison() {
        assert!(compare(BinaryOp::Lt, &simple("a"), &simple("b")).unwrap());
        let en: RdfTerm = Literal::new_language_tagged_literal("a", "en").unwrap().into();
        assert!(compare(BinaryOp::Ne, &simple("a"), &en).unwrap());
        assert!(compare(BinaryOp::Lt, &simple("a"), &en).is_err());
        assert!(!compare(BinaryOp::Eq, &simple("1"), &int(1)).unwrap());
    }

    #[test]
    fn test_effective_boolean_value() {
        assert!(effective_boolean_value(&simple("x")).unwrap());
        assert!(!effective_boolean_value(&simple("")).unwrap());
        assert!(!effective_boolean_value(&int(0)).unwrap());
        assert!(effective_boolean_value(&lit("0.5", vocab::XSD_DECIMAL)).unwrap());
        assert!(!effective_boolean_value(&lit("nope", vocab::XSD_INTEGER)).unwrap());
        assert!(effective_boolean_value(&iri("http://example.org/")).is_err());
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval_str("1 + 2 * 3").unwrap(), int(7));
        assert_eq!(eval_str("7 / 2").unwrap(), lit("3.5", vocab::XSD_DECIMAL));
        assert_eq!(eval_str("4 / 2").unwrap(), lit("2.0", vocab::XSD_DECIMAL));
        assert_eq!(eval_str("1.5e0 * 2").unwrap(), lit("3E0", vocab::XSD_DOUBLE));
        assert_eq!(eval_str("-(3)").unwrap(), int(-3));
        assert!(eval_str("1 / 0").is_err());
        assert!(eval_str("\"a\" + 1").is_err());
    }

    #[test]
    fn test_three_valued_logic() {
        let t = Literal::from_bool(true).into();
        let f: RdfTerm = Literal::from_bool(false).into();
        assert_eq!(eval_str("?unbound || true").unwrap(), t);
        assert_eq!(eval_str("?unbound && false").unwrap(), f);
        assert!(eval_str("?unbound || false").is_err());
        assert!(eval_str("?unbound && true").is_err());
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(eval_str("STRLEN(\"héllo\")").unwrap(), int(5));
        assert_eq!(eval_str("UCASE(\"abc\"@en)").unwrap(), Literal::new_language_tagged_literal("ABC", "en").unwrap().into());
        assert_eq!(eval_str("CONCAT(\"a\", \"b\", \"c\")").unwrap(), simple("abc"));
        assert_eq!(eval_str("CONCAT(\"a\"@en, \"b\"@en)").unwrap(), Literal::new_language_tagged_literal("ab", "en").unwrap().into());
        assert_eq!(eval_str("STRSTARTS(\"foobar\", \"foo\")").unwrap(), Literal::from_bool(true).into());
        assert!(eval_str("CONTAINS(\"abc\", \"b\"@en)").is_err());
        assert_eq!(eval_str("REGEX(\"Alice\", \"^ali\", \"i\")").unwrap(), Literal::from_bool(true).into());
        assert_eq!(eval_str("LANGMATCHES(LANG(\"x\"@en-GB), \"en\")").unwrap(), Literal::from_bool(true).into());
        assert_eq!(eval_str("DATATYPE(\"x\")").unwrap(), iri(vocab::XSD_STRING));
        assert_eq!(eval_str("STR(<http://example.org/a>)").unwrap(), simple("http://example.org/a"));
    }

    #[test]
    fn test_conditionals_and_membership() {
        assert_eq!(eval_str("IF(1 > 2, \"yes\", \"no\")").unwrap(), simple("no"));
        assert_eq!(eval_str("COALESCE(?missing, 1 / 0, 3)").unwrap(), int(3));
        assert_eq!(eval_str("2 IN (1, 2, 3)").unwrap(), Literal::from_bool(true).into());
        assert_eq!(eval_str("2 NOT IN (1, 3)").unwrap(), Literal::from_bool(true).into());
        assert!(eval_str("2 IN (1, ?missing)").is_err());
        assert_eq!(eval_str("BOUND(?missing)").unwrap(), Literal::from_bool(false).into());
    }

    #[test]
    fn test_casts() {
        assert_eq!(
            eval_str("<http://www.w3.org/2001/XMLSchema#integer>(\"42\")").unwrap(),
            int(42)
        );
        assert_eq!(
            eval_str("<http://www.w3.org/2001/XMLSchema#integer>(3.9)").unwrap(),
            int(3)
        );
        assert_eq!(
            eval_str("<http://www.w3.org/2001/XMLSchema#boolean>(\"1\")").unwrap(),
            Literal::from_bool(true).into()
        );
        assert_eq!(
            eval_str("<http://www.w3.org/2001/XMLSchema#string>(12)").unwrap(),
            simple("12")
        );
        assert!(eval_str("<http://www.w3.org/2001/XMLSchema#integer>(\"x\")").is_err());
    }

    #[test]
    fn test_order_terms() {
        let blank: RdfTerm = BlankNode::new_unchecked("b").into();
        let named = iri("http://example.org/a");
        assert_eq!(order_terms(None, Some(&blank)), Ordering::Less);
        assert_eq!(order_terms(Some(&blank), Some(&named)), Ordering::Less);
        assert_eq!(order_terms(Some(&named), Some(&simple("a"))), Ordering::Less);
        assert_eq!(order_terms(Some(&int(10)), Some(&int(9))), Ordering::Greater);
        assert_eq!(
            order_terms(Some(&int(2)), Some(&lit("10", vocab::XSD_DECIMAL))),
            Ordering::Less
        );
    }
}
