//! Functional rate expressions.
//!
//! A transition's rate (or, for immediate transitions, its weight) is an
//! arithmetic expression over numbers, named rate parameters and token
//! counts of the current marking:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/') unary)*
//! unary  := '-' unary | atom
//! atom   := '#(' place (',' token)? ')' | func '(' expr (',' expr)* ')'
//!         | ident | number | '(' expr ')'
//! func   := ceil | floor | min | max
//! ```
//!
//! Expressions are parsed once into a [`RateTable`]; parse failures are kept
//! and only reported when the offending rate is actually evaluated.
use std::fmt;

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric1, char, multispace0, one_of};
use nom::combinator::{all_consuming, map, opt, recognize};
use nom::multi::{many0, many0_count, separated_list1};
use nom::number::complete::double;
use nom::sequence::{delimited, pair, preceded};
use nom::{IResult, Parser};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::net::core::Net;
use crate::net::ids::TransitionId;
use crate::net::index_vec::IndexVec;
use crate::state::{Marking, TokenCount};

/// Parameters may refer to other parameters; deeper chains are treated as cycles.
const MAX_PARAMETER_DEPTH: usize = 32;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RateError {
    #[error("cannot parse rate expression `{expression}`: {reason}")]
    Parse { expression: String, reason: String },
    #[error("unknown rate parameter `{0}`")]
    UnknownParameter(String),
    #[error("unknown place `{0}` in rate expression")]
    UnknownPlace(String),
    #[error("unknown token type `{0}` in rate expression")]
    UnknownToken(String),
    #[error("place `{0}` is unbounded (ω), its token count has no numeric value")]
    UnboundedPlace(String),
    #[error("rate parameter `{0}` refers to itself")]
    Cyclic(String),
    #[error("function `{function}` expects {expected} argument(s), found {found}")]
    Arity {
        function: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("rate evaluates to {0}, expected a finite non-negative number")]
    Invalid(f64),
    #[error("immediate transitions enabled in this marking have zero total weight")]
    ZeroWeight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Ceil,
    Floor,
    Min,
    Max,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ceil" => Some(Function::Ceil),
            "floor" => Some(Function::Floor),
            "min" => Some(Function::Min),
            "max" => Some(Function::Max),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Function::Ceil => "ceil",
            Function::Floor => "floor",
            Function::Min => "min",
            Function::Max => "max",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RateExpr {
    Number(f64),
    Parameter(String),
    Tokens {
        place: String,
        token: Option<String>,
    },
    Neg(Box<RateExpr>),
    Binary(BinaryOp, Box<RateExpr>, Box<RateExpr>),
    Call(Function, Vec<RateExpr>),
}

impl RateExpr {
    pub fn parse(expression: &str) -> Result<Self, RateError> {
        all_consuming(delimited(multispace0, expr, multispace0))
            .parse(expression)
            .map(|(_, parsed)| parsed)
            .map_err(|err| RateError::Parse {
                expression: expression.to_string(),
                reason: err.to_string(),
            })
    }

    /// True if the value depends on the marking.
    pub fn is_marking_dependent(&self) -> bool {
        match self {
            RateExpr::Number(_) | RateExpr::Parameter(_) => false,
            RateExpr::Tokens { .. } => true,
            RateExpr::Neg(inner) => inner.is_marking_dependent(),
            RateExpr::Binary(_, lhs, rhs) => {
                lhs.is_marking_dependent() || rhs.is_marking_dependent()
            }
            RateExpr::Call(_, args) => args.iter().any(RateExpr::is_marking_dependent),
        }
    }
}

impl fmt::Display for RateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateExpr::Number(value) => write!(f, "{value}"),
            RateExpr::Parameter(name) => write!(f, "{name}"),
            RateExpr::Tokens { place, token: None } => write!(f, "#({place})"),
            RateExpr::Tokens {
                place,
                token: Some(token),
            } => write!(f, "#({place}, {token})"),
            RateExpr::Neg(inner) => write!(f, "-{inner}"),
            RateExpr::Binary(op, lhs, rhs) => {
                let symbol = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                };
                write!(f, "({lhs} {symbol} {rhs})")
            }
            RateExpr::Call(function, args) => {
                write!(f, "{}(", function.name())?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

fn symbol<'a>(c: char) -> impl Parser<&'a str, Output = char, Error = nom::error::Error<&'a str>> {
    delimited(multispace0, char(c), multispace0)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

fn token_count(input: &str) -> IResult<&str, RateExpr> {
    map(
        delimited(
            pair(tag("#"), symbol('(')),
            pair(identifier, opt(preceded(symbol(','), identifier))),
            symbol(')'),
        ),
        |(place, token)| RateExpr::Tokens {
            place: place.to_string(),
            token: token.map(str::to_string),
        },
    )
    .parse(input)
}

fn call(input: &str) -> IResult<&str, RateExpr> {
    let (rest, name) = identifier(input)?;
    let Some(function) = Function::from_name(name) else {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )));
    };
    map(
        delimited(symbol('('), separated_list1(symbol(','), expr), symbol(')')),
        move |args| RateExpr::Call(function, args),
    )
    .parse(rest)
}

fn atom(input: &str) -> IResult<&str, RateExpr> {
    alt((
        token_count,
        call,
        map(identifier, |name| RateExpr::Parameter(name.to_string())),
        map(double, RateExpr::Number),
        delimited(symbol('('), expr, symbol(')')),
    ))
    .parse(input)
}

fn unary(input: &str) -> IResult<&str, RateExpr> {
    alt((
        map(preceded(symbol('-'), unary), |inner| {
            RateExpr::Neg(Box::new(inner))
        }),
        preceded(multispace0, atom),
    ))
    .parse(input)
}

fn term(input: &str) -> IResult<&str, RateExpr> {
    let (input, first) = unary(input)?;
    let (input, rest) =
        many0(pair(delimited(multispace0, one_of("*/"), multispace0), unary)).parse(input)?;
    let folded = rest.into_iter().fold(first, |lhs, (op, rhs)| {
        let op = if op == '*' { BinaryOp::Mul } else { BinaryOp::Div };
        RateExpr::Binary(op, Box::new(lhs), Box::new(rhs))
    });
    Ok((input, folded))
}

fn expr(input: &str) -> IResult<&str, RateExpr> {
    let (input, first) = term(input)?;
    let (input, rest) =
        many0(pair(delimited(multispace0, one_of("+-"), multispace0), term)).parse(input)?;
    let folded = rest.into_iter().fold(first, |lhs, (op, rhs)| {
        let op = if op == '+' { BinaryOp::Add } else { BinaryOp::Sub };
        RateExpr::Binary(op, Box::new(lhs), Box::new(rhs))
    });
    Ok((input, folded))
}

/// Pre-parsed rate expressions of a net.
#[derive(Debug, Clone)]
pub struct RateTable {
    transitions: IndexVec<TransitionId, Result<RateExpr, RateError>>,
    parameters: FxHashMap<String, Result<RateExpr, RateError>>,
}

impl RateTable {
    pub fn compile(net: &Net) -> Self {
        let transitions = net
            .transitions
            .iter()
            .map(|transition| RateExpr::parse(&transition.rate))
            .collect();
        let parameters = net
            .rate_parameters
            .iter()
            .map(|parameter| {
                (
                    parameter.name.clone(),
                    RateExpr::parse(&parameter.expression),
                )
            })
            .collect();
        Self {
            transitions,
            parameters,
        }
    }

    /// Evaluates the rate (or weight) of `transition` under `marking`.
    pub fn evaluate(
        &self,
        net: &Net,
        marking: &Marking,
        transition: TransitionId,
    ) -> Result<f64, RateError> {
        let parsed = self.transitions[transition].as_ref().map_err(Clone::clone)?;
        let value = self.eval(net, marking, parsed, 0)?;
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(RateError::Invalid(value))
        }
    }

    fn eval(
        &self,
        net: &Net,
        marking: &Marking,
        expr: &RateExpr,
        depth: usize,
    ) -> Result<f64, RateError> {
        match expr {
            RateExpr::Number(value) => Ok(*value),
            RateExpr::Parameter(name) => {
                if depth >= MAX_PARAMETER_DEPTH {
                    return Err(RateError::Cyclic(name.clone()));
                }
                let parsed = self
                    .parameters
                    .get(name)
                    .ok_or_else(|| RateError::UnknownParameter(name.clone()))?
                    .as_ref()
                    .map_err(Clone::clone)?;
                self.eval(net, marking, parsed, depth + 1)
            }
            RateExpr::Tokens { place, token } => {
                let place_id = net
                    .place_id(place)
                    .ok_or_else(|| RateError::UnknownPlace(place.clone()))?;
                let count = match token {
                    Some(token) => {
                        let token_id = net
                            .token_id(token)
                            .ok_or_else(|| RateError::UnknownToken(token.clone()))?;
                        marking.tokens(place_id, token_id)
                    }
                    None => marking.total(place_id),
                };
                match count {
                    TokenCount::Finite(n) => Ok(n as f64),
                    TokenCount::Omega => Err(RateError::UnboundedPlace(place.clone())),
                }
            }
            RateExpr::Neg(inner) => Ok(-self.eval(net, marking, inner, depth)?),
            RateExpr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(net, marking, lhs, depth)?;
                let rhs = self.eval(net, marking, rhs, depth)?;
                Ok(match op {
                    BinaryOp::Add => lhs + rhs,
                    BinaryOp::Sub => lhs - rhs,
                    BinaryOp::Mul => lhs * rhs,
                    BinaryOp::Div => lhs / rhs,
                })
            }
            RateExpr::Call(function, args) => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(net, marking, arg, depth))
                    .collect::<Result<Vec<_>, _>>()?;
                match function {
                    Function::Ceil | Function::Floor => {
                        let [value] = values[..] else {
                            return Err(RateError::Arity {
                                function: function.name(),
                                expected: 1,
                                found: values.len(),
                            });
                        };
                        Ok(if *function == Function::Ceil {
                            value.ceil()
                        } else {
                            value.floor()
                        })
                    }
                    Function::Min => Ok(values.into_iter().fold(f64::INFINITY, f64::min)),
                    Function::Max => Ok(values.into_iter().fold(f64::NEG_INFINITY, f64::max)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::structure::{Place, RateParameter, Transition, DEFAULT_TOKEN};

    fn net_with_rate(rate: &str) -> (Net, TransitionId) {
        let mut net = Net::empty();
        net.add_place(Place::new("P0").with_tokens(DEFAULT_TOKEN, 3));
        net.add_place(Place::new("P1").with_tokens(DEFAULT_TOKEN, 1));
        net.add_rate_parameter(RateParameter::new("lambda", "2.5"));
        net.add_rate_parameter(RateParameter::new("twice", "lambda * 2"));
        let t = net.add_transition(Transition::new("T0").with_rate(rate));
        (net, t)
    }

    fn eval(rate: &str) -> Result<f64, RateError> {
        let (net, t) = net_with_rate(rate);
        let table = RateTable::compile(&net);
        table.evaluate(&net, &net.initial_marking(), t)
    }

    #[test]
    fn parses_precedence_and_parentheses() {
        assert_eq!(eval("1 + 2 * 3"), Ok(7.0));
        assert_eq!(eval("(1 + 2) * 3"), Ok(9.0));
        assert_eq!(eval("8 / 2 / 2"), Ok(2.0));
        assert_eq!(eval("-1 + 3"), Ok(2.0));
    }

    #[test]
    fn resolves_parameters_and_token_counts() {
        assert_eq!(eval("twice"), Ok(5.0));
        assert_eq!(eval("#(P0) * lambda"), Ok(7.5));
        assert_eq!(eval("#(P1, Default) + #(P0)"), Ok(4.0));
        assert_eq!(eval("min(#(P0), 2) + max(1, 0.5)"), Ok(3.0));
        assert_eq!(eval("ceil(0.2) + floor(1.8)"), Ok(2.0));
    }

    #[test]
    fn reports_bad_expressions() {
        assert!(matches!(eval("1 +"), Err(RateError::Parse { .. })));
        assert!(matches!(eval("rate!"), Err(RateError::Parse { .. })));
        assert_eq!(eval("mu"), Err(RateError::UnknownParameter("mu".into())));
        assert_eq!(eval("#(P9)"), Err(RateError::UnknownPlace("P9".into())));
        assert_eq!(eval("0 - 1"), Err(RateError::Invalid(-1.0)));
        assert!(matches!(eval("ceil(1, 2)"), Err(RateError::Arity { .. })));
    }

    #[test]
    fn detects_self_referencing_parameters() {
        let (mut net, _) = net_with_rate("1");
        net.add_rate_parameter(RateParameter::new("loop", "loop + 1"));
        let t = net.add_transition(Transition::new("T1").with_rate("loop"));
        let table = RateTable::compile(&net);
        assert_eq!(
            table.evaluate(&net, &net.initial_marking(), t),
            Err(RateError::Cyclic("loop".into()))
        );
    }

    #[test]
    fn display_round_trips_structure() {
        let parsed = RateExpr::parse("#(P0, Red) * (a + 1)").unwrap();
        assert_eq!(parsed.to_string(), "(#(P0, Red) * (a + 1))");
        assert!(parsed.is_marking_dependent());
    }
}
