//! The semantics every sequence operator shares, independent of whether the
//! sequence is the collection itself, an in-document array or a grouping.
//! Each operator is bound once here and lowered through the capabilities of
//! a [`SequenceTarget`].

use crate::{
    binder::{registry::OperatorKind, BindingContext, Error, Result},
    codec::ClassMap,
    ir::{constant_folding, Expression, SetOperator, SortDirection},
    query::{BinaryOp, Expr, MethodCall, ValueType},
};
use bson::Bson;
use std::sync::Arc;

/// A lambda bound against a sequence element. `variable` names the element
/// inside `body`; targets that iterate in-document arrays reuse it as the
/// `$filter`/`$map` variable.
#[derive(Debug, Clone)]
pub(crate) struct BoundLambda {
    pub variable: String,
    pub body: Expression,
}

pub(crate) enum Step<T: SequenceTarget> {
    Sequence(T),
    Terminal(T::Output),
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub(crate) enum AggregateKind {
    Count,
    LongCount,
    Sum,
    Average,
    Min,
    Max,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub(crate) enum ElementKind {
    First,
    FirstOrDefault,
    Last,
    LastOrDefault,
    Single,
    SingleOrDefault,
}

const CONTAINS_VARIABLE: &str = "x";

/// What a sequence can be lowered to. A capability a target lacks fails
/// with `UnsupportedQueryShape`; `at` is the operator being bound, for
/// diagnostics.
pub(crate) trait SequenceTarget: Sized {
    type Output;

    /// How a lambda parameter named `variable` reads the current element.
    fn item(&self, variable: &str) -> Expression;

    /// Called before every operator except `ThenBy`.
    fn close_sort(&mut self) {}

    fn filter(self, _cx: &mut BindingContext, _predicate: BoundLambda, at: &str) -> Result<Self> {
        Err(Error::shape(at))
    }

    fn project(self, _cx: &mut BindingContext, _selector: BoundLambda, at: &str) -> Result<Self> {
        Err(Error::shape(at))
    }

    /// Flattens an array of the current element. Returns the new sequence
    /// and how it reads the unwound item.
    fn unwind(
        self,
        _cx: &mut BindingContext,
        _collection: Expression,
        at: &str,
    ) -> Result<(Self, Expression)> {
        Err(Error::shape(at))
    }

    fn group_by(
        self,
        _cx: &mut BindingContext,
        _key: BoundLambda,
        _element: Option<BoundLambda>,
        at: &str,
    ) -> Result<Self> {
        Err(Error::shape(at))
    }

    fn distinct(self, _cx: &mut BindingContext, at: &str) -> Result<Self> {
        Err(Error::shape(at))
    }

    fn order_by(
        self,
        _cx: &mut BindingContext,
        _key: BoundLambda,
        _direction: SortDirection,
        _then: bool,
        at: &str,
    ) -> Result<Self> {
        Err(Error::shape(at))
    }

    fn skip(self, _count: u64, at: &str) -> Result<Self> {
        Err(Error::shape(at))
    }

    fn take(self, _count: u64, at: &str) -> Result<Self> {
        Err(Error::shape(at))
    }

    fn of_type(self, _cx: &mut BindingContext, _class_map: Arc<ClassMap>, at: &str) -> Result<Self> {
        Err(Error::shape(at))
    }

    fn set_operation(
        self,
        _cx: &mut BindingContext,
        _op: SetOperator,
        _other: Expression,
        at: &str,
    ) -> Result<Self> {
        Err(Error::shape(at))
    }

    /// `ToList`/`ToArray`. A no-op unless the target has to collect its
    /// elements explicitly.
    fn materialize(self, _cx: &mut BindingContext, _at: &str) -> Result<Step<Self>> {
        Ok(Step::Sequence(self))
    }

    fn any(
        self,
        _cx: &mut BindingContext,
        _predicate: Option<BoundLambda>,
        at: &str,
    ) -> Result<Self::Output> {
        Err(Error::shape(at))
    }

    fn all(self, _cx: &mut BindingContext, _predicate: BoundLambda, at: &str) -> Result<Self::Output> {
        Err(Error::shape(at))
    }

    /// `Contains(v)` is `Any(x => x == v)` unless the target has a direct
    /// membership test.
    fn contains(self, cx: &mut BindingContext, value: Expression, at: &str) -> Result<Self::Output> {
        let item = self.item(CONTAINS_VARIABLE);
        let predicate = BoundLambda {
            variable: CONTAINS_VARIABLE.to_string(),
            body: constant_folding::binary(BinaryOp::Eq, item, value),
        };
        self.any(cx, Some(predicate), at)
    }

    fn aggregate(
        self,
        _cx: &mut BindingContext,
        _kind: AggregateKind,
        _selector: Option<BoundLambda>,
        at: &str,
    ) -> Result<Self::Output> {
        Err(Error::shape(at))
    }

    fn element(self, _cx: &mut BindingContext, _kind: ElementKind, at: &str) -> Result<Self::Output> {
        Err(Error::shape(at))
    }
}

fn argument<'c>(call: &'c MethodCall, index: usize) -> Result<&'c Expr> {
    call.arguments
        .get(index)
        .ok_or_else(|| Error::shape(call))
}

/// Splits a lambda argument into its parameters and body, checking its arity.
fn lambda_parts(arg: &Expr, arity: usize) -> Result<(&[String], &Expr)> {
    match arg {
        Expr::Lambda { parameters, body } if parameters.len() == arity => {
            Ok((parameters.as_slice(), body.as_ref()))
        }
        _ => Err(Error::shape(arg)),
    }
}

fn lambda_arity(arg: &Expr) -> Option<usize> {
    match arg {
        Expr::Lambda { parameters, .. } => Some(parameters.len()),
        _ => None,
    }
}

/// Binds a one-parameter lambda with its parameter reading the target's
/// current element.
fn bind_lambda<T: SequenceTarget>(
    cx: &mut BindingContext,
    target: &T,
    arg: &Expr,
) -> Result<BoundLambda> {
    let (parameters, body) = lambda_parts(arg, 1)?;
    let variable = variable_name(&parameters[0]);
    let item = target.item(&variable);
    let body = cx.with_scope(vec![(parameters[0].clone(), item)], |cx| cx.bind(body))?;
    Ok(BoundLambda { variable, body })
}

/// The `$$` variable a lambda parameter is read through. The server only
/// accepts names that start with a lowercase ASCII letter and continue with
/// ASCII letters, digits or `_`; any other parameter name is prefixed with
/// `v_` and has its remaining invalid characters replaced by `_`.
fn variable_name(parameter: &str) -> String {
    let valid = parameter.starts_with(|c: char| c.is_ascii_lowercase())
        && parameter
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        return parameter.to_string();
    }
    let rest: String = parameter
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("v_{rest}")
}

fn optional_lambda<T: SequenceTarget>(
    cx: &mut BindingContext,
    target: &T,
    call: &MethodCall,
) -> Result<Option<BoundLambda>> {
    call.arguments
        .first()
        .map(|arg| bind_lambda(cx, target, arg))
        .transpose()
}

/// Paging arguments must be non-negative integer constants.
fn count_argument(call: &MethodCall) -> Result<u64> {
    match argument(call, 0)? {
        Expr::Constant {
            value: Bson::Int32(n),
            ..
        } => u64::try_from(*n).map_err(|_| Error::shape(call)),
        Expr::Constant {
            value: Bson::Int64(n),
            ..
        } => u64::try_from(*n).map_err(|_| Error::shape(call)),
        other => Err(Error::shape(other)),
    }
}

fn class_map_argument(cx: &BindingContext, call: &MethodCall) -> Result<Arc<ClassMap>> {
    match call.type_arguments.first() {
        Some(ValueType::Document(name)) => cx
            .codecs()
            .class_map(name)
            .ok_or_else(|| Error::UnknownType(name.clone())),
        _ => Err(Error::shape(call)),
    }
}

/// Binds one operator application against `target`.
pub(crate) fn bind_operator<T: SequenceTarget>(
    cx: &mut BindingContext,
    mut target: T,
    kind: OperatorKind,
    call: &MethodCall,
) -> Result<Step<T>> {
    use OperatorKind::*;
    let at = call.to_string();
    let at = at.as_str();
    if !matches!(kind, ThenBy | ThenByDescending) {
        target.close_sort();
    }

    Ok(match kind {
        Where => {
            let predicate = bind_lambda(cx, &target, argument(call, 0)?)?;
            Step::Sequence(target.filter(cx, predicate, at)?)
        }
        Select => {
            let selector = bind_lambda(cx, &target, argument(call, 0)?)?;
            Step::Sequence(target.project(cx, selector, at)?)
        }
        SelectMany => {
            let collection = bind_lambda(cx, &target, argument(call, 0)?)?;
            let outer = target.item(&collection.variable);
            let (target, inner) = target.unwind(cx, collection.body, at)?;
            let selector = match call.arguments.get(1) {
                Some(result) => {
                    let (parameters, body) = lambda_parts(result, 2)?;
                    let bindings = vec![
                        (parameters[0].clone(), outer),
                        (parameters[1].clone(), inner),
                    ];
                    BoundLambda {
                        variable: parameters[1].clone(),
                        body: cx.with_scope(bindings, |cx| cx.bind(body))?,
                    }
                }
                None => BoundLambda {
                    variable: collection.variable,
                    body: inner,
                },
            };
            Step::Sequence(target.project(cx, selector, at)?)
        }
        GroupBy => {
            let key = bind_lambda(cx, &target, argument(call, 0)?)?;
            // GroupBy(key, element) and GroupBy(key, (k, g) => result) both
            // take two arguments; the lambda arity tells them apart
            let (element, result) = match call.arguments.as_slice() {
                [_] => (None, None),
                [_, second] if lambda_arity(second) == Some(2) => (None, Some(second)),
                [_, second] => (Some(bind_lambda(cx, &target, second)?), None),
                [_, second, third] => (Some(bind_lambda(cx, &target, second)?), Some(third)),
                _ => return Err(Error::shape(call)),
            };
            let target = target.group_by(cx, key, element, at)?;
            match result {
                None => Step::Sequence(target),
                Some(result) => {
                    let (parameters, body) = lambda_parts(result, 2)?;
                    let grouping = target.item(&parameters[1]);
                    let key = match &grouping {
                        Expression::Grouping(g) => g.key.as_ref().clone(),
                        other => other.clone(),
                    };
                    let bindings = vec![
                        (parameters[0].clone(), key),
                        (parameters[1].clone(), grouping),
                    ];
                    let body = cx.with_scope(bindings, |cx| cx.bind(body))?;
                    let selector = BoundLambda {
                        variable: parameters[1].clone(),
                        body,
                    };
                    Step::Sequence(target.project(cx, selector, at)?)
                }
            }
        }
        Distinct => Step::Sequence(target.distinct(cx, at)?),
        OrderBy | OrderByDescending | ThenBy | ThenByDescending => {
            let key = bind_lambda(cx, &target, argument(call, 0)?)?;
            let direction = match kind {
                OrderByDescending | ThenByDescending => SortDirection::Descending,
                _ => SortDirection::Ascending,
            };
            let then = matches!(kind, ThenBy | ThenByDescending);
            Step::Sequence(target.order_by(cx, key, direction, then, at)?)
        }
        Skip => Step::Sequence(target.skip(count_argument(call)?, at)?),
        Take => Step::Sequence(target.take(count_argument(call)?, at)?),
        Any => {
            let predicate = optional_lambda(cx, &target, call)?;
            Step::Terminal(target.any(cx, predicate, at)?)
        }
        All => {
            let predicate = bind_lambda(cx, &target, argument(call, 0)?)?;
            Step::Terminal(target.all(cx, predicate, at)?)
        }
        Contains => {
            let value = cx.bind(argument(call, 0)?)?;
            Step::Terminal(target.contains(cx, value, at)?)
        }
        Count | LongCount => {
            let aggregate = if kind == Count {
                AggregateKind::Count
            } else {
                AggregateKind::LongCount
            };
            let target = match optional_lambda(cx, &target, call)? {
                Some(predicate) => target.filter(cx, predicate, at)?,
                None => target,
            };
            Step::Terminal(target.aggregate(cx, aggregate, None, at)?)
        }
        Sum | Average | Min | Max => {
            let aggregate = match kind {
                Sum => AggregateKind::Sum,
                Average => AggregateKind::Average,
                Min => AggregateKind::Min,
                _ => AggregateKind::Max,
            };
            let selector = optional_lambda(cx, &target, call)?;
            Step::Terminal(target.aggregate(cx, aggregate, selector, at)?)
        }
        First | FirstOrDefault | Single | SingleOrDefault | Last | LastOrDefault => {
            let element = match kind {
                First => ElementKind::First,
                FirstOrDefault => ElementKind::FirstOrDefault,
                Single => ElementKind::Single,
                SingleOrDefault => ElementKind::SingleOrDefault,
                Last => ElementKind::Last,
                _ => ElementKind::LastOrDefault,
            };
            let target = match optional_lambda(cx, &target, call)? {
                Some(predicate) => target.filter(cx, predicate, at)?,
                None => target,
            };
            Step::Terminal(target.element(cx, element, at)?)
        }
        ElementAt | ElementAtOrDefault => {
            let element = if kind == ElementAt {
                ElementKind::First
            } else {
                ElementKind::FirstOrDefault
            };
            let target = target.skip(count_argument(call)?, at)?;
            Step::Terminal(target.element(cx, element, at)?)
        }
        Union | Except | Intersect => {
            let op = match kind {
                Union => SetOperator::Union,
                Except => SetOperator::Difference,
                _ => SetOperator::Intersection,
            };
            let other = cx.bind(argument(call, 0)?)?;
            Step::Sequence(target.set_operation(cx, op, other, at)?)
        }
        OfType => {
            let class_map = class_map_argument(cx, call)?;
            Step::Sequence(target.of_type(cx, class_map, at)?)
        }
        ToList | ToArray => target.materialize(cx, at)?,
        AsQueryable => Step::Sequence(target),
    })
}
