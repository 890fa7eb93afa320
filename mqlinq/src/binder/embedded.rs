//! The in-document target: operators over an array-valued expression become
//! a single nested expression instead of stages.

use crate::{
    binder::{
        dispatch::{AggregateKind, BoundLambda, ElementKind, SequenceTarget},
        stages::DISCRIMINATOR_FIELD,
        BindingContext, Error, Result,
    },
    codec::{ClassMap, Codec},
    ir::{
        ArrayElemAt, ArrayItem, Expression, FieldPath, Filter, In, Map, Reduce, ReduceOperator,
        SetOperation, SetOperator, Slice, SortArray, SortArrayKey, SortDirection,
    },
    query::BinaryOp,
    rewrites::skip_limit::SkipLimitReducer,
};
use bson::Bson;
use std::sync::Arc;

const OF_TYPE_VARIABLE: &str = "item";

fn index_constant(index: i64) -> Expression {
    match i32::try_from(index) {
        Ok(i) => Expression::constant(i, Codec::int32()),
        Err(_) => Expression::constant(index, Codec::int64()),
    }
}

pub(crate) struct EmbeddedSequence {
    array: Expression,
    item: Codec,
    paging: SkipLimitReducer,
    sort_open: bool,
}

impl EmbeddedSequence {
    /// Starts a sequence over `source`. A source that is itself a slice or
    /// a sorted array resumes the paging or sort it was built from, so that
    /// chained `Skip`/`Take` compose and `ThenBy` extends `OrderBy`.
    pub(crate) fn new(source: Expression, at: &impl ToString) -> Result<Self> {
        let codec = source.codec();
        let item = codec
            .item()
            .cloned()
            .ok_or_else(|| Error::AmbiguousArraySerialization(at.to_string()))?;
        Ok(match source {
            Expression::Slice(Slice { array, skip, limit }) => {
                let paging = SkipLimitReducer::default().skip(skip.unwrap_or(0));
                EmbeddedSequence {
                    array: *array,
                    item,
                    paging: match limit {
                        Some(limit) => paging.take(limit),
                        None => paging,
                    },
                    sort_open: false,
                }
            }
            source => EmbeddedSequence {
                sort_open: matches!(source, Expression::SortArray(_)),
                array: source,
                item,
                paging: SkipLimitReducer::default(),
            },
        })
    }

    fn array_codec(&self) -> Codec {
        Codec::array_of(self.item.clone())
    }

    /// Lowers pending paging to `$slice`. An empty window is the empty array.
    fn flush(mut self) -> Self {
        if !self.paging.is_pending() {
            return self;
        }
        let paging = std::mem::take(&mut self.paging);
        self.array = if paging.is_empty() {
            Expression::constant(Bson::Array(vec![]), self.array_codec())
        } else {
            let paging = paging.finish();
            Expression::Slice(Slice {
                array: Box::new(self.array),
                skip: paging.skip,
                limit: paging.limit,
            })
        };
        self
    }

    pub(crate) fn finish(self) -> Expression {
        self.flush().array
    }

    fn map(self, selector: BoundLambda) -> Expression {
        Expression::Map(Map {
            input: Box::new(self.flush().array),
            variable: selector.variable,
            body: Box::new(selector.body),
        })
    }
}

impl SequenceTarget for EmbeddedSequence {
    type Output = Expression;

    fn item(&self, variable: &str) -> Expression {
        Expression::ArrayItem(ArrayItem {
            array: Box::new(self.array.clone()),
            variable: variable.to_string(),
            codec: self.item.clone(),
        })
    }

    fn close_sort(&mut self) {
        self.sort_open = false;
    }

    fn filter(self, _cx: &mut BindingContext, predicate: BoundLambda, _at: &str) -> Result<Self> {
        let sequence = self.flush();
        Ok(EmbeddedSequence {
            array: Expression::Filter(Filter {
                input: Box::new(sequence.array),
                variable: predicate.variable,
                condition: Box::new(predicate.body),
            }),
            ..sequence
        })
    }

    fn project(self, _cx: &mut BindingContext, selector: BoundLambda, _at: &str) -> Result<Self> {
        let item = selector.body.codec();
        Ok(EmbeddedSequence {
            array: self.map(selector),
            item,
            paging: SkipLimitReducer::default(),
            sort_open: false,
        })
    }

    fn distinct(self, _cx: &mut BindingContext, _at: &str) -> Result<Self> {
        let sequence = self.flush();
        Ok(EmbeddedSequence {
            array: Expression::SetOperation(SetOperation {
                op: SetOperator::Distinct,
                args: vec![sequence.array],
            }),
            ..sequence
        })
    }

    fn set_operation(
        self,
        _cx: &mut BindingContext,
        op: SetOperator,
        other: Expression,
        at: &str,
    ) -> Result<Self> {
        if !other.codec().is_array() {
            return Err(Error::shape(at));
        }
        let sequence = self.flush();
        Ok(EmbeddedSequence {
            array: Expression::SetOperation(SetOperation {
                op,
                args: vec![sequence.array, other],
            }),
            ..sequence
        })
    }

    fn order_by(
        self,
        _cx: &mut BindingContext,
        key: BoundLambda,
        direction: SortDirection,
        then: bool,
        at: &str,
    ) -> Result<Self> {
        let path = match &key.body {
            Expression::ArrayItem(a) if a.variable == key.variable => None,
            Expression::Field(f)
                if f.path.variable.as_deref() == Some(key.variable.as_str())
                    && !f.path.segments.is_empty() =>
            {
                Some(f.path.dotted())
            }
            _ => return Err(Error::shape(at)),
        };
        let key = SortArrayKey { path, direction };
        if then {
            let mut sequence = self;
            match (&mut sequence.array, sequence.sort_open) {
                (Expression::SortArray(sort), true) => sort.keys.push(key),
                _ => return Err(Error::shape(at)),
            }
            return Ok(sequence);
        }
        let sequence = self.flush();
        Ok(EmbeddedSequence {
            array: Expression::SortArray(SortArray {
                input: Box::new(sequence.array),
                keys: vec![key],
            }),
            sort_open: true,
            ..sequence
        })
    }

    fn skip(self, count: u64, _at: &str) -> Result<Self> {
        Ok(EmbeddedSequence {
            paging: self.paging.skip(count),
            ..self
        })
    }

    fn take(self, count: u64, _at: &str) -> Result<Self> {
        Ok(EmbeddedSequence {
            paging: self.paging.take(count),
            ..self
        })
    }

    fn of_type(self, _cx: &mut BindingContext, class_map: Arc<ClassMap>, at: &str) -> Result<Self> {
        let discriminator = class_map
            .discriminator
            .clone()
            .ok_or_else(|| Error::shape(at))?;
        let sequence = self.flush();
        let condition = Expression::binary(
            BinaryOp::Eq,
            Expression::field(
                FieldPath::variable(OF_TYPE_VARIABLE).child(DISCRIMINATOR_FIELD),
                Codec::string(),
            ),
            Expression::constant(discriminator, Codec::string()),
        );
        Ok(EmbeddedSequence {
            array: Expression::Filter(Filter {
                input: Box::new(sequence.array),
                variable: OF_TYPE_VARIABLE.to_string(),
                condition: Box::new(condition),
            }),
            item: Codec::Document(class_map),
            ..sequence
        })
    }

    fn any(
        self,
        _cx: &mut BindingContext,
        predicate: Option<BoundLambda>,
        _at: &str,
    ) -> Result<Self::Output> {
        Ok(match predicate {
            Some(predicate) => Expression::AnyElementTrue(Box::new(self.map(predicate))),
            None => Expression::binary(
                BinaryOp::Gt,
                Expression::Size(Box::new(self.finish())),
                Expression::constant(0, Codec::int32()),
            ),
        })
    }

    fn all(self, _cx: &mut BindingContext, predicate: BoundLambda, _at: &str) -> Result<Self::Output> {
        Ok(Expression::AllElementsTrue(Box::new(self.map(predicate))))
    }

    fn contains(self, _cx: &mut BindingContext, value: Expression, _at: &str) -> Result<Self::Output> {
        Ok(Expression::In(In {
            value: Box::new(value),
            array: Box::new(self.finish()),
        }))
    }

    fn aggregate(
        self,
        _cx: &mut BindingContext,
        kind: AggregateKind,
        selector: Option<BoundLambda>,
        _at: &str,
    ) -> Result<Self::Output> {
        let op = match kind {
            AggregateKind::Count | AggregateKind::LongCount => {
                return Ok(Expression::Size(Box::new(self.finish())));
            }
            AggregateKind::Sum => ReduceOperator::Sum,
            AggregateKind::Average => ReduceOperator::Avg,
            AggregateKind::Min => ReduceOperator::Min,
            AggregateKind::Max => ReduceOperator::Max,
        };
        let (input, item) = match selector {
            Some(selector) => {
                let item = selector.body.codec();
                (self.map(selector), item)
            }
            None => {
                let item = self.item.clone();
                (self.finish(), item)
            }
        };
        let codec = if op == ReduceOperator::Avg {
            Codec::double()
        } else {
            item
        };
        Ok(Expression::Reduce(Reduce {
            op,
            input: Box::new(input),
            codec,
        }))
    }

    fn element(self, _cx: &mut BindingContext, kind: ElementKind, at: &str) -> Result<Self::Output> {
        let (array, index) = match kind {
            ElementKind::First | ElementKind::FirstOrDefault => {
                if self.paging.is_pending() && !self.paging.is_empty() {
                    // the first element of a non-empty window is the element
                    // at the window's offset
                    let skip = self.paging.finish().skip.unwrap_or(0);
                    let index = i64::try_from(skip).map_err(|_| Error::shape(at))?;
                    (self.array, index_constant(index))
                } else {
                    (self.finish(), index_constant(0))
                }
            }
            ElementKind::Last | ElementKind::LastOrDefault => (self.finish(), index_constant(-1)),
            ElementKind::Single | ElementKind::SingleOrDefault => return Err(Error::shape(at)),
        };
        Ok(Expression::ArrayElemAt(ArrayElemAt {
            array: Box::new(array),
            index: Box::new(index),
        }))
    }
}
