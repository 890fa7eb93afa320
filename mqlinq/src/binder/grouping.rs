//! The grouping target: operators over the elements of a group become
//! accumulators of the `Group` stage that formed it.

use crate::{
    binder::{
        dispatch::{AggregateKind, BoundLambda, ElementKind, SequenceTarget, Step},
        BindingContext, Error, Result,
    },
    codec::Codec,
    ir::{Accumulator, AccumulatorKind, Expression, Grouping},
    query::BinaryOp,
};
use bson::Bson;

pub(crate) struct GroupingSequence {
    grouping: Grouping,
}

impl GroupingSequence {
    pub(crate) fn new(grouping: Grouping) -> Self {
        GroupingSequence { grouping }
    }

    pub(crate) fn finish(self) -> Expression {
        Expression::Grouping(self.grouping)
    }

    fn accumulator(
        &self,
        cx: &mut BindingContext,
        kind: AccumulatorKind,
        source: Expression,
        codec: Codec,
    ) -> Expression {
        Expression::Accumulator(Accumulator {
            group: self.grouping.group,
            kind,
            source: Box::new(source),
            output_field: cx.next_accumulator_name(),
            codec,
        })
    }
}

impl SequenceTarget for GroupingSequence {
    type Output = Expression;

    fn item(&self, _variable: &str) -> Expression {
        self.grouping.element.as_ref().clone()
    }

    fn filter(self, _cx: &mut BindingContext, predicate: BoundLambda, _at: &str) -> Result<Self> {
        let mut grouping = self.grouping;
        grouping.predicate = Some(Box::new(match grouping.predicate.take() {
            Some(existing) => Expression::binary(BinaryOp::And, *existing, predicate.body),
            None => predicate.body,
        }));
        Ok(GroupingSequence { grouping })
    }

    fn project(self, _cx: &mut BindingContext, selector: BoundLambda, _at: &str) -> Result<Self> {
        let mut grouping = self.grouping;
        grouping.element = Box::new(selector.body);
        Ok(GroupingSequence { grouping })
    }

    fn distinct(self, _cx: &mut BindingContext, _at: &str) -> Result<Self> {
        let mut grouping = self.grouping;
        grouping.distinct = true;
        Ok(GroupingSequence { grouping })
    }

    fn materialize(self, cx: &mut BindingContext, at: &str) -> Result<Step<Self>> {
        if self.grouping.predicate.is_some() {
            return Err(Error::shape(at));
        }
        let kind = if self.grouping.distinct {
            AccumulatorKind::AddToSet
        } else {
            AccumulatorKind::Push
        };
        let element = self.grouping.element.as_ref().clone();
        let codec = Codec::array_of(element.codec());
        Ok(Step::Terminal(self.accumulator(cx, kind, element, codec)))
    }

    fn aggregate(
        self,
        cx: &mut BindingContext,
        kind: AggregateKind,
        selector: Option<BoundLambda>,
        at: &str,
    ) -> Result<Self::Output> {
        if self.grouping.distinct {
            return Err(Error::shape(at));
        }
        let value = selector.map_or_else(|| self.grouping.element.as_ref().clone(), |s| s.body);
        let (accumulator, source, codec) = match kind {
            AggregateKind::Count => (
                AccumulatorKind::Count,
                Expression::constant(1, Codec::int32()),
                Codec::int32(),
            ),
            AggregateKind::LongCount => (
                AccumulatorKind::Count,
                Expression::constant(1, Codec::int32()),
                Codec::int64(),
            ),
            AggregateKind::Sum => {
                let codec = value.codec();
                (AccumulatorKind::Sum, value, codec)
            }
            AggregateKind::Average => (AccumulatorKind::Avg, value, Codec::double()),
            AggregateKind::Min => {
                let codec = value.codec();
                (AccumulatorKind::Min, value, codec)
            }
            AggregateKind::Max => {
                let codec = value.codec();
                (AccumulatorKind::Max, value, codec)
            }
        };
        // elements failing the predicate contribute nothing: zero to counts
        // and sums, null (ignored) to the others
        let source = match &self.grouping.predicate {
            Some(predicate) => {
                let otherwise = match accumulator {
                    AccumulatorKind::Count | AccumulatorKind::Sum => {
                        Expression::constant(0, Codec::int32())
                    }
                    _ => Expression::constant(Bson::Null, source.codec()),
                };
                Expression::conditional(predicate.as_ref().clone(), source, otherwise)
            }
            None => source,
        };
        Ok(self.accumulator(cx, accumulator, source, codec))
    }

    fn element(self, cx: &mut BindingContext, kind: ElementKind, at: &str) -> Result<Self::Output> {
        if self.grouping.predicate.is_some() || self.grouping.distinct {
            return Err(Error::shape(at));
        }
        let accumulator = match kind {
            ElementKind::First | ElementKind::FirstOrDefault => AccumulatorKind::First,
            ElementKind::Last | ElementKind::LastOrDefault => AccumulatorKind::Last,
            ElementKind::Single | ElementKind::SingleOrDefault => return Err(Error::shape(at)),
        };
        let element = self.grouping.element.as_ref().clone();
        let codec = element.codec();
        Ok(self.accumulator(cx, accumulator, element, codec))
    }
}
