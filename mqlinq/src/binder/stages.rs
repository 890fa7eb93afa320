//! The top-level target: operators become aggregation stages.

use crate::{
    binder::{
        dispatch::{AggregateKind, BoundLambda, ElementKind, SequenceTarget},
        BindingContext, Error, Result,
    },
    codec::{ClassMap, Codec},
    ir::{
        Document, Expression, FieldPath, Group, GroupId, Grouping, PipelineExpression,
        ResultOperator, ResultOperatorKind, SortDirection, SortKey, Stage,
    },
    query::BinaryOp,
};
use std::sync::Arc;

/// The discriminator element of polymorphic documents.
pub const DISCRIMINATOR_FIELD: &str = "_t";

fn is_grouping(e: &Expression) -> bool {
    matches!(e, Expression::Grouping(_))
}

/// How rows coming out of a `Group` stage read the key it grouped by. A
/// compound key keeps its members addressable.
fn read_group_key(key: &Expression) -> Expression {
    let id = FieldPath::field("_id");
    match key {
        Expression::Document(d) => Expression::Document(Document {
            fields: d
                .fields
                .clone()
                .map_with_key(|member, e| Expression::field(id.child(member), e.codec())),
        }),
        other => Expression::field(id, other.codec()),
    }
}

impl PipelineExpression {
    fn push_group(self, id: Expression) -> (Self, GroupId) {
        let mut pipeline = self.flush_paging();
        let group = GroupId(pipeline.stages.len());
        pipeline.stages.push(Stage::Group(Group {
            id,
            accumulators: vec![],
        }));
        (pipeline, group)
    }

    fn with_result(mut self, kind: ResultOperatorKind, source: Expression) -> Self {
        self.result_operator = Some(ResultOperator { kind, source });
        self
    }
}

impl SequenceTarget for PipelineExpression {
    type Output = PipelineExpression;

    fn item(&self, _variable: &str) -> Expression {
        self.projector.clone()
    }

    fn close_sort(&mut self) {
        self.sort_open = false;
    }

    fn filter(self, _cx: &mut BindingContext, predicate: BoundLambda, _at: &str) -> Result<Self> {
        let mut pipeline = self.flush_paging();
        pipeline.stages.push(Stage::Match(predicate.body));
        Ok(pipeline)
    }

    fn project(self, _cx: &mut BindingContext, selector: BoundLambda, _at: &str) -> Result<Self> {
        Ok(PipelineExpression {
            projector: selector.body,
            ..self
        })
    }

    fn unwind(
        self,
        _cx: &mut BindingContext,
        collection: Expression,
        at: &str,
    ) -> Result<(Self, Expression)> {
        let (path, codec) = match collection {
            Expression::Field(f) if f.path.variable.is_none() && !f.path.segments.is_empty() => {
                (f.path, f.codec)
            }
            _ => return Err(Error::shape(at)),
        };
        let item = match &codec {
            Codec::Array(_) => codec
                .item()
                .cloned()
                .ok_or_else(|| Error::AmbiguousArraySerialization(at.to_string()))?,
            _ => return Err(Error::shape(at)),
        };
        let mut pipeline = self.flush_paging();
        pipeline.stages.push(Stage::Unwind(path.clone()));
        Ok((pipeline, Expression::field(path, item)))
    }

    fn group_by(
        self,
        _cx: &mut BindingContext,
        key: BoundLambda,
        element: Option<BoundLambda>,
        at: &str,
    ) -> Result<Self> {
        let element = element.map_or_else(|| self.projector.clone(), |e| e.body);
        if key.body.contains(&is_grouping) || element.contains(&is_grouping) {
            return Err(Error::shape(at));
        }
        let read_key = read_group_key(&key.body);
        let (mut pipeline, group) = self.push_group(key.body);
        pipeline.projector = Expression::Grouping(Grouping {
            group,
            key: Box::new(read_key),
            element: Box::new(element),
            predicate: None,
            distinct: false,
        });
        Ok(pipeline)
    }

    fn distinct(self, _cx: &mut BindingContext, at: &str) -> Result<Self> {
        if self.projector.contains(&is_grouping) {
            return Err(Error::shape(at));
        }
        let key = self.projector.clone();
        let read_key = read_group_key(&key);
        let (mut pipeline, _) = self.push_group(key);
        pipeline.projector = read_key;
        Ok(pipeline)
    }

    fn order_by(
        self,
        _cx: &mut BindingContext,
        key: BoundLambda,
        direction: SortDirection,
        then: bool,
        at: &str,
    ) -> Result<Self> {
        let key = SortKey {
            key: key.body,
            direction,
        };
        if then {
            let mut pipeline = self;
            if !pipeline.sort_open {
                return Err(Error::shape(at));
            }
            match pipeline.stages.last_mut() {
                Some(Stage::Sort(keys)) => keys.push(key),
                _ => return Err(Error::shape(at)),
            }
            return Ok(pipeline);
        }
        let mut pipeline = self.flush_paging();
        pipeline.stages.push(Stage::Sort(vec![key]));
        pipeline.sort_open = true;
        Ok(pipeline)
    }

    fn skip(self, count: u64, _at: &str) -> Result<Self> {
        Ok(PipelineExpression {
            paging: self.paging.skip(count),
            ..self
        })
    }

    fn take(self, count: u64, _at: &str) -> Result<Self> {
        Ok(PipelineExpression {
            paging: self.paging.take(count),
            ..self
        })
    }

    fn of_type(self, _cx: &mut BindingContext, class_map: Arc<ClassMap>, at: &str) -> Result<Self> {
        let discriminator = class_map
            .discriminator
            .clone()
            .ok_or_else(|| Error::shape(at))?;
        let path = match &self.projector {
            Expression::Field(f) => f.path.clone(),
            _ => return Err(Error::shape(at)),
        };
        let mut pipeline = self.flush_paging();
        pipeline.stages.push(Stage::Match(Expression::binary(
            BinaryOp::Eq,
            Expression::field(path.child(DISCRIMINATOR_FIELD), Codec::string()),
            Expression::constant(discriminator, Codec::string()),
        )));
        pipeline.projector = Expression::field(path, Codec::Document(class_map));
        Ok(pipeline)
    }

    fn any(
        self,
        cx: &mut BindingContext,
        predicate: Option<BoundLambda>,
        at: &str,
    ) -> Result<Self::Output> {
        let pipeline = match predicate {
            Some(predicate) => self.filter(cx, predicate, at)?,
            None => self,
        };
        Ok(PipelineExpression {
            paging: pipeline.paging.take(1),
            ..pipeline
        }
        .with_result(
            ResultOperatorKind::Any,
            Expression::constant(true, Codec::boolean()),
        ))
    }

    fn all(self, _cx: &mut BindingContext, predicate: BoundLambda, _at: &str) -> Result<Self::Output> {
        Ok(self.with_result(ResultOperatorKind::All, predicate.body))
    }

    fn aggregate(
        self,
        _cx: &mut BindingContext,
        kind: AggregateKind,
        selector: Option<BoundLambda>,
        _at: &str,
    ) -> Result<Self::Output> {
        let source = selector.map_or_else(|| self.projector.clone(), |s| s.body);
        let (kind, source) = match kind {
            AggregateKind::Count => (
                ResultOperatorKind::Count,
                Expression::constant(1, Codec::int32()),
            ),
            AggregateKind::LongCount => (
                ResultOperatorKind::LongCount,
                Expression::constant(1, Codec::int32()),
            ),
            AggregateKind::Sum => (ResultOperatorKind::Sum, source),
            AggregateKind::Average => (ResultOperatorKind::Average, source),
            AggregateKind::Min => (ResultOperatorKind::Min, source),
            AggregateKind::Max => (ResultOperatorKind::Max, source),
        };
        Ok(self.with_result(kind, source))
    }

    fn element(self, _cx: &mut BindingContext, kind: ElementKind, _at: &str) -> Result<Self::Output> {
        let (kind, paging) = match kind {
            ElementKind::First => (ResultOperatorKind::First, self.paging.take(1)),
            ElementKind::FirstOrDefault => (ResultOperatorKind::FirstOrDefault, self.paging.take(1)),
            ElementKind::Single => (ResultOperatorKind::Single, self.paging.take(2)),
            ElementKind::SingleOrDefault => {
                (ResultOperatorKind::SingleOrDefault, self.paging.take(2))
            }
            ElementKind::Last => (ResultOperatorKind::Last, self.paging),
            ElementKind::LastOrDefault => (ResultOperatorKind::LastOrDefault, self.paging),
        };
        let source = self.projector.clone();
        Ok(PipelineExpression { paging, ..self }.with_result(kind, source))
    }
}
