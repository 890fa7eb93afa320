use crate::{
    codec::Codec,
    ir::{
        visitor::Visitor, Accumulator, AccumulatorKind, Document, Expression, FieldPath, Group,
        GroupId, Grouping, PipelineExpression, ResultOperator, ResultOperatorKind, Stage,
    },
    rewrites::{Error, Pass, Result},
};
use mqlinq_datastructures::unique_linked_hash_map::UniqueLinkedHashMap;
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// The output field of the implicit group that reduces a terminal operator.
pub const RESULT_FIELD: &str = "__result";

/// Resolves every aggregate produced during binding into an accumulator of
/// the `Group` stage it belongs to, and reduces a pending terminal operator
/// with an implicit single group.
///
/// Accumulator names continue from `next_accumulator` so that names minted
/// here never collide with the ones minted while binding.
pub struct AccumulatorBinderPass {
    pub next_accumulator: usize,
}

impl Pass<PipelineExpression> for AccumulatorBinderPass {
    fn apply(&self, pipeline: PipelineExpression) -> Result<PipelineExpression> {
        let mut materializer = GroupingMaterializer {
            next_accumulator: self.next_accumulator,
            error: None,
        };
        let projector = materializer.visit_expression(pipeline.projector);
        let result_operator = pipeline.result_operator.map(|r| ResultOperator {
            kind: r.kind,
            source: materializer.visit_expression(r.source),
        });
        if let Some(err) = materializer.error {
            return Err(err);
        }

        let mut collector = AccumulatorCollector {
            group_stages: pipeline
                .stages
                .iter()
                .enumerate()
                .filter_map(|(i, s)| matches!(s, Stage::Group(_)).then_some(i))
                .collect(),
            attached: HashMap::new(),
            error: None,
        };
        let stages = pipeline
            .stages
            .into_iter()
            .map(|s| collector.visit_stage(s))
            .collect::<Vec<_>>();
        let projector = collector.visit_expression(projector);
        let result_operator = result_operator.map(|r| ResultOperator {
            kind: r.kind,
            source: collector.visit_expression(r.source),
        });
        if let Some(err) = collector.error {
            return Err(err);
        }

        let mut attached = collector.attached;
        let stages = stages
            .into_iter()
            .enumerate()
            .map(|(i, stage)| match (stage, attached.remove(&i)) {
                (Stage::Group(mut group), Some(accumulators)) => {
                    group.accumulators.extend(accumulators);
                    Stage::Group(group)
                }
                (stage, _) => stage,
            })
            .collect();

        Ok(reduce_result_operator(PipelineExpression {
            stages,
            projector,
            result_operator,
            paging: pipeline.paging,
            sort_open: pipeline.sort_open,
        }))
    }
}

fn result_codec(kind: ResultOperatorKind, source: &Expression) -> Codec {
    match kind {
        ResultOperatorKind::Count => Codec::int32(),
        ResultOperatorKind::LongCount => Codec::int64(),
        ResultOperatorKind::Average => Codec::double(),
        ResultOperatorKind::Any | ResultOperatorKind::All => Codec::boolean(),
        _ => source.codec(),
    }
}

/// Appends the implicit `Group(id = 1)` stage for a terminal operator that
/// reduces all rows to one value.
fn reduce_result_operator(pipeline: PipelineExpression) -> PipelineExpression {
    let (kind, accumulator, source) = match &pipeline.result_operator {
        Some(result) => match result.kind.accumulator() {
            Some(accumulator) => (result.kind, accumulator, result.source.clone()),
            None => return pipeline,
        },
        None => return pipeline,
    };
    let codec = result_codec(kind, &source);
    let mut pipeline = pipeline.flush_paging();
    let group = GroupId(pipeline.stages.len());
    trace!(?kind, group = group.0, "reducing result operator with implicit group");
    pipeline.stages.push(Stage::Group(Group {
        id: Expression::constant(1, Codec::int32()),
        accumulators: vec![Accumulator {
            group,
            kind: accumulator,
            source: Box::new(source),
            output_field: RESULT_FIELD.to_string(),
            codec: codec.clone(),
        }],
    }));
    pipeline.projector = Expression::field(FieldPath::field(RESULT_FIELD), codec);
    pipeline
}

/// Turns a grouping that is read as a value into `{ Key, Elements }`, where
/// `Elements` collects the grouped elements.
struct GroupingMaterializer {
    next_accumulator: usize,
    error: Option<Error>,
}

impl GroupingMaterializer {
    fn materialize(&mut self, grouping: Grouping) -> Expression {
        if grouping.predicate.is_some() {
            self.error = Some(Error::FilteredGroupingNotAggregated(format!(
                "{:?}",
                grouping.element
            )));
            return Expression::Grouping(grouping);
        }
        let output_field = format!("__agg{}", self.next_accumulator);
        self.next_accumulator += 1;
        let elements = Accumulator {
            group: grouping.group,
            kind: if grouping.distinct {
                AccumulatorKind::AddToSet
            } else {
                AccumulatorKind::Push
            },
            codec: Codec::array_of(grouping.element.codec()),
            source: grouping.element,
            output_field,
        };
        match UniqueLinkedHashMap::try_from_iter(vec![
            ("Key".to_string(), *grouping.key),
            ("Elements".to_string(), Expression::Accumulator(elements)),
        ]) {
            Ok(fields) => Expression::Document(Document { fields }),
            Err(e) => {
                self.error = Some(Error::DuplicateOutputField(e.key().to_string()));
                Expression::Constant(crate::ir::Constant {
                    value: bson::Bson::Null,
                    codec: Codec::Dynamic,
                })
            }
        }
    }
}

impl Visitor for GroupingMaterializer {
    fn visit_expression(&mut self, node: Expression) -> Expression {
        match node {
            Expression::Grouping(g) => self.materialize(g),
            // aggregates already read their grouping's elements directly
            Expression::Accumulator(_) => node,
            _ => node.walk(self),
        }
    }
}

/// Replaces accumulator nodes with references to their output fields and
/// records which accumulators each group stage must compute.
struct AccumulatorCollector {
    group_stages: HashSet<usize>,
    attached: HashMap<usize, Vec<Accumulator>>,
    error: Option<Error>,
}

impl AccumulatorCollector {
    fn attach(&mut self, accumulator: Accumulator) -> Expression {
        let group = accumulator.group;
        let nested = accumulator.source.contains(&|e| match e {
            Expression::Accumulator(inner) => inner.group == group,
            Expression::Grouping(_) => true,
            _ => false,
        });
        if nested {
            self.error = Some(Error::NestedGrouping(format!("{:?}", accumulator.source)));
            return Expression::Accumulator(accumulator);
        }
        if !self.group_stages.contains(&group.0) {
            self.error = Some(Error::AccumulatorWithoutGroup(
                accumulator.output_field.clone(),
            ));
            return Expression::Accumulator(accumulator);
        }

        let source = self.visit_expression(*accumulator.source);
        let codec = accumulator.codec.clone();
        let accumulators = self.attached.entry(group.0).or_default();
        let output_field = match accumulators
            .iter()
            .find(|a| a.kind == accumulator.kind && *a.source == source)
        {
            Some(existing) => existing.output_field.clone(),
            None => {
                let output_field = accumulator.output_field.clone();
                trace!(group = group.0, %output_field, "attaching accumulator");
                accumulators.push(Accumulator {
                    source: Box::new(source),
                    ..accumulator
                });
                output_field
            }
        };
        Expression::field(FieldPath::field(&output_field), codec)
    }
}

impl Visitor for AccumulatorCollector {
    fn visit_expression(&mut self, node: Expression) -> Expression {
        match node {
            Expression::Accumulator(a) => self.attach(a),
            _ => node.walk(self),
        }
    }
}
