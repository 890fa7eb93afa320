mod binder;
pub mod codec;
mod codegen;
// ir module: the pipeline IR that binding produces and the rewrites consume
mod ir;
pub mod options;
pub mod query;
pub mod result;
mod rewrites;
pub mod usererror;

pub use binder::registry::{build_registry, OperatorKind, OperatorRegistry};
pub use ir::ResultOperatorKind;

use crate::{
    binder::BindingContext,
    codec::{CodecRegistry, OutputCodec},
    codegen::MqlCodeGenerator,
    options::TranslationOptions,
    query::QueryModel,
    result::Result,
    rewrites::{AccumulatorBinderPass, CorrelatedGroupRewritePass, Pass},
};
use tracing::{debug, instrument};

/// Contains all the information needed to execute a translated query and
/// decode its results.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub collection: String,
    pub pipeline: Vec<bson::Document>,
    pub output: OutputCodec,
    /// The terminal operator the execution layer applies to the returned
    /// rows, if the query ends in one.
    pub result_operator: Option<ResultOperatorKind>,
}

/// Returns the aggregation pipeline for the provided query. Translation is
/// deterministic and either returns a whole pipeline or an error.
#[instrument(skip_all, fields(collection = %model.source.collection))]
pub fn translate(
    model: &QueryModel,
    codecs: &CodecRegistry,
    operators: &OperatorRegistry,
    options: TranslationOptions,
) -> Result<Translation> {
    // bind the clauses into the pipeline IR
    let mut cx = BindingContext::new(codecs, operators);
    let pipeline = binder::bind_query(&mut cx, model)?;
    debug!(stages = pipeline.stages.len(), "bound query");

    // resolve aggregates into group accumulators
    let pipeline = AccumulatorBinderPass {
        next_accumulator: cx.accumulator_count(),
    }
    .apply(pipeline)?;

    let finished = codegen::finish_pipeline(pipeline);
    let finished = if options.correlated_group_rewrite {
        CorrelatedGroupRewritePass.apply(finished)?
    } else {
        finished
    };

    // codegen the stages into MQL
    let pipeline = MqlCodeGenerator::new(options.match_language).codegen_pipeline(&finished.stages)?;
    debug!(stages = pipeline.len(), "generated pipeline");

    Ok(Translation {
        collection: model.source.collection.clone(),
        pipeline,
        output: finished.output,
        result_operator: finished.result_operator,
    })
}
