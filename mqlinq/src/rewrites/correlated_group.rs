use crate::{
    codec::{ClassMap, Codec, OutputCodec},
    ir::{Expression, FinishedPipeline, Group, Stage},
    rewrites::{Pass, Result},
};
use std::{collections::HashMap, sync::Arc};
use tracing::trace;

/// Merges a final `Project` into the `Group` right before it when the
/// projection only renames fields that group produces. Accumulators the
/// projection does not read are dropped, accumulators read exactly once take
/// the name of the member reading them, and the output codec is remapped so
/// that decoding the group's rows yields the same values the projection
/// would have produced.
pub struct CorrelatedGroupRewritePass;

impl Pass<FinishedPipeline> for CorrelatedGroupRewritePass {
    fn apply(&self, pipeline: FinishedPipeline) -> Result<FinishedPipeline> {
        let n = pipeline.stages.len();
        if n < 2 {
            return Ok(pipeline);
        }
        let (group, selector) = match (&pipeline.stages[n - 2], &pipeline.stages[n - 1]) {
            (Stage::Group(group), Stage::Project(selector)) => (group, selector),
            _ => return Ok(pipeline),
        };
        let references = match references(selector, &pipeline.output) {
            Some(references) => references,
            None => return Ok(pipeline),
        };
        let produced = |name: &str| {
            name == "_id" || group.accumulators.iter().any(|a| a.output_field == name)
        };
        if !references.iter().all(|(_, field)| produced(field)) {
            return Ok(pipeline);
        }

        let (group, renames) = merge(group, &references);
        let element_names = references
            .into_iter()
            .map(|(member, field)| {
                let element = renames.get(&field).cloned().unwrap_or(field);
                (member, element)
            })
            .collect::<HashMap<_, _>>();
        trace!(?element_names, "merging projection into group");

        let mut stages = pipeline.stages;
        stages.truncate(n - 2);
        stages.push(Stage::Group(group));
        Ok(FinishedPipeline {
            stages,
            output: remap_output(pipeline.output, &element_names),
            result_operator: pipeline.result_operator,
        })
    }
}

/// The `(member, field)` pairs a projection reads, when every member is a
/// plain top-level field reference.
fn references(selector: &Expression, output: &OutputCodec) -> Option<Vec<(String, String)>> {
    fn top_level(expr: &Expression) -> Option<String> {
        match expr {
            Expression::Field(f) if f.path.variable.is_none() && f.path.segments.len() == 1 => {
                f.path.segments.first().cloned()
            }
            _ => None,
        }
    }
    match (selector, output) {
        (Expression::Document(d), OutputCodec::Document(_)) => d
            .fields
            .iter()
            .map(|(member, e)| Some((member.clone(), top_level(e)?)))
            .collect(),
        (expr, OutputCodec::Value { field, .. }) => Some(vec![(field.clone(), top_level(expr)?)]),
        _ => None,
    }
}

/// Drops unread accumulators and renames accumulators read by exactly one
/// member. Returns the new group and the applied renames.
fn merge(group: &Group, references: &[(String, String)]) -> (Group, HashMap<String, String>) {
    let mut reads: HashMap<&str, Vec<&str>> = HashMap::new();
    for (member, field) in references {
        reads.entry(field.as_str()).or_default().push(member.as_str());
    }
    let kept = group
        .accumulators
        .iter()
        .filter(|a| reads.contains_key(a.output_field.as_str()))
        .cloned()
        .collect::<Vec<_>>();

    let mut in_use = kept
        .iter()
        .map(|a| a.output_field.clone())
        .collect::<Vec<_>>();
    in_use.push("_id".to_string());
    let mut renames = HashMap::new();
    let accumulators = kept
        .into_iter()
        .map(|mut a| {
            if let Some([member]) = reads.get(a.output_field.as_str()).map(Vec::as_slice) {
                let free = !in_use.iter().any(|n| n.as_str() == *member)
                    && !member.starts_with('$')
                    && !member.contains('.');
                if free {
                    in_use.push(member.to_string());
                    renames.insert(a.output_field.clone(), member.to_string());
                    a.output_field = member.to_string();
                }
            }
            a
        })
        .collect();
    (
        Group {
            id: group.id.clone(),
            accumulators,
        },
        renames,
    )
}

fn remap_output(output: OutputCodec, element_names: &HashMap<String, String>) -> OutputCodec {
    match output {
        OutputCodec::Value { field, codec } => OutputCodec::Value {
            field: element_names.get(&field).cloned().unwrap_or(field),
            codec,
        },
        OutputCodec::Document(Codec::Document(class_map)) => {
            let mut remapped = ClassMap::clone(&class_map);
            for member in remapped.members.iter_mut() {
                if let Some(element) = element_names.get(&member.member_name) {
                    member.element_name = element.clone();
                }
            }
            OutputCodec::Document(Codec::Document(Arc::new(remapped)))
        }
        other => other,
    }
}
