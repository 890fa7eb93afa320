use super::{Error, MqlCodeGenerator, Result, VALUE_FIELD};
use crate::ir::{self, AccumulatorKind, Expression, Group, SortDirection, SortKey, Stage};
use bson::{doc, Bson, Document};

/// Counts are emitted as `$skip`/`$limit` arguments, which the server reads
/// as 64-bit integers.
pub(crate) fn count_to_bson(count: u64) -> Bson {
    Bson::Int64(i64::try_from(count).unwrap_or(i64::MAX))
}

impl MqlCodeGenerator {
    pub fn codegen_stage(&self, stage: &Stage) -> Result<Document> {
        match stage {
            Stage::Match(predicate) => self.codegen_match(predicate),
            Stage::Project(selector) => self.codegen_project(selector),
            Stage::Group(group) => self.codegen_group(group),
            Stage::Sort(keys) => self.codegen_sort(keys),
            Stage::Skip(n) => Ok(doc! {"$skip": count_to_bson(*n)}),
            Stage::Limit(n) => Ok(doc! {"$limit": count_to_bson(*n)}),
            Stage::Unwind(path) => Ok(doc! {"$unwind": path.to_string()}),
        }
    }

    fn codegen_match(&self, predicate: &Expression) -> Result<Document> {
        let filter = if self.match_language {
            self.codegen_match_predicate(predicate)?
        } else {
            doc! {"$expr": self.codegen_expression(predicate)?}
        };
        Ok(doc! {"$match": filter})
    }

    /// A value in `$project` position. Bare numbers and booleans there mean
    /// inclusion or exclusion, so every constant is wrapped in `$literal`,
    /// and nested documents are projection specs of their own.
    fn codegen_project_value(&self, value: &Expression) -> Result<Bson> {
        match value {
            Expression::Constant(c) => Ok(doc! {"$literal": c.value.clone()}.into()),
            Expression::Document(d) => Ok(Bson::Document(self.codegen_project_fields(d)?)),
            other => self.codegen_expression(other),
        }
    }

    fn codegen_project_fields(&self, d: &ir::Document) -> Result<Document> {
        d.fields
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.codegen_project_value(v)?)))
            .collect()
    }

    fn codegen_project(&self, selector: &Expression) -> Result<Document> {
        let project_doc = match selector {
            Expression::Document(d) => self.codegen_project_fields(d)?,
            other => doc! {VALUE_FIELD: self.codegen_project_value(other)?},
        };
        let project_doc = if project_doc.contains_key("_id") {
            project_doc
        } else {
            // _id: 0 always comes first so emitted stages are stable
            let mut tmp_project_doc = doc! {"_id": 0};
            tmp_project_doc.extend(project_doc);
            tmp_project_doc
        };
        Ok(doc! {"$project": project_doc})
    }

    fn accumulator_op(kind: AccumulatorKind) -> &'static str {
        match kind {
            AccumulatorKind::Count | AccumulatorKind::Sum => "$sum",
            AccumulatorKind::Avg => "$avg",
            AccumulatorKind::Min => "$min",
            AccumulatorKind::Max => "$max",
            AccumulatorKind::First => "$first",
            AccumulatorKind::Last => "$last",
            AccumulatorKind::Push => "$push",
            AccumulatorKind::AddToSet => "$addToSet",
        }
    }

    fn codegen_group(&self, group: &Group) -> Result<Document> {
        let mut group_doc = doc! {"_id": self.codegen_expression(&group.id)?};
        for accumulator in group.accumulators.iter() {
            let mut accumulator_doc = Document::new();
            accumulator_doc.insert(
                Self::accumulator_op(accumulator.kind),
                self.codegen_expression(&accumulator.source)?,
            );
            group_doc.insert(accumulator.output_field.clone(), accumulator_doc);
        }
        Ok(doc! {"$group": group_doc})
    }

    fn codegen_sort(&self, keys: &[SortKey]) -> Result<Document> {
        let sort_doc = keys
            .iter()
            .map(|SortKey { key, direction }| {
                let path = match key {
                    Expression::Field(f)
                        if f.path.variable.is_none() && !f.path.segments.is_empty() =>
                    {
                        f.path.dotted()
                    }
                    other => return Err(Error::InvalidSortKey(format!("{other:?}"))),
                };
                let direction = match direction {
                    SortDirection::Ascending => Bson::Int32(1),
                    SortDirection::Descending => Bson::Int32(-1),
                };
                Ok((path, direction))
            })
            .collect::<Result<Document>>()?;
        Ok(doc! {"$sort": sort_doc})
    }
}
