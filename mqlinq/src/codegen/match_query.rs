//! Lowers `$match` predicates to the query language where each conjunct
//! allows it, so the server can use indexes. Conjuncts that cannot be
//! expressed fall back to `$expr`.

use super::{expressions::flatten, MqlCodeGenerator, Result};
use crate::{
    ir::{Expression, Field},
    query::BinaryOp,
};
use bson::{doc, Bson, Document};

impl MqlCodeGenerator {
    pub(crate) fn codegen_match_predicate(&self, predicate: &Expression) -> Result<Document> {
        let mut conjuncts = vec![];
        flatten(BinaryOp::And, predicate, &mut conjuncts);
        let mut lowered = conjuncts
            .into_iter()
            .map(|c| match to_query(c) {
                Some(query) => Ok(query),
                None => Ok(doc! {"$expr": self.codegen_expression(c)?}),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(if lowered.len() == 1 {
            lowered.remove(0)
        } else {
            doc! {"$and": lowered}
        })
    }
}

/// A field of the current document, written as a dotted query path.
fn query_path(field: &Field) -> Option<String> {
    if field.path.variable.is_some() || field.path.segments.is_empty() {
        return None;
    }
    Some(field.path.dotted())
}

fn single_key(key: String, value: impl Into<Bson>) -> Document {
    let mut d = Document::new();
    d.insert(key, value);
    d
}

/// The query-language operator for `field op value`. `None` where query
/// semantics diverge from expression semantics: query filters never match a
/// null or missing field under `$lt`/`$lte`, and `{field: null}` also matches
/// a missing field.
fn comparison(op: BinaryOp, value: Bson) -> Option<Bson> {
    if value == Bson::Null {
        return None;
    }
    let op = match op {
        // an equality against a document value needs $eq so the document is
        // not read as an operator expression
        BinaryOp::Eq => match value {
            Bson::Document(_) | Bson::RegularExpression(_) => "$eq",
            value => return Some(value),
        },
        BinaryOp::Ne => "$ne",
        BinaryOp::Gt => "$gt",
        BinaryOp::Gte => "$gte",
        _ => return None,
    };
    Some(Bson::Document(single_key(op.to_string(), value)))
}

fn to_query_all(op: BinaryOp, expr: &Expression) -> Option<Vec<Document>> {
    let mut operands = vec![];
    flatten(op, expr, &mut operands);
    operands.into_iter().map(to_query).collect()
}

fn to_query(expr: &Expression) -> Option<Document> {
    match expr {
        Expression::Binary(b) if b.op.is_comparison() => {
            let (field, value, op) = match (b.left.as_ref(), b.right.as_ref()) {
                (Expression::Field(f), Expression::Constant(c)) => (f, c, b.op),
                (Expression::Constant(c), Expression::Field(f)) => (f, c, b.op.flip()),
                _ => return None,
            };
            let path = query_path(field)?;
            Some(single_key(path, comparison(op, value.value.clone())?))
        }
        Expression::Binary(b) if b.op == BinaryOp::And => {
            Some(doc! {"$and": to_query_all(BinaryOp::And, expr)?})
        }
        Expression::Binary(b) if b.op == BinaryOp::Or => {
            Some(doc! {"$or": to_query_all(BinaryOp::Or, expr)?})
        }
        Expression::Unary(u) if u.op == crate::query::UnaryOp::Not => {
            Some(doc! {"$nor": [to_query(&u.operand)?]})
        }
        Expression::Field(f) if f.codec.is_boolean() => Some(single_key(query_path(f)?, true)),
        Expression::In(i) => match (i.value.as_ref(), i.array.as_ref()) {
            (Expression::Field(f), Expression::Constant(c)) => match &c.value {
                Bson::Array(items) if !items.contains(&Bson::Null) => {
                    Some(single_key(query_path(f)?, doc! {"$in": c.value.clone()}))
                }
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}
