use super::{Error, MqlCodeGenerator, Result};
use crate::{
    ir::{
        Binary, Expression, FieldPath, ReduceOperator, SetOperator, SortArray, SortDirection,
    },
    query::{BinaryOp, UnaryOp},
};
use bson::{bson, Bson, Document};

/// Strings, documents and arrays are wrapped in `$literal` so they cannot be
/// read as field paths or operators.
pub(crate) fn codegen_constant(value: &Bson) -> Bson {
    match value {
        Bson::String(_) | Bson::Document(_) | Bson::Array(_) => {
            bson!({"$literal": value.clone()})
        }
        other => other.clone(),
    }
}

fn binary_op(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "$add",
        BinaryOp::Subtract => "$subtract",
        BinaryOp::Multiply => "$multiply",
        BinaryOp::Divide => "$divide",
        BinaryOp::Modulo => "$mod",
        BinaryOp::Eq => "$eq",
        BinaryOp::Ne => "$ne",
        BinaryOp::Lt => "$lt",
        BinaryOp::Lte => "$lte",
        BinaryOp::Gt => "$gt",
        BinaryOp::Gte => "$gte",
        BinaryOp::And => "$and",
        BinaryOp::Or => "$or",
    }
}

/// Collects the operands of a chain of the same associative operator.
pub(crate) fn flatten<'a>(op: BinaryOp, expr: &'a Expression, out: &mut Vec<&'a Expression>) {
    match expr {
        Expression::Binary(b) if b.op == op => {
            flatten(op, &b.left, out);
            flatten(op, &b.right, out);
        }
        _ => out.push(expr),
    }
}

fn single_op(name: &str, arg: Bson) -> Bson {
    let mut d = Document::new();
    d.insert(name, arg);
    Bson::Document(d)
}

impl MqlCodeGenerator {
    pub fn codegen_expression(&self, expr: &Expression) -> Result<Bson> {
        self.codegen_scoped(expr, &mut Vec::new())
    }

    fn codegen_path(path: &FieldPath, scope: &[String]) -> Result<Bson> {
        if let Some(variable) = &path.variable {
            if !scope.contains(variable) {
                return Err(Error::UnboundVariable(variable.clone()));
            }
        }
        Ok(Bson::String(path.to_string()))
    }

    fn codegen_bound(
        &self,
        variable: &str,
        body: &Expression,
        scope: &mut Vec<String>,
    ) -> Result<Bson> {
        scope.push(variable.to_string());
        let result = self.codegen_scoped(body, scope);
        scope.pop();
        result
    }

    fn codegen_binary(&self, binary: &Binary, scope: &mut Vec<String>) -> Result<Bson> {
        let operands = if matches!(binary.op, BinaryOp::And | BinaryOp::Or) {
            let mut operands = vec![];
            flatten(binary.op, &binary.left, &mut operands);
            flatten(binary.op, &binary.right, &mut operands);
            operands
        } else {
            vec![binary.left.as_ref(), binary.right.as_ref()]
        };
        let args = operands
            .into_iter()
            .map(|e| self.codegen_scoped(e, scope))
            .collect::<Result<Vec<_>>>()?;
        Ok(single_op(binary_op(binary.op), Bson::Array(args)))
    }

    fn codegen_sort_array(&self, sort: &SortArray, scope: &mut Vec<String>) -> Result<Bson> {
        let direction = |d: SortDirection| match d {
            SortDirection::Ascending => Bson::Int32(1),
            SortDirection::Descending => Bson::Int32(-1),
        };
        let sort_by = match sort.keys.as_slice() {
            [key] if key.path.is_none() => direction(key.direction),
            keys => {
                let mut sort_by = Document::new();
                for key in keys {
                    match &key.path {
                        Some(path) => {
                            sort_by.insert(path.clone(), direction(key.direction));
                        }
                        None => return Err(Error::InvalidSortKey(format!("{sort:?}"))),
                    }
                }
                Bson::Document(sort_by)
            }
        };
        Ok(bson!({"$sortArray": {
            "input": self.codegen_scoped(&sort.input, scope)?,
            "sortBy": sort_by,
        }}))
    }

    fn codegen_scoped(&self, expr: &Expression, scope: &mut Vec<String>) -> Result<Bson> {
        Ok(match expr {
            Expression::Constant(c) => codegen_constant(&c.value),
            Expression::Field(f) => Self::codegen_path(&f.path, scope)?,
            Expression::Document(d) => Bson::Document(
                d.fields
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.codegen_scoped(v, scope)?)))
                    .collect::<Result<Document>>()?,
            ),
            Expression::ArrayItem(item) => {
                Self::codegen_path(&FieldPath::variable(&item.variable), scope)?
            }
            Expression::Accumulator(a) => {
                return Err(Error::UnattachedAccumulator(a.output_field.clone()))
            }
            Expression::Binary(b) => self.codegen_binary(b, scope)?,
            Expression::Unary(u) => {
                let operand = self.codegen_scoped(&u.operand, scope)?;
                match u.op {
                    UnaryOp::Not => bson!({"$not": [operand]}),
                    UnaryOp::Negate => bson!({"$subtract": [0, operand]}),
                }
            }
            Expression::Conditional(c) => bson!({"$cond": [
                self.codegen_scoped(&c.test, scope)?,
                self.codegen_scoped(&c.if_true, scope)?,
                self.codegen_scoped(&c.if_false, scope)?,
            ]}),
            Expression::Filter(f) => bson!({"$filter": {
                "input": self.codegen_scoped(&f.input, scope)?,
                "as": f.variable.clone(),
                "cond": self.codegen_bound(&f.variable, &f.condition, scope)?,
            }}),
            Expression::Map(m) => bson!({"$map": {
                "input": self.codegen_scoped(&m.input, scope)?,
                "as": m.variable.clone(),
                "in": self.codegen_bound(&m.variable, &m.body, scope)?,
            }}),
            Expression::AnyElementTrue(e) => {
                bson!({"$anyElementTrue": [self.codegen_scoped(e, scope)?]})
            }
            Expression::AllElementsTrue(e) => {
                bson!({"$allElementsTrue": [self.codegen_scoped(e, scope)?]})
            }
            Expression::SetOperation(s) => {
                let args = s
                    .args
                    .iter()
                    .map(|a| self.codegen_scoped(a, scope))
                    .collect::<Result<Vec<_>>>()?;
                let op = match s.op {
                    SetOperator::Union | SetOperator::Distinct => "$setUnion",
                    SetOperator::Difference => "$setDifference",
                    SetOperator::Intersection => "$setIntersection",
                };
                single_op(op, Bson::Array(args))
            }
            Expression::Size(e) => bson!({"$size": self.codegen_scoped(e, scope)?}),
            Expression::In(i) => bson!({"$in": [
                self.codegen_scoped(&i.value, scope)?,
                self.codegen_scoped(&i.array, scope)?,
            ]}),
            Expression::ArrayElemAt(a) => bson!({"$arrayElemAt": [
                self.codegen_scoped(&a.array, scope)?,
                self.codegen_scoped(&a.index, scope)?,
            ]}),
            Expression::Slice(s) => {
                let array = self.codegen_scoped(&s.array, scope)?;
                let to_i32 = |n: u64| Bson::Int32(i32::try_from(n).unwrap_or(i32::MAX));
                match (s.skip, s.limit) {
                    (None, None) => array,
                    (None, Some(limit)) => bson!({"$slice": [array, to_i32(limit)]}),
                    (Some(skip), limit) => bson!({"$slice": [
                        array,
                        to_i32(skip),
                        to_i32(limit.unwrap_or(i32::MAX as u64)),
                    ]}),
                }
            }
            Expression::Reduce(r) => {
                let op = match r.op {
                    ReduceOperator::Sum => "$sum",
                    ReduceOperator::Avg => "$avg",
                    ReduceOperator::Min => "$min",
                    ReduceOperator::Max => "$max",
                };
                single_op(op, self.codegen_scoped(&r.input, scope)?)
            }
            Expression::SortArray(s) => self.codegen_sort_array(s, scope)?,
            Expression::GetField(g) => bson!({"$getField": {
                "field": g.field.clone(),
                "input": self.codegen_scoped(&g.input, scope)?,
            }}),
            Expression::Grouping(g) => {
                return Err(Error::UnresolvedGrouping(format!("{:?}", g.element)))
            }
        })
    }
}
