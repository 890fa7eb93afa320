use crate::ir::*;

/// A rewriting traversal over the IR. Each `visit_*` method defaults to
/// walking the node's children, so implementors override only the nodes they
/// care about and call `walk` to keep descending.
pub trait Visitor: Sized {
    fn visit_expression(&mut self, node: Expression) -> Expression {
        node.walk(self)
    }

    fn visit_stage(&mut self, node: Stage) -> Stage {
        node.walk(self)
    }
}

fn visit_box<V: Visitor>(visitor: &mut V, node: Box<Expression>) -> Box<Expression> {
    Box::new(visitor.visit_expression(*node))
}

impl Expression {
    pub fn walk<V: Visitor>(self, visitor: &mut V) -> Self {
        match self {
            Expression::Constant(_) | Expression::Field(_) => self,
            Expression::Document(d) => Expression::Document(Document {
                fields: d.fields.map_values(|e| visitor.visit_expression(e)),
            }),
            Expression::ArrayItem(a) => Expression::ArrayItem(ArrayItem {
                array: visit_box(visitor, a.array),
                ..a
            }),
            Expression::Accumulator(a) => Expression::Accumulator(Accumulator {
                source: visit_box(visitor, a.source),
                ..a
            }),
            Expression::Binary(b) => Expression::Binary(Binary {
                op: b.op,
                left: visit_box(visitor, b.left),
                right: visit_box(visitor, b.right),
            }),
            Expression::Unary(u) => Expression::Unary(Unary {
                op: u.op,
                operand: visit_box(visitor, u.operand),
            }),
            Expression::Conditional(c) => Expression::Conditional(Conditional {
                test: visit_box(visitor, c.test),
                if_true: visit_box(visitor, c.if_true),
                if_false: visit_box(visitor, c.if_false),
            }),
            Expression::Filter(f) => Expression::Filter(Filter {
                input: visit_box(visitor, f.input),
                variable: f.variable,
                condition: visit_box(visitor, f.condition),
            }),
            Expression::Map(m) => Expression::Map(Map {
                input: visit_box(visitor, m.input),
                variable: m.variable,
                body: visit_box(visitor, m.body),
            }),
            Expression::AnyElementTrue(e) => Expression::AnyElementTrue(visit_box(visitor, e)),
            Expression::AllElementsTrue(e) => Expression::AllElementsTrue(visit_box(visitor, e)),
            Expression::SetOperation(s) => Expression::SetOperation(SetOperation {
                op: s.op,
                args: s
                    .args
                    .into_iter()
                    .map(|e| visitor.visit_expression(e))
                    .collect(),
            }),
            Expression::Size(e) => Expression::Size(visit_box(visitor, e)),
            Expression::In(i) => Expression::In(In {
                value: visit_box(visitor, i.value),
                array: visit_box(visitor, i.array),
            }),
            Expression::ArrayElemAt(a) => Expression::ArrayElemAt(ArrayElemAt {
                array: visit_box(visitor, a.array),
                index: visit_box(visitor, a.index),
            }),
            Expression::Slice(s) => Expression::Slice(Slice {
                array: visit_box(visitor, s.array),
                ..s
            }),
            Expression::Reduce(r) => Expression::Reduce(Reduce {
                input: visit_box(visitor, r.input),
                ..r
            }),
            Expression::SortArray(s) => Expression::SortArray(SortArray {
                input: visit_box(visitor, s.input),
                keys: s.keys,
            }),
            Expression::GetField(g) => Expression::GetField(GetField {
                input: visit_box(visitor, g.input),
                ..g
            }),
            Expression::Grouping(g) => Expression::Grouping(Grouping {
                group: g.group,
                key: visit_box(visitor, g.key),
                element: visit_box(visitor, g.element),
                predicate: g.predicate.map(|p| visit_box(visitor, p)),
                distinct: g.distinct,
            }),
        }
    }
}

impl Stage {
    pub fn walk<V: Visitor>(self, visitor: &mut V) -> Self {
        match self {
            Stage::Match(e) => Stage::Match(visitor.visit_expression(e)),
            Stage::Project(e) => Stage::Project(visitor.visit_expression(e)),
            Stage::Group(g) => Stage::Group(Group {
                id: visitor.visit_expression(g.id),
                accumulators: g
                    .accumulators
                    .into_iter()
                    .map(|a| Accumulator {
                        source: visit_box(visitor, a.source),
                        ..a
                    })
                    .collect(),
            }),
            Stage::Sort(keys) => Stage::Sort(
                keys.into_iter()
                    .map(|k| SortKey {
                        key: visitor.visit_expression(k.key),
                        direction: k.direction,
                    })
                    .collect(),
            ),
            Stage::Skip(_) | Stage::Limit(_) | Stage::Unwind(_) => self,
        }
    }
}
