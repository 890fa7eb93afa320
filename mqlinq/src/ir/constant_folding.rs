//! Folds operators whose operands are all constants. A fold only happens when
//! the folded value is exact: integer overflow, inexact division and floating
//! point arithmetic are left for the server to evaluate.

use crate::{
    codec::Codec,
    ir::{Constant, Expression},
    query::{BinaryOp, UnaryOp},
};
use bson::Bson;
use std::cmp::Ordering;

enum Integer {
    Int32(i32),
    Int64(i64),
}

fn integer(value: &Bson) -> Option<Integer> {
    match value {
        Bson::Int32(i) => Some(Integer::Int32(*i)),
        Bson::Int64(i) => Some(Integer::Int64(*i)),
        _ => None,
    }
}

fn fold_int32(op: BinaryOp, l: i32, r: i32) -> Option<Bson> {
    match op {
        BinaryOp::Add => l.checked_add(r),
        BinaryOp::Subtract => l.checked_sub(r),
        BinaryOp::Multiply => l.checked_mul(r),
        BinaryOp::Divide if r != 0 && l.checked_rem(r) == Some(0) => l.checked_div(r),
        BinaryOp::Modulo => l.checked_rem(r),
        _ => None,
    }
    .map(Bson::Int32)
}

fn fold_int64(op: BinaryOp, l: i64, r: i64) -> Option<Bson> {
    match op {
        BinaryOp::Add => l.checked_add(r),
        BinaryOp::Subtract => l.checked_sub(r),
        BinaryOp::Multiply => l.checked_mul(r),
        BinaryOp::Divide if r != 0 && l.checked_rem(r) == Some(0) => l.checked_div(r),
        BinaryOp::Modulo => l.checked_rem(r),
        _ => None,
    }
    .map(Bson::Int64)
}

fn compare(left: &Bson, right: &Bson) -> Option<Ordering> {
    match (left, right) {
        (Bson::Int32(l), Bson::Int32(r)) => Some(l.cmp(r)),
        (Bson::Int64(l), Bson::Int64(r)) => Some(l.cmp(r)),
        (Bson::Int32(l), Bson::Int64(r)) => Some(i64::from(*l).cmp(r)),
        (Bson::Int64(l), Bson::Int32(r)) => Some(l.cmp(&i64::from(*r))),
        (Bson::Double(l), Bson::Double(r)) => l.partial_cmp(r),
        (Bson::String(l), Bson::String(r)) => Some(l.cmp(r)),
        (Bson::Boolean(l), Bson::Boolean(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

pub fn fold_binary(op: BinaryOp, left: &Bson, right: &Bson) -> Option<Bson> {
    if op.is_comparison() {
        let ordering = compare(left, right)?;
        return Some(Bson::Boolean(match op {
            BinaryOp::Eq => ordering == Ordering::Equal,
            BinaryOp::Ne => ordering != Ordering::Equal,
            BinaryOp::Lt => ordering == Ordering::Less,
            BinaryOp::Lte => ordering != Ordering::Greater,
            BinaryOp::Gt => ordering == Ordering::Greater,
            BinaryOp::Gte => ordering != Ordering::Less,
            _ => return None,
        }));
    }
    match (op, left, right) {
        (BinaryOp::And, Bson::Boolean(l), Bson::Boolean(r)) => Some(Bson::Boolean(*l && *r)),
        (BinaryOp::Or, Bson::Boolean(l), Bson::Boolean(r)) => Some(Bson::Boolean(*l || *r)),
        _ => match (integer(left)?, integer(right)?) {
            (Integer::Int32(l), Integer::Int32(r)) => fold_int32(op, l, r),
            (Integer::Int32(l), Integer::Int64(r)) => fold_int64(op, i64::from(l), r),
            (Integer::Int64(l), Integer::Int32(r)) => fold_int64(op, l, i64::from(r)),
            (Integer::Int64(l), Integer::Int64(r)) => fold_int64(op, l, r),
        },
    }
}

pub fn fold_unary(op: UnaryOp, operand: &Bson) -> Option<Bson> {
    match (op, operand) {
        (UnaryOp::Not, Bson::Boolean(b)) => Some(Bson::Boolean(!b)),
        (UnaryOp::Negate, Bson::Int32(i)) => i.checked_neg().map(Bson::Int32),
        (UnaryOp::Negate, Bson::Int64(i)) => i.checked_neg().map(Bson::Int64),
        _ => None,
    }
}

/// Builds a binary node, folding it when both operands are constants.
pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
    if let (Expression::Constant(l), Expression::Constant(r)) = (&left, &right) {
        if let Some(value) = fold_binary(op, &l.value, &r.value) {
            let codec = match value {
                Bson::Boolean(_) => Codec::boolean(),
                Bson::Int64(_) => Codec::int64(),
                _ => l.codec.clone(),
            };
            return Expression::Constant(Constant { value, codec });
        }
    }
    Expression::binary(op, left, right)
}

pub fn unary(op: UnaryOp, operand: Expression) -> Expression {
    if let Expression::Constant(c) = &operand {
        if let Some(value) = fold_unary(op, &c.value) {
            return Expression::Constant(Constant {
                value,
                codec: c.codec.clone(),
            });
        }
    }
    Expression::Unary(crate::ir::Unary {
        op,
        operand: Box::new(operand),
    })
}

/// A conditional whose test is a constant collapses to the chosen branch.
pub fn conditional(test: Expression, if_true: Expression, if_false: Expression) -> Expression {
    match test {
        Expression::Constant(Constant {
            value: Bson::Boolean(b),
            ..
        }) => {
            if b {
                if_true
            } else {
                if_false
            }
        }
        test => Expression::conditional(test, if_true, if_false),
    }
}
