use super::{BinaryOp, Expr, MethodCall, MethodIdentity, QueryModel, UnaryOp, ValueType};
use bson::Bson;
use itertools::Itertools;
use std::fmt::{self, Display, Formatter};

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            ValueType::Boolean => write!(f, "bool"),
            ValueType::Int32 => write!(f, "int"),
            ValueType::Int64 => write!(f, "long"),
            ValueType::Double => write!(f, "double"),
            ValueType::Decimal128 => write!(f, "decimal"),
            ValueType::String => write!(f, "string"),
            ValueType::DateTime => write!(f, "DateTime"),
            ValueType::ObjectId => write!(f, "ObjectId"),
            ValueType::Object => write!(f, "object"),
            ValueType::Document(name) => write!(f, "{name}"),
            ValueType::Array(item) => write!(f, "{item}[]"),
        }
    }
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Negate => write!(f, "-"),
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{op}")
    }
}

impl Display for MethodIdentity {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.declaring_type, self.name)
    }
}

impl Display for MethodCall {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.method.name)?;
        if !self.type_arguments.is_empty() {
            write!(f, "<{}>", self.type_arguments.iter().join(", "))?;
        }
        write!(f, "({})", self.arguments.iter().join(", "))
    }
}

fn write_constant(f: &mut Formatter, value: &Bson) -> fmt::Result {
    match value {
        Bson::String(s) => write!(f, "{s:?}"),
        Bson::Int32(i) => write!(f, "{i}"),
        Bson::Int64(i) => write!(f, "{i}L"),
        Bson::Double(d) => write!(f, "{d:?}"),
        Bson::Boolean(b) => write!(f, "{b}"),
        Bson::Null => write!(f, "null"),
        Bson::Array(items) => {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_constant(f, item)?;
            }
            write!(f, "]")
        }
        other => write!(f, "{other}"),
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Expr::Constant { value, .. } => write_constant(f, value),
            Expr::Parameter(name) => write!(f, "{name}"),
            Expr::Member { target, member } => write!(f, "{target}.{member}"),
            Expr::Unary { op, operand } => write!(f, "{op}{operand}"),
            Expr::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => write!(f, "({test} ? {if_true} : {if_false})"),
            Expr::New { members } => write!(
                f,
                "new {{ {} }}",
                members
                    .iter()
                    .map(|(name, e)| format!("{name} = {e}"))
                    .join(", ")
            ),
            Expr::Index { array, index } => write!(f, "{array}[{index}]"),
            Expr::Call { source, call } => write!(f, "{source}.{call}"),
            Expr::Lambda { parameters, body } => match parameters.as_slice() {
                [single] => write!(f, "{single} => {body}"),
                _ => write!(f, "({}) => {body}", parameters.join(", ")),
            },
        }
    }
}

impl Display for QueryModel {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.source.collection)?;
        for clause in self.clauses.iter() {
            write!(f, ".{clause}")?;
        }
        Ok(())
    }
}
