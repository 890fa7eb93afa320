//! The host query model consumed by the translator. Values of these types are
//! produced by the fluent-query clause parser; the translator only reads them.

use bson::Bson;

mod pretty_print;

/// The declaring types whose sequence operators the translator understands.
pub const QUERYABLE: &str = "Queryable";
pub const ENUMERABLE: &str = "Enumerable";
pub const MONGO_QUERYABLE: &str = "MongoQueryable";

/// The static type of a host value.
#[derive(PartialEq, Eq, Debug, Clone, Hash)]
pub enum ValueType {
    Boolean,
    Int32,
    Int64,
    Double,
    Decimal128,
    String,
    DateTime,
    ObjectId,
    Object,
    Document(String),
    Array(Box<ValueType>),
}

impl ValueType {
    pub fn document(name: impl Into<String>) -> Self {
        ValueType::Document(name.into())
    }

    pub fn array(item: ValueType) -> Self {
        ValueType::Array(Box::new(item))
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// The operator that gives the same answer with its operands swapped.
    pub fn flip(self) -> Self {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Lte => BinaryOp::Gte,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Gte => BinaryOp::Lte,
            other => other,
        }
    }
}

/// Identifies a method by the type that declares it and its name, e.g.
/// `Queryable.Where`.
#[derive(PartialEq, Eq, Debug, Clone, Hash)]
pub struct MethodIdentity {
    pub declaring_type: String,
    pub name: String,
}

/// One operator application, without the sequence it is applied to.
#[derive(PartialEq, Debug, Clone)]
pub struct MethodCall {
    pub method: MethodIdentity,
    pub type_arguments: Vec<ValueType>,
    pub arguments: Vec<Expr>,
}

impl MethodCall {
    pub fn new(declaring_type: &str, name: &str, arguments: Vec<Expr>) -> Self {
        MethodCall {
            method: MethodIdentity {
                declaring_type: declaring_type.to_string(),
                name: name.to_string(),
            },
            type_arguments: vec![],
            arguments,
        }
    }

    pub fn queryable(name: &str, arguments: Vec<Expr>) -> Self {
        Self::new(QUERYABLE, name, arguments)
    }

    pub fn enumerable(name: &str, arguments: Vec<Expr>) -> Self {
        Self::new(ENUMERABLE, name, arguments)
    }

    pub fn with_type_arguments(mut self, type_arguments: Vec<ValueType>) -> Self {
        self.type_arguments = type_arguments;
        self
    }

    pub fn name(&self) -> &str {
        &self.method.name
    }

    pub fn arity(&self) -> usize {
        self.arguments.len()
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum Expr {
    Constant {
        value: Bson,
        value_type: ValueType,
    },
    Parameter(String),
    Member {
        target: Box<Expr>,
        member: String,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    New {
        members: Vec<(String, Expr)>,
    },
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        source: Box<Expr>,
        call: MethodCall,
    },
    Lambda {
        parameters: Vec<String>,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn constant(value: impl Into<Bson>, value_type: ValueType) -> Self {
        Expr::Constant {
            value: value.into(),
            value_type,
        }
    }

    pub fn int(value: i32) -> Self {
        Self::constant(value, ValueType::Int32)
    }

    pub fn string(value: &str) -> Self {
        Self::constant(value, ValueType::String)
    }

    pub fn boolean(value: bool) -> Self {
        Self::constant(value, ValueType::Boolean)
    }

    pub fn param(name: &str) -> Self {
        Expr::Parameter(name.to_string())
    }

    pub fn member(self, member: &str) -> Self {
        Expr::Member {
            target: Box::new(self),
            member: member.to_string(),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Self {
        Expr::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    pub fn new_object(members: Vec<(&str, Expr)>) -> Self {
        Expr::New {
            members: members
                .into_iter()
                .map(|(name, e)| (name.to_string(), e))
                .collect(),
        }
    }

    pub fn index(self, index: Expr) -> Self {
        Expr::Index {
            array: Box::new(self),
            index: Box::new(index),
        }
    }

    pub fn call(self, call: MethodCall) -> Self {
        Expr::Call {
            source: Box::new(self),
            call,
        }
    }

    pub fn lambda(parameters: &[&str], body: Expr) -> Self {
        Expr::Lambda {
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            body: Box::new(body),
        }
    }
}

/// The root of a query: the collection it reads and the type of its documents.
#[derive(PartialEq, Debug, Clone)]
pub struct SourceClause {
    pub collection: String,
    pub item_type: ValueType,
}

#[derive(PartialEq, Debug, Clone)]
pub struct QueryModel {
    pub source: SourceClause,
    pub clauses: Vec<MethodCall>,
}

impl QueryModel {
    pub fn new(collection: &str, item_type: ValueType) -> Self {
        QueryModel {
            source: SourceClause {
                collection: collection.to_string(),
                item_type,
            },
            clauses: vec![],
        }
    }

    pub fn clause(mut self, call: MethodCall) -> Self {
        self.clauses.push(call);
        self
    }
}
