use crate::{
    codec::{ClassMap, Codec, OutputCodec},
    query::{BinaryOp, UnaryOp},
    rewrites::skip_limit::SkipLimitReducer,
};
use bson::Bson;
use mqlinq_datastructures::unique_linked_hash_map::UniqueLinkedHashMap;
use std::fmt::{self, Display, Formatter};

/// A reference into the current row. A path with no variable is relative to
/// the root document; a path with a variable reads the value bound by an
/// enclosing `$filter`/`$map`.
#[derive(PartialEq, Eq, Debug, Clone, Hash, Default)]
pub struct FieldPath {
    pub variable: Option<String>,
    pub segments: Vec<String>,
}

impl FieldPath {
    pub fn root() -> Self {
        FieldPath::default()
    }

    pub fn field(name: &str) -> Self {
        FieldPath {
            variable: None,
            segments: vec![name.to_string()],
        }
    }

    pub fn variable(name: &str) -> Self {
        FieldPath {
            variable: Some(name.to_string()),
            segments: vec![],
        }
    }

    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        FieldPath {
            variable: self.variable.clone(),
            segments,
        }
    }

    pub fn is_root(&self) -> bool {
        self.variable.is_none() && self.segments.is_empty()
    }

    /// The dotted path without any `$` prefix, e.g. `a.b`.
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match (&self.variable, self.segments.is_empty()) {
            (None, true) => write!(f, "$$ROOT"),
            (None, false) => write!(f, "${}", self.dotted()),
            (Some(v), true) => write!(f, "$${v}"),
            (Some(v), false) => write!(f, "$${v}.{}", self.dotted()),
        }
    }
}

/// Index of the `Group` stage an accumulator belongs to.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub struct GroupId(pub usize);

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum AccumulatorKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
    AddToSet,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum SetOperator {
    Union,
    Difference,
    Intersection,
    Distinct,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum ReduceOperator {
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Expression {
    Constant(Constant),
    Field(Field),
    Document(Document),
    ArrayItem(ArrayItem),
    Accumulator(Accumulator),
    Binary(Binary),
    Unary(Unary),
    Conditional(Conditional),
    Filter(Filter),
    Map(Map),
    AnyElementTrue(Box<Expression>),
    AllElementsTrue(Box<Expression>),
    SetOperation(SetOperation),
    Size(Box<Expression>),
    In(In),
    ArrayElemAt(ArrayElemAt),
    Slice(Slice),
    Reduce(Reduce),
    SortArray(SortArray),
    GetField(GetField),
    Grouping(Grouping),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Constant {
    pub value: Bson,
    pub codec: Codec,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Field {
    pub path: FieldPath,
    pub codec: Codec,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Document {
    pub fields: UniqueLinkedHashMap<String, Expression>,
}

/// The implicit element of an array sub-query, read as `$$variable`.
#[derive(PartialEq, Debug, Clone)]
pub struct ArrayItem {
    pub array: Box<Expression>,
    pub variable: String,
    pub codec: Codec,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Accumulator {
    pub group: GroupId,
    pub kind: AccumulatorKind,
    pub source: Box<Expression>,
    pub output_field: String,
    pub codec: Codec,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Binary {
    pub op: BinaryOp,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Unary {
    pub op: UnaryOp,
    pub operand: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Conditional {
    pub test: Box<Expression>,
    pub if_true: Box<Expression>,
    pub if_false: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Filter {
    pub input: Box<Expression>,
    pub variable: String,
    pub condition: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Map {
    pub input: Box<Expression>,
    pub variable: String,
    pub body: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct SetOperation {
    pub op: SetOperator,
    pub args: Vec<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct In {
    pub value: Box<Expression>,
    pub array: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ArrayElemAt {
    pub array: Box<Expression>,
    pub index: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Slice {
    pub array: Box<Expression>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Reduce {
    pub op: ReduceOperator,
    pub input: Box<Expression>,
    pub codec: Codec,
}

/// A `$sortArray` key. `path` is relative to the array item; `None` sorts by
/// the item itself.
#[derive(PartialEq, Debug, Clone)]
pub struct SortArrayKey {
    pub path: Option<String>,
    pub direction: SortDirection,
}

#[derive(PartialEq, Debug, Clone)]
pub struct SortArray {
    pub input: Box<Expression>,
    pub keys: Vec<SortArrayKey>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct GetField {
    pub input: Box<Expression>,
    pub field: String,
    pub codec: Codec,
}

/// The shape of a row right after `GroupBy`. Never emitted: the accumulator
/// pass resolves it into accumulators on the group stage it names.
#[derive(PartialEq, Debug, Clone)]
pub struct Grouping {
    pub group: GroupId,
    pub key: Box<Expression>,
    pub element: Box<Expression>,
    pub predicate: Option<Box<Expression>>,
    pub distinct: bool,
}

impl Expression {
    pub fn constant(value: impl Into<Bson>, codec: Codec) -> Self {
        Expression::Constant(Constant {
            value: value.into(),
            codec,
        })
    }

    pub fn field(path: FieldPath, codec: Codec) -> Self {
        Expression::Field(Field { path, codec })
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary(Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn conditional(test: Expression, if_true: Expression, if_false: Expression) -> Self {
        Expression::Conditional(Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        })
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Expression::Field(Field { path, .. }) if path.is_root())
    }

    pub fn codec(&self) -> Codec {
        match self {
            Expression::Constant(c) => c.codec.clone(),
            Expression::Field(f) => f.codec.clone(),
            Expression::Document(d) => d.codec(),
            Expression::ArrayItem(a) => a.codec.clone(),
            Expression::Accumulator(a) => a.codec.clone(),
            Expression::Binary(b) => {
                if b.op.is_comparison() || b.op.is_logical() {
                    Codec::boolean()
                } else if b.right.codec().is_double() {
                    Codec::double()
                } else {
                    b.left.codec()
                }
            }
            Expression::Unary(u) => match u.op {
                UnaryOp::Not => Codec::boolean(),
                UnaryOp::Negate => u.operand.codec(),
            },
            Expression::Conditional(c) => c.if_true.codec(),
            Expression::Filter(f) => f.input.codec(),
            Expression::Map(m) => Codec::array_of(m.body.codec()),
            Expression::AnyElementTrue(_) | Expression::AllElementsTrue(_) | Expression::In(_) => {
                Codec::boolean()
            }
            Expression::SetOperation(s) => s
                .args
                .first()
                .map(Expression::codec)
                .unwrap_or(Codec::Dynamic),
            Expression::Size(_) => Codec::int32(),
            Expression::ArrayElemAt(a) => a.array.codec().item().cloned().unwrap_or(Codec::Dynamic),
            Expression::Slice(s) => s.array.codec(),
            Expression::Reduce(r) => r.codec.clone(),
            Expression::SortArray(s) => s.input.codec(),
            Expression::GetField(g) => g.codec.clone(),
            Expression::Grouping(g) => Codec::array_of(g.element.codec()),
        }
    }

    /// Whether a node of the given shape appears anywhere in this tree.
    pub fn contains(&self, pred: &dyn Fn(&Expression) -> bool) -> bool {
        pred(self) || self.children().into_iter().any(|c| c.contains(pred))
    }

    pub(crate) fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Constant(_) | Expression::Field(_) => vec![],
            Expression::Document(d) => d.fields.values().collect(),
            Expression::ArrayItem(a) => vec![a.array.as_ref()],
            Expression::Accumulator(a) => vec![a.source.as_ref()],
            Expression::Binary(b) => vec![b.left.as_ref(), b.right.as_ref()],
            Expression::Unary(u) => vec![u.operand.as_ref()],
            Expression::Conditional(c) => {
                vec![c.test.as_ref(), c.if_true.as_ref(), c.if_false.as_ref()]
            }
            Expression::Filter(f) => vec![f.input.as_ref(), f.condition.as_ref()],
            Expression::Map(m) => vec![m.input.as_ref(), m.body.as_ref()],
            Expression::AnyElementTrue(e) | Expression::AllElementsTrue(e) | Expression::Size(e) => {
                vec![e.as_ref()]
            }
            Expression::SetOperation(s) => s.args.iter().collect(),
            Expression::In(i) => vec![i.value.as_ref(), i.array.as_ref()],
            Expression::ArrayElemAt(a) => vec![a.array.as_ref(), a.index.as_ref()],
            Expression::Slice(s) => vec![s.array.as_ref()],
            Expression::Reduce(r) => vec![r.input.as_ref()],
            Expression::SortArray(s) => vec![s.input.as_ref()],
            Expression::GetField(g) => vec![g.input.as_ref()],
            Expression::Grouping(g) => {
                let mut children = vec![g.key.as_ref(), g.element.as_ref()];
                if let Some(p) = &g.predicate {
                    children.push(p.as_ref());
                }
                children
            }
        }
    }
}

impl Document {
    /// The synthesized class map describing this document's members.
    pub fn codec(&self) -> Codec {
        Codec::Document(
            ClassMap::synthesized(self.fields.iter().map(|(k, v)| (k.clone(), v.codec()))).into(),
        )
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct SortKey {
    pub key: Expression,
    pub direction: SortDirection,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Group {
    pub id: Expression,
    pub accumulators: Vec<Accumulator>,
}

/// One aggregation stage. Stage order is execution order.
#[derive(PartialEq, Debug, Clone)]
pub enum Stage {
    Match(Expression),
    Project(Expression),
    Group(Group),
    Sort(Vec<SortKey>),
    Skip(u64),
    Limit(u64),
    Unwind(FieldPath),
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum ResultOperatorKind {
    Count,
    LongCount,
    Sum,
    Average,
    Min,
    Max,
    First,
    FirstOrDefault,
    Last,
    LastOrDefault,
    Single,
    SingleOrDefault,
    Any,
    All,
}

impl ResultOperatorKind {
    /// The value the execution layer returns when the pipeline yields no
    /// rows. `None` means an empty result is an error.
    pub fn empty_default(self) -> Option<Bson> {
        use ResultOperatorKind::*;
        match self {
            Count | Sum => Some(Bson::Int32(0)),
            LongCount => Some(Bson::Int64(0)),
            Any => Some(Bson::Boolean(false)),
            All => Some(Bson::Boolean(true)),
            FirstOrDefault | LastOrDefault | SingleOrDefault => Some(Bson::Null),
            Average | Min | Max | First | Last | Single => None,
        }
    }

    /// The most rows a valid result may contain. The pipeline of a `Single`
    /// reads one row past this so the execution layer can detect the excess.
    pub fn max_rows(self) -> u64 {
        1
    }

    pub fn accumulator(self) -> Option<AccumulatorKind> {
        use ResultOperatorKind::*;
        match self {
            Count | LongCount => Some(AccumulatorKind::Count),
            Sum => Some(AccumulatorKind::Sum),
            Average => Some(AccumulatorKind::Avg),
            Min => Some(AccumulatorKind::Min),
            Max | Any => Some(AccumulatorKind::Max),
            All => Some(AccumulatorKind::Min),
            First | FirstOrDefault => Some(AccumulatorKind::First),
            Last | LastOrDefault => Some(AccumulatorKind::Last),
            Single | SingleOrDefault => None,
        }
    }
}

/// A terminal, scalar-reducing operator together with the value it reduces.
#[derive(PartialEq, Debug, Clone)]
pub struct ResultOperator {
    pub kind: ResultOperatorKind,
    pub source: Expression,
}

/// The translation-time pipeline threaded through every stage binder. The
/// projector describes how the next operator reads the current row.
#[derive(PartialEq, Debug, Clone)]
pub struct PipelineExpression {
    pub stages: Vec<Stage>,
    pub projector: Expression,
    pub result_operator: Option<ResultOperator>,
    pub paging: SkipLimitReducer,
    pub sort_open: bool,
}

impl PipelineExpression {
    pub fn new(root: Codec) -> Self {
        PipelineExpression {
            stages: vec![],
            projector: Expression::field(FieldPath::root(), root),
            result_operator: None,
            paging: SkipLimitReducer::default(),
            sort_open: false,
        }
    }

    /// Emits pending paging as `Skip`/`Limit` stages.
    pub fn flush_paging(mut self) -> Self {
        let paging = std::mem::take(&mut self.paging).finish();
        if let Some(skip) = paging.skip {
            self.stages.push(Stage::Skip(skip));
        }
        if let Some(limit) = paging.limit {
            self.stages.push(Stage::Limit(limit));
        }
        self
    }
}

/// A pipeline after finishing: every stage is final and the row shape is
/// described by the output codec.
#[derive(PartialEq, Debug, Clone)]
pub struct FinishedPipeline {
    pub stages: Vec<Stage>,
    pub output: OutputCodec,
    pub result_operator: Option<ResultOperatorKind>,
}
