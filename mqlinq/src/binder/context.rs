use crate::{
    binder::{
        dispatch::{self, Step},
        embedded::EmbeddedSequence,
        grouping::GroupingSequence,
        registry::OperatorRegistry,
        Error, Result,
    },
    codec::CodecRegistry,
    ir::{constant_folding, ArrayElemAt, Document, Expression, FieldPath, GetField},
    query::{Expr, MethodCall},
};
use mqlinq_datastructures::{
    scope_stack::ScopeStack, unique_linked_hash_map::UniqueLinkedHashMap,
};

/// Per-translation binding state: the registries, the range variables in
/// scope and the accumulator name counter. Never shared between
/// translations.
pub struct BindingContext<'a> {
    codecs: &'a CodecRegistry,
    operators: &'a OperatorRegistry,
    scopes: ScopeStack<String, Expression>,
    next_accumulator: usize,
}

impl<'a> BindingContext<'a> {
    pub fn new(codecs: &'a CodecRegistry, operators: &'a OperatorRegistry) -> Self {
        BindingContext {
            codecs,
            operators,
            scopes: ScopeStack::new(),
            next_accumulator: 0,
        }
    }

    pub fn codecs(&self) -> &'a CodecRegistry {
        self.codecs
    }

    pub fn operators(&self) -> &'a OperatorRegistry {
        self.operators
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    /// The number of accumulator names minted so far.
    pub fn accumulator_count(&self) -> usize {
        self.next_accumulator
    }

    pub fn next_accumulator_name(&mut self) -> String {
        let name = format!("__agg{}", self.next_accumulator);
        self.next_accumulator += 1;
        name
    }

    /// Runs `f` with `bindings` in scope. The scope is popped whether or not
    /// `f` succeeds.
    pub fn with_scope<T>(
        &mut self,
        bindings: Vec<(String, Expression)>,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.scopes.push_frame(bindings);
        let result = f(self);
        self.scopes.pop_frame();
        result
    }

    pub fn bind(&mut self, expr: &Expr) -> Result<Expression> {
        match expr {
            Expr::Constant { value, value_type } => {
                let codec = self
                    .codecs
                    .lookup(value_type)
                    .ok_or_else(|| Error::UnknownType(value_type.to_string()))?;
                Ok(Expression::constant(value.clone(), codec))
            }
            Expr::Parameter(name) => self
                .scopes
                .lookup(name)
                .cloned()
                .ok_or_else(|| Error::shape(expr)),
            Expr::Member { target, member } => {
                let target = self.bind(target)?;
                self.bind_member(target, member, expr)
            }
            Expr::Unary { op, operand } => Ok(constant_folding::unary(*op, self.bind(operand)?)),
            Expr::Binary { op, left, right } => {
                let left = self.bind(left)?;
                let right = self.bind(right)?;
                Ok(constant_folding::binary(*op, left, right))
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                let test = self.bind(test)?;
                let if_true = self.bind(if_true)?;
                let if_false = self.bind(if_false)?;
                Ok(constant_folding::conditional(test, if_true, if_false))
            }
            Expr::New { members } => {
                let mut fields = UniqueLinkedHashMap::new();
                for (name, member) in members {
                    let bound = self.bind(member)?;
                    fields
                        .insert(name.clone(), bound)
                        .map_err(|_| Error::shape(expr))?;
                }
                Ok(Expression::Document(Document { fields }))
            }
            Expr::Index { array, index } => {
                let array = self.bind(array)?;
                if !array.codec().is_array() {
                    return Err(Error::shape(expr));
                }
                let index = self.bind(index)?;
                Ok(Expression::ArrayElemAt(ArrayElemAt {
                    array: Box::new(array),
                    index: Box::new(index),
                }))
            }
            Expr::Call { source, call } => self.bind_call(source, call, expr),
            // lambdas are only meaningful as operator arguments
            Expr::Lambda { .. } => Err(Error::shape(expr)),
        }
    }

    fn bind_member(&mut self, target: Expression, member: &str, expr: &Expr) -> Result<Expression> {
        let unresolved = || Error::UnresolvedField {
            member: member.to_string(),
            expression: expr.to_string(),
        };
        match target {
            Expression::Document(d) => d.fields.get(&member.to_string()).cloned().ok_or_else(unresolved),
            Expression::Grouping(g) if member == "Key" => Ok(*g.key),
            Expression::Grouping(_) => Err(unresolved()),
            target => {
                let codec = target.codec();
                if codec.is_array() && matches!(member, "Length" | "Count") {
                    return Ok(Expression::Size(Box::new(target)));
                }
                let (element, member_codec) =
                    self.codecs.member(&codec, member).ok_or_else(unresolved)?;
                Ok(match target {
                    Expression::Field(f) => Expression::field(f.path.child(&element), member_codec),
                    Expression::ArrayItem(a) => Expression::field(
                        FieldPath::variable(&a.variable).child(&element),
                        member_codec,
                    ),
                    other => Expression::GetField(GetField {
                        input: Box::new(other),
                        field: element,
                        codec: member_codec,
                    }),
                })
            }
        }
    }

    /// Binds a sequence operator applied inside an expression: over a
    /// grouping it produces accumulators, over an array it produces
    /// embedded expression nodes.
    fn bind_call(&mut self, source: &Expr, call: &MethodCall, expr: &Expr) -> Result<Expression> {
        let kind = self.operators.lookup(call)?;
        let source = self.bind(source)?;
        match source {
            Expression::Grouping(g) => {
                match dispatch::bind_operator(self, GroupingSequence::new(g), kind, call)? {
                    Step::Sequence(s) => Ok(s.finish()),
                    Step::Terminal(e) => Ok(e),
                }
            }
            source if source.codec().is_array() => {
                let sequence = EmbeddedSequence::new(source, expr)?;
                match dispatch::bind_operator(self, sequence, kind, call)? {
                    Step::Sequence(s) => Ok(s.finish()),
                    Step::Terminal(e) => Ok(e),
                }
            }
            _ => Err(Error::shape(expr)),
        }
    }
}
