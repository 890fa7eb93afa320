use crate::{
    binder::{Error, Result},
    query::{MethodCall, ENUMERABLE, MONGO_QUERYABLE, QUERYABLE},
};
use std::collections::HashMap;

/// Every sequence operator the translator can bind.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum OperatorKind {
    Where,
    Select,
    SelectMany,
    GroupBy,
    Distinct,
    OrderBy,
    OrderByDescending,
    ThenBy,
    ThenByDescending,
    Skip,
    Take,
    Any,
    All,
    Contains,
    Count,
    LongCount,
    Sum,
    Average,
    Min,
    Max,
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Last,
    LastOrDefault,
    ElementAt,
    ElementAtOrDefault,
    Union,
    Except,
    Intersect,
    OfType,
    ToList,
    ToArray,
    AsQueryable,
}

#[derive(Debug, Clone, Copy)]
struct NameEntry {
    kind: OperatorKind,
    is_supported: fn(usize) -> bool,
}

fn none_or_one(argc: usize) -> bool {
    argc <= 1
}

fn one_to_three(argc: usize) -> bool {
    (1..=3).contains(&argc)
}

/// Resolves a method call to the operator that binds it. Built once and
/// read-only afterwards.
///
/// Operators with a single signature live in the exact table keyed by
/// `(declaring type, name, arity)`. Operators with optional arguments, such
/// as `Count()` and `Count(predicate)`, share one entry in the name table
/// with a predicate over the argument count.
#[derive(Debug, Clone)]
pub struct OperatorRegistry {
    exact: HashMap<(String, String, usize), OperatorKind>,
    by_name: HashMap<(String, String), NameEntry>,
}

pub fn build_registry() -> OperatorRegistry {
    OperatorRegistry::build()
}

impl OperatorRegistry {
    pub fn build() -> Self {
        use OperatorKind::*;
        let exact_signatures: &[(&str, usize, OperatorKind)] = &[
            ("Where", 1, Where),
            ("Select", 1, Select),
            ("SelectMany", 1, SelectMany),
            ("SelectMany", 2, SelectMany),
            ("Distinct", 0, Distinct),
            ("OrderBy", 1, OrderBy),
            ("OrderByDescending", 1, OrderByDescending),
            ("ThenBy", 1, ThenBy),
            ("ThenByDescending", 1, ThenByDescending),
            ("Skip", 1, Skip),
            ("Take", 1, Take),
            ("All", 1, All),
            ("Contains", 1, Contains),
            ("ElementAt", 1, ElementAt),
            ("ElementAtOrDefault", 1, ElementAtOrDefault),
            ("Union", 1, Union),
            ("Except", 1, Except),
            ("Intersect", 1, Intersect),
            ("OfType", 0, OfType),
        ];
        let named: &[(&str, OperatorKind, fn(usize) -> bool)] = &[
            ("Any", Any, none_or_one),
            ("Count", Count, none_or_one),
            ("LongCount", LongCount, none_or_one),
            ("Sum", Sum, none_or_one),
            ("Average", Average, none_or_one),
            ("Min", Min, none_or_one),
            ("Max", Max, none_or_one),
            ("First", First, none_or_one),
            ("FirstOrDefault", FirstOrDefault, none_or_one),
            ("Single", Single, none_or_one),
            ("SingleOrDefault", SingleOrDefault, none_or_one),
            ("Last", Last, none_or_one),
            ("LastOrDefault", LastOrDefault, none_or_one),
            ("GroupBy", GroupBy, one_to_three),
        ];

        let mut exact = HashMap::new();
        let mut by_name = HashMap::new();
        for declaring_type in [QUERYABLE, ENUMERABLE, MONGO_QUERYABLE] {
            for (name, arity, kind) in exact_signatures {
                exact.insert(
                    (declaring_type.to_string(), name.to_string(), *arity),
                    *kind,
                );
            }
            for (name, kind, is_supported) in named {
                by_name.insert(
                    (declaring_type.to_string(), name.to_string()),
                    NameEntry {
                        kind: *kind,
                        is_supported: *is_supported,
                    },
                );
            }
        }
        exact.insert((ENUMERABLE.to_string(), "ToList".to_string(), 0), ToList);
        exact.insert((ENUMERABLE.to_string(), "ToArray".to_string(), 0), ToArray);
        exact.insert(
            (QUERYABLE.to_string(), "AsQueryable".to_string(), 0),
            AsQueryable,
        );
        OperatorRegistry { exact, by_name }
    }

    pub fn lookup(&self, call: &MethodCall) -> Result<OperatorKind> {
        let method = &call.method;
        let exact_key = (
            method.declaring_type.clone(),
            method.name.clone(),
            call.arity(),
        );
        if let Some(kind) = self.exact.get(&exact_key) {
            return Ok(*kind);
        }
        let name_key = (method.declaring_type.clone(), method.name.clone());
        match self.by_name.get(&name_key) {
            Some(entry) if (entry.is_supported)(call.arity()) => Ok(entry.kind),
            _ => Err(Error::UnsupportedOperator {
                operator: method.name.clone(),
                declaring_type: method.declaring_type.clone(),
                expression: call.to_string(),
            }),
        }
    }
}
