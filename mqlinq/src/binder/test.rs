use crate::{
    binder::{bind_query, registry::OperatorKind, BindingContext, Error},
    build_registry,
    codec::Codec,
    ir::{Expression, FieldPath, Filter, Stage},
    query::{BinaryOp, Expr, MethodCall, ValueType},
    test::fixtures::*,
};

macro_rules! test_bind_expr {
    ($func_name:ident, expected = $expected:expr, input = $input:expr $(, scope = $scope:expr)?) => {
        #[test]
        fn $func_name() {
            let codecs = codecs();
            let operators = build_registry();
            let mut cx = BindingContext::new(&codecs, &operators);
            #[allow(unused_mut, unused_assignments)]
            let mut bindings: Vec<(String, Expression)> = vec![];
            $(bindings = $scope(&codecs);)?
            let input = $input;

            let actual = cx.with_scope(bindings, |cx| cx.bind(&input));
            assert_eq!($expected, actual);
            assert_eq!(0, cx.scope_depth());
        }
    };
}

fn person_in_scope(codecs: &crate::codec::CodecRegistry) -> Vec<(String, Expression)> {
    let person = codecs
        .lookup(&ValueType::document("Person"))
        .expect("Person is registered");
    vec![("x".to_string(), Expression::field(FieldPath::root(), person))]
}

mod bind {
    use super::*;

    test_bind_expr!(
        member_resolves_element_name,
        expected = Ok(Expression::field(FieldPath::field("age"), Codec::int32())),
        input = x("Age"),
        scope = person_in_scope
    );

    test_bind_expr!(
        unknown_member,
        expected = Err(Error::UnresolvedField {
            member: "Salary".to_string(),
            expression: "x.Salary".to_string(),
        }),
        input = x("Salary"),
        scope = person_in_scope
    );

    test_bind_expr!(
        parameter_out_of_scope,
        expected = Err(Error::UnsupportedQueryShape("x".to_string())),
        input = Expr::param("x")
    );

    test_bind_expr!(
        lambda_outside_operator,
        expected = Err(Error::UnsupportedQueryShape("y => y".to_string())),
        input = lambda("y", Expr::param("y")),
        scope = person_in_scope
    );

    test_bind_expr!(
        constants_fold,
        expected = Ok(Expression::constant(7, Codec::int32())),
        input = Expr::binary(BinaryOp::Add, Expr::int(3), Expr::int(4))
    );

    test_bind_expr!(
        embedded_where_filters_items,
        expected = Ok(Expression::Filter(Filter {
            input: Box::new(Expression::field(
                FieldPath::field("scores"),
                Codec::array_of(Codec::int32())
            )),
            variable: "s".to_string(),
            condition: Box::new(Expression::binary(
                BinaryOp::Gt,
                Expression::ArrayItem(crate::ir::ArrayItem {
                    array: Box::new(Expression::field(
                        FieldPath::field("scores"),
                        Codec::array_of(Codec::int32())
                    )),
                    variable: "s".to_string(),
                    codec: Codec::int32(),
                }),
                Expression::constant(5, Codec::int32()),
            )),
        })),
        input = x("Scores").call(enumerable(
            "Where",
            vec![lambda("s", Expr::binary(BinaryOp::Gt, Expr::param("s"), Expr::int(5)))]
        )),
        scope = person_in_scope
    );

    test_bind_expr!(
        call_on_scalar_is_a_shape_error,
        expected = Err(Error::UnsupportedQueryShape("x.Age.Count()".to_string())),
        input = x("Age").call(enumerable("Count", vec![])),
        scope = person_in_scope
    );

    test_bind_expr!(
        single_is_not_embedded,
        expected = Err(Error::UnsupportedQueryShape("Single()".to_string())),
        input = x("Scores").call(enumerable("Single", vec![])),
        scope = person_in_scope
    );

    test_bind_expr!(
        scope_is_popped_after_failed_lambda,
        expected = Err(Error::UnresolvedField {
            member: "Missing".to_string(),
            expression: "p.Missing".to_string(),
        }),
        input = x("Pets").call(enumerable(
            "Where",
            vec![lambda("p", Expr::param("p").member("Missing"))]
        )),
        scope = person_in_scope
    );
}

mod registry {
    use super::*;

    #[test]
    fn exact_signature() {
        let registry = build_registry();
        assert_eq!(
            Ok(OperatorKind::Where),
            registry.lookup(&queryable("Where", vec![lambda("x", x("IsActive"))]))
        );
    }

    #[test]
    fn falls_back_to_name_table() {
        let registry = build_registry();
        assert_eq!(
            Ok(OperatorKind::Count),
            registry.lookup(&queryable("Count", vec![]))
        );
        assert_eq!(
            Ok(OperatorKind::Count),
            registry.lookup(&queryable("Count", vec![lambda("x", x("IsActive"))]))
        );
    }

    #[test]
    fn name_table_checks_argument_count() {
        let registry = build_registry();
        let call = queryable("Count", vec![Expr::int(1), Expr::int(2)]);
        assert_eq!(
            Err(Error::UnsupportedOperator {
                operator: "Count".to_string(),
                declaring_type: "Queryable".to_string(),
                expression: call.to_string(),
            }),
            registry.lookup(&call)
        );
    }

    #[test]
    fn declaring_type_is_part_of_the_key() {
        let registry = build_registry();
        assert_eq!(
            Ok(OperatorKind::ToList),
            registry.lookup(&enumerable("ToList", vec![]))
        );
        assert!(registry.lookup(&queryable("ToList", vec![])).is_err());
        assert_eq!(
            Ok(OperatorKind::Where),
            registry.lookup(&MethodCall::new(
                crate::query::MONGO_QUERYABLE,
                "Where",
                vec![lambda("x", x("IsActive"))]
            ))
        );
    }
}

mod query {
    use super::*;

    #[test]
    fn select_replaces_projector_without_stage() {
        let codecs = codecs();
        let operators = build_registry();
        let mut cx = BindingContext::new(&codecs, &operators);
        let model = people().clause(queryable("Select", vec![lambda("x", x("Name"))]));
        let pipeline = bind_query(&mut cx, &model).unwrap();
        assert!(pipeline.stages.is_empty());
        assert_eq!(
            Expression::field(FieldPath::field("name"), Codec::string()),
            pipeline.projector
        );
    }

    #[test]
    fn group_by_mints_accumulator_names_in_order() {
        let codecs = codecs();
        let operators = build_registry();
        let mut cx = BindingContext::new(&codecs, &operators);
        let model = people().clause(queryable(
            "GroupBy",
            vec![
                lambda("x", x("City")),
                Expr::lambda(
                    &["k", "g"],
                    Expr::new_object(vec![
                        ("Min", Expr::param("g").call(enumerable("Min", vec![lambda("p", Expr::param("p").member("Age"))]))),
                        ("Max", Expr::param("g").call(enumerable("Max", vec![lambda("p", Expr::param("p").member("Age"))]))),
                    ]),
                ),
            ],
        ));
        let pipeline = bind_query(&mut cx, &model).unwrap();
        assert_eq!(2, cx.accumulator_count());
        assert!(matches!(pipeline.stages.as_slice(), [Stage::Group(_)]));
        match pipeline.projector {
            Expression::Document(d) => {
                let names = d
                    .fields
                    .values()
                    .map(|e| match e {
                        Expression::Accumulator(a) => a.output_field.clone(),
                        other => panic!("unexpected member {other:?}"),
                    })
                    .collect::<Vec<_>>();
                assert_eq!(vec!["__agg0", "__agg1"], names);
            }
            other => panic!("unexpected projector {other:?}"),
        }
    }

    #[test]
    fn failed_bind_leaves_no_scope() {
        let codecs = codecs();
        let operators = build_registry();
        let mut cx = BindingContext::new(&codecs, &operators);
        let model = people().clause(queryable(
            "Where",
            vec![lambda(
                "x",
                x("Pets").call(enumerable(
                    "Any",
                    vec![lambda("p", Expr::param("p").member("Missing"))],
                )),
            )],
        ));
        assert!(bind_query(&mut cx, &model).is_err());
        assert_eq!(0, cx.scope_depth());
    }
}
