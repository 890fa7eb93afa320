macro_rules! test_codegen_expr {
    ($func_name:ident, expected = $expected:expr, input = $input:expr) => {
        #[test]
        fn $func_name() {
            use crate::codegen::MqlCodeGenerator;
            let expected = $expected;
            let input = $input;

            let gen = MqlCodeGenerator::new(true);
            assert_eq!(expected, gen.codegen_expression(&input));
        }
    };
}

macro_rules! test_codegen_stage {
    ($func_name:ident, expected = $expected:expr, input = $input:expr, match_language = $ml:expr) => {
        #[test]
        fn $func_name() {
            use crate::codegen::MqlCodeGenerator;
            let expected = $expected;
            let input = $input;

            let gen = MqlCodeGenerator::new($ml);
            assert_eq!(expected, gen.codegen_stage(&input));
        }
    };
    ($func_name:ident, expected = $expected:expr, input = $input:expr) => {
        test_codegen_stage!($func_name, expected = $expected, input = $input, match_language = true);
    };
}

fn int_field(name: &str) -> crate::ir::Expression {
    crate::ir::Expression::field(crate::ir::FieldPath::field(name), crate::codec::Codec::int32())
}

mod constants {
    use crate::{codec::Codec, ir::Expression};
    use bson::{bson, doc, Bson};

    test_codegen_expr!(
        number_is_raw,
        expected = Ok(Bson::Int32(42)),
        input = Expression::constant(42, Codec::int32())
    );

    test_codegen_expr!(
        null_is_raw,
        expected = Ok(Bson::Null),
        input = Expression::constant(Bson::Null, Codec::Dynamic)
    );

    test_codegen_expr!(
        string_is_literal,
        expected = Ok(bson!({"$literal": "$notAField"})),
        input = Expression::constant("$notAField", Codec::string())
    );

    test_codegen_expr!(
        document_is_literal,
        expected = Ok(bson!({"$literal": {"$gt": 1}})),
        input = Expression::constant(doc! {"$gt": 1}, Codec::Dynamic)
    );
}

mod fields {
    use super::int_field;
    use crate::{
        codec::Codec,
        codegen::Error,
        ir::{Expression, FieldPath, Filter},
        query::BinaryOp,
    };
    use bson::{bson, Bson};

    test_codegen_expr!(
        root,
        expected = Ok(Bson::String("$$ROOT".to_string())),
        input = Expression::field(FieldPath::root(), Codec::Dynamic)
    );

    test_codegen_expr!(
        nested,
        expected = Ok(Bson::String("$a.b".to_string())),
        input = Expression::field(FieldPath::field("a").child("b"), Codec::int32())
    );

    test_codegen_expr!(
        variable_outside_scope,
        expected = Err(Error::UnboundVariable("x".to_string())),
        input = Expression::field(FieldPath::variable("x"), Codec::int32())
    );

    test_codegen_expr!(
        variable_inside_filter,
        expected = Ok(bson!({"$filter": {
            "input": "$scores",
            "as": "x",
            "cond": {"$gt": ["$$x", 5]},
        }})),
        input = Expression::Filter(Filter {
            input: Box::new(Expression::field(
                FieldPath::field("scores"),
                Codec::array_of(Codec::int32())
            )),
            variable: "x".to_string(),
            condition: Box::new(Expression::binary(
                BinaryOp::Gt,
                Expression::field(FieldPath::variable("x"), Codec::int32()),
                Expression::constant(5, Codec::int32()),
            )),
        })
    );

    test_codegen_expr!(
        logical_chain_is_flattened,
        expected = Ok(bson!({"$and": [
            {"$eq": ["$a", 1]},
            {"$eq": ["$b", 2]},
            {"$eq": ["$c", 3]},
        ]})),
        input = Expression::binary(
            BinaryOp::And,
            Expression::binary(
                BinaryOp::And,
                Expression::binary(BinaryOp::Eq, int_field("a"), Expression::constant(1, Codec::int32())),
                Expression::binary(BinaryOp::Eq, int_field("b"), Expression::constant(2, Codec::int32())),
            ),
            Expression::binary(BinaryOp::Eq, int_field("c"), Expression::constant(3, Codec::int32())),
        )
    );
}

mod arrays {
    use crate::{
        codec::Codec,
        codegen::Error,
        ir::{
            Expression, FieldPath, Slice, SortArray, SortArrayKey, SortDirection,
        },
    };
    use bson::bson;

    fn scores() -> Box<Expression> {
        Box::new(Expression::field(
            FieldPath::field("scores"),
            Codec::array_of(Codec::int32()),
        ))
    }

    test_codegen_expr!(
        slice_limit_only,
        expected = Ok(bson!({"$slice": ["$scores", 3]})),
        input = Expression::Slice(Slice {
            array: scores(),
            skip: None,
            limit: Some(3),
        })
    );

    test_codegen_expr!(
        slice_skip_and_limit,
        expected = Ok(bson!({"$slice": ["$scores", 2, 3]})),
        input = Expression::Slice(Slice {
            array: scores(),
            skip: Some(2),
            limit: Some(3),
        })
    );

    test_codegen_expr!(
        slice_skip_only,
        expected = Ok(bson!({"$slice": ["$scores", 2, i32::MAX]})),
        input = Expression::Slice(Slice {
            array: scores(),
            skip: Some(2),
            limit: None,
        })
    );

    test_codegen_expr!(
        sort_array_by_item,
        expected = Ok(bson!({"$sortArray": {"input": "$scores", "sortBy": -1}})),
        input = Expression::SortArray(SortArray {
            input: scores(),
            keys: vec![SortArrayKey {
                path: None,
                direction: SortDirection::Descending,
            }],
        })
    );

    test_codegen_expr!(
        sort_array_mixed_keys,
        expected = Err(Error::InvalidSortKey(format!(
            "{:?}",
            SortArray {
                input: scores(),
                keys: vec![
                    SortArrayKey {
                        path: Some("a".to_string()),
                        direction: SortDirection::Ascending,
                    },
                    SortArrayKey {
                        path: None,
                        direction: SortDirection::Ascending,
                    },
                ],
            }
        ))),
        input = Expression::SortArray(SortArray {
            input: scores(),
            keys: vec![
                SortArrayKey {
                    path: Some("a".to_string()),
                    direction: SortDirection::Ascending,
                },
                SortArrayKey {
                    path: None,
                    direction: SortDirection::Ascending,
                },
            ],
        })
    );
}

mod unresolved {
    use crate::{
        codec::Codec,
        codegen::Error,
        ir::{Accumulator, AccumulatorKind, Expression, FieldPath, GroupId},
    };

    test_codegen_expr!(
        accumulator_without_group,
        expected = Err(Error::UnattachedAccumulator("__agg0".to_string())),
        input = Expression::Accumulator(Accumulator {
            group: GroupId(0),
            kind: AccumulatorKind::Sum,
            source: Box::new(Expression::field(FieldPath::field("a"), Codec::int32())),
            output_field: "__agg0".to_string(),
            codec: Codec::int32(),
        })
    );
}

mod stages {
    use super::int_field;
    use crate::{
        codec::Codec,
        codegen::Error,
        ir::{
            Accumulator, AccumulatorKind, Expression, FieldPath, Group, GroupId, In, SortDirection,
            SortKey, Stage,
        },
        query::{BinaryOp, UnaryOp},
    };
    use bson::{doc, Bson};

    test_codegen_stage!(
        skip_is_int64,
        expected = Ok(doc! {"$skip": Bson::Int64(10)}),
        input = Stage::Skip(10)
    );

    test_codegen_stage!(
        limit_is_int64,
        expected = Ok(doc! {"$limit": Bson::Int64(0)}),
        input = Stage::Limit(0)
    );

    test_codegen_stage!(
        unwind,
        expected = Ok(doc! {"$unwind": "$tags"}),
        input = Stage::Unwind(FieldPath::field("tags"))
    );

    test_codegen_stage!(
        sort,
        expected = Ok(doc! {"$sort": {"a": 1, "b.c": -1}}),
        input = Stage::Sort(vec![
            SortKey {
                key: int_field("a"),
                direction: SortDirection::Ascending,
            },
            SortKey {
                key: Expression::field(FieldPath::field("b").child("c"), Codec::int32()),
                direction: SortDirection::Descending,
            },
        ])
    );

    test_codegen_stage!(
        sort_by_computed_value,
        expected = Err(Error::InvalidSortKey(format!("{:?}", Expression::constant(1, Codec::int32())))),
        input = Stage::Sort(vec![SortKey {
            key: Expression::constant(1, Codec::int32()),
            direction: SortDirection::Ascending,
        }])
    );

    test_codegen_stage!(
        project_document_hides_id,
        expected = Ok(doc! {"$project": {"_id": 0, "Name": "$name"}}),
        input = Stage::Project(Expression::Document(crate::ir::Document {
            fields: mqlinq_datastructures::unique_linked_hash_map::UniqueLinkedHashMap::try_from_iter(
                vec![("Name".to_string(), Expression::field(FieldPath::field("name"), Codec::string()))]
            )
            .unwrap(),
        }))
    );

    test_codegen_stage!(
        project_document_keeps_id,
        expected = Ok(doc! {"$project": {"_id": "$_id", "Name": "$name"}}),
        input = Stage::Project(Expression::Document(crate::ir::Document {
            fields: mqlinq_datastructures::unique_linked_hash_map::UniqueLinkedHashMap::try_from_iter(
                vec![
                    ("_id".to_string(), Expression::field(FieldPath::field("_id"), Codec::Dynamic)),
                    ("Name".to_string(), Expression::field(FieldPath::field("name"), Codec::string())),
                ]
            )
            .unwrap(),
        }))
    );

    test_codegen_stage!(
        project_scalar,
        expected = Ok(doc! {"$project": {"_id": 0, "_v": "$age"}}),
        input = Stage::Project(int_field("age"))
    );

    test_codegen_stage!(
        group_count_is_sum,
        expected = Ok(doc! {"$group": {"_id": "$city", "__agg0": {"$sum": 1}}}),
        input = Stage::Group(Group {
            id: Expression::field(FieldPath::field("city"), Codec::string()),
            accumulators: vec![Accumulator {
                group: GroupId(0),
                kind: AccumulatorKind::Count,
                source: Box::new(Expression::constant(1, Codec::int32())),
                output_field: "__agg0".to_string(),
                codec: Codec::int32(),
            }],
        })
    );

    test_codegen_stage!(
        match_comparison,
        expected = Ok(doc! {"$match": {"age": {"$gt": 21}}}),
        input = Stage::Match(Expression::binary(
            BinaryOp::Gt,
            int_field("age"),
            Expression::constant(21, Codec::int32())
        ))
    );

    test_codegen_stage!(
        match_flipped_comparison,
        expected = Ok(doc! {"$match": {"age": {"$gt": 21}}}),
        input = Stage::Match(Expression::binary(
            BinaryOp::Lt,
            Expression::constant(21, Codec::int32()),
            int_field("age"),
        ))
    );

    test_codegen_stage!(
        match_less_than_stays_expression,
        expected = Ok(doc! {"$match": {"$expr": {"$lt": ["$age", 21]}}}),
        input = Stage::Match(Expression::binary(
            BinaryOp::Lt,
            int_field("age"),
            Expression::constant(21, Codec::int32())
        ))
    );

    test_codegen_stage!(
        match_flipped_to_less_than_stays_expression,
        expected = Ok(doc! {"$match": {"$expr": {"$gte": [21, "$age"]}}}),
        input = Stage::Match(Expression::binary(
            BinaryOp::Gte,
            Expression::constant(21, Codec::int32()),
            int_field("age"),
        ))
    );

    test_codegen_stage!(
        match_null_equality_stays_expression,
        expected = Ok(doc! {"$match": {"$expr": {"$eq": ["$name", null]}}}),
        input = Stage::Match(Expression::binary(
            BinaryOp::Eq,
            Expression::field(FieldPath::field("name"), Codec::string()),
            Expression::constant(Bson::Null, Codec::Dynamic),
        ))
    );

    test_codegen_stage!(
        match_in_with_null_stays_expression,
        expected = Ok(doc! {"$match": {"$expr": {"$in": ["$age", {"$literal": [1, null]}]}}}),
        input = Stage::Match(Expression::In(In {
            value: Box::new(int_field("age")),
            array: Box::new(Expression::constant(
                vec![Bson::Int32(1), Bson::Null],
                Codec::array_of(Codec::int32())
            )),
        }))
    );

    test_codegen_stage!(
        match_equality_is_implicit,
        expected = Ok(doc! {"$match": {"name": "bob"}}),
        input = Stage::Match(Expression::binary(
            BinaryOp::Eq,
            Expression::field(FieldPath::field("name"), Codec::string()),
            Expression::constant("bob", Codec::string()),
        ))
    );

    test_codegen_stage!(
        match_document_equality_uses_eq,
        expected = Ok(doc! {"$match": {"address": {"$eq": {"city": "Oslo"}}}}),
        input = Stage::Match(Expression::binary(
            BinaryOp::Eq,
            Expression::field(FieldPath::field("address"), Codec::Dynamic),
            Expression::constant(doc! {"city": "Oslo"}, Codec::Dynamic),
        ))
    );

    test_codegen_stage!(
        match_falls_back_per_conjunct,
        expected = Ok(doc! {"$match": {"$and": [
            {"age": {"$gte": 18}},
            {"$expr": {"$gt": ["$a", "$b"]}},
        ]}}),
        input = Stage::Match(Expression::binary(
            BinaryOp::And,
            Expression::binary(BinaryOp::Gte, int_field("age"), Expression::constant(18, Codec::int32())),
            Expression::binary(BinaryOp::Gt, int_field("a"), int_field("b")),
        ))
    );

    test_codegen_stage!(
        match_or_needs_both_sides,
        expected = Ok(doc! {"$match": {"$expr": {"$or": [
            {"$eq": ["$age", 1]},
            {"$gt": ["$a", "$b"]},
        ]}}}),
        input = Stage::Match(Expression::binary(
            BinaryOp::Or,
            Expression::binary(BinaryOp::Eq, int_field("age"), Expression::constant(1, Codec::int32())),
            Expression::binary(BinaryOp::Gt, int_field("a"), int_field("b")),
        ))
    );

    test_codegen_stage!(
        match_not_is_nor,
        expected = Ok(doc! {"$match": {"$nor": [{"active": true}]}}),
        input = Stage::Match(Expression::Unary(crate::ir::Unary {
            op: UnaryOp::Not,
            operand: Box::new(Expression::field(FieldPath::field("active"), Codec::boolean())),
        }))
    );

    test_codegen_stage!(
        match_in_constant_array,
        expected = Ok(doc! {"$match": {"age": {"$in": [1, 2]}}}),
        input = Stage::Match(Expression::In(In {
            value: Box::new(int_field("age")),
            array: Box::new(Expression::constant(
                vec![Bson::Int32(1), Bson::Int32(2)],
                Codec::array_of(Codec::int32())
            )),
        }))
    );

    test_codegen_stage!(
        match_expression_language,
        expected = Ok(doc! {"$match": {"$expr": {"$gt": ["$age", 21]}}}),
        input = Stage::Match(Expression::binary(
            BinaryOp::Gt,
            int_field("age"),
            Expression::constant(21, Codec::int32())
        )),
        match_language = false
    );
}

mod finish {
    use crate::{
        codec::{Codec, OutputCodec},
        codegen::finish_pipeline,
        ir::{Expression, FieldPath, PipelineExpression, Stage},
    };

    #[test]
    fn root_projector_adds_no_stage() {
        let finished = finish_pipeline(PipelineExpression::new(Codec::Dynamic));
        assert!(finished.stages.is_empty());
        assert_eq!(OutputCodec::Document(Codec::Dynamic), finished.output);
    }

    #[test]
    fn scalar_projector_is_read_from_value_field() {
        let mut pipeline = PipelineExpression::new(Codec::Dynamic);
        pipeline.projector = Expression::field(FieldPath::field("age"), Codec::int32());
        pipeline.paging = pipeline.paging.take(5);
        let finished = finish_pipeline(pipeline);
        assert_eq!(
            vec![
                Stage::Limit(5),
                Stage::Project(Expression::field(FieldPath::field("age"), Codec::int32())),
            ],
            finished.stages
        );
        assert_eq!(
            OutputCodec::Value {
                field: "_v".to_string(),
                codec: Codec::int32()
            },
            finished.output
        );
    }
}
