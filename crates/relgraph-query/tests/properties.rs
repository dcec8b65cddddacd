//! Property tests over compiled output
//!
//! User-supplied values must only ever reach the database as bound
//! parameters, and compilation must be deterministic.

use proptest::prelude::*;
use relgraph_query::ast::{
    ComparisonOp, FieldRef, PredicateExpression, QueryAst, Traversal, ValueOperand,
    VariableLengthSpec,
};
use relgraph_query::dialect::Dialect;
use relgraph_query::{BoundParam, CompileOptions, QueryCompiler};
use serde_json::Value;

fn options(dialect: Dialect) -> CompileOptions {
    CompileOptions::new(dialect)
}

fn dialects() -> impl Strategy<Value = Dialect> {
    prop_oneof![Just(Dialect::Sqlite), Just(Dialect::Postgres)]
}

fn query(name: &str, age: i64, hops: i64) -> QueryAst {
    let traversal = Traversal::out("p", "e", "knows", "f", "Person");
    let traversal = if hops > 1 {
        traversal.variable_length(VariableLengthSpec::new(1, hops))
    } else {
        traversal
    };
    QueryAst::from_kind("p", "Person")
        .traverse(traversal)
        .filter("p", PredicateExpression::eq(FieldRef::prop("p", "name"), name))
        .filter(
            "f",
            PredicateExpression::compare(
                FieldRef::prop("f", "age"),
                ComparisonOp::Gte,
                ValueOperand::literal(age),
            ),
        )
}

fn placeholder_count(sql: &str, dialect: Dialect) -> usize {
    match dialect {
        Dialect::Sqlite => sql.matches('?').count(),
        Dialect::Postgres => sql.matches('$').count(),
    }
}

proptest! {
    #[test]
    fn compilation_is_deterministic(
        name in "[a-z]{1,12}",
        age in 0i64..120,
        hops in 1i64..6,
        dialect in dialects(),
    ) {
        let compiler = QueryCompiler::new(options(dialect));
        let ast = query(&name, age, hops);

        let first = compiler.compile(&ast, "g1").unwrap();
        let second = compiler.compile(&ast, "g1").unwrap();

        prop_assert_eq!(first.sql(), second.sql());
        prop_assert_eq!(first.params(), second.params());
    }

    #[test]
    fn values_are_bound_not_inlined(
        name in "[a-zA-Z' ;-]{8,24}",
        hops in 1i64..6,
        dialect in dialects(),
    ) {
        let compiled = QueryCompiler::new(options(dialect))
            .compile(&query(&name, 30, hops), "graph'; DROP TABLE nodes; --")
            .unwrap();

        prop_assert!(!compiled.sql().contains(&name));
        prop_assert!(!compiled.sql().contains("DROP TABLE"));
        prop_assert_eq!(
            placeholder_count(compiled.sql(), dialect),
            compiled.params().len()
        );
        let bound = BoundParam::Value { value: Value::String(name.clone()) };
        prop_assert!(compiled.params().contains(&bound));
    }

    #[test]
    fn postgres_placeholders_are_numbered_in_order(
        name in "[a-z]{1,8}",
        hops in 1i64..6,
    ) {
        let compiled = QueryCompiler::new(options(Dialect::Postgres))
            .compile(&query(&name, 1, hops), "g1")
            .unwrap();

        let mut expected = 1;
        let sql = compiled.sql();
        for (index, _) in sql.match_indices('$') {
            let digits: String = sql[index + 1..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            prop_assert_eq!(digits.parse::<usize>().unwrap(), expected);
            expected += 1;
        }
        prop_assert_eq!(expected - 1, compiled.params().len());
    }
}
