//! PostgreSQL dialect (jsonb + pgvector).

use super::{
    ensure_metric, Dialect, DialectAdapter, DialectCapabilities, ExtractAs,
    RecursiveQueryStrategy, SetOperationStrategy, StandardQueryStrategy, VectorStrategy,
};
use crate::ast::{ValueType, VectorMetric};
use crate::error::CompileResult;
use crate::json_pointer::JsonPointer;
use crate::sql::{sql, ParamTransform, Sql};
use serde_json::Value;

static CAPABILITIES: DialectCapabilities = DialectCapabilities {
    standard_query_strategy: StandardQueryStrategy::CteChain,
    recursive_query_strategy: RecursiveQueryStrategy::SingleRecursiveMember,
    set_operation_strategy: SetOperationStrategy::ParenthesizedBranches,
    materialize_intermediate_ctes: true,
    force_recursive_join_order: false,
    vector_strategy: VectorStrategy::PgVector,
    vector_metrics: &[VectorMetric::Cosine, VectorMetric::L2, VectorMetric::InnerProduct],
};

/// PostgreSQL adapter.
///
/// Props are `jsonb`; paths use `#>`/`#>>` with text-array literals and
/// recursive paths are `text[]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    fn path_text(pointer: &JsonPointer) -> String {
        let elements: Vec<String> = pointer
            .segments()
            .iter()
            .map(|segment| array_element(segment))
            .collect();
        format!("{{{}}}", elements.join(","))
    }

    /// `?::<type>` cast so jsonb builders know the parameter type.
    fn typed(value: Sql, value_type: ValueType) -> Sql {
        let cast = match value_type {
            ValueType::Number => "::numeric",
            ValueType::Boolean => "::boolean",
            ValueType::String
            | ValueType::Date
            | ValueType::Unknown
            | ValueType::Array
            | ValueType::Object
            | ValueType::Embedding => "::text",
        };
        sql![value, cast]
    }

    fn raw(&self, column: &Sql, pointer: &JsonPointer) -> Sql {
        sql!["(", column, " #> ", self.json_path(pointer), ")"]
    }
}

/// Element of a text-array literal, quoted when it contains syntax
/// characters.
fn array_element(segment: &str) -> String {
    let needs_quotes = segment.is_empty()
        || segment.eq_ignore_ascii_case("null")
        || segment
            .chars()
            .any(|c| matches!(c, ',' | '{' | '}' | '"' | '\\') || c.is_whitespace());
    if !needs_quotes {
        return segment.to_string();
    }
    let mut out = String::with_capacity(segment.len() + 2);
    out.push('"');
    for c in segment.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

impl DialectAdapter for PostgresDialect {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn name(&self) -> &'static str {
        "postgres"
    }

    fn capabilities(&self) -> &DialectCapabilities {
        &CAPABILITIES
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn json_path(&self, pointer: &JsonPointer) -> Sql {
        Sql::string_literal(&Self::path_text(pointer))
    }

    fn json_extract(&self, column: &Sql, pointer: &JsonPointer, extract: ExtractAs) -> Sql {
        let text = sql!["(", column, " #>> ", self.json_path(pointer), ")"];
        match extract {
            ExtractAs::Text => text,
            ExtractAs::Number => sql![text, "::numeric"],
            ExtractAs::Boolean => sql![text, "::boolean"],
            ExtractAs::Date => sql![text, "::timestamptz"],
            ExtractAs::Raw => self.raw(column, pointer),
        }
    }

    fn array_length(&self, column: &Sql, pointer: &JsonPointer) -> Sql {
        let raw = self.raw(column, pointer);
        sql![
            "(CASE WHEN jsonb_typeof(",
            &raw,
            ") = 'array' THEN jsonb_array_length(",
            &raw,
            ") END)"
        ]
    }

    fn array_contains(
        &self,
        column: &Sql,
        pointer: &JsonPointer,
        value: Sql,
        value_type: ValueType,
    ) -> Sql {
        sql![
            self.raw(column, pointer),
            " @> jsonb_build_array(",
            Self::typed(value, value_type),
            ")"
        ]
    }

    fn array_contains_all(
        &self,
        column: &Sql,
        pointer: &JsonPointer,
        values: Vec<Sql>,
        value_type: ValueType,
    ) -> Sql {
        let elements = values.into_iter().map(|v| Self::typed(v, value_type));
        sql![
            self.raw(column, pointer),
            " @> jsonb_build_array(",
            Sql::join(elements, ", "),
            ")"
        ]
    }

    fn object_has_path(&self, column: &Sql, pointer: &JsonPointer) -> Sql {
        sql![self.raw(column, pointer), " IS NOT NULL"]
    }

    fn object_path_is_null(&self, column: &Sql, pointer: &JsonPointer, negated: bool) -> Sql {
        let raw = self.raw(column, pointer);
        if negated {
            sql!["(", &raw, " IS NOT NULL AND jsonb_typeof(", &raw, ") <> 'null')"]
        } else {
            sql!["(", &raw, " IS NULL OR jsonb_typeof(", &raw, ") = 'null')"]
        }
    }

    fn ilike(&self, lhs: Sql, pattern: Sql) -> Sql {
        sql![lhs, " ILIKE ", pattern, " ESCAPE '\\'"]
    }

    fn like(&self, lhs: Sql, pattern: Sql) -> Sql {
        sql![lhs, " LIKE ", pattern]
    }

    fn like_pattern_transform(&self) -> ParamTransform {
        ParamTransform::Identity
    }

    fn path_init(&self, id: Sql) -> Sql {
        sql!["ARRAY[", id, "]"]
    }

    fn path_extend(&self, path: Sql, id: Sql) -> Sql {
        sql![path, " || ", id]
    }

    fn cycle_check(&self, path: Sql, id: Sql) -> Sql {
        sql![id, " <> ALL(", path, ")"]
    }

    fn current_timestamp(&self) -> Sql {
        Sql::raw("NOW()")
    }

    fn bind_value(&self, value: Value) -> Value {
        value
    }

    fn vector_distance(&self, column: Sql, query: Sql, metric: VectorMetric) -> CompileResult<Sql> {
        ensure_metric(self, metric)?;
        let operator = match metric {
            VectorMetric::Cosine => " <=> ",
            VectorMetric::L2 => " <-> ",
            VectorMetric::InnerProduct => " <#> ",
        };
        Ok(sql!["(", column, operator, query, "::vector)"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn render(fragment: Sql) -> String {
        fragment.render_inline(&PostgresDialect)
    }

    #[test_case("/age", "'{age}'" ; "single key")]
    #[test_case("/address/city", "'{address,city}'" ; "nested")]
    #[test_case("/tags/0", "'{tags,0}'" ; "array index")]
    #[test_case("/first name", "'{\"first name\"}'" ; "whitespace quoted")]
    #[test_case("/a,b", "'{\"a,b\"}'" ; "comma quoted")]
    #[test_case("", "'{}'" ; "root")]
    fn test_json_paths(pointer: &str, expected: &str) {
        let pointer = JsonPointer::parse(pointer).unwrap();
        assert_eq!(render(PostgresDialect.json_path(&pointer)), expected);
    }

    #[test]
    fn test_typed_extraction() {
        let column = Sql::raw("n.props");
        let pointer = JsonPointer::from_segments(["age"]);
        assert_eq!(
            render(PostgresDialect.json_extract(&column, &pointer, ExtractAs::Number)),
            "(n.props #>> '{age}')::numeric"
        );
        assert_eq!(
            render(PostgresDialect.json_extract(&column, &pointer, ExtractAs::Text)),
            "(n.props #>> '{age}')"
        );
        assert_eq!(
            render(PostgresDialect.json_extract(&column, &pointer, ExtractAs::Raw)),
            "(n.props #> '{age}')"
        );
    }

    #[test]
    fn test_array_contains_all() {
        let column = Sql::raw("n.props");
        let pointer = JsonPointer::from_segments(["tags"]);
        let fragment = PostgresDialect.array_contains_all(
            &column,
            &pointer,
            vec![Sql::param("a"), Sql::param("b")],
            ValueType::String,
        );
        assert_eq!(
            render(fragment),
            "(n.props #> '{tags}') @> jsonb_build_array('a'::text, 'b'::text)"
        );
    }

    #[test]
    fn test_cycle_helpers() {
        let d = PostgresDialect;
        assert_eq!(render(d.path_init(Sql::raw("n.id"))), "ARRAY[n.id]");
        assert_eq!(render(d.path_extend(Sql::raw("r.path"), Sql::raw("n.id"))), "r.path || n.id");
        assert_eq!(
            render(d.cycle_check(Sql::raw("r.path"), Sql::raw("n.id"))),
            "n.id <> ALL(r.path)"
        );
    }

    #[test_case(VectorMetric::Cosine, "(emb.embedding <=> '[1,0]'::vector)")]
    #[test_case(VectorMetric::L2, "(emb.embedding <-> '[1,0]'::vector)")]
    #[test_case(VectorMetric::InnerProduct, "(emb.embedding <#> '[1,0]'::vector)")]
    fn test_vector_operators(metric: VectorMetric, expected: &str) {
        let fragment = PostgresDialect
            .vector_distance(Sql::raw("emb.embedding"), Sql::param("[1,0]"), metric)
            .unwrap();
        assert_eq!(render(fragment), expected);
    }

    #[test]
    fn test_ilike_is_native() {
        let fragment = PostgresDialect.ilike(Sql::raw("n.name"), Sql::param("%ada%"));
        assert_eq!(render(fragment), "n.name ILIKE '%ada%' ESCAPE '\\'");
    }
}
