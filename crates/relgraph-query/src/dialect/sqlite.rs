//! SQLite dialect (JSON1 + sqlite-vec).

use super::{
    clamp_i64, ensure_metric, Dialect, DialectAdapter, DialectCapabilities, ExtractAs,
    RecursiveQueryStrategy, SetOperationStrategy, StandardQueryStrategy, VectorStrategy,
};
use crate::ast::{ValueType, VectorMetric};
use crate::error::CompileResult;
use crate::json_pointer::{is_array_index, JsonPointer};
use crate::sql::{sql, ParamTransform, Sql};
use serde_json::Value;

static CAPABILITIES: DialectCapabilities = DialectCapabilities {
    standard_query_strategy: StandardQueryStrategy::CteChain,
    recursive_query_strategy: RecursiveQueryStrategy::RecursiveCte,
    set_operation_strategy: SetOperationStrategy::FlattenCtes,
    materialize_intermediate_ctes: false,
    force_recursive_join_order: true,
    vector_strategy: VectorStrategy::SqliteVec,
    vector_metrics: &[VectorMetric::Cosine, VectorMetric::L2],
};

/// SQLite adapter.
///
/// Booleans bind as `0`/`1`, recursive paths are `|`-delimited strings and
/// vector search goes through sqlite-vec's `vec_distance_*` functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    fn path_text(pointer: &JsonPointer) -> String {
        let mut path = String::from("$");
        for segment in pointer.segments() {
            if is_array_index(segment) {
                path.push('[');
                path.push_str(segment);
                path.push(']');
            } else if is_plain_key(segment) {
                path.push('.');
                path.push_str(segment);
            } else {
                path.push_str(".\"");
                path.push_str(segment);
                path.push('"');
            }
        }
        path
    }

    fn json_type(&self, column: &Sql, pointer: &JsonPointer) -> Sql {
        sql!["json_type(", column, ", ", self.json_path(pointer), ")"]
    }
}

fn is_plain_key(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

impl DialectAdapter for SqliteDialect {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn capabilities(&self) -> &DialectCapabilities {
        &CAPABILITIES
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn json_path(&self, pointer: &JsonPointer) -> Sql {
        Sql::string_literal(&Self::path_text(pointer))
    }

    // json_extract already returns native SQL types for scalars and JSON
    // text for containers, so the requested type needs no cast.
    fn json_extract(&self, column: &Sql, pointer: &JsonPointer, _extract: ExtractAs) -> Sql {
        sql!["json_extract(", column, ", ", self.json_path(pointer), ")"]
    }

    fn array_length(&self, column: &Sql, pointer: &JsonPointer) -> Sql {
        sql!["json_array_length(", column, ", ", self.json_path(pointer), ")"]
    }

    fn array_contains(
        &self,
        column: &Sql,
        pointer: &JsonPointer,
        value: Sql,
        _value_type: ValueType,
    ) -> Sql {
        sql![
            "EXISTS (SELECT 1 FROM json_each(",
            column,
            ", ",
            self.json_path(pointer),
            ") WHERE json_each.value = ",
            value,
            ")"
        ]
    }

    fn array_contains_any(
        &self,
        column: &Sql,
        pointer: &JsonPointer,
        values: Vec<Sql>,
        _value_type: ValueType,
    ) -> Sql {
        sql![
            "EXISTS (SELECT 1 FROM json_each(",
            column,
            ", ",
            self.json_path(pointer),
            ") WHERE json_each.value IN (",
            Sql::join(values, ", "),
            "))"
        ]
    }

    fn object_has_path(&self, column: &Sql, pointer: &JsonPointer) -> Sql {
        sql![self.json_type(column, pointer), " IS NOT NULL"]
    }

    fn object_path_is_null(&self, column: &Sql, pointer: &JsonPointer, negated: bool) -> Sql {
        let json_type = self.json_type(column, pointer);
        if negated {
            sql!["(", &json_type, " IS NOT NULL AND ", &json_type, " <> 'null')"]
        } else {
            sql!["(", &json_type, " IS NULL OR ", &json_type, " = 'null')"]
        }
    }

    fn ilike(&self, lhs: Sql, pattern: Sql) -> Sql {
        sql![lhs, " LIKE ", pattern, " ESCAPE '\\'"]
    }

    // SQLite's LIKE is case-insensitive for ASCII; GLOB is the case-sensitive
    // matcher, fed a converted pattern.
    fn like(&self, lhs: Sql, pattern: Sql) -> Sql {
        sql![lhs, " GLOB ", pattern]
    }

    fn like_pattern_transform(&self) -> ParamTransform {
        ParamTransform::LikeToGlob
    }

    fn path_init(&self, id: Sql) -> Sql {
        sql!["'|' || ", id, " || '|'"]
    }

    fn path_extend(&self, path: Sql, id: Sql) -> Sql {
        sql![path, " || ", id, " || '|'"]
    }

    fn cycle_check(&self, path: Sql, id: Sql) -> Sql {
        sql!["instr(", path, ", '|' || ", id, " || '|') = 0"]
    }

    fn current_timestamp(&self) -> Sql {
        Sql::raw("strftime('%Y-%m-%dT%H:%M:%fZ', 'now')")
    }

    fn bind_value(&self, value: Value) -> Value {
        match value {
            Value::Bool(b) => Value::from(i64::from(b)),
            other => other,
        }
    }

    // OFFSET is only valid after a LIMIT; -1 means no limit
    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> Sql {
        let limit = match limit {
            Some(limit) => Sql::integer(clamp_i64(limit)),
            None => Sql::raw("-1"),
        };
        match offset {
            Some(offset) => sql!["LIMIT ", limit, " OFFSET ", Sql::integer(clamp_i64(offset))],
            None => sql!["LIMIT ", limit],
        }
    }

    fn vector_distance(&self, column: Sql, query: Sql, metric: VectorMetric) -> CompileResult<Sql> {
        ensure_metric(self, metric)?;
        let function = match metric {
            VectorMetric::Cosine => "vec_distance_cosine(",
            VectorMetric::L2 => "vec_distance_L2(",
            // rejected by ensure_metric
            VectorMetric::InnerProduct => "vec_distance_ip(",
        };
        Ok(sql![function, column, ", vec_f32(", query, "))"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileError;

    fn render(fragment: Sql) -> String {
        fragment.render_inline(&SqliteDialect)
    }

    #[test]
    fn test_json_paths() {
        let d = SqliteDialect;
        assert_eq!(render(d.json_path(&JsonPointer::root())), "'$'");
        assert_eq!(
            render(d.json_path(&JsonPointer::parse("/address/city").unwrap())),
            "'$.address.city'"
        );
        assert_eq!(
            render(d.json_path(&JsonPointer::parse("/tags/0").unwrap())),
            "'$.tags[0]'"
        );
        assert_eq!(
            render(d.json_path(&JsonPointer::parse("/first name").unwrap())),
            "'$.\"first name\"'"
        );
    }

    #[test]
    fn test_path_segments_cannot_break_out_of_literal() {
        let pointer = JsonPointer::from_segments(["x') OR 1=1 --"]);
        let rendered = render(SqliteDialect.json_path(&pointer));
        assert_eq!(rendered, "'$.\"x'') OR 1=1 --\"'");
    }

    #[test]
    fn test_json_extract() {
        let column = Sql::raw("n.props");
        let pointer = JsonPointer::from_segments(["age"]);
        assert_eq!(
            render(SqliteDialect.json_extract(&column, &pointer, ExtractAs::Number)),
            "json_extract(n.props, '$.age')"
        );
    }

    #[test]
    fn test_array_contains() {
        let column = Sql::raw("n.props");
        let pointer = JsonPointer::from_segments(["tags"]);
        let fragment =
            SqliteDialect.array_contains(&column, &pointer, Sql::param("rust"), ValueType::String);
        assert_eq!(
            render(fragment),
            "EXISTS (SELECT 1 FROM json_each(n.props, '$.tags') WHERE json_each.value = 'rust')"
        );
    }

    #[test]
    fn test_null_path_checks() {
        let column = Sql::raw("n.props");
        let pointer = JsonPointer::from_segments(["nick"]);
        assert_eq!(
            render(SqliteDialect.object_path_is_null(&column, &pointer, false)),
            "(json_type(n.props, '$.nick') IS NULL OR json_type(n.props, '$.nick') = 'null')"
        );
    }

    #[test]
    fn test_cycle_helpers() {
        let d = SqliteDialect;
        assert_eq!(render(d.path_init(Sql::raw("n.id"))), "'|' || n.id || '|'");
        assert_eq!(
            render(d.cycle_check(Sql::raw("r.path"), Sql::raw("n.id"))),
            "instr(r.path, '|' || n.id || '|') = 0"
        );
    }

    #[test]
    fn test_offset_without_limit() {
        assert_eq!(render(SqliteDialect.limit_offset(None, Some(20))), "LIMIT -1 OFFSET 20");
        assert_eq!(render(SqliteDialect.limit_offset(Some(5), None)), "LIMIT 5");
    }

    #[test]
    fn test_booleans_bind_as_integers() {
        assert_eq!(SqliteDialect.bind_value(Value::Bool(true)), Value::from(1));
        assert_eq!(SqliteDialect.bind_value(Value::Bool(false)), Value::from(0));
        assert_eq!(SqliteDialect.bind_value(Value::from("x")), Value::from("x"));
    }

    #[test]
    fn test_vector_distance() {
        let fragment = SqliteDialect
            .vector_distance(Sql::raw("emb.embedding"), Sql::param("[1,0]"), VectorMetric::Cosine)
            .unwrap();
        assert_eq!(
            render(fragment),
            "vec_distance_cosine(emb.embedding, vec_f32('[1,0]'))"
        );
    }

    #[test]
    fn test_inner_product_rejected() {
        let err = SqliteDialect
            .vector_distance(Sql::raw("e"), Sql::param("[1]"), VectorMetric::InnerProduct)
            .unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedPredicate { .. }));
        assert!(err.to_string().contains("inner_product"));
        assert!(err.to_string().contains("sqlite"));
    }
}
