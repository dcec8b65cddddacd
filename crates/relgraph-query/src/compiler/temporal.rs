//! Row-visibility filters for the temporal modes.

use crate::ast::TemporalMode;
use crate::config::CompileOptions;
use crate::dialect::DialectAdapter;
use crate::sql::{sql, Sql};

/// The "now" every alias is filtered against, if the mode needs one.
///
/// `as_of` binds its timestamp; otherwise a pinned clock from the options is
/// bound, falling back to the database clock.
pub(crate) fn now_expression(
    mode: &TemporalMode,
    adapter: &dyn DialectAdapter,
    options: &CompileOptions,
) -> Option<Sql> {
    match mode {
        TemporalMode::AsOf { timestamp } => Some(Sql::param(timestamp.as_str())),
        TemporalMode::Current => Some(match options.pinned_now() {
            Some(now) => Sql::param(now),
            None => adapter.current_timestamp(),
        }),
        TemporalMode::IncludeEnded | TemporalMode::IncludeTombstones => None,
    }
}

/// Filter on the table aliased `table` (`n`, `e`).
pub(crate) fn condition(table: &'static str, mode: &TemporalMode, now: Option<&Sql>) -> Option<Sql> {
    let column = |name: &str| Sql::trusted(format!("{}.{}", table, name));
    let not_deleted = sql![column("deleted_at"), " IS NULL"];

    match (mode, now) {
        (TemporalMode::IncludeTombstones, _) => None,
        (TemporalMode::IncludeEnded, _) | (_, None) => Some(not_deleted),
        (TemporalMode::Current | TemporalMode::AsOf { .. }, Some(now)) => Some(sql![
            not_deleted,
            " AND (",
            column("valid_from"),
            " IS NULL OR ",
            column("valid_from"),
            " <= ",
            now,
            ") AND (",
            column("valid_to"),
            " IS NULL OR ",
            column("valid_to"),
            " > ",
            now,
            ")"
        ]),
    }
}
