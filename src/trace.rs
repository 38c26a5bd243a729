//! Tracing helpers for statements and transactions

/// Emit a debug-level event with the SQL text and parameter count.
macro_rules! trace_query {
    ($sql:expr, $param_count:expr) => {
        tracing::debug!(sql = %$sql, params = $param_count, "relational_store.query");
    };
}

/// Emit a debug-level event for transaction lifecycle (begin, commit).
macro_rules! trace_tx {
    ($event:literal, $operation:expr, $list:expr) => {
        tracing::debug!(
            event = $event,
            operation = $operation,
            list = %$list,
            "relational_store.transaction"
        );
    };
}
