//! Table definitions and statements per SQL dialect
//!
//! The dialect comes from [`spindle_interfaces::Storage::name`]. Backends
//! with an unknown name get no DDL and the portable statements.

use spindle_config::StorageDialect;

/// Resolve the dialect advertised by a storage backend
pub fn dialect_for(storage_name: &str) -> Option<StorageDialect> {
    storage_name.parse().ok()
}

/// Statements creating the `tasks` history table
pub fn tasks_table_ddl(dialect: Option<StorageDialect>, retention_days: u32) -> Vec<String> {
    match dialect {
        Some(StorageDialect::TimescaleDb) => vec![
            r#"CREATE TABLE IF NOT EXISTS tasks (
                task_id UUID,
                status VARCHAR(10),
                task_name VARCHAR(128),
                parent_id UUID,
                state JSONB,
                iterations INTEGER,
                published_at TIMESTAMPTZ,
                started_at TIMESTAMPTZ,
                ended_at TIMESTAMPTZ,
                last_error TEXT,
                PRIMARY KEY (task_id, published_at)
            ) WITH (
                tsdb.hypertable,
                tsdb.partition_column='published_at',
                tsdb.orderby='published_at DESC'
            )"#
            .to_string(),
            format!(
                "SELECT add_retention_policy('tasks', drop_after => INTERVAL '{} days', if_not_exists => true)",
                retention_days
            ),
        ],
        Some(StorageDialect::QuestDb) => vec![format!(
            r#"CREATE TABLE IF NOT EXISTS tasks (
                task_id UUID,
                status SYMBOL,
                task_name VARCHAR,
                parent_id UUID,
                state VARCHAR,
                iterations INTEGER,
                published_at TIMESTAMP,
                started_at TIMESTAMP,
                ended_at TIMESTAMP,
                last_error VARCHAR
            ) TIMESTAMP(published_at)
            PARTITION BY DAY TTL {} DAYS
            DEDUP UPSERT KEYS (published_at, task_id)"#,
            retention_days
        )],
        None => Vec::new(),
    }
}

/// Statements creating the `logs` table for structured task logs
pub fn logs_table_ddl(dialect: Option<StorageDialect>, retention_days: u32) -> Vec<String> {
    match dialect {
        Some(StorageDialect::TimescaleDb) => vec![
            r#"CREATE TABLE IF NOT EXISTS logs (
                task_id UUID,
                state_id UUID,
                level VARCHAR(10),
                message TEXT,
                data JSONB,
                logged_at TIMESTAMPTZ
            ) WITH (
                tsdb.hypertable,
                tsdb.partition_column='logged_at',
                tsdb.orderby='logged_at DESC'
            )"#
            .to_string(),
            format!(
                "SELECT add_retention_policy('logs', drop_after => INTERVAL '{} days', if_not_exists => true)",
                retention_days
            ),
        ],
        Some(StorageDialect::QuestDb) => vec![format!(
            r#"CREATE TABLE IF NOT EXISTS logs (
                task_id UUID,
                state_id UUID,
                level SYMBOL,
                message VARCHAR,
                data VARCHAR,
                logged_at TIMESTAMP
            ) TIMESTAMP(logged_at)
            PARTITION BY DAY TTL {} DAYS"#,
            retention_days
        )],
        None => Vec::new(),
    }
}

/// Upsert of one history row, keyed by lineage and publication time.
///
/// Arguments: task_id, status, task_name, parent_id, state, iterations,
/// published_at, started_at, ended_at, last_error.
pub fn upsert_task_statement(dialect: Option<StorageDialect>) -> &'static str {
    match dialect {
        // QuestDB deduplicates on the table's upsert keys
        Some(StorageDialect::QuestDb) => {
            "INSERT INTO tasks (task_id, status, task_name, parent_id, state, iterations, published_at, started_at, ended_at, last_error) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        }
        _ => {
            "INSERT INTO tasks (task_id, status, task_name, parent_id, state, iterations, published_at, started_at, ended_at, last_error) \
             VALUES ($1, $2, $3, $4, $5::jsonb, $6, $7, $8, $9, $10) \
             ON CONFLICT (task_id, published_at) DO UPDATE SET \
             status = EXCLUDED.status, \
             task_name = EXCLUDED.task_name, \
             parent_id = EXCLUDED.parent_id, \
             state = EXCLUDED.state, \
             iterations = EXCLUDED.iterations, \
             started_at = EXCLUDED.started_at, \
             ended_at = EXCLUDED.ended_at, \
             last_error = EXCLUDED.last_error"
        }
    }
}

/// Insert of one structured log record.
///
/// Arguments: task_id, state_id, level, message, data, logged_at.
pub fn insert_log_statement(dialect: Option<StorageDialect>) -> &'static str {
    match dialect {
        Some(StorageDialect::QuestDb) => {
            "INSERT INTO logs (task_id, state_id, level, message, data, logged_at) VALUES ($1, $2, $3, $4, $5, $6)"
        }
        _ => {
            "INSERT INTO logs (task_id, state_id, level, message, data, logged_at) VALUES ($1, $2, $3, $4, $5::jsonb, $6)"
        }
    }
}

/// Most recent history rows of a task. Arguments: task_name, limit.
pub const SELECT_TASK_HISTORY: &str = "SELECT task_id, status, task_name, parent_id, state, iterations, \
     published_at, started_at, ended_at, last_error \
     FROM tasks WHERE task_name = $1 ORDER BY published_at DESC LIMIT $2";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_storage_name() {
        assert_eq!(dialect_for("timescaledb"), Some(StorageDialect::TimescaleDb));
        assert_eq!(dialect_for("questdb"), Some(StorageDialect::QuestDb));
        assert_eq!(dialect_for("memory"), None);
    }

    #[test]
    fn test_timescale_ddl_includes_retention() {
        let ddl = tasks_table_ddl(Some(StorageDialect::TimescaleDb), 7);
        assert_eq!(ddl.len(), 2);
        assert!(ddl[0].contains("PRIMARY KEY (task_id, published_at)"));
        assert!(ddl[1].contains("INTERVAL '7 days'"));
    }

    #[test]
    fn test_questdb_ddl_uses_ttl() {
        let ddl = logs_table_ddl(Some(StorageDialect::QuestDb), 3);
        assert_eq!(ddl.len(), 1);
        assert!(ddl[0].contains("TTL 3 DAYS"));
    }

    #[test]
    fn test_unknown_dialect_has_no_ddl() {
        assert!(tasks_table_ddl(None, 7).is_empty());
        assert!(logs_table_ddl(None, 7).is_empty());
        assert!(upsert_task_statement(None).contains("ON CONFLICT"));
    }
}
