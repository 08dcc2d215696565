use std::io::Write;
use std::sync::{Arc, Mutex};

use sqlite_gateway::{Database, GatewayError, LinkOutcome, MigrationOutcome, Params, Value};
use tempfile::NamedTempFile;

const USERS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT
);
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    label TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS user_tags (
    user_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    PRIMARY KEY (user_id, tag_id)
);
"#;

// Write `content` to a temporary file that lives as long as the handle
fn sql_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

// Helper function to create an in-memory database with the users schema
async fn create_test_db() -> Database {
    let db = Database::new();
    db.open_in_memory().await.unwrap();
    let schema = sql_file(USERS_SCHEMA);
    db.create_from_schema(schema.path()).await.unwrap();
    db
}

// Shared in-memory sink for formatted log lines
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// Route INFO and above for the current thread into a buffer
fn capture_info_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}

fn is_no_database<T>(result: Result<T, GatewayError>) -> bool {
    matches!(result, Err(GatewayError::NoDatabase))
}

#[tokio::test]
async fn every_operation_fails_before_open() {
    let db = Database::new();
    let schema = sql_file(USERS_SCHEMA);

    assert!(is_no_database(db.create_from_schema(schema.path()).await));
    assert!(is_no_database(db.run_migrations(schema.path(), false).await));
    assert!(is_no_database(db.insert("users (name) VALUES (?)", ["Ada"]).await));
    assert!(is_no_database(db.update("users SET name = ?", ["Ada"]).await));
    assert!(is_no_database(db.select_all("* FROM users", ()).await));
    assert!(is_no_database(db.select_one("* FROM users", ()).await));
    assert!(is_no_database(db.select_value("name FROM users", ()).await));
    assert!(is_no_database(db.raw_select("SELECT * FROM users", ()).await));
    assert!(is_no_database(db.delete_where("users WHERE id = ?", [1]).await));
    assert!(is_no_database(db.truncate("users").await));
    assert!(is_no_database(db.prepare("SELECT 1").await));
}

#[tokio::test]
async fn operations_fail_again_after_close() {
    let db = create_test_db().await;
    db.close().await;
    assert!(!db.is_open().await);
    assert!(is_no_database(db.select_all("* FROM users", ()).await));

    // Closing twice is logged, not raised.
    db.close().await;
}

#[tokio::test]
async fn prepared_statement_on_closed_handle_is_no_database() {
    let db = create_test_db().await;
    let stmt = db
        .prepare("INSERT INTO users (name) VALUES (?)")
        .await
        .unwrap();
    db.close().await;

    let result = db.run_prepared(&stmt, ["Ada"], "insert user").await;
    assert!(is_no_database(result));

    let unopened = Database::new();
    let result = unopened.run_prepared(&stmt, ["Ada"], "insert user").await;
    assert!(is_no_database(result));
}

#[tokio::test]
async fn ada_scenario() {
    let db = create_test_db().await;

    let id = db.insert("users (name) VALUES (?)", ["Ada"]).await.unwrap();
    assert_eq!(id, 1);

    let name = db
        .select_value("name FROM users WHERE id = ?", [1])
        .await
        .unwrap();
    assert_eq!(name, Some(Value::from("Ada")));

    db.truncate("users").await.unwrap();
    let rows = db.select_all("* FROM users", ()).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn insert_returns_id_seen_by_select_value() {
    let db = create_test_db().await;
    db.insert("users (name) VALUES (?)", ["Ada"]).await.unwrap();
    let id = db.insert("users (name) VALUES (?)", ["Grace"]).await.unwrap();

    let found = db
        .select_value("id FROM users WHERE name = ?", ["Grace"])
        .await
        .unwrap();
    assert_eq!(found, Some(Value::Integer(id)));
}

#[tokio::test]
async fn update_counts_changed_rows() {
    let db = create_test_db().await;
    db.insert("users (name) VALUES (?)", ["Ada"]).await.unwrap();
    db.insert("users (name) VALUES (?)", ["Ada"]).await.unwrap();

    let changed = db
        .update("users SET name = ? WHERE name = ?", ["Lovelace", "Ada"])
        .await
        .unwrap();
    assert_eq!(changed, 2);

    let changed = db
        .update("users SET name = ? WHERE id = ?", [Value::from("x"), Value::from(99)])
        .await
        .unwrap();
    assert_eq!(changed, 0);
}

#[tokio::test]
async fn select_value_without_match_is_none() {
    let db = create_test_db().await;
    let value = db
        .select_value("name FROM users WHERE id = ?", [42])
        .await
        .unwrap();
    assert_eq!(value, None);

    let row = db
        .select_one("* FROM users WHERE id = ?", [42])
        .await
        .unwrap();
    assert!(row.is_none());
}

#[tokio::test]
async fn select_value_reads_null_column_as_null() {
    let db = create_test_db().await;
    db.insert("users (name) VALUES (?)", [Value::Null]).await.unwrap();
    let value = db
        .select_value("name FROM users WHERE id = ?", [1])
        .await
        .unwrap();
    assert_eq!(value, Some(Value::Null));
}

#[tokio::test]
async fn raw_select_and_delete_where() {
    let db = create_test_db().await;
    for name in ["Ada", "Grace", "Barbara"] {
        db.insert("users (name) VALUES (?)", [name]).await.unwrap();
    }

    let deleted = db.delete_where("users WHERE name = ?", ["Grace"]).await.unwrap();
    assert_eq!(deleted, 1);

    let rows = db
        .raw_select("SELECT name FROM users ORDER BY name", ())
        .await
        .unwrap();
    let names: Vec<_> = rows.iter().map(|r| r["name"].clone()).collect();
    assert_eq!(names, vec![Value::from("Ada"), Value::from("Barbara")]);
}

#[tokio::test]
async fn engine_errors_propagate() {
    let db = create_test_db().await;
    let err = db
        .select_all("* FROM missing_table", ())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Sqlite(_)));
    assert!(err.to_string().contains("missing_table"));
}

#[tokio::test]
async fn schema_with_if_not_exists_is_idempotent() {
    let db = create_test_db().await;
    let schema = sql_file(USERS_SCHEMA);
    db.create_from_schema(schema.path()).await.unwrap();
}

#[tokio::test]
async fn schema_without_if_not_exists_fails_second_time() {
    let db = Database::new();
    db.open_in_memory().await.unwrap();
    let schema = sql_file("CREATE TABLE things (id INTEGER PRIMARY KEY);");

    db.create_from_schema(schema.path()).await.unwrap();
    let err = db.create_from_schema(schema.path()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Sqlite(_)));
}

#[tokio::test]
async fn missing_schema_file_is_reported() {
    let db = Database::new();
    db.open_in_memory().await.unwrap();
    let err = db
        .create_from_schema("/definitely/not/here/schema.sql")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::SchemaNotFound(_)));
}

#[tokio::test]
async fn migrations_rerun_without_raising() {
    let db = create_test_db().await;
    let migrations = sql_file(
        "ALTER TABLE users ADD COLUMN email TEXT;\n\
         CREATE TABLE audit (id INTEGER PRIMARY KEY, note TEXT);\n\
         CREATE UNIQUE INDEX idx_users_email ON users(email);\n",
    );

    let first = db.run_migrations(migrations.path(), true).await.unwrap();
    assert_eq!(first.applied(), 3);
    assert_eq!(first.failed(), 0);

    let second = db.run_migrations(migrations.path(), true).await.unwrap();
    assert_eq!(second.applied(), 0);
    assert_eq!(second.already_applied(), 3);

    // The migrated column is usable.
    db.insert("users (name, email) VALUES (?, ?)", ["Ada", "ada@example.com"])
        .await
        .unwrap();
}

#[tokio::test]
async fn verbose_rerun_logs_already_applied_at_info() {
    let db = create_test_db().await;
    let migrations = sql_file("ALTER TABLE users ADD COLUMN email TEXT;");
    db.run_migrations(migrations.path(), true).await.unwrap();

    let (logs, _guard) = capture_info_logs();
    db.run_migrations(migrations.path(), true).await.unwrap();

    let logs = logs.contents();
    let line = logs
        .lines()
        .find(|line| line.contains("Migration already applied:"))
        .unwrap_or_else(|| panic!("no already-applied line in {logs:?}"));
    assert!(line.contains("INFO"));
    assert!(line.contains("ALTER TABLE users ADD COLUMN email TEXT"));
}

#[tokio::test]
async fn quiet_rerun_keeps_already_applied_below_info() {
    let db = create_test_db().await;
    let migrations = sql_file("ALTER TABLE users ADD COLUMN email TEXT;");
    db.run_migrations(migrations.path(), false).await.unwrap();

    let (logs, _guard) = capture_info_logs();
    let report = db.run_migrations(migrations.path(), false).await.unwrap();
    assert_eq!(report.already_applied(), 1);

    let logs = logs.contents();
    assert!(!logs.contains("Migration already applied"), "{logs}");
    assert!(!logs.contains("Migration applied"), "{logs}");
}

#[tokio::test]
async fn migrations_continue_past_genuine_failures() {
    let db = create_test_db().await;
    let migrations = sql_file(
        "INSERT INTO nowhere VALUES (1);\nCREATE TABLE later (id INTEGER);",
    );

    let report = db.run_migrations(migrations.path(), false).await.unwrap();
    assert_eq!(report.statements.len(), 2);
    assert!(matches!(
        report.statements[0].outcome,
        MigrationOutcome::Failed { .. }
    ));
    assert_eq!(report.statements[1].outcome, MigrationOutcome::Applied);
}

#[tokio::test]
async fn duplicate_link_does_not_raise() {
    let db = create_test_db().await;

    assert_eq!(db.m2m("user", "tag", 1, 2, true).await, LinkOutcome::Linked);
    assert_eq!(
        db.m2m("user", "tag", 1, 2, true).await,
        LinkOutcome::AlreadyLinked
    );

    let count = db
        .select_value("COUNT(*) FROM user_tags", ())
        .await
        .unwrap();
    assert_eq!(count, Some(Value::Integer(1)));
}

#[tokio::test]
async fn unlink_of_missing_link_does_not_raise() {
    let db = create_test_db().await;
    assert_eq!(
        db.m2m("user", "tag", 5, 6, false).await,
        LinkOutcome::NotLinked
    );

    db.link("user", "tag", 5, 6).await;
    assert_eq!(db.unlink("user", "tag", 5, 6).await, LinkOutcome::Unlinked);
}

#[tokio::test]
async fn link_to_missing_join_table_is_a_logged_failure() {
    let db = create_test_db().await;
    let outcome = db.link("user", "group", 1, 1).await;
    assert!(matches!(outcome, LinkOutcome::Failed(reason) if reason.contains("user_groups")));
}

#[tokio::test]
async fn prepared_statement_errors_carry_label() {
    let db = create_test_db().await;
    let stmt = db
        .prepare("INSERT INTO user_tags (user_id, tag_id) VALUES (?, ?)")
        .await
        .unwrap();

    db.run_prepared(&stmt, [1, 1], "link user tag").await.unwrap();
    let err = db
        .run_prepared(&stmt, [1, 1], "link user tag")
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unexpected error when running prepared statement link user tag"
    );
}

#[tokio::test]
async fn prepare_propagates_engine_errors() {
    let db = create_test_db().await;
    let err = db.prepare("SELEKT 1").await.unwrap_err();
    assert!(matches!(err, GatewayError::Sqlite(_)));
}

#[tokio::test]
async fn file_backed_database_persists_across_reopen() {
    let file = NamedTempFile::new().unwrap();
    let schema = sql_file(USERS_SCHEMA);

    let db = Database::new();
    db.open(file.path()).await.unwrap();
    db.create_from_schema(schema.path()).await.unwrap();
    db.insert(
        "users (name) VALUES (:name)",
        Params::new().with_value("name", "Ada"),
    )
    .await
    .unwrap();
    db.close().await;

    db.open(file.path()).await.unwrap();
    let rows = db.select_all("id, name FROM users", ()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], Value::from("Ada"));
}
