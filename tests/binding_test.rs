//! Integration tests for placeholder binding and the name-error modes.

use db_manager::models::{BindSet, ConnectionConfig};
use db_manager::monitor::ModeKey;
use db_manager::{DbError, DbManager, Mode, NameErrorBinding};
use tokio_test::{assert_err, assert_ok};

async fn setup() -> DbManager {
    let manager = DbManager::prepare();
    assert!(
        manager
            .define(ConnectionConfig::sqlite("mem", ":memory:"))
            .await
    );
    assert!(manager.connect("mem").await);
    assert!(
        manager
            .query_direct("mem", "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT)")
            .await
    );
    assert!(
        manager
            .query_direct("mem", "INSERT INTO people (id, name) VALUES (1, 'Ada'), (2, 'Linus')")
            .await
    );
    assert!(
        manager
            .query("by_id", "SELECT name FROM people WHERE id = :id")
            .await
    );
    assert!(manager.new_operation("mem", 1, "by_id").await);
    manager.monitor().clear_logs();
    manager
}

fn log_count(manager: &DbManager) -> usize {
    manager.monitor().logs().len()
}

#[tokio::test]
async fn test_leading_colon_is_optional() {
    let manager = setup().await;
    assert!(assert_ok!(manager.bind_value(1, "id", 1).await));
    assert!(assert_ok!(manager.bind_value(1, ":id", 2).await));
    assert!(manager.execute(1).await);
    let row = manager.fetch(1).await.unwrap();
    assert_eq!(row["name"], "Linus");
}

#[tokio::test]
async fn test_stop_mode_logs_and_refuses() {
    let manager = setup().await;
    assert!(!manager.bind_value(1, "missing", 1).await.unwrap());
    let logs = manager.monitor().logs();
    assert_eq!(logs.len(), 1);
    assert!(
        logs[0]
            .message
            .starts_with("Binding :missing failed on operation 1")
    );
}

#[tokio::test]
async fn test_continue_mode_is_silent() {
    let manager = setup().await;
    manager.set_mode(Mode::NameErrorBinding(NameErrorBinding::Continue));
    assert!(!manager.bind_value(1, "missing", 1).await.unwrap());
    assert_eq!(log_count(&manager), 0);
}

#[tokio::test]
async fn test_throw_mode_returns_error() {
    let manager = setup().await;
    manager.set_mode(Mode::NameErrorBinding(NameErrorBinding::Throw));
    let err = assert_err!(manager.bind_value(1, "missing", 1).await);
    match err {
        DbError::BindFailed {
            operation_id,
            placeholder,
            ..
        } => {
            assert_eq!(operation_id, 1);
            assert_eq!(placeholder, ":missing");
        }
        other => panic!("unexpected error: {other}"),
    }
    // A present placeholder still binds normally.
    assert!(assert_ok!(manager.bind_value(1, "id", 1).await));
}

#[tokio::test]
async fn test_unset_mode_logs_generic_failure() {
    let manager = setup().await;
    manager.monitor().clear_mode(ModeKey::NameErrorBinding);
    assert!(!manager.bind_value(1, "missing", 1).await.unwrap());
    let logs = manager.monitor().logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "Binding failed on operation 1");
}

#[tokio::test]
async fn test_unknown_operation() {
    let manager = setup().await;
    manager.set_mode(Mode::NameErrorBinding(NameErrorBinding::Throw));
    assert!(!assert_ok!(manager.bind_value(77, "id", 1).await));
    assert!(log_count(&manager) > 0);
}

#[tokio::test]
async fn test_missing_binding_fails_execute() {
    let manager = setup().await;
    assert!(!manager.execute(1).await);
    let info = manager.error_info(1).await.unwrap();
    assert!(!info.is_ok());
    assert!(info.message.unwrap().contains(":id"));
}

#[tokio::test]
async fn test_inline_named_binds_override() {
    let manager = setup().await;
    assert!(manager.bind_value(1, "id", 1).await.unwrap());
    assert!(
        manager
            .execute_with(1, BindSet::named([("id", 2)]))
            .await
    );
    assert_eq!(manager.fetch(1).await.unwrap()["name"], "Linus");

    // Stored binding is still in place for a plain execute.
    assert!(manager.execute(1).await);
    assert_eq!(manager.fetch(1).await.unwrap()["name"], "Ada");

    assert!(
        !manager
            .execute_with(1, BindSet::named([("nope", 2)]))
            .await
    );
}

#[tokio::test]
async fn test_positional_binds() {
    let manager = setup().await;
    assert!(
        manager
            .query("pos", "SELECT name FROM people WHERE id = ? OR id = ? ORDER BY id")
            .await
    );
    assert!(manager.new_operation("mem", 2, "pos").await);

    assert!(
        manager
            .execute_with(2, BindSet::positional([1, 2]))
            .await
    );
    assert_eq!(manager.fetch_all(2).await.unwrap().len(), 2);

    assert!(!manager.execute_with(2, BindSet::positional([1])).await);
    assert!(!manager.execute(2).await);
}

#[tokio::test]
async fn test_bind_values_from_builder() {
    let manager = setup().await;
    let built = db_manager::QueryBuilder::table("people")
        .select(&["name"])
        .where_in("id", [1, 2])
        .order_by("name", "desc")
        .build()
        .unwrap();
    assert!(manager.query_from_builder("names", &built).await);
    assert!(manager.new_operation("mem", 3, "names").await);
    assert!(manager.bind_values(3, &built).await.unwrap());
    assert!(manager.execute(3).await);

    let names: Vec<String> = manager
        .fetch_all(3)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|row| row.get("name").and_then(|v| v.as_str()).map(String::from))
        .collect();
    assert_eq!(names, vec!["Linus", "Ada"]);
}

#[tokio::test]
async fn test_backslash_literal_does_not_swallow_placeholder() {
    let manager = setup().await;
    assert!(
        manager
            .query_direct("mem", "CREATE TABLE files (id INTEGER PRIMARY KEY, path TEXT)")
            .await
    );
    assert!(
        manager
            .query_direct("mem", r"INSERT INTO files (id, path) VALUES (1, 'C:\'), (2, 'D:\')")
            .await
    );
    assert!(
        manager
            .query("by_path", r"SELECT id FROM files WHERE path = 'C:\' AND id = :id")
            .await
    );
    assert!(manager.new_operation("mem", 2, "by_path").await);

    assert!(assert_ok!(manager.bind_value(2, "id", 1).await));
    assert!(manager.execute(2).await);
    let row = manager.fetch(2).await.unwrap();
    assert_eq!(row["id"], 1);
    assert!(manager.fetch(2).await.is_none());
}
