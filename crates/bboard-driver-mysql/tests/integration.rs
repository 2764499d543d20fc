//! Live MySQL/MariaDB integration tests.
//!
//! These tests need a running server. They are ignored by default and can be
//! run with:
//!
//! ```bash
//! export BBOARD_TEST_MYSQL_HOST=127.0.0.1
//! export BBOARD_TEST_MYSQL_USER=root
//! export BBOARD_TEST_MYSQL_PASSWORD=secret
//! export BBOARD_TEST_MYSQL_DATABASE=bboard_test
//!
//! cargo test -p bboard-driver-mysql --test integration -- --ignored
//! ```
//!
//! For CI, use Docker:
//! ```bash
//! docker run -e MYSQL_ROOT_PASSWORD=secret -e MYSQL_DATABASE=bboard_test \
//!     -p 3306:3306 mysql:8
//! ```

use std::sync::Arc;
use std::time::Duration;

use bboard_connection::{
    ConnectionFactory, ConnectionManager, HealthStatus, ManagerConfig, PoolConfig, PoolError,
};
use bboard_core::{BoardError, Connection, DatabaseConfig, Value};
use bboard_driver_mysql::MySqlConnectionFactory;

fn get_test_config() -> Option<DatabaseConfig> {
    let host = std::env::var("BBOARD_TEST_MYSQL_HOST").ok()?;
    let port = std::env::var("BBOARD_TEST_MYSQL_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(3306);
    let user = std::env::var("BBOARD_TEST_MYSQL_USER").unwrap_or_else(|_| "root".into());
    let password = std::env::var("BBOARD_TEST_MYSQL_PASSWORD").ok();
    let database =
        std::env::var("BBOARD_TEST_MYSQL_DATABASE").unwrap_or_else(|_| "bboard_test".into());

    Some(
        DatabaseConfig::new(host, database)
            .with_port(port)
            .with_credentials(user, password)
            .with_io_timeouts_ms(5_000, 5_000),
    )
}

fn factory() -> Arc<MySqlConnectionFactory> {
    let config = get_test_config().expect("BBOARD_TEST_MYSQL_HOST required");
    Arc::new(MySqlConnectionFactory::new(config).expect("valid config"))
}

fn manager(min: usize, max: usize) -> ConnectionManager {
    let config = ManagerConfig {
        pool: PoolConfig::new(min, max).with_acquire_timeout_ms(5_000),
        ..ManagerConfig::default()
    };
    ConnectionManager::new(config, factory()).expect("valid manager config")
}

#[tokio::test]
#[ignore = "Requires MySQL"]
async fn test_basic_connection() {
    let factory = factory();
    let mut conn = factory.create().await.expect("Failed to connect");
    assert_eq!(conn.driver_name(), "mysql");

    conn.ping().await.expect("ping");
    let result = conn.query("SELECT 1 AS one", &[]).await.expect("query");
    assert_eq!(result.scalar().and_then(Value::as_i64), Some(1));

    conn.close().await.expect("Failed to close connection");
}

#[tokio::test]
#[ignore = "Requires MySQL"]
async fn test_session_is_initialised() {
    let mut conn = factory().create().await.expect("Failed to connect");
    let result = conn
        .query("SELECT @@character_set_connection, @@autocommit", &[])
        .await
        .expect("query");
    let row = &result.rows[0];
    assert_eq!(row.get(0).and_then(Value::as_str), Some("utf8mb4"));
    assert_eq!(row.get(1).and_then(Value::as_i64), Some(0));
}

#[tokio::test]
#[ignore = "Requires MySQL"]
async fn test_invalid_credentials_are_reported() {
    let config = get_test_config()
        .expect("BBOARD_TEST_MYSQL_HOST required")
        .with_credentials("no_such_user", Some("wrong_password".into()));
    let factory = MySqlConnectionFactory::new(config).expect("valid config");

    let err = factory.create().await.err().expect("login must fail");
    assert!(matches!(err, BoardError::Connection(_)), "{}", err);
}

#[tokio::test]
#[ignore = "Requires MySQL"]
async fn test_parameters_and_transactions() {
    let manager = manager(1, 2);

    manager
        .with_connection(|conn| {
            Box::pin(async move {
                conn.execute(
                    "CREATE TEMPORARY TABLE posts (id BIGINT AUTO_INCREMENT PRIMARY KEY, \
                     title VARCHAR(200) NOT NULL, posted_at DATETIME NULL)",
                    &[],
                )
                .await?;

                conn.begin_transaction().await?;
                let inserted = conn
                    .execute(
                        "INSERT INTO posts (title) VALUES (?), (?)",
                        &[Value::from("first"), Value::from("it's second")],
                    )
                    .await?;
                assert_eq!(inserted.affected_rows, 2);
                assert!(inserted.last_insert_id.is_some());
                conn.rollback().await?;

                let count = conn.query("SELECT COUNT(*) FROM posts", &[]).await?;
                assert_eq!(count.scalar().and_then(Value::as_i64), Some(0));

                conn.begin_transaction().await?;
                conn.execute("INSERT INTO posts (title) VALUES (?)", &[Value::from("kept")])
                    .await?;
                conn.commit().await?;

                let titles = conn
                    .query("SELECT title FROM posts WHERE title = ?", &[Value::from("kept")])
                    .await?;
                assert_eq!(titles.row_count(), 1);
                Ok(())
            })
        })
        .await
        .expect("scoped work");

    manager.shutdown().await;
}

#[tokio::test]
#[ignore = "Requires MySQL"]
async fn test_uncommitted_work_is_discarded_on_release() {
    let manager = manager(1, 1);

    manager
        .with_connection(|conn| {
            Box::pin(async move {
                conn.execute(
                    "CREATE TEMPORARY TABLE drafts (id BIGINT AUTO_INCREMENT PRIMARY KEY, \
                     body TEXT NOT NULL)",
                    &[],
                )
                .await?;
                conn.execute("INSERT INTO drafts (body) VALUES (?)", &[Value::from("unsent")])
                    .await?;
                Ok(())
            })
        })
        .await
        .expect("insert without commit");

    // Same session (the pool holds one), but the INSERT was rolled back
    let remaining = manager
        .with_connection(|conn| {
            Box::pin(async move {
                let result = conn.query("SELECT COUNT(*) FROM drafts", &[]).await?;
                Ok(result.scalar().and_then(Value::as_i64))
            })
        })
        .await
        .expect("count drafts");
    assert_eq!(remaining, Some(0));

    manager.shutdown().await;
}

#[tokio::test]
#[ignore = "Requires MySQL"]
async fn test_killed_session_is_replaced() {
    let manager = manager(1, 1);

    let victim = manager
        .with_connection(|conn| {
            Box::pin(async move {
                let result = conn.query("SELECT CONNECTION_ID()", &[]).await?;
                Ok(result.scalar().and_then(Value::as_i64))
            })
        })
        .await
        .expect("connection id")
        .expect("non-null id");

    // Kill the pooled session from a separate connection
    let mut admin = factory().create().await.expect("admin connection");
    admin
        .execute(&format!("KILL {}", victim), &[])
        .await
        .expect("kill");
    admin.close().await.expect("close admin");

    let replacement = manager
        .with_connection(|conn| {
            Box::pin(async move {
                let result = conn.query("SELECT CONNECTION_ID()", &[]).await?;
                Ok(result.scalar().and_then(Value::as_i64))
            })
        })
        .await
        .expect("replacement connection");
    assert_ne!(replacement, Some(victim));
    assert_eq!(manager.pool().map(|p| p.metrics().probe_failures), Some(1));

    manager.shutdown().await;
}

#[tokio::test]
#[ignore = "Requires MySQL"]
async fn test_health_check_and_shutdown() {
    let manager = manager(2, 4);
    manager.initialize().await.expect("initialize");
    assert_eq!(manager.stats().total(), 2);

    let report = manager.health_check(Duration::from_secs(5)).await;
    assert_ne!(report.status, HealthStatus::Unhealthy);

    manager.shutdown().await;
    assert_eq!(manager.stats().total(), 0);

    // The next acquisition builds a fresh pool
    let conn = manager.acquire().await.expect("reinitialized");
    drop(conn);
    manager.shutdown().await;
}

#[tokio::test]
#[ignore = "Requires MySQL"]
async fn test_statement_timeout_disposes_connection() {
    let config = get_test_config()
        .expect("BBOARD_TEST_MYSQL_HOST required")
        .with_io_timeouts_ms(200, 200);
    let factory = Arc::new(MySqlConnectionFactory::new(config).expect("valid config"));
    let manager = ConnectionManager::new(
        ManagerConfig {
            pool: PoolConfig::new(0, 1),
            ..ManagerConfig::default()
        },
        factory,
    )
    .expect("valid manager config");

    let err = manager
        .with_connection(|conn| Box::pin(async move { conn.query("SELECT SLEEP(2)", &[]).await }))
        .await
        .err()
        .expect("statement must time out");
    assert!(matches!(err, PoolError::Database(BoardError::Timeout(_))), "{}", err);
    assert_eq!(manager.stats().total(), 0);

    manager.shutdown().await;
}
