//! MySQL connection implementation

use async_trait::async_trait;
use bboard_core::{BoardError, Connection, QueryResult, Result, Row, StatementResult, Value};
use mysql_async::{Conn, Params, Row as MySqlRow, consts::ColumnType, prelude::*};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, error::Elapsed};


/// One MySQL/MariaDB session.
///
/// Statements are bounded by the configured read/write timeouts. A statement
/// that times out or loses the socket leaves the session in an unknown
/// protocol state, so the connection reports itself closed from then on and
/// the pool disposes it on release.
pub struct MySqlConnection {
    conn: Option<Conn>,
    read_timeout: Duration,
    write_timeout: Duration,
    broken: bool,
}

impl MySqlConnection {
    pub(crate) fn new(conn: Conn, read_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            conn: Some(conn),
            read_timeout,
            write_timeout,
            broken: false,
        }
    }

    /// Server connection id, useful when correlating with `SHOW PROCESSLIST`
    pub fn server_id(&self) -> Option<u32> {
        self.conn.as_ref().map(|conn| conn.id())
    }

    fn session(&mut self) -> Result<&mut Conn> {
        if self.broken {
            return Err(BoardError::Connection(
                "MySQL session was abandoned after a failed statement".into(),
            ));
        }
        self.conn
            .as_mut()
            .ok_or_else(|| BoardError::Connection("MySQL connection is closed".into()))
    }

    /// Turn the outcome of one bounded round trip into our Result, marking
    /// the session broken on timeouts and transport failures
    fn settle<T>(
        &mut self,
        outcome: std::result::Result<std::result::Result<T, mysql_async::Error>, Elapsed>,
        limit: Duration,
        what: &str,
    ) -> Result<T> {
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let err = map_mysql_error(e, what);
                if err.is_connection_level() {
                    self.broken = true;
                }
                Err(err)
            }
            Err(_) => {
                self.broken = true;
                tracing::warn!(timeout = ?limit, what, "MySQL statement timed out");
                Err(BoardError::Timeout(format!(
                    "{} did not finish within {:?}",
                    what, limit
                )))
            }
        }
    }
}

/// Translate a driver error, keeping transport failures distinguishable from
/// statement failures
pub(crate) fn map_mysql_error(e: mysql_async::Error, what: &str) -> BoardError {
    match e {
        mysql_async::Error::Io(e) => BoardError::Connection(format!("{} failed: {}", what, e)),
        mysql_async::Error::Driver(mysql_async::DriverError::ConnectionClosed) => {
            BoardError::Connection(format!("{} failed: connection closed", what))
        }
        mysql_async::Error::Server(e) => {
            BoardError::Query(format!("{} failed: {} ({})", what, e.message, e.code))
        }
        other => BoardError::Query(format!("{} failed: {}", what, other)),
    }
}

fn to_params(params: &[Value]) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params.iter().map(value_to_mysql).collect())
    }
}

/// Convert our Value into a bound statement parameter
pub(crate) fn value_to_mysql(value: &Value) -> mysql_async::Value {
    use chrono::{Datelike, Timelike};

    match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Bool(v) => mysql_async::Value::Int(*v as i64),
        Value::Int64(v) => mysql_async::Value::Int(*v),
        Value::UInt64(v) => mysql_async::Value::UInt(*v),
        Value::Float32(v) => mysql_async::Value::Float(*v),
        Value::Float64(v) => mysql_async::Value::Double(*v),
        Value::Decimal(v) | Value::String(v) => mysql_async::Value::Bytes(v.as_bytes().to_vec()),
        Value::Bytes(v) => mysql_async::Value::Bytes(v.clone()),
        Value::Date(d) => {
            mysql_async::Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0)
        }
        Value::DateTime(dt) => mysql_async::Value::Date(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            dt.nanosecond() / 1_000,
        ),
    }
}

/// Convert a mysql_async value to ours, using column type metadata to
/// interpret the byte strings the text protocol returns.
pub(crate) fn mysql_value_to_value(val: mysql_async::Value, col_type: ColumnType) -> Value {
    match val {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => match col_type {
                ColumnType::MYSQL_TYPE_TINY
                | ColumnType::MYSQL_TYPE_SHORT
                | ColumnType::MYSQL_TYPE_LONG
                | ColumnType::MYSQL_TYPE_LONGLONG
                | ColumnType::MYSQL_TYPE_INT24
                | ColumnType::MYSQL_TYPE_YEAR => match s.parse::<i64>() {
                    Ok(v) => Value::Int64(v),
                    Err(_) => s.parse::<u64>().map(Value::UInt64).unwrap_or(Value::String(s)),
                },
                ColumnType::MYSQL_TYPE_FLOAT => {
                    s.parse::<f32>().map(Value::Float32).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_DOUBLE => {
                    s.parse::<f64>().map(Value::Float64).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
                    Value::Decimal(s)
                }
                ColumnType::MYSQL_TYPE_DATE => chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                    .map(Value::Date)
                    .unwrap_or(Value::String(s)),
                ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_TIMESTAMP => {
                    chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                        .map(Value::DateTime)
                        .unwrap_or(Value::String(s))
                }
                _ => Value::String(s),
            },
            Err(e) => Value::Bytes(e.into_bytes()),
        },
        mysql_async::Value::Int(i) => Value::Int64(i),
        mysql_async::Value::UInt(u) => match i64::try_from(u) {
            Ok(i) => Value::Int64(i),
            Err(_) => Value::UInt64(u),
        },
        mysql_async::Value::Float(f) => Value::Float32(f),
        mysql_async::Value::Double(d) => Value::Float64(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            let Some(date) = chrono::NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
            else {
                // Zero dates ('0000-00-00') have no chrono representation
                return Value::String(format!("{:04}-{:02}-{:02}", year, month, day));
            };
            if col_type == ColumnType::MYSQL_TYPE_DATE {
                return Value::Date(date);
            }
            match date.and_hms_micro_opt(hour as u32, min as u32, sec as u32, micro) {
                Some(dt) => Value::DateTime(dt),
                None => Value::String(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, min, sec
                )),
            }
        }
        mysql_async::Value::Time(negative, days, hours, mins, secs, micros) => {
            let total_hours = days * 24 + hours as u32;
            let sign = if negative { "-" } else { "" };
            Value::String(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                sign, total_hours, mins, secs, micros
            ))
        }
    }
}

fn rows_to_result(mysql_rows: Vec<MySqlRow>, elapsed: Duration) -> QueryResult {
    let Some(first) = mysql_rows.first() else {
        return QueryResult {
            execution_time_ms: elapsed.as_millis() as u64,
            ..QueryResult::empty()
        };
    };

    let column_types: Vec<ColumnType> = first
        .columns_ref()
        .iter()
        .map(|col| col.column_type())
        .collect();
    let columns: Arc<[String]> = first
        .columns_ref()
        .iter()
        .map(|col| col.name_str().into_owned())
        .collect();

    let rows = mysql_rows
        .into_iter()
        .map(|mut mysql_row| {
            let values = column_types
                .iter()
                .enumerate()
                .map(|(idx, col_type)| {
                    let raw = mysql_row
                        .take::<mysql_async::Value, _>(idx)
                        .unwrap_or(mysql_async::Value::NULL);
                    mysql_value_to_value(raw, *col_type)
                })
                .collect();
            Row::new(Arc::clone(&columns), values)
        })
        .collect();

    QueryResult {
        columns,
        rows,
        execution_time_ms: elapsed.as_millis() as u64,
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    fn driver_name(&self) -> &str {
        "mysql"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let limit = self.write_timeout;
        let params = to_params(params);
        let outcome = {
            let conn = self.session()?;
            tokio::time::timeout(limit, async {
                match params {
                    Params::Empty => conn.query_drop(sql).await?,
                    params => conn.exec_drop(sql, params).await?,
                }
                Ok::<_, mysql_async::Error>(StatementResult {
                    affected_rows: conn.affected_rows(),
                    last_insert_id: conn.last_insert_id(),
                })
            })
            .await
        };
        let result = self.settle(outcome, limit, "statement")?;

        tracing::debug!(affected_rows = result.affected_rows, "statement executed");
        Ok(result)
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start = Instant::now();
        let limit = self.read_timeout;
        let params = to_params(params);
        let outcome = {
            let conn = self.session()?;
            tokio::time::timeout(limit, async {
                let rows: Vec<MySqlRow> = match params {
                    Params::Empty => conn.query(sql).await?,
                    params => conn.exec(sql, params).await?,
                };
                Ok::<_, mysql_async::Error>(rows)
            })
            .await
        };
        let mysql_rows = self.settle(outcome, limit, "query")?;

        let result = rows_to_result(mysql_rows, start.elapsed());
        tracing::debug!(
            row_count = result.row_count(),
            execution_time_ms = result.execution_time_ms,
            "query executed successfully"
        );
        Ok(result)
    }

    /// COM_PING instead of a query round trip
    async fn ping(&mut self) -> Result<()> {
        let limit = self.read_timeout;
        let outcome = {
            let conn = self.session()?;
            tokio::time::timeout(limit, conn.ping()).await
        };
        self.settle(outcome, limit, "ping")
    }

    async fn commit(&mut self) -> Result<()> {
        tracing::debug!("committing MySQL transaction");
        let limit = self.write_timeout;
        let outcome = {
            let conn = self.session()?;
            tokio::time::timeout(limit, conn.query_drop("COMMIT")).await
        };
        self.settle(outcome, limit, "commit")
    }

    async fn rollback(&mut self) -> Result<()> {
        tracing::debug!("rolling back MySQL transaction");
        let limit = self.write_timeout;
        let outcome = {
            let conn = self.session()?;
            tokio::time::timeout(limit, conn.query_drop("ROLLBACK")).await
        };
        self.settle(outcome, limit, "rollback")
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        if self.broken {
            // No clean COM_QUIT on a desynchronized session; dropping the
            // socket is enough.
            drop(conn);
            return Ok(());
        }
        let id = conn.id();
        conn.disconnect()
            .await
            .map_err(|e| map_mysql_error(e, "disconnect"))?;
        tracing::debug!(server_id = id, "MySQL connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none() || self.broken
    }
}
