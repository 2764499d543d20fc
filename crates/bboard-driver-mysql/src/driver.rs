//! MySQL connection factory

use async_trait::async_trait;
use bboard_connection::ConnectionFactory;
use bboard_core::{BoardError, Connection, DatabaseConfig, Result};
use mysql_async::{Conn, Opts, OptsBuilder};

use crate::MySqlConnection;
use crate::connection::map_mysql_error;


/// Opens MySQL/MariaDB sessions for the pool.
///
/// Each session is initialised with the configured character set, collation
/// and autocommit mode before it is handed out.
pub struct MySqlConnectionFactory {
    config: DatabaseConfig,
}

impl MySqlConnectionFactory {
    /// Create a factory after validating `config`
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        tracing::debug!(host = %config.host, port = config.port, "MySQL connection factory initialized");
        Ok(Self { config })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Statements run on every new session before first use
    pub fn session_init(&self) -> Vec<String> {
        vec![
            format!(
                "SET NAMES {} COLLATE {}",
                self.config.charset, self.config.collation
            ),
            format!("SET autocommit = {}", u8::from(self.config.autocommit)),
        ]
    }

    fn opts(&self) -> Opts {
        let config = &self.config;
        let mut builder = OptsBuilder::default()
            .ip_or_hostname(config.host.as_str())
            .tcp_port(config.port)
            .user(Some(config.user.as_str()))
            .init(self.session_init());

        if let Some(password) = &config.password {
            builder = builder.pass(Some(password.as_str()));
        }
        if !config.database.is_empty() {
            builder = builder.db_name(Some(config.database.as_str()));
        }
        builder.into()
    }

    /// Connection string for logs, without credentials
    pub fn connection_string(&self) -> String {
        let config = &self.config;
        let mut conn_str = format!("mysql://{}@{}:{}", config.user, config.host, config.port);
        if !config.database.is_empty() {
            conn_str.push('/');
            conn_str.push_str(&config.database);
        }
        conn_str
    }
}

#[async_trait]
impl ConnectionFactory for MySqlConnectionFactory {
    #[tracing::instrument(skip(self), fields(host = %self.config.host, database = %self.config.database))]
    async fn create(&self) -> Result<Box<dyn Connection>> {
        let timeout = self.config.connect_timeout();
        let conn = match tokio::time::timeout(timeout, Conn::new(self.opts())).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                let err = map_mysql_error(e, "connect");
                tracing::error!(error = %err, "failed to connect to MySQL database");
                return Err(BoardError::Connection(err.to_string()));
            }
            Err(_) => {
                tracing::error!(timeout = ?timeout, "MySQL connect timed out");
                return Err(BoardError::Timeout(format!(
                    "connect to {} did not finish within {:?}",
                    self.describe(),
                    timeout
                )));
            }
        };

        tracing::debug!(server_id = conn.id(), "MySQL connection created");
        Ok(Box::new(MySqlConnection::new(
            conn,
            self.config.read_timeout(),
            self.config.write_timeout(),
        )))
    }

    fn describe(&self) -> String {
        self.connection_string()
    }
}
