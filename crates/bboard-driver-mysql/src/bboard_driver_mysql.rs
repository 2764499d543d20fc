//! MySQL/MariaDB driver for the bboard connection pool

mod connection;
mod driver;

pub use connection::MySqlConnection;
pub use driver::MySqlConnectionFactory;
