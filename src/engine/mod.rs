//! Connection and statement lifecycle

mod connection;
mod handle;
mod materializer;
mod statement;

pub use connection::Connection;
pub use statement::Statement;
