pub mod connection;
pub mod dispatcher;
pub mod fanout;
pub mod registry;
