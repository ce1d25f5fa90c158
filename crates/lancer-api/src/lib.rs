pub mod auth;
pub mod chats;
pub mod files;
pub mod messages;
pub mod middleware;
pub mod users;
