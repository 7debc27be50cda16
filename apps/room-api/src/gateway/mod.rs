pub mod events;
pub mod fanout;
pub mod handler;
pub mod presence;
pub mod reaper;
pub mod server;
pub mod session;
