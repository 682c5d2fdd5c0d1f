pub mod command;
pub mod outbox;
pub mod render;
pub mod reply;
pub mod router;
