pub mod chat;
pub mod pipeline;
