pub mod chat;
pub mod gate;
