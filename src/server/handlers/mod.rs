pub mod chat;
pub mod conversations;
pub mod documents;
pub mod health;
pub mod settings;
pub mod whatsapp;
