pub mod chart;
pub mod chat;
pub mod credentials;
pub mod events;
pub mod projects;
