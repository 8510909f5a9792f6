pub mod burn_sweeper;
pub mod encryption;
pub mod message_service;
pub mod session_service;
pub mod unread_service;
