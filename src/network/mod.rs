pub mod file_server;
pub mod local_ip;
pub mod validators;

pub use file_server::ServeSession;
