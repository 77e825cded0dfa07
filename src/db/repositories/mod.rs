pub mod file;
pub mod token;
pub mod user;
