pub mod file;
pub mod user;

pub use file::{FileRecord, ModerationStatus};
pub use user::{Permission, Role, TokenKind, User, permissions_for_roles};
