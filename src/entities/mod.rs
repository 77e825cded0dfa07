pub mod prelude;

pub mod auth_tokens;
pub mod files;
pub mod user_roles;
pub mod users;
