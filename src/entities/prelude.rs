pub use super::auth_tokens::Entity as AuthTokens;
pub use super::files::Entity as Files;
pub use super::user_roles::Entity as UserRoles;
pub use super::users::Entity as Users;
