pub mod sharded;

pub mod token;
pub use token::{Claims, IssuedToken, Principal, TokenError, TokenService};

pub mod throttle;
pub use throttle::LoginThrottle;

pub mod rate_limit;
pub use rate_limit::{RateLimitError, RateLimiter};

pub mod permissions;
pub use permissions::PermissionResolver;

pub mod validation;

pub mod mailer;
pub use mailer::{LogMailer, Mailer};

pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{
    AuthError, AuthResult, AuthService, Registration, UserInfo, VerificationStatus,
};
pub use auth_service_impl::SeaOrmAuthService;

pub mod file_service;
pub mod file_service_impl;
pub use file_service::{FileError, FilePage, FileService, NewUpload};
pub use file_service_impl::SeaOrmFileService;

pub mod scheduler;
pub use scheduler::Scheduler;
