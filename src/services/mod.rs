pub mod auth;
pub mod document;
pub mod password;
pub mod qr;
pub mod share;

pub use auth::AuthService;
pub use document::DocumentService;
pub use password::SharePasswordHasher;
pub use share::ShareService;
