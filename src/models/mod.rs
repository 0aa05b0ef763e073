pub mod document;
pub mod share;
pub mod user;

pub use document::*;
pub use share::*;
pub use user::*;
