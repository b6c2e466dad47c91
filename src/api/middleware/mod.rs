pub mod auth;
pub mod trace;

pub use auth::*;
pub use trace::*;
