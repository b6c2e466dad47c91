pub mod export;
pub mod system;

pub use export::*;
pub use system::*;
