pub mod types;
pub mod machine;

pub use machine::*;
pub use types::*;
