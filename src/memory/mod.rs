pub mod types;
pub mod ids;
pub mod store;
pub mod reconcile;
pub mod selector;

pub use types::*;
pub use store::*;
pub use reconcile::*;
pub use selector::*;
