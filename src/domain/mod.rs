mod account;
mod money;
mod principal;
mod transaction;

pub use account::*;
pub use money::*;
pub use principal::*;
pub use transaction::*;
