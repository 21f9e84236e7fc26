pub mod application;
pub mod cli;
pub mod domain;
pub mod events;
pub mod observability;
pub mod storage;

pub use domain::*;
pub use storage::Repository;
