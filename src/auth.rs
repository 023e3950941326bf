//! Credential model and the token store/refresher.

pub mod credential;
pub mod manager;

pub use credential::*;
pub use manager::*;
