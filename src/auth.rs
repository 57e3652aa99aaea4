//! Token models and scope sets.

pub mod scope;
pub mod token;

pub use scope::*;
pub use token::{record::*, secret::*};
