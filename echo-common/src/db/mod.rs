//! Database initialization and row conversions

pub mod init;
pub mod rows;

pub use init::*;
pub use rows::*;
