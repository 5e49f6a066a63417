pub mod comment;
pub mod vote;

pub use comment::*;
pub use vote::*;
