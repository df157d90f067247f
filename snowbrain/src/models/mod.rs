mod persona;
mod query;

pub use persona::*;
pub use query::*;
