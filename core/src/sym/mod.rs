mod arena;
mod model;


pub use arena::*;
pub use model::*;
