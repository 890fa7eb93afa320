pub mod constant_folding;
mod definitions;
pub use definitions::*;
pub mod visitor;
