mod gpu;
pub mod renderer;
pub mod structs;

pub use gpu::{FillRect, Gpu};
