#[macro_use]
mod global_macros;

mod channels;
pub use channels::*;
