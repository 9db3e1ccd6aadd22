//! Value and mode engine for control mappings.
//!
//! Everything in here is pure: no I/O, no logging, no allocation on the event
//! path. The domain layer composes these pieces into mappings.

mod value;
pub use value::*;

mod interval;
pub use interval::*;

mod source;
pub use source::*;

mod target;
pub use target::*;

mod transformation;
pub use transformation::*;

mod mode;
pub use mode::*;
