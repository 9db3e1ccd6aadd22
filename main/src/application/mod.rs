mod mapping_data;
pub use mapping_data::*;
