pub mod enums;
pub mod filters;
pub mod record;
pub mod warning;

pub use enums::*;
pub use filters::*;
pub use record::*;
pub use warning::*;
