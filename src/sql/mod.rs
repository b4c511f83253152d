//! Safe SQL builder: identifiers from the introspected schema only, values as parameters.

mod builder;
mod filter;
pub mod params;
pub use builder::*;
pub use filter::*;
