//! Internal utilities.

mod dynamic;
pub use dynamic::Dynamic;
