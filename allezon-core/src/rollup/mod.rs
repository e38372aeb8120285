//! Rollup keys and dimension fan-out.

pub mod dimensions;
pub mod fanout;
pub mod key;

pub use dimensions::{Dimension, Dimensions};
pub use fanout::power_set;
pub use key::{RollupKey, derive_key};
