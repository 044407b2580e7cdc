pub mod adapter;
pub mod probe;
pub mod registry;
