pub mod domain;
pub mod errors;
pub mod pipeline;
pub mod sanitize;
pub mod traits;
