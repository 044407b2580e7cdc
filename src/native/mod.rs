/// Native module contains implementations of core traits
/// without any isolation layer like Docker or Runc,
/// spawning plain child processes and using the local filesystem instead.
pub mod supervisor;
pub mod workspace;
