pub mod dump;
pub mod log;
