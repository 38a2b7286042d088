pub mod logger;
pub mod workspace;
