pub mod center;
pub mod operator;
pub mod provision;
pub mod service;
