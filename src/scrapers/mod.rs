pub mod base;
pub mod market;
pub mod nepse;
