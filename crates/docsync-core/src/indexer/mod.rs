pub mod dependencies;
pub mod symbols;
