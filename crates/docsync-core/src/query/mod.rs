pub mod artifacts;
pub mod change_impact;
pub mod guards;
pub mod risk;
pub mod threshold;
