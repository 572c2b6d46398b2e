pub mod cfg;
pub mod construct;
pub mod instruction;
pub mod script;
