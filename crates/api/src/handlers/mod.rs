pub mod generate;
pub mod tasks;
