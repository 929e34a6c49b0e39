pub mod display;
pub mod stock;
