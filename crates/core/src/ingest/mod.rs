pub mod asic;
pub mod collect;
pub mod provider;
pub mod short_interest;
pub mod types;
