pub mod availability;
pub mod slots;
pub mod store;
