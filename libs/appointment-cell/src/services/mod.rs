pub mod authorization;
pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod notifications;
pub mod session;
pub mod slots;
pub mod store;
