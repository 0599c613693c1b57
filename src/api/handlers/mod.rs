pub mod admins;
pub mod audit;
pub mod health;
pub mod session;
pub mod throttle;
