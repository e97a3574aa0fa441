pub mod fault_injection;
pub mod register;
pub mod routes;
pub mod server;
pub mod state;
pub mod store;
