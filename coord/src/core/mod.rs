pub mod debug;
pub mod download;
pub mod manager;
pub mod meta;
pub mod placement;
pub mod routes;
pub mod state;
pub mod transport;
pub mod upload;
