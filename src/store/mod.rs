pub mod audit;
pub mod claims;
pub mod heartbeat;
pub mod lock;
pub mod paths;
pub mod persist;
pub mod repo;
