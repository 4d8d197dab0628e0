pub mod context;
pub mod profile;
pub mod role;
pub mod session;
