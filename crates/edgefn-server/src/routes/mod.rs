pub mod admin;
pub mod functions;
pub mod shared;
