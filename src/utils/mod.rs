pub mod cli;
pub mod jwt;
pub mod mime;
pub mod session;
pub mod state;
