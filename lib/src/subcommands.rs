pub use client::*;
pub use server::*;
pub use train::*;

pub mod client;
pub mod packet;
pub mod server;
pub mod train;
