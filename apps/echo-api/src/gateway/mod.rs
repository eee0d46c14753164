pub mod dispatch;
pub mod events;
pub mod registry;
pub mod server;
pub mod sweep;

pub use dispatch::Gateway;
