pub mod channel;
pub mod compute;
pub mod config;
pub mod consts;
pub mod error;
pub mod io;
pub mod levels;
pub mod overlay;
pub mod preview;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod transform;
pub mod viewport;
