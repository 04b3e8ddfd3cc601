pub mod start;
pub mod stop;

pub use start::{build_pusher, start_command};
pub use stop::stop_command;
