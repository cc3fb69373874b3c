//! 常用系统

mod callback;
mod constant;
mod pid;
mod ramp;
mod summer;
mod wam;

pub use callback::Callback;
pub use constant::Constant;
pub use pid::{PidController, PidGains};
pub use ramp::Ramp;
pub use summer::Summer;
pub use wam::{LowLevelWamWrapper, WamSink, WamSource};
