//! Connection attempts and the step pipeline that drives them.

pub mod attempt;
pub mod steps;

pub use attempt::{ConnectAttempt, Link};
pub use steps::{ConnectContext, Step, build_plan, run};
