//! Network-facing stages: static fetch, robots check, rendering fallback.

pub mod http;
pub mod render;
pub mod robots;

pub use http::HttpFetcher;
#[cfg(feature = "headless")]
pub use render::ChromiumEngine;
pub use render::{FallbackRenderer, PendingLaunch, SessionGuard};
pub use robots::{check_robots, RobotsBasis, RobotsDecision, RobotsTxt};
