pub mod cooldown;

pub use cooldown::{Clock, Cooldown, CooldownActive, CooldownPermit, ManualClock, SystemClock};
