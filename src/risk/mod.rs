// Risk controls consulted by the scanner and the position manager
pub mod cooldown;

pub use cooldown::CooldownRegistry;
