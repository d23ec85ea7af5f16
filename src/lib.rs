pub mod commands;
pub mod data;
pub mod detection;
pub mod enforcement;
pub mod handlers;
pub mod logging;

// Customize these constants for your bot
pub const BOT_NAME: &str = "crashguard";
pub const COMMAND_TARGET: &str = "crashguard::command";
pub const ERROR_TARGET: &str = "crashguard::error";
pub const EVENT_TARGET: &str = "crashguard::handlers";
pub const DETECTION_TARGET: &str = "crashguard::detection";
pub const ENFORCEMENT_TARGET: &str = "crashguard::enforcement";
pub const CONSOLE_TARGET: &str = "crashguard";

pub use data::{Data, DataInner, Settings};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
