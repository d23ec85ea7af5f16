//! Anomaly detection for guild-nuke patterns
//!
//! Pure, clock-parameterized primitives (sliding windows, cooldown gates,
//! warn-once ledgers) composed into per-event classification chains by the
//! [`Detector`]. Nothing in this module touches Discord; the event handlers
//! feed it normalized events and act on the verdicts.

pub mod classifier;
pub mod cooldown;
pub mod warnings;
pub mod window;

pub use classifier::{
    BanVerdict, BotAddVerdict, CheckKind, CreationKind, DeletionKind, Detector, LinkVerdict,
    Violation,
};
pub use cooldown::{BotAddCooldown, CooldownAction, CooldownGate};
pub use warnings::{Offense, WarningLedger};
pub use window::SlidingWindow;
