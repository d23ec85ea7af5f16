//! Damage reversal and punishment
//!
//! The engine applies verdicts from the detection layer: hierarchy, self and
//! owner guards first, then a fairness inspection, then the role strip,
//! timeout or ban. Notifications live alongside so every user-visible DM is
//! rendered in one place.

pub mod engine;
pub mod error;
pub mod notify;

pub use engine::{
    guard_target, has_privileged_roles, punish, strippable_roles, EnforcementContext, GuardSkip,
    RoleProfile, DANGEROUS_PERMISSIONS,
};
pub use error::{EnforcementError, EnforcementResult};
