//! Who is calling, and what they may do inside an organisation.
//!
//! Authentication happens upstream; the gateway forwards the caller's id in
//! `X-User-Id`. Membership and role checks happen here.

mod context;
mod membership;

pub use context::{ActingUser, X_USER_ID};
pub use membership::{require_permission, Membership};
