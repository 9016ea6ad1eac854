//! # `iam-domain`
//!
//! Worked examples of the command layer's seven-step template (spec
//! §4.4) over three aggregates: organizations, human users, and
//! label policies. Each command is a direct `async fn` — validate,
//! load, check invariants, append, reduce, return — rather than the
//! teacher's generic Action/Reducer/Effect interpreter, which has no
//! counterpart in an event-sourced command layer that talks to a real
//! eventstore instead of dispatching in-process effects.
//!
//! See `organization`, `user`, and `label_policy` for the three
//! aggregates, and [`iam_core::command`] for the shared
//! `CommandContext`/`ObjectDetails` types every command here returns.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod label_policy;
pub mod organization;
pub mod user;
