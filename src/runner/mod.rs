//! Query lifecycle controller
//!
//! Drives one query through a session:
//!
//! ```text
//! prepare -> submit -> poll ---------------> fetchable -> digest (SELECT) -> report
//!                       |                               \-> wait   (DML)  -/
//!                       \-> deadline -> cancel -> report
//! ```
//!
//! Any failure between submission and completion is classified into the
//! report rather than returned.

mod cancel;
mod controller;

pub use cancel::cancel_query;
pub use controller::QueryRunner;
