//! Result digest computer
//!
//! Reduces a streamed result set to an order-independent integer so two runs
//! of the same query can be compared without storing their rows.
//!
//! - NULL contributes a fixed sentinel
//! - Floats are rounded to six digits before hashing
//! - Each value is weighted by its column position, never its row position
//! - Optionally writes a `value<TAB>running digest` trace per value

mod hash;
mod worker;

pub use hash::{
    digest_rows, normalize, round_float, stable_hash, ResultDigest, DIGEST_MODULUS, NULL_SENTINEL,
};
pub use worker::{
    hash_results, spawn_digest, trace_file_name, DigestJob, DigestTask, RESULT_HASHES_DIR,
};
