//! Assertions over results and chains.

/// Unwraps an `Ok`, panicking with the error otherwise.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(err) => panic!("expected Ok, got Err: {:?}", err),
        }
    };
}

/// Asserts the result failed with the given stable error code.
#[macro_export]
macro_rules! assert_error_code {
    ($expr:expr, $code:expr) => {
        match $expr {
            Ok(val) => panic!("expected Err({}), got Ok: {:?}", $code, val),
            Err(err) => {
                use ::isaac_types::error::ErrorCode as _;
                assert_eq!(err.code(), $code, "unexpected error: {}", err);
            }
        }
    };
}

use isaac_types::app::{Manifest, Voteproof};

/// Asserts `next` directly extends `prev`.
#[track_caller]
pub fn assert_chained(prev: &Manifest, next: &Manifest) {
    assert_eq!(
        next.height(),
        prev.height().next(),
        "block {} does not follow height {}",
        next.hash(),
        prev.height().0
    );
    assert_eq!(
        next.previous_block(),
        prev.hash(),
        "block at height {} points elsewhere",
        next.height().0
    );
}

/// Asserts the voteproof reached majority and was signed by none of `absent`.
#[track_caller]
pub fn assert_majority_without(voteproof: &Voteproof, absent: &[&isaac_types::app::Address]) {
    assert!(voteproof.is_majority(), "voteproof is {:?}", voteproof.result());
    for vote in voteproof.votes() {
        assert!(
            !absent.contains(&&vote.node),
            "{} voted in {:?} voteproof at height {}",
            vote.node,
            voteproof.stage(),
            voteproof.height().0
        );
    }
}
