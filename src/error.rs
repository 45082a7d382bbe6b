use crate::descriptor::conversion::Kind;

/// Everything that can go wrong while registering descriptors, planning a
/// conversion, or executing one.
///
/// Per the policy this library follows: `InvalidAttributes`,
/// `DuplicateMismatch` and `AllocFailed` are registration-time, "this is a
/// programming bug" errors. [`crate::Context::find_conversion`] and
/// friends route them through the context's fatal hook instead of
/// returning them to callers that merely want a conversion plan.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A lookup by name or id found nothing of that kind.
    #[error("no {kind} registered under {name:?}")]
    NotFound { kind: &'static str, name: String },

    /// A second registration under an existing name disagreed with the
    /// first on its attributes.
    #[error("{kind} {name:?} already registered with different attributes")]
    DuplicateMismatch { kind: &'static str, name: String },

    /// A descriptor's attributes violate the invariants of its kind, e.g. a
    /// format whose components are not a permutation of its model's, or a
    /// conversion whose endpoints disagree in kind.
    #[error("invalid attributes for {kind} {name:?}: {reason}")]
    InvalidAttributes {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// The planner could not find a path from `src` to `dst`, because some
    /// leg's Type or Model graph does not reach the reference.
    #[error("no conversion path from {src:?} to {dst:?}")]
    NoPath { src: String, dst: String },

    /// The configured allocator strategy returned a null/failed allocation.
    #[error("allocation of {size} bytes failed")]
    AllocFailed { size: usize },

    /// A leaf kernel wrote fewer pixels than requested. This variant is
    /// never returned as an `Err` — it documents the condition that
    /// [`crate::plan::Plan::process`] reports through its return value.
    #[error("kernel for {kind:?} conversion wrote {processed} of {requested} pixels")]
    KernelShortWrite {
        kind: Kind,
        processed: usize,
        requested: usize,
    },
}

pub type Result<T> = core::result::Result<T, Error>;
