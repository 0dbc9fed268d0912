//! Command handlers grouped by concern.

pub(crate) mod bundle;
pub(crate) mod compare;
pub(crate) mod hashcomp;
pub(crate) mod remove;
pub(crate) mod search;
pub(crate) mod transfer;
