//! Keeping the model request inside the context window.
//!
//! Two mechanisms share one pruning primitive:
//!
//! | When | Trigger | Drop per step |
//! |------|---------|---------------|
//! | Before each call | estimate > request budget | 1 turn until it fits |
//! | After a rejection | overflow error | 2 × attempt turns |
//! | After a rejection | generic 400 | attempt turns |
//!
//! Both repair an orphaned tool turn at the head and never touch the
//! current exchange.

pub mod budget;
pub mod recovery;

pub use budget::enforce_budget;
pub use recovery::{prune_oldest, PruneReason};
