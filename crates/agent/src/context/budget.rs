//! Proactive request budgeting.

use deskpilot_core::provider::ProviderRequest;
use super::recovery::prune_oldest;

/// Drop the oldest turns of `request` until its estimate fits `budget`.
///
/// Turns at index `protected_from` and later (the current exchange) are
/// never dropped, so an oversized current exchange is sent as-is and left
/// to overflow recovery. Returns how many turns were removed.
pub fn enforce_budget(request: &mut ProviderRequest, budget: usize, protected_from: usize) -> usize {
    let mut dropped = 0;
    let mut protected_from = protected_from.min(request.messages.len());
    while request.estimated_tokens() > budget && protected_from > 0 {
        let removed = prune_oldest(&mut request.messages, 1, protected_from);
        if removed == 0 {
            break;
        }
        protected_from -= removed;
        dropped += removed;
    }
    dropped
}
