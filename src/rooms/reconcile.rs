use tracing::{debug, info, warn};

use super::platform::VoicePlatform;
use super::registry::OwnershipRegistry;

/// Drops every registry entry whose room no longer exists. Never creates or deletes channels.
///
/// Entries that cannot be checked are kept. Returns how many entries were dropped.
pub async fn reconcile<P: VoicePlatform>(platform: &P, registry: &OwnershipRegistry) -> usize {
    let mut dropped = 0;
    for (user, channel) in registry.entries() {
        match platform.channel(channel).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                if registry.delete_if(user, channel) {
                    debug!(%user, %channel, "dropped entry for vanished room");
                    dropped += 1;
                }
            }
            Err(e) => warn!(%user, %channel, error = %e, "could not verify room; keeping entry"),
        }
    }
    info!(dropped, remaining = registry.len(), "ownership registry reconciled");
    dropped
}
