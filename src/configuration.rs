use std::collections::HashSet;

use crate::model::{Campaign, ConfigResponse, Timestamp, TryParse};

/// One immutable snapshot of the downloaded campaign configuration.
///
/// A selection pass uses a single snapshot throughout, so a concurrent
/// configuration update can never make one pass observe two different
/// campaign lists.
#[derive(Debug)]
pub struct Configuration {
    /// When this snapshot was materialized on the device.
    pub fetched_at: Timestamp,
    /// The server response backing this snapshot.
    pub response: ConfigResponse,
}

impl Configuration {
    /// Create a configuration snapshot from a server response.
    pub fn from_config_response(response: ConfigResponse) -> Configuration {
        let malformed = response
            .campaigns
            .iter()
            .filter(|c| matches!(c, TryParse::ParseFailed(_)))
            .count();
        if malformed > 0 {
            log::warn!(target: "inapp", malformed;
                "configuration contains campaigns that failed to parse; they will never be shown");
        }

        Configuration {
            fetched_at: chrono::Utc::now(),
            response,
        }
    }

    /// Well-formed campaigns, in server order.
    pub fn campaigns(&self) -> impl Iterator<Item = &Campaign> {
        self.response.campaigns.iter().filter_map(TryParse::parsed)
    }

    /// Ids of all well-formed campaigns.
    pub fn campaign_ids(&self) -> HashSet<crate::Str> {
        self.campaigns().map(|c| c.id.clone()).collect()
    }
}
