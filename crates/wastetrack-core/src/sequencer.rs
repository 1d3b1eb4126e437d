//! Request sequencing for stale-response protection
//!
//! Each query context (a list view, a lookup loader) has a monotonically
//! increasing sequence. A response is applied only if its ticket is still
//! the latest issued for its context.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use wastetrack_core_types::RequestId;

/// Handle for one issued request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    context: String,
    seq: u64,
    request_id: RequestId,
}

impl RequestTicket {
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}

/// Issues tickets and answers whether a ticket is still current
///
/// Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct RequestSequencer {
    latest: Arc<Mutex<HashMap<String, u64>>>,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next ticket for `context`, superseding earlier ones
    pub fn begin(&self, context: &str) -> RequestTicket {
        let seq = self
            .latest
            .lock()
            .map(|mut latest| {
                let entry = latest.entry(context.to_string()).or_insert(0);
                *entry += 1;
                *entry
            })
            .unwrap_or(0);

        RequestTicket {
            context: context.to_string(),
            seq,
            request_id: RequestId::new(),
        }
    }

    /// True if no newer ticket was issued for the ticket's context
    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.latest
            .lock()
            .map(|latest| latest.get(&ticket.context).copied() == Some(ticket.seq))
            .unwrap_or(false)
    }

    /// Supersede every outstanding ticket (sign-out)
    ///
    /// Counters keep increasing so a ticket issued before the reset can never
    /// match one issued after it.
    pub fn reset(&self) {
        self.latest
            .lock()
            .map(|mut latest| latest.values_mut().for_each(|seq| *seq += 1))
            .ok();
    }
}
