use cb_event::Event;
use tracing::warn;

use crate::Result;

pub fn encode(event: &Event) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

pub fn decode(payload: &[u8]) -> Result<Event> {
    Ok(serde_json::from_slice(payload)?)
}

/// Decode into `batch`, dropping payloads that are not events
pub fn push_decoded(batch: &mut Vec<Event>, payload: Option<&[u8]>) {
    let Some(payload) = payload else {
        warn!("Dropping message without payload");
        return;
    };
    match decode(payload) {
        Ok(event) => batch.push(event),
        Err(e) => warn!(error = %e, "Dropping undecodable event"),
    }
}
