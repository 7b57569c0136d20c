//! Passive traffic observer.
//!
//! Consumes records of outbound portal requests the browser made on its own
//! and squirrels away the last-seen payload fields and session cookie for
//! later pre-fill. Strictly best-effort: malformed records are logged at
//! debug and dropped, never surfaced to the feed.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::portal::api::CREATE_CARTON_ITEM_URL;
use crate::settings::{CapturedPayload, SettingsStore};

/// One observed outbound request, as delivered by the capture feed.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct TrafficRecord {
    /// Full request URL.
    pub url: String,
    /// Request headers; names compared case-insensitively.
    pub headers: BTreeMap<String, String>,
    /// Raw request body, if the feed captured one.
    pub body: Option<String>,
}

impl TrafficRecord {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Watches the feed for carton-item creation requests.
pub struct TrafficObserver {
    store: SettingsStore,
}

impl TrafficObserver {
    pub fn new(store: SettingsStore) -> Self {
        Self { store }
    }

    /// Inspect one record, persisting payload fields and cookie when present.
    ///
    /// Never fails: every extraction or persistence problem is swallowed so
    /// the feed connection stays up.
    pub fn observe(&self, record: &TrafficRecord) {
        if !matches_endpoint(&record.url) {
            return;
        }

        if let Some(payload) = record.body.as_deref().and_then(extract_payload) {
            tracing::debug!(carton_id = %payload.carton_id, "captured portal payload");
            if let Err(err) = self
                .store
                .update(|settings| settings.captured_payload = Some(payload.clone()))
            {
                tracing::debug!("failed to persist captured payload: {err}");
            }
        }

        if let Some(cookie) = record.header("cookie").filter(|value| !value.is_empty()) {
            let cookie = cookie.to_string();
            if let Err(err) = self
                .store
                .update(|settings| settings.captured_cookie = Some(cookie.clone()))
            {
                tracing::debug!("failed to persist captured cookie: {err}");
            }
        }
    }
}

fn matches_endpoint(url: &str) -> bool {
    url.split('?').next() == Some(CREATE_CARTON_ITEM_URL)
}

/// Best-effort parse of a creation payload.
///
/// Requires the two identifying fields (`cartonId`, `vendorId`); a missing
/// `skuCode` is captured as empty rather than discarding the record.
fn extract_payload(body: &str) -> Option<CapturedPayload> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let carton_id = match value.get("cartonId")? {
        serde_json::Value::Number(number) => number.to_string(),
        serde_json::Value::String(text) if !text.is_empty() => text.clone(),
        _ => return None,
    };
    let vendor_id = value.get("vendorId")?.as_str()?.to_string();
    if vendor_id.is_empty() {
        return None;
    }
    let sku_code = value
        .get("skuCode")
        .and_then(|sku| sku.as_str())
        .unwrap_or_default()
        .to_string();
    Some(CapturedPayload {
        carton_id,
        vendor_id,
        sku_code,
    })
}
