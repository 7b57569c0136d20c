//! Client for the partner portal carton-item creation endpoint.

use serde::Serialize;

use crate::http_client;

/// Fixed endpoint the request loop posts to.
pub const CREATE_CARTON_ITEM_URL: &str =
    "https://partnersapi.myntrainfo.com/api/scanandpack/cartonItem/create";
/// Portal origin the browser would send alongside the request.
pub const PORTAL_ORIGIN: &str = "https://partners.myntrainfo.com";
/// Referer for the portal page the traffic originates from.
pub const PORTAL_REFERER: &str = "https://partners.myntrainfo.com/";

const MAX_ERROR_BODY_BYTES: usize = 16 * 1024;

/// Wire payload for one carton-item creation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartonItemRequest {
    /// Numeric carton identifier.
    pub carton_id: i64,
    /// Opaque vendor identifier.
    pub vendor_id: String,
    /// Opaque SKU code.
    pub sku_code: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateItemError {
    /// The portal answered with a non-2xx status.
    #[error("HTTP {code}: {detail}")]
    Status { code: u16, detail: String },
    /// The request never produced an HTTP response.
    #[error("HTTP error: {0}")]
    Transport(String),
}

/// Seam for issuing one creation attempt, so the request loop can run
/// against a fake in tests.
pub trait SubmitCartonItem: Send + Sync {
    /// Issue a single POST; `attempt` is the 1-based attempt index.
    fn submit(
        &self,
        request: &CartonItemRequest,
        cookie_header: &str,
        attempt: u32,
    ) -> Result<(), CreateItemError>;
}

/// Production submitter backed by the shared HTTP agent.
#[derive(Clone, Copy, Debug, Default)]
pub struct PortalClient;

impl SubmitCartonItem for PortalClient {
    fn submit(
        &self,
        request: &CartonItemRequest,
        cookie_header: &str,
        attempt: u32,
    ) -> Result<(), CreateItemError> {
        tracing::debug!(attempt, carton_id = request.carton_id, "posting carton item");
        create_carton_item(request, cookie_header)
    }
}

/// POST one carton item with the portal's expected header set.
///
/// Any 2xx response body is discarded; only the status matters to callers.
pub fn create_carton_item(
    request: &CartonItemRequest,
    cookie_header: &str,
) -> Result<(), CreateItemError> {
    let req = http_client::agent()
        .post(CREATE_CARTON_ITEM_URL)
        .set("Accept", "application/json")
        .set("Accept-Language", "en-US,en;q=0.5")
        .set("Content-Type", "application/json")
        .set("Referer", PORTAL_REFERER)
        .set("X-Requested-With", "XMLHttpRequest")
        .set("x-myntra-app-name", "partners")
        .set("Origin", PORTAL_ORIGIN)
        .set("Sec-Fetch-Dest", "empty")
        .set("Sec-Fetch-Mode", "cors")
        .set("Sec-Fetch-Site", "same-site")
        .set("Cookie", cookie_header);

    match req.send_json(request) {
        Ok(_response) => Ok(()),
        Err(ureq::Error::Status(code, response)) => {
            Err(status_error(code, response))
        }
        Err(ureq::Error::Transport(err)) => Err(CreateItemError::Transport(err.to_string())),
    }
}

fn status_error(code: u16, response: ureq::Response) -> CreateItemError {
    let status_text = response.status_text().to_string();
    let body = http_client::read_body_truncated(response, MAX_ERROR_BODY_BYTES)
        .unwrap_or_default();
    let trimmed = body.trim();
    let detail = if trimmed.is_empty() {
        status_text
    } else {
        trimmed.to_string()
    };
    CreateItemError::Status { code, detail }
}
