use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use sc_core::{ContactsError, ContactsResult, millis};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

pub const SYNC_PATH: &str = "/api/contacts/sync";
pub const CHECK_PATH: &str = "/api";

#[derive(Debug, Clone)]
pub struct ContactsApi {
    base_url: String,
    client: Client,
}

/// One contact as it travels over the wire. A `None` label is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireContact {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "millis::deserialize_opt")]
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncRequest {
    pub current_timestamp: i64,
    pub items: BTreeMap<String, WireContact>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SyncResponse {
    #[serde(default, deserialize_with = "lenient_items")]
    pub items: BTreeMap<String, WireContact>,
}

impl ContactsApi {
    pub fn new(base_url: &str) -> ContactsResult<Self> {
        let trimmed = base_url.trim().trim_end_matches('/').to_string();
        if trimmed.is_empty() {
            return Err(ContactsError::usage("server URL cannot be empty"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!("stellar-contacts/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| {
                ContactsError::io(format!("failed to construct API client: {err}"))
            })?;

        Ok(Self {
            base_url: trimmed,
            client,
        })
    }

    /// Read-only authenticated request; any 2xx answer means the key is accepted.
    pub fn check_api_key(&self, api_key: &str) -> ContactsResult<()> {
        if api_key.trim().is_empty() {
            return Err(ContactsError::usage("API key is required"));
        }

        let response = self
            .client
            .get(self.url(CHECK_PATH))
            .bearer_auth(api_key)
            .send()
            .map_err(network_error)?;

        parse_no_content_response(response)
    }

    /// Pushes the local change set and returns the remote change set.
    pub fn sync_contacts(
        &self,
        api_key: &str,
        request: &SyncRequest,
    ) -> ContactsResult<SyncResponse> {
        if api_key.trim().is_empty() {
            return Err(ContactsError::usage("API key is required for sync"));
        }

        tracing::debug!(
            items = request.items.len(),
            current_timestamp = request.current_timestamp,
            "posting contact changes"
        );

        let response = self
            .client
            .post(self.url(SYNC_PATH))
            .bearer_auth(api_key)
            .json(request)
            .send()
            .map_err(network_error)?;

        parse_json_response(response)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn parse_no_content_response(response: Response) -> ContactsResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body_text = response.text().ok();
    Err(parse_error_response(status, body_text.as_deref()))
}

fn parse_json_response<T: DeserializeOwned>(response: Response) -> ContactsResult<T> {
    let status = response.status();
    let body_text = response.text();

    if !status.is_success() {
        return Err(parse_error_response(status, body_text.ok().as_deref()));
    }

    let body_text = body_text
        .map_err(|err| ContactsError::sync(format!("failed to read API response body: {err}")))?;

    serde_json::from_str::<T>(&body_text)
        .map_err(|err| ContactsError::sync(format!("failed to decode API response JSON: {err}")))
}

/// Picks the most human-readable explanation of a failed request: a JSON
/// `message` or `error` field, then the raw body, then `"<code> <reason>"`.
fn parse_error_response(status: StatusCode, body_text: Option<&str>) -> ContactsError {
    let fallback = format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or_default()
    )
    .trim_end()
    .to_string();

    let message = match body_text {
        Some(body) if !body.is_empty() => {
            message_from_json(body).unwrap_or_else(|| body.to_string())
        }
        _ => fallback,
    };

    ContactsError::http(status.as_u16(), message)
}

fn message_from_json(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<Value>(body).ok()?;
    let object = parsed.as_object()?;

    ["message", "error"]
        .iter()
        .filter_map(|field| object.get(*field))
        .find_map(readable_field)
}

fn readable_field(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Object(nested) => nested
            .get("message")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

/// Accepts `items` as an object of entries; `null` entries and entries that do
/// not decode are dropped, and a non-object `items` reads as empty.
fn lenient_items<'de, D>(deserializer: D) -> Result<BTreeMap<String, WireContact>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let Value::Object(entries) = raw else {
        if !raw.is_null() {
            tracing::warn!("remote items payload is not an object; ignoring it");
        }
        return Ok(BTreeMap::new());
    };

    let mut items = BTreeMap::new();
    for (id, entry) in entries {
        if entry.is_null() {
            continue;
        }

        match serde_json::from_value::<WireContact>(entry) {
            Ok(contact) => {
                items.insert(id, contact);
            }
            Err(err) => {
                tracing::warn!(id = %id, error = %err, "skipping undecodable remote contact");
            }
        }
    }

    Ok(items)
}

fn network_error(err: reqwest::Error) -> ContactsError {
    ContactsError::sync(format!("network request failed: {err}"))
}
