use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

use crate::mail::transport::Transport;

/// Result of the discovery handshake, fixed for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub authorization: String,
    pub account_id: String,
    pub api_url: String,
    pub download_template: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResource {
    accounts: HashMap<String, serde_json::Value>,
    api_url: String,
    download_url: String,
}

/// Fetch the JMAP session resource and pick out the single account.
pub fn establish(transport: &dyn Transport, session_url: &str, token: &str) -> Result<Session> {
    let authorization = format!("Bearer {token}");
    let resp = transport.get(session_url, &authorization)?;
    debug!("Status code (session): {}", resp.status);
    debug!("Response text (session): {}", resp.text_lossy());

    // A parseable body wins over the status code; anything else is fatal.
    let resource: SessionResource = match serde_json::from_slice(&resp.body) {
        Ok(r) => r,
        Err(e) if resp.is_success() => {
            return Err(anyhow!("unreadable session response from {session_url}: {e}"));
        }
        Err(_) => bail!(
            "session request to {session_url} failed with HTTP {}",
            resp.status
        ),
    };

    let mut ids = resource.accounts.into_keys();
    let account_id = match (ids.next(), ids.next()) {
        (Some(id), None) => id,
        (None, _) => bail!("session lists no accounts; exactly one is required"),
        (Some(_), Some(_)) => bail!(
            "session lists {} accounts; exactly one is supported",
            2 + ids.count()
        ),
    };

    Url::parse(&resource.api_url)
        .with_context(|| format!("invalid apiUrl '{}'", resource.api_url))?;

    Ok(Session {
        authorization,
        account_id,
        api_url: resource.api_url,
        download_template: resource.download_url,
    })
}
