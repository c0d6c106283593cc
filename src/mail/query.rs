use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::domain::email::MessageSummary;
use crate::mail::session::Session;
use crate::mail::transport::Transport;

pub const PAGE_SIZE: u32 = 50;

const CAPABILITIES: [&str; 2] = ["urn:ietf:params:jmap:core", "urn:ietf:params:jmap:mail"];
const FILTER_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// ---- request ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JmapRequest<'a> {
    using: [&'static str; 2],
    method_calls: (Invocation<QueryArgs<'a>>, Invocation<GetArgs<'a>>),
}

/// `[name, arguments, callId]`
#[derive(Debug, Serialize)]
struct Invocation<A>(&'static str, A, &'static str);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryArgs<'a> {
    account_id: &'a str,
    sort: [Comparator; 1],
    filter: Filter,
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    anchor: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    anchor_offset: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Comparator {
    property: &'static str,
    is_ascending: bool,
}

#[derive(Debug, Serialize)]
struct Filter {
    after: String,
    before: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GetArgs<'a> {
    account_id: &'a str,
    #[serde(rename = "#ids")]
    ids: ResultReference,
    properties: [&'static str; 3],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultReference {
    name: &'static str,
    path: &'static str,
    result_of: &'static str,
}

// ---- response ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JmapResponse {
    method_responses: Vec<(String, serde_json::Value, String)>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GetResult {
    list: Vec<EmailItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailItem {
    id: String,
    blob_id: String,
    received_at: DateTime<Utc>,
    #[serde(default)]
    subject: Option<String>,
}

impl From<EmailItem> for MessageSummary {
    fn from(it: EmailItem) -> Self {
        MessageSummary {
            id: it.id,
            blob_id: it.blob_id,
            received_at: it.received_at,
            subject: it.subject,
        }
    }
}

fn build_request<'a>(
    session: &'a Session,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    anchor: Option<&'a str>,
) -> JmapRequest<'a> {
    let query = QueryArgs {
        account_id: &session.account_id,
        sort: [Comparator {
            property: "receivedAt",
            is_ascending: false,
        }],
        filter: Filter {
            after: start.format(FILTER_TIME_FORMAT).to_string(),
            before: end.format(FILTER_TIME_FORMAT).to_string(),
        },
        limit: PAGE_SIZE,
        anchor,
        anchor_offset: anchor.map(|_| 1),
    };
    let get = GetArgs {
        account_id: &session.account_id,
        ids: ResultReference {
            name: "Email/query",
            path: "/ids/*",
            result_of: "0",
        },
        properties: ["blobId", "receivedAt", "subject"],
    };
    JmapRequest {
        using: CAPABILITIES,
        method_calls: (
            Invocation("Email/query", query, "0"),
            Invocation("Email/get", get, "1"),
        ),
    }
}

/// Lazily walks every message received in `[start, end)`, newest first.
///
/// Each page is requested relative to the last id of the previous one. The
/// walk ends when the server returns an empty id list. Errors are fatal: the
/// iterator yields the error once and then stops.
pub struct EmailQuery<'a> {
    transport: &'a dyn Transport,
    session: &'a Session,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    anchor: Option<String>,
    page: VecDeque<MessageSummary>,
    done: bool,
}

pub fn query<'a>(
    transport: &'a dyn Transport,
    session: &'a Session,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> EmailQuery<'a> {
    EmailQuery {
        transport,
        session,
        start,
        end,
        anchor: None,
        page: VecDeque::new(),
        done: false,
    }
}

impl EmailQuery<'_> {
    fn fetch_page(&mut self) -> Result<()> {
        let req = build_request(self.session, self.start, self.end, self.anchor.as_deref());
        let body = serde_json::to_vec(&req)?;
        debug!("JSON request: {}", String::from_utf8_lossy(&body));

        let resp = self
            .transport
            .post_json(&self.session.api_url, &self.session.authorization, body)?;
        debug!("Status code (query): {}", resp.status);
        debug!("Response text (query): {}", resp.text_lossy());

        if resp.status == 403 {
            bail!("Permission denied: Disallowed capabilities: urn:ietf:params:jmap:mail");
        }
        let full: JmapResponse = serde_json::from_slice(&resp.body).with_context(|| {
            format!(
                "unreadable query response (HTTP {}): {}",
                resp.status,
                resp.text_lossy()
            )
        })?;

        if full
            .method_responses
            .iter()
            .any(|(name, _, _)| name.eq_ignore_ascii_case("error"))
        {
            bail!("Error received from server: {}", resp.text_lossy());
        }

        let mut calls = full.method_responses.into_iter().map(|(_, args, _)| args);
        let (query_args, get_args) = match (calls.next(), calls.next()) {
            (Some(q), Some(g)) => (q, g),
            _ => return Err(anyhow!("expected two method responses")),
        };

        let ids: QueryResult = serde_json::from_value(query_args).context("Email/query response")?;
        let Some(last) = ids.ids.last() else {
            self.done = true;
            return Ok(());
        };
        self.anchor = Some(last.clone());

        let got: GetResult = serde_json::from_value(get_args).context("Email/get response")?;
        self.page.extend(got.list.into_iter().map(MessageSummary::from));
        Ok(())
    }
}

impl Iterator for EmailQuery<'_> {
    type Item = Result<MessageSummary>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(m) = self.page.pop_front() {
                return Some(Ok(m));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}
