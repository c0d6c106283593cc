use anyhow::{Result, bail};
use log::debug;
use std::path::PathBuf;

use crate::domain::email::MessageSummary;
use crate::mail::session::Session;
use crate::mail::transport::Transport;
use crate::store::archive::MailArchive;

const DOWNLOAD_NAME: &str = "email";
const DOWNLOAD_TYPE: &str = "application/octet-stream";

pub fn download_url(session: &Session, blob_id: &str) -> String {
    session
        .download_template
        .replace("{accountId}", &session.account_id)
        .replace("{blobId}", blob_id)
        .replace("{name}", DOWNLOAD_NAME)
        .replace("{type}", DOWNLOAD_TYPE)
}

/// Fetch the raw message and store it in the archive.
///
/// Every failure (network, HTTP status, disk) comes back as `Err`; callers
/// decide whether to retry.
pub fn download_email(
    transport: &dyn Transport,
    session: &Session,
    msg: &MessageSummary,
    archive: &MailArchive,
) -> Result<PathBuf> {
    archive.ensure_dir(msg)?;
    let url = download_url(session, &msg.blob_id);
    let resp = transport.get(&url, &session.authorization)?;
    if !resp.is_success() {
        bail!("HTTP {} for {url}", resp.status);
    }
    let path = archive.write(msg, &resp.body)?;
    debug!(
        "Downloaded {} {}",
        msg.id,
        msg.received_at.format("%Y-%m-%d %H:%M:%S")
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::transport::mock::MockTransport;
    use chrono::{TimeZone, Utc};

    fn session() -> Session {
        Session {
            authorization: "Bearer t".into(),
            account_id: "acc".into(),
            api_url: "https://jmap.test/api/".into(),
            download_template: "https://dl.test/{accountId}/{blobId}/{name}?type={type}".into(),
        }
    }

    fn msg() -> MessageSummary {
        MessageSummary {
            id: "m1".into(),
            blob_id: "blob1".into(),
            received_at: Utc.with_ymd_and_hms(2022, 12, 31, 23, 59, 59).unwrap(),
            subject: Some("Year end".into()),
        }
    }

    #[test]
    fn renders_template() {
        assert_eq!(
            download_url(&session(), "blob1"),
            "https://dl.test/acc/blob1/email?type=application/octet-stream"
        );
    }

    #[test]
    fn writes_body_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let archive = MailArchive::new(dir.path());
        let t = MockTransport::new();
        let url = download_url(&session(), "blob1");
        t.on_get(&url, 200, b"raw\r\nmessage".to_vec());

        let path = download_email(&t, &session(), &msg(), &archive).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"raw\r\nmessage");
        assert!(path.starts_with(dir.path().join("2022-12")));
    }

    #[test]
    fn http_error_is_reported_and_nothing_written() {
        let dir = tempfile::tempdir().unwrap();
        let archive = MailArchive::new(dir.path());
        let t = MockTransport::new();
        t.on_get(&download_url(&session(), "blob1"), 500, "oops");

        let err = download_email(&t, &session(), &msg(), &archive).unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
        assert!(!archive.contains(&msg()));
    }

    #[test]
    fn network_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let archive = MailArchive::new(dir.path());
        let t = MockTransport::new();
        t.fail_get(&download_url(&session(), "blob1"));
        assert!(download_email(&t, &session(), &msg(), &archive).is_err());
    }
}
