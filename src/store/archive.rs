use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::email::MessageSummary;

const SUBJECT_MAX_CHARS: usize = 50;

/// Location of a message relative to the archive root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePath {
    /// `YYYY-MM`
    pub dir: String,
    /// `YYYYMMDD_HHMMSS_<id>_<subject>.eml`
    pub file: String,
}

impl MessagePath {
    pub fn relative(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.file)
    }
}

/// Subject reduced to something safe to put in a file name.
pub fn sanitize_subject(subject: Option<&str>) -> String {
    let Some(subject) = subject else {
        return String::new();
    };
    let kept: String = subject
        .chars()
        .filter(|c| !c.is_ascii_punctuation() && !c.is_control())
        .take(SUBJECT_MAX_CHARS)
        .collect();
    kept.trim().to_string()
}

pub fn message_path(msg: &MessageSummary) -> MessagePath {
    let date = msg.received_at.format("%Y%m%d_%H%M%S");
    let dir = msg.received_at.format("%Y-%m").to_string();
    let subject = sanitize_subject(msg.subject.as_deref());
    MessagePath {
        dir,
        file: format!("{date}_{}_{subject}.eml", msg.id),
    }
}

/// Month-bucketed directory tree of `.eml` files.
#[derive(Debug, Clone)]
pub struct MailArchive {
    root: PathBuf,
}

impl MailArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn full_path(&self, msg: &MessageSummary) -> PathBuf {
        self.root.join(message_path(msg).relative())
    }

    /// A file already on disk counts as archived; contents are not checked.
    pub fn contains(&self, msg: &MessageSummary) -> bool {
        self.full_path(msg).exists()
    }

    /// Create the month directory for `msg` if it is missing.
    pub fn ensure_dir(&self, msg: &MessageSummary) -> Result<PathBuf> {
        let dir = self.root.join(message_path(msg).dir);
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        Ok(dir)
    }

    pub fn write(&self, msg: &MessageSummary, raw: &[u8]) -> Result<PathBuf> {
        let dir = self.ensure_dir(msg)?;
        let path = dir.join(message_path(msg).file);
        fs::write(&path, raw).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(subject: Option<&str>) -> MessageSummary {
        MessageSummary {
            id: "M42".into(),
            blob_id: "B42".into(),
            received_at: Utc.with_ymd_and_hms(2023, 7, 9, 8, 5, 3).unwrap(),
            subject: subject.map(str::to_string),
        }
    }

    #[test]
    fn path_layout() {
        let p = message_path(&msg(Some("Re: lunch?")));
        assert_eq!(p.dir, "2023-07");
        assert_eq!(p.file, "20230709_080503_M42_Re lunch.eml");
        assert_eq!(p.relative(), PathBuf::from("2023-07/20230709_080503_M42_Re lunch.eml"));
    }

    #[test]
    fn no_subject() {
        assert_eq!(message_path(&msg(None)).file, "20230709_080503_M42_.eml");
    }

    #[test]
    fn strips_separators_and_control_chars() {
        let s = sanitize_subject(Some("a/b\\c\td\0e..f"));
        assert_eq!(s, "abcdef");
    }

    #[test]
    fn subject_is_truncated_then_trimmed() {
        let long = format!("  {}", "x".repeat(80));
        let s = sanitize_subject(Some(&long));
        assert_eq!(s, "x".repeat(48));

        let s = sanitize_subject(Some(&"é".repeat(60)));
        assert_eq!(s.chars().count(), 50);
    }

    #[test]
    fn deterministic() {
        let m = msg(Some("Invoice #123 (final)"));
        assert_eq!(message_path(&m), message_path(&m.clone()));
        assert_eq!(message_path(&m).file, "20230709_080503_M42_Invoice 123 final.eml");
    }

    #[test]
    fn write_creates_month_dir() {
        let dir = tempfile::tempdir().unwrap();
        let archive = MailArchive::new(dir.path());
        let m = msg(Some("hello"));
        assert!(!archive.contains(&m));
        let written = archive.write(&m, b"From: a\r\n\r\nbody").unwrap();
        assert!(archive.contains(&m));
        assert_eq!(written, dir.path().join("2023-07/20230709_080503_M42_hello.eml"));
        assert_eq!(fs::read(written).unwrap(), b"From: a\r\n\r\nbody");
    }
}
