pub mod progress;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Duration, NaiveTime, SubsecRound, TimeZone, Utc};
use log::{debug, info, warn};
use std::path::Path;

use crate::backup::progress::VerifyProgress;
use crate::config::{Config, ConfigFile, EnvSettings};
use crate::domain::email::{EmailId, MessageSummary};
use crate::mail::download::download_email;
use crate::mail::query::query;
use crate::mail::session::{self, Session};
use crate::mail::transport::Transport;
use crate::store::archive::MailArchive;

pub struct BackupOptions {
    /// Rescan from the floor date and re-fetch anything missing.
    pub verify: bool,
    /// Supplies the floor when the config has no `not_before`.
    pub env: EnvSettings,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub archived: u64,
    pub verified: u64,
    pub already_present: u64,
    pub failed: Vec<EmailId>,
}

/// Half-open `[start, end)` range of receipt times to archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub fn compute_window(cfg: &Config, opts: &BackupOptions, now: DateTime<Utc>) -> Result<Window> {
    let end = Duration::try_hours(cfg.delay_hours)
        .and_then(|delay| now.trunc_subsecs(0).checked_sub_signed(delay))
        .ok_or_else(|| anyhow!("Configuration error: delay_hours {} is out of range", cfg.delay_hours))?;
    let not_before = cfg.not_before(&opts.env)?;
    let floor = Utc.from_utc_datetime(&not_before.and_time(NaiveTime::MIN));
    debug!("Will not archive email prior to {not_before}");

    let start = if opts.verify {
        floor
    } else {
        cfg.last_end_time.unwrap_or(floor)
    };
    Ok(Window { start, end })
}

pub fn check_dest_dir(dest: &Path) -> Result<()> {
    if !dest.is_dir() {
        bail!(
            "destination path '{}' does not exist (you may need to mount it?)",
            dest.display()
        );
    }
    Ok(())
}

struct Run<'a> {
    transport: &'a dyn Transport,
    session: &'a Session,
    archive: &'a MailArchive,
    progress: Option<VerifyProgress>,
    report: BackupReport,
}

impl Run<'_> {
    fn try_download(&mut self, msg: &MessageSummary) -> bool {
        match download_email(self.transport, self.session, msg, self.archive) {
            Ok(_) => {
                self.report.archived += 1;
                true
            }
            Err(e) => {
                debug!("Failed to download {}: {e:#}", msg.id);
                false
            }
        }
    }

    fn count_verified(&mut self) {
        if let Some(p) = self.progress.as_mut() {
            if let Some(line) = p.record() {
                debug!("{line}");
            }
            self.report.verified = p.verified();
        }
    }

    /// Scan pass: existing files are trusted, missing ones are fetched.
    /// Returns the messages whose download failed.
    fn scan(&mut self, window: Window) -> Result<Vec<MessageSummary>> {
        let mut failed = Vec::new();
        for item in query(self.transport, self.session, window.start, window.end) {
            let msg = item?;
            if self.archive.contains(&msg) {
                debug!("{} ok", self.archive.full_path(&msg).display());
                self.report.already_present += 1;
            } else if !self.try_download(&msg) {
                failed.push(msg);
                continue;
            }
            self.count_verified();
        }
        Ok(failed)
    }

    /// One more attempt for each failure, no backoff.
    fn retry(&mut self, failed: Vec<MessageSummary>) {
        if failed.is_empty() {
            return;
        }
        info!("Retrying {} failed downloads", failed.len());
        for msg in failed {
            if self.try_download(&msg) {
                self.count_verified();
            } else {
                warn!("Failed to download {} after retry", msg.id);
                self.report.failed.push(msg.id);
            }
        }
    }
}

/// Archive everything in the current window and advance the checkpoint.
///
/// Session, authorization and query errors abort before the config is
/// written, so the next run starts from the same point. Individual download
/// failures do not.
pub fn run_backup(
    transport: &dyn Transport,
    file: &mut ConfigFile,
    opts: &BackupOptions,
    now: DateTime<Utc>,
) -> Result<BackupReport> {
    let archive = MailArchive::new(&file.config.dest_dir);
    let session = session::establish(transport, file.config.session_url(), &file.config.token)?;
    let window = compute_window(&file.config, opts, now)?;
    info!("Archiving messages received {} .. {}", window.start, window.end);

    let mut run = Run {
        transport,
        session: &session,
        archive: &archive,
        progress: opts
            .verify
            .then(|| VerifyProgress::new(file.config.last_verify_count)),
        report: BackupReport::default(),
    };
    if opts.verify {
        debug!("Verification enabled (this will take longer)");
    }

    if window.start < window.end {
        let failed = run.scan(window)?;
        debug!("Done!");
        run.retry(failed);
    } else {
        warn!(
            "empty window: start {} is not before end {}",
            window.start, window.end
        );
    }

    let report = run.report;
    file.config.last_end_time = Some(window.end);
    if report.verified > 0 {
        file.config.last_verify_count = Some(report.verified);
    }
    file.save()?;
    Ok(report)
}
