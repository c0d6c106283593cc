/// Report every this many verified messages.
pub const REPORT_EVERY: u64 = 100;

/// Running count of messages confirmed present during a verify pass,
/// compared against what the previous verify pass found.
#[derive(Debug, Clone)]
pub struct VerifyProgress {
    previous: Option<u64>,
    verified: u64,
}

impl VerifyProgress {
    pub fn new(previous: Option<u64>) -> Self {
        Self {
            previous,
            verified: 0,
        }
    }

    pub fn verified(&self) -> u64 {
        self.verified
    }

    /// Count one message; returns a line to show when a reporting step is hit.
    pub fn record(&mut self) -> Option<String> {
        self.verified += 1;
        (self.verified % REPORT_EVERY == 0).then(|| self.message())
    }

    pub fn message(&self) -> String {
        match self.previous {
            Some(prev) if prev > 0 => {
                let pct = self.verified as f64 / prev as f64 * 100.0;
                format!("Verified {pct:.1}% ({} of {prev})", self.verified)
            }
            _ => format!("Verified {}", self.verified),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hundredth_of_five_hundred_is_twenty_percent() {
        let mut p = VerifyProgress::new(Some(500));
        let lines: Vec<_> = (0..100).filter_map(|_| p.record()).collect();
        assert_eq!(lines, vec!["Verified 20.0% (100 of 500)".to_string()]);
    }

    #[test]
    fn without_previous_count_only_totals() {
        let mut p = VerifyProgress::new(None);
        for _ in 0..99 {
            assert!(p.record().is_none());
        }
        assert_eq!(p.record().as_deref(), Some("Verified 100"));

        let mut z = VerifyProgress::new(Some(0));
        z.verified = 99;
        assert_eq!(z.record().as_deref(), Some("Verified 100"));
    }

    #[test]
    fn can_exceed_previous_run() {
        let mut p = VerifyProgress::new(Some(150));
        p.verified = 199;
        assert_eq!(p.record().as_deref(), Some("Verified 133.3% (200 of 150)"));
    }
}
