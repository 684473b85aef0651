use super::Severity;

/// Minimum-severity gate applied before a record is formatted or buffered.
#[derive(Debug, Clone, Copy)]
pub struct SeverityFilter {
    threshold: Severity,
}

impl SeverityFilter {
    pub fn new(threshold: Severity) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Severity {
        self.threshold
    }

    #[inline]
    pub fn should_emit(&self, severity: Severity) -> bool {
        severity >= self.threshold
    }
}
