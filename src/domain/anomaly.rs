use crate::domain::models::ChargeSession;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub suspicious: bool,
}

/// Hook for an external fraud/anomaly check on freshly recorded sessions.
pub trait SessionClassifier {
    fn classify(&self, session: &ChargeSession) -> Classification;
}

/// Treats every session as normal. Used until a real classifier is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSessionClassifier;

impl SessionClassifier for NoopSessionClassifier {
    fn classify(&self, _session: &ChargeSession) -> Classification {
        Classification::default()
    }
}
