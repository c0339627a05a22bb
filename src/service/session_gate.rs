use std::sync::Arc;

use tracing::{info, warn};

pub const REJECTION_MESSAGE: &str =
    "Invalid Access Key. Please check your credentials or subscription status.";

/// Decides whether a normalised credential grants access to the portal.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> bool;
}

/// Trims surrounding whitespace and case-folds to upper case.
pub fn normalize_credential(input: &str) -> String {
    input.trim().to_uppercase()
}

/// Fixed allow-list of access codes, compared after normalisation.
#[derive(Debug, Clone)]
pub struct AccessCodeVerifier {
    codes: Vec<String>,
}

impl AccessCodeVerifier {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            codes: codes
                .into_iter()
                .map(|c| normalize_credential(c.as_ref()))
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }
}

impl CredentialVerifier for AccessCodeVerifier {
    fn verify(&self, credential: &str) -> bool {
        self.codes.iter().any(|code| code == credential)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Unlocked,
    Rejected { reason: String },
}

/// Locked/unlocked state guarding the conversation surface.
pub struct SessionGate {
    verifier: Arc<dyn CredentialVerifier>,
    unlocked: bool,
}

impl SessionGate {
    pub fn new(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { verifier, unlocked: false }
    }

    /// Any number of attempts is allowed; a rejection leaves the state untouched.
    pub fn submit_credential(&mut self, input: &str) -> GateOutcome {
        let candidate = normalize_credential(input);
        if !candidate.is_empty() && self.verifier.verify(&candidate) {
            self.unlocked = true;
            info!("Portal session unlocked");
            GateOutcome::Unlocked
        } else {
            warn!("Rejected portal access key");
            GateOutcome::Rejected { reason: REJECTION_MESSAGE.to_string() }
        }
    }

    pub fn lock(&mut self) {
        self.unlocked = false;
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> SessionGate {
        SessionGate::new(Arc::new(AccessCodeVerifier::new(["MUN2025", "mun2026"])))
    }

    #[test]
    fn starts_locked() {
        assert!(!gate().is_unlocked());
    }

    #[test]
    fn whitespace_and_case_are_ignored() {
        let mut first = gate();
        assert_eq!(first.submit_credential(" mun2025 "), GateOutcome::Unlocked);
        assert!(first.is_unlocked());

        let mut second = gate();
        assert_eq!(second.submit_credential("\tMuN2026\n"), GateOutcome::Unlocked);
    }

    #[test]
    fn unknown_code_is_rejected_with_reason() {
        let mut gate = gate();
        let outcome = gate.submit_credential("mun2024");
        assert_eq!(outcome, GateOutcome::Rejected { reason: REJECTION_MESSAGE.to_string() });
        assert!(!gate.is_unlocked());
    }

    #[test]
    fn blank_input_is_rejected() {
        let mut gate = gate();
        assert!(matches!(gate.submit_credential("   "), GateOutcome::Rejected { .. }));
    }

    #[test]
    fn repeated_failures_do_not_lock_out() {
        let mut gate = gate();
        for _ in 0..50 {
            gate.submit_credential("wrong");
        }
        assert_eq!(gate.submit_credential("MUN2025"), GateOutcome::Unlocked);
    }

    #[test]
    fn lock_returns_to_locked() {
        let mut gate = gate();
        gate.submit_credential("MUN2025");
        gate.lock();
        assert!(!gate.is_unlocked());
    }

    struct AllowNothing;

    impl CredentialVerifier for AllowNothing {
        fn verify(&self, _credential: &str) -> bool {
            false
        }
    }

    #[test]
    fn verifier_is_pluggable() {
        let mut gate = SessionGate::new(Arc::new(AllowNothing));
        assert!(matches!(gate.submit_credential("MUN2025"), GateOutcome::Rejected { .. }));
    }
}
