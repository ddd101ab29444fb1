use serde_json::{Map, Value};

/// A caller the identity provider vouched for.
///
/// Always has a non-empty subject. Claims are kept for the operation
/// collaborators; routing never looks at them.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    subject: String,
    claims: Map<String, Value>,
}

impl Identity {
    /// Returns `None` when `subject` is empty.
    pub fn new(subject: impl Into<String>, claims: Map<String, Value>) -> Option<Self> {
        let subject = subject.into();
        if subject.trim().is_empty() {
            return None;
        }
        Some(Self { subject, claims })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_subject_is_not_an_identity() {
        assert!(Identity::new("", Map::new()).is_none());
        assert!(Identity::new("   ", Map::new()).is_none());
    }

    #[test]
    fn test_identity_keeps_claims() {
        let mut claims = Map::new();
        claims.insert("scope".into(), Value::String("invoices/write".into()));
        let identity = Identity::new("user-1", claims).unwrap();
        assert_eq!(identity.subject(), "user-1");
        assert_eq!(identity.claims()["scope"], "invoices/write");
    }
}
