use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipalKind {
    Human,
    Service,
}

/// Verified claims about the caller, as produced by the identity gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub kind: PrincipalKind,
}

impl IdentityClaims {
    pub fn human(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            email: None,
            name: None,
            kind: PrincipalKind::Human,
        }
    }

    pub fn service(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            email: None,
            name: None,
            kind: PrincipalKind::Service,
        }
    }

    pub fn is_service_principal(&self) -> bool {
        self.kind == PrincipalKind::Service
    }

    /// Best human-readable label for a new realm.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| self.subject.clone())
    }
}
