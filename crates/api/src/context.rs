use stockledger_core::ActorName;

/// Caller role as asserted by the fronting gateway.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Admin,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "staff" => Some(Role::Staff),
            _ => None,
        }
    }
}

/// Principal context for a request (caller identity + role).
///
/// Must be present for every ledger route; the actor is recorded as `by` on
/// every transaction the request writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    actor: ActorName,
    role: Role,
}

impl PrincipalContext {
    pub fn new(actor: ActorName, role: Role) -> Self {
        Self { actor, role }
    }

    pub fn actor(&self) -> &ActorName {
        &self.actor
    }

    pub fn role(&self) -> Role {
        self.role
    }
}
