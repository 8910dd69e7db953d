//! API-side capability checks.
//!
//! Enforced at the request boundary (before any engine call), keeping the
//! ledger itself authorization-agnostic.

use thiserror::Error;

use crate::context::{PrincipalContext, Role};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Permission {
    LedgerRead,
    StockIn,
    StockOut,
    Transfer,
    EditBatch,
    PurgeBatch,
    Reconcile,
    MasterData,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::LedgerRead => "ledger.read",
            Permission::StockIn => "ledger.stock_in",
            Permission::StockOut => "ledger.stock_out",
            Permission::Transfer => "ledger.transfer",
            Permission::EditBatch => "ledger.edit",
            Permission::PurgeBatch => "ledger.purge",
            Permission::Reconcile => "ledger.reconcile",
            Permission::MasterData => "master_data.write",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("role '{role}' lacks permission '{permission}'")]
pub struct AuthzError {
    pub role: &'static str,
    pub permission: &'static str,
}

const STAFF_PERMISSIONS: &[Permission] = &[
    Permission::LedgerRead,
    Permission::StockIn,
    Permission::StockOut,
    Permission::Transfer,
];

fn grants(role: Role, permission: Permission) -> bool {
    match role {
        // Convention: "admin" grants every permission.
        Role::Admin => true,
        Role::Staff => STAFF_PERMISSIONS.contains(&permission),
    }
}

/// Check a permission for the current caller. Call **before** invoking the engine.
pub fn authorize(principal: &PrincipalContext, permission: Permission) -> Result<(), AuthzError> {
    if grants(principal.role(), permission) {
        return Ok(());
    }
    Err(AuthzError {
        role: principal.role().as_str(),
        permission: permission.as_str(),
    })
}
