//! Account seeding: create the demo accounts and grant their roles.
//!
//! Runs with the service-role key, never from user-facing code. Existing
//! accounts keep their password and only have their role re-granted.
//!
//! ERROR HANDLING
//! ==============
//! A failing account is recorded in the report and the run moves on to the
//! next one; one bad row should not block the others.

use std::fmt;

use tracing::{error, info};

use crate::provider::{ProviderError, RoleAdmin};
use crate::role::Role;

pub const DEFAULT_PASSWORD: &str = "12345678";

#[derive(Clone, PartialEq, Eq)]
pub struct SeedAccount {
    pub email: String,
    pub password: String,
    pub role: Role,
}

impl fmt::Debug for SeedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedAccount")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

impl SeedAccount {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>, role: Role) -> Self {
        Self { email: email.into(), password: password.into(), role }
    }
}

/// One account per role.
#[must_use]
pub fn default_accounts() -> Vec<SeedAccount> {
    vec![
        SeedAccount::new("superadmin@gmail.com", DEFAULT_PASSWORD, Role::SuperAdmin),
        SeedAccount::new("admin@gmail.com", DEFAULT_PASSWORD, Role::Admin),
        SeedAccount::new("user@gmail.com", DEFAULT_PASSWORD, Role::User),
    ]
}

/// Step at which seeding an account failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedStage {
    Lookup,
    Create,
    GrantRole,
}

impl fmt::Display for SeedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lookup => "lookup",
            Self::Create => "create",
            Self::GrantRole => "grant role",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    Created,
    RoleUpdated,
    Failed { stage: SeedStage, error: ProviderError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedResult {
    pub email: String,
    pub role: Role,
    pub outcome: SeedOutcome,
}

impl fmt::Display for SeedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            SeedOutcome::Created => write!(f, "created {} with role {}", self.email, self.role),
            SeedOutcome::RoleUpdated => write!(f, "updated {} to role {}", self.email, self.role),
            SeedOutcome::Failed { stage, error } => write!(f, "failed {} at {stage}: {error}", self.email),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub results: Vec<SeedResult>,
}

impl SeedReport {
    #[must_use]
    pub fn failures(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, SeedOutcome::Failed { .. }))
            .count()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }
}

/// Create or update each account in order.
pub async fn seed_accounts(admin: &dyn RoleAdmin, accounts: &[SeedAccount]) -> SeedReport {
    let mut report = SeedReport::default();
    for account in accounts {
        let outcome = seed_one(admin, account).await;
        match &outcome {
            SeedOutcome::Failed { stage, error } => {
                error!(email = %account.email, %stage, %error, "seeding failed");
            }
            _ => info!(email = %account.email, role = %account.role, ?outcome, "account seeded"),
        }
        report
            .results
            .push(SeedResult { email: account.email.clone(), role: account.role, outcome });
    }
    report
}

async fn seed_one(admin: &dyn RoleAdmin, account: &SeedAccount) -> SeedOutcome {
    // Re-list per account so an account created earlier in the run is seen.
    let existing = match admin.list_users().await {
        Ok(users) => users
            .into_iter()
            .find(|u| u.email.as_deref() == Some(account.email.as_str())),
        Err(error) => return SeedOutcome::Failed { stage: SeedStage::Lookup, error },
    };

    if let Some(user) = existing {
        info!(email = %account.email, "account exists; updating role");
        return match admin.upsert_role(user.id, account.role).await {
            Ok(()) => SeedOutcome::RoleUpdated,
            Err(error) => SeedOutcome::Failed { stage: SeedStage::GrantRole, error },
        };
    }

    let user = match admin.create_user(&account.email, &account.password).await {
        Ok(user) => user,
        Err(error) => return SeedOutcome::Failed { stage: SeedStage::Create, error },
    };
    match admin.insert_role(user.id, account.role).await {
        Ok(()) => SeedOutcome::Created,
        Err(error) => SeedOutcome::Failed { stage: SeedStage::GrantRole, error },
    }
}

#[cfg(test)]
#[path = "seed_test.rs"]
mod tests;
