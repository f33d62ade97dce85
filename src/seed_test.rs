use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use super::*;
use crate::provider::ProviderUser;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    List,
    Create(String),
    Upsert(Uuid, Role),
    Insert(Uuid, Role),
}

#[derive(Default)]
struct MockAdmin {
    users: Mutex<Vec<ProviderUser>>,
    calls: Mutex<Vec<Call>>,
    fail_create: Mutex<HashMap<String, ProviderError>>,
    fail_list: Mutex<Option<ProviderError>>,
    fail_grant: Mutex<Option<ProviderError>>,
}

impl MockAdmin {
    fn with_existing(email: &str) -> (Self, Uuid) {
        let admin = Self::default();
        let id = Uuid::new_v4();
        admin
            .users
            .lock()
            .unwrap()
            .push(ProviderUser { id, email: Some(email.to_owned()) });
        (admin, id)
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RoleAdmin for MockAdmin {
    async fn list_users(&self) -> Result<Vec<ProviderUser>, ProviderError> {
        self.calls.lock().unwrap().push(Call::List);
        if let Some(e) = self.fail_list.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.users.lock().unwrap().clone())
    }

    async fn create_user(&self, email: &str, _password: &str) -> Result<ProviderUser, ProviderError> {
        self.calls.lock().unwrap().push(Call::Create(email.to_owned()));
        if let Some(e) = self.fail_create.lock().unwrap().get(email).cloned() {
            return Err(e);
        }
        let user = ProviderUser { id: Uuid::new_v4(), email: Some(email.to_owned()) };
        self.users.lock().unwrap().push(user.clone());
        Ok(user)
    }

    async fn upsert_role(&self, user_id: Uuid, role: Role) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(Call::Upsert(user_id, role));
        match self.fail_grant.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn insert_role(&self, user_id: Uuid, role: Role) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(Call::Insert(user_id, role));
        match self.fail_grant.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn conflict() -> ProviderError {
    ProviderError::Response { status: 422, message: "User already registered".into() }
}

// =============================================================================
// default_accounts
// =============================================================================

#[test]
fn default_accounts_cover_every_role() {
    let accounts = default_accounts();
    let roles: Vec<Role> = accounts.iter().map(|a| a.role).collect();
    assert_eq!(roles, Role::ALL.to_vec());
    assert_eq!(accounts[0].email, "superadmin@gmail.com");
    assert!(accounts.iter().all(|a| a.password == DEFAULT_PASSWORD));
}

#[test]
fn seed_account_debug_redacts_password() {
    let debug = format!("{:?}", SeedAccount::new("a@b.c", "hunter2", Role::User));
    assert!(!debug.contains("hunter2"));
    assert!(debug.contains("a@b.c"));
}

// =============================================================================
// seed_accounts
// =============================================================================

#[tokio::test]
async fn creates_missing_accounts_and_inserts_roles() {
    let admin = MockAdmin::default();

    let report = seed_accounts(&admin, &default_accounts()).await;

    assert!(report.is_success());
    assert!(report.results.iter().all(|r| r.outcome == SeedOutcome::Created));
    let users = admin.users.lock().unwrap().clone();
    assert_eq!(users.len(), 3);
    let inserts: Vec<Role> = admin
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Insert(_, role) => Some(role),
            _ => None,
        })
        .collect();
    assert_eq!(inserts, vec![Role::SuperAdmin, Role::Admin, Role::User]);
}

#[tokio::test]
async fn existing_account_gets_role_upserted() {
    let (admin, id) = MockAdmin::with_existing("admin@gmail.com");
    let accounts = vec![SeedAccount::new("admin@gmail.com", DEFAULT_PASSWORD, Role::Admin)];

    let report = seed_accounts(&admin, &accounts).await;

    assert_eq!(report.results[0].outcome, SeedOutcome::RoleUpdated);
    assert_eq!(admin.calls(), vec![Call::List, Call::Upsert(id, Role::Admin)]);
}

#[tokio::test]
async fn failure_is_recorded_and_run_continues() {
    let admin = MockAdmin::default();
    admin
        .fail_create
        .lock()
        .unwrap()
        .insert("admin@gmail.com".into(), conflict());

    let report = seed_accounts(&admin, &default_accounts()).await;

    assert_eq!(report.failures(), 1);
    assert!(!report.is_success());
    assert_eq!(report.results[0].outcome, SeedOutcome::Created);
    assert_eq!(report.results[1].outcome, SeedOutcome::Failed { stage: SeedStage::Create, error: conflict() });
    assert_eq!(report.results[2].outcome, SeedOutcome::Created);
    assert!(!admin.calls().iter().any(|c| matches!(c, Call::Insert(_, Role::Admin))));
}

#[tokio::test]
async fn lookup_failure_skips_account() {
    let admin = MockAdmin::default();
    *admin.fail_list.lock().unwrap() = Some(ProviderError::MissingServiceKey);

    let report = seed_accounts(&admin, &default_accounts()).await;

    assert_eq!(report.failures(), 3);
    assert!(report.results.iter().all(|r| matches!(
        r.outcome,
        SeedOutcome::Failed { stage: SeedStage::Lookup, .. }
    )));
    assert!(admin.calls().iter().all(|c| *c == Call::List));
}

#[tokio::test]
async fn role_grant_failure_is_reported() {
    let admin = MockAdmin::default();
    *admin.fail_grant.lock().unwrap() = Some(ProviderError::Response { status: 403, message: "denied".into() });
    let accounts = vec![SeedAccount::new("user@gmail.com", DEFAULT_PASSWORD, Role::User)];

    let report = seed_accounts(&admin, &accounts).await;

    assert!(matches!(report.results[0].outcome, SeedOutcome::Failed { stage: SeedStage::GrantRole, .. }));
}

#[tokio::test]
async fn rerun_updates_instead_of_creating() {
    let admin = MockAdmin::default();
    seed_accounts(&admin, &default_accounts()).await;

    let second = seed_accounts(&admin, &default_accounts()).await;

    assert!(second.results.iter().all(|r| r.outcome == SeedOutcome::RoleUpdated));
    assert_eq!(admin.users.lock().unwrap().len(), 3);
}

// =============================================================================
// Display
// =============================================================================

#[test]
fn result_lines_are_readable() {
    let created = SeedResult { email: "a@b.c".into(), role: Role::Admin, outcome: SeedOutcome::Created };
    assert_eq!(created.to_string(), "created a@b.c with role admin");

    let failed = SeedResult {
        email: "a@b.c".into(),
        role: Role::Admin,
        outcome: SeedOutcome::Failed { stage: SeedStage::GrantRole, error: ProviderError::MissingServiceKey },
    };
    assert_eq!(failed.to_string(), "failed a@b.c at grant role: service role key not configured");
}
