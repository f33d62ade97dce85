use super::*;

const USER_ID: &str = "6f1c2b8e-8d3a-4f4e-9c57-2a1b3c4d5e6f";

fn user_id() -> Uuid {
    USER_ID.parse().unwrap()
}

fn client(service_role_key: Option<&str>) -> SupabaseClient {
    let mut config = ProviderConfig::new("https://abc.supabase.co/", "anon");
    config.service_role_key = service_role_key.map(str::to_owned);
    SupabaseClient::new(&config).unwrap()
}

// =============================================================================
// parse_token_response
// =============================================================================

#[test]
fn token_response_with_expires_in() {
    let json = format!(
        r#"{{"access_token":"at","token_type":"bearer","expires_in":3600,"refresh_token":"rt",
            "user":{{"id":"{USER_ID}","email":"admin@gmail.com","aud":"authenticated"}}}}"#
    );
    let session = parse_token_response(&json, 1_000).unwrap();
    assert_eq!(session.access_token, "at");
    assert_eq!(session.refresh_token, "rt");
    assert_eq!(session.expires_at, Some(4_600));
    assert_eq!(session.user.id, user_id());
    assert_eq!(session.user.email.as_deref(), Some("admin@gmail.com"));
}

#[test]
fn token_response_prefers_absolute_expiry() {
    let json = format!(
        r#"{{"access_token":"at","expires_in":3600,"expires_at":9999,"user":{{"id":"{USER_ID}"}}}}"#
    );
    let session = parse_token_response(&json, 1_000).unwrap();
    assert_eq!(session.expires_at, Some(9_999));
    assert_eq!(session.refresh_token, "");
    assert_eq!(session.user.email, None);
}

#[test]
fn token_response_missing_user_is_parse_error() {
    let err = parse_token_response(r#"{"access_token":"at"}"#, 0).unwrap_err();
    assert!(matches!(err, ProviderError::Parse(_)));
}

// =============================================================================
// parse_role_rows
// =============================================================================

#[test]
fn role_rows_first_row_wins() {
    let role = parse_role_rows(r#"[{"role":"superadmin"},{"role":"user"}]"#).unwrap();
    assert_eq!(role, Some(Role::SuperAdmin));
}

#[test]
fn role_rows_empty_is_none() {
    assert_eq!(parse_role_rows("[]").unwrap(), None);
}

#[test]
fn role_rows_unknown_value_is_invalid_role() {
    let err = parse_role_rows(r#"[{"role":"owner"}]"#).unwrap_err();
    assert_eq!(err, ProviderError::InvalidRole("owner".into()));
}

#[test]
fn role_rows_non_array_is_parse_error() {
    assert!(matches!(parse_role_rows(r#"{"role":"admin"}"#), Err(ProviderError::Parse(_))));
}

// =============================================================================
// parse_user / parse_user_page
// =============================================================================

#[test]
fn user_page_lists_users() {
    let json = format!(r#"{{"users":[{{"id":"{USER_ID}","email":"user@gmail.com"}}],"aud":"authenticated"}}"#);
    let users = parse_user_page(&json).unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].email.as_deref(), Some("user@gmail.com"));
}

#[test]
fn user_page_without_users_key_is_empty() {
    assert!(parse_user_page("{}").unwrap().is_empty());
}

#[test]
fn user_bare_object() {
    let json = format!(r#"{{"id":"{USER_ID}","email":"a@b.c"}}"#);
    assert_eq!(parse_user(&json).unwrap().id, user_id());
}

#[test]
fn user_wrapped_object() {
    let json = format!(r#"{{"user":{{"id":"{USER_ID}","email":"a@b.c"}}}}"#);
    assert_eq!(parse_user(&json).unwrap().email.as_deref(), Some("a@b.c"));
}

// =============================================================================
// parse_error_message
// =============================================================================

#[test]
fn error_message_prefers_description() {
    let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
    assert_eq!(parse_error_message(body), "Invalid login credentials");
}

#[test]
fn error_message_reads_msg_and_message() {
    assert_eq!(parse_error_message(r#"{"code":422,"msg":"User already registered"}"#), "User already registered");
    assert_eq!(
        parse_error_message(r#"{"message":"duplicate key value violates unique constraint"}"#),
        "duplicate key value violates unique constraint"
    );
}

#[test]
fn error_message_falls_back_to_body() {
    assert_eq!(parse_error_message(" upstream timeout \n"), "upstream timeout");
    assert_eq!(parse_error_message(""), "empty response");
}

// =============================================================================
// ProviderError classification
// =============================================================================

#[test]
fn retryable_statuses() {
    assert!(ProviderError::Request("reset".into()).retryable());
    assert!(ProviderError::Response { status: 429, message: String::new() }.retryable());
    assert!(ProviderError::Response { status: 503, message: String::new() }.retryable());
    assert!(!ProviderError::Response { status: 400, message: String::new() }.retryable());
    assert!(!ProviderError::NoSession.retryable());
}

#[test]
fn rejection_statuses() {
    assert!(ProviderError::Response { status: 400, message: String::new() }.is_rejection());
    assert!(ProviderError::Response { status: 401, message: String::new() }.is_rejection());
    assert!(!ProviderError::Response { status: 500, message: String::new() }.is_rejection());
    assert!(!ProviderError::Request("dns".into()).is_rejection());
}

// =============================================================================
// client behavior without network
// =============================================================================

#[test]
fn role_lookup_url_filters_by_user() {
    assert_eq!(
        role_lookup_url("https://abc.supabase.co", user_id()),
        format!("https://abc.supabase.co/rest/v1/user_roles?select=role&user_id=eq.{USER_ID}")
    );
}

#[test]
fn role_row_serializes_wire_names() {
    let row = role_row(user_id(), Role::SuperAdmin);
    assert_eq!(row["role"], "superadmin");
    assert_eq!(row["user_id"], USER_ID);
}

#[test]
fn new_trims_trailing_slash() {
    assert_eq!(client(None).url(), "https://abc.supabase.co");
}

#[test]
fn session_debug_redacts_tokens() {
    let session = Session {
        access_token: "secret-access".into(),
        refresh_token: "secret-refresh".into(),
        expires_at: None,
        user: ProviderUser { id: user_id(), email: None },
    };
    let debug = format!("{session:?}");
    assert!(!debug.contains("secret-access"));
    assert!(!debug.contains("secret-refresh"));
    assert!(debug.contains(USER_ID));
}

#[tokio::test]
async fn starts_without_session() {
    let client = client(None);
    assert_eq!(client.current_session().await.unwrap(), None);
}

#[tokio::test]
async fn sign_out_without_session_emits_signed_out() {
    let client = client(None);
    let mut changes = client.on_session_change();

    client.sign_out().await.unwrap();

    let change = changes.recv().await.unwrap();
    assert_eq!(change.event, SessionEvent::SignedOut);
    assert_eq!(change.session, None);
}

#[tokio::test]
async fn refresh_without_session_is_no_session() {
    assert_eq!(client(None).refresh_session().await.unwrap_err(), ProviderError::NoSession);
}

#[tokio::test]
async fn admin_calls_require_service_key() {
    let client = client(None);
    assert_eq!(client.list_users().await.unwrap_err(), ProviderError::MissingServiceKey);
    assert_eq!(
        client.upsert_role(user_id(), Role::Admin).await.unwrap_err(),
        ProviderError::MissingServiceKey
    );
}

// =============================================================================
// expiry
// =============================================================================

fn session_expiring_at(expires_at: Option<i64>) -> Session {
    Session {
        access_token: "at".into(),
        refresh_token: "rt".into(),
        expires_at,
        user: ProviderUser { id: user_id(), email: Some("user@gmail.com".into()) },
    }
}

#[test]
fn session_expiry_boundary() {
    let session = session_expiring_at(Some(1_000));
    assert!(!session.is_expired(999));
    assert!(session.is_expired(1_000));
    assert!(!session_expiring_at(None).is_expired(i64::MAX));
}

#[tokio::test]
async fn current_session_returns_unexpired_session_as_is() {
    let client = client(None);
    let session = session_expiring_at(Some(unix_now() + 3_600));
    client.store_session(Some(session.clone()));

    assert_eq!(client.current_session().await.unwrap(), Some(session));
}

#[tokio::test]
async fn expired_session_refresh_failure_in_transit_keeps_session() {
    // Nothing listens on the discard port, so the refresh cannot be sent.
    let mut config = ProviderConfig::new("http://127.0.0.1:9", "anon");
    config.timeouts.connect_secs = 1;
    config.timeouts.request_secs = 2;
    let client = SupabaseClient::new(&config).unwrap();
    let mut changes = client.on_session_change();
    let session = session_expiring_at(Some(unix_now() - 10));
    client.store_session(Some(session.clone()));

    let err = client.current_session().await.unwrap_err();

    assert!(matches!(err, ProviderError::Request(_)));
    assert_eq!(client.session_snapshot(), Some(session));
    assert!(changes.try_recv().is_err(), "no transition emitted");
}
