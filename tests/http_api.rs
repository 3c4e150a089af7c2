//! HTTP surface driven through the router without a socket.

use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use compliance_security::principal::TenantId;

mod common;

const CLIENT: &str = "203.0.113.5:40000";

async fn send(t: &common::TestCore, client: &str, request: Request<Body>) -> Response<Body> {
    common::router_from(t.core.clone(), client)
        .oneshot(request)
        .await
        .unwrap()
}

async fn provision(t: &common::TestCore, tenant: TenantId, username: &str, password: &str) -> Value {
    let response = send(
        t,
        CLIENT,
        common::json_request(
            Method::POST,
            &format!("/admin/tenants/{}/users", tenant),
            Some(json!({ "username": username, "password": password, "role": "editor" })),
            Some(common::ADMIN_KEY),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    common::read_json(response).await
}

async fn login(t: &common::TestCore, client: &str, tenant: &str, username: &str, password: &str) -> Response<Body> {
    send(
        t,
        client,
        common::json_request(
            Method::POST,
            "/auth/login",
            Some(json!({ "tenant_id": tenant, "username": username, "password": password })),
            None,
        ),
    )
    .await
}

#[tokio::test]
async fn test_health() {
    let t = common::build_core(common::test_config());
    let response = send(&t, CLIENT, common::json_request(Method::GET, "/health", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(common::read_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_admin_routes_require_key() {
    let t = common::build_core(common::test_config());

    let missing = send(&t, CLIENT, common::json_request(Method::GET, "/admin/status", None, None)).await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = send(
        &t,
        CLIENT,
        common::json_request(Method::GET, "/admin/status", None, Some("not-the-key")),
    )
    .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let ok = send(
        &t,
        CLIENT,
        common::json_request(Method::GET, "/admin/status", None, Some(common::ADMIN_KEY)),
    )
    .await;
    assert_eq!(ok.status(), StatusCode::OK);
    let status = common::read_json(ok).await;
    assert_eq!(status["cipher_active_version"], 1);
    assert_eq!(status["status"], "operational");
}

#[tokio::test]
async fn test_login_then_session_then_logout() {
    let t = common::build_core(common::test_config());
    let tenant = TenantId::new();
    let provisioned = provision(&t, tenant, "editor@example.org", "Editor2024!").await;

    let response = login(&t, CLIENT, &tenant.to_string(), "editor@example.org", "Editor2024!").await;
    assert_eq!(response.status(), StatusCode::OK);
    let tokens = common::read_json(response).await;
    assert_eq!(tokens["token_type"], "Bearer");
    assert_eq!(tokens["expires_in"], 900);
    let access = tokens["access_token"].as_str().unwrap().to_string();

    let session = send(
        &t,
        CLIENT,
        common::json_request(Method::GET, "/auth/session", None, Some(&access)),
    )
    .await;
    assert_eq!(session.status(), StatusCode::OK);
    let session = common::read_json(session).await;
    assert_eq!(session["tenant_id"], tenant.to_string());
    assert_eq!(session["user_id"], provisioned["user_id"]);
    assert_eq!(session["role"], "editor");

    let logout = send(
        &t,
        CLIENT,
        common::json_request(Method::POST, "/auth/logout", None, Some(&access)),
    )
    .await;
    assert_eq!(logout.status(), StatusCode::NO_CONTENT);

    let after = send(
        &t,
        CLIENT,
        common::json_request(Method::GET, "/auth/session", None, Some(&access)),
    )
    .await;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);

    let refresh = send(
        &t,
        CLIENT,
        common::json_request(
            Method::POST,
            "/auth/refresh",
            Some(json!({ "refresh_token": tokens["refresh_token"] })),
            None,
        ),
    )
    .await;
    assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_without_token_is_unauthorized() {
    let t = common::build_core(common::test_config());
    let response = send(&t, CLIENT, common::json_request(Method::GET, "/auth/session", None, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_tenant_id_is_bad_request_with_reason() {
    let t = common::build_core(common::test_config());
    let response = login(&t, CLIENT, "not-a-tenant", "editor", "Editor2024!").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = common::read_json(response).await;
    assert_eq!(body["error"], "invalid_request");
    assert_eq!(body["field"], "tenant_id");
    assert_eq!(body["reason"], "invalid_format");
}

#[tokio::test]
async fn test_wrong_password_and_unknown_user_look_the_same() {
    let t = common::build_core(common::test_config());
    let tenant = TenantId::new();
    provision(&t, tenant, "editor", "Editor2024!").await;

    let wrong = login(&t, CLIENT, &tenant.to_string(), "editor", "Wrong2024!").await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    let wrong = common::read_json(wrong).await;

    let unknown = login(&t, CLIENT, &tenant.to_string(), "nobody", "Wrong2024!").await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(common::read_json(unknown).await, wrong);
    assert_eq!(wrong, json!({ "error": "unauthorized" }));
}

#[tokio::test]
async fn test_sixth_login_gets_429_with_retry_after() {
    let t = common::build_core(common::test_config());
    let tenant = TenantId::new();
    provision(&t, tenant, "editor", "Editor2024!").await;

    let attacker = "192.0.2.44:5555";
    for _ in 0..5 {
        let response = login(&t, attacker, &tenant.to_string(), "editor", "Wrong2024!").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let sixth = login(&t, attacker, &tenant.to_string(), "editor", "Editor2024!").await;
    assert_eq!(sixth.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = sixth.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    // Another address is unaffected.
    let other = login(&t, CLIENT, &tenant.to_string(), "editor", "Editor2024!").await;
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_password_change_requires_current_password() {
    let t = common::build_core(common::test_config());
    let tenant = TenantId::new();
    provision(&t, tenant, "editor", "Editor2024!").await;
    let tokens = common::read_json(login(&t, CLIENT, &tenant.to_string(), "editor", "Editor2024!").await).await;
    let access = tokens["access_token"].as_str().unwrap().to_string();

    let rejected = send(
        &t,
        CLIENT,
        common::json_request(
            Method::POST,
            "/auth/password",
            Some(json!({ "current_password": "Guess2024!", "new_password": "Fresh2025!" })),
            Some(&access),
        ),
    )
    .await;
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);

    let weak = send(
        &t,
        CLIENT,
        common::json_request(
            Method::POST,
            "/auth/password",
            Some(json!({ "current_password": "Editor2024!", "new_password": "short" })),
            Some(&access),
        ),
    )
    .await;
    assert_eq!(weak.status(), StatusCode::BAD_REQUEST);

    let changed = send(
        &t,
        CLIENT,
        common::json_request(
            Method::POST,
            "/auth/password",
            Some(json!({ "current_password": "Editor2024!", "new_password": "Fresh2025!" })),
            Some(&access),
        ),
    )
    .await;
    assert_eq!(changed.status(), StatusCode::NO_CONTENT);

    let old = login(&t, CLIENT, &tenant.to_string(), "editor", "Editor2024!").await;
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);
    let new = login(&t, CLIENT, &tenant.to_string(), "editor", "Fresh2025!").await;
    assert_eq!(new.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_verify_reports_intact_chain_and_records() {
    let t = common::build_core(common::test_config());
    let tenant = TenantId::new();
    provision(&t, tenant, "editor", "Editor2024!").await;
    login(&t, CLIENT, &tenant.to_string(), "editor", "Editor2024!").await;

    let verify = send(
        &t,
        CLIENT,
        common::json_request(
            Method::GET,
            &format!("/admin/audit/{}/verify", tenant),
            None,
            Some(common::ADMIN_KEY),
        ),
    )
    .await;
    assert_eq!(verify.status(), StatusCode::OK);
    let verification = common::read_json(verify).await;
    assert_eq!(verification["records_checked"], 2);
    assert!(verification["first_broken"].is_null());

    t.store.tamper(tenant, |records| records[0].entity_id = "forged".into());
    let verify = send(
        &t,
        CLIENT,
        common::json_request(
            Method::GET,
            &format!("/admin/audit/{}/verify", tenant),
            None,
            Some(common::ADMIN_KEY),
        ),
    )
    .await;
    let verification = common::read_json(verify).await;
    assert_eq!(verification["first_broken"]["index"], 0);
    assert_eq!(verification["first_broken"]["fault"]["kind"], "content_hash_mismatch");

    let records = send(
        &t,
        CLIENT,
        common::json_request(
            Method::GET,
            &format!("/admin/audit/{}/records", tenant),
            None,
            Some(common::ADMIN_KEY),
        ),
    )
    .await;
    let records = common::read_json(records).await;
    assert_eq!(records.as_array().unwrap().len(), 2);
    assert_eq!(records[1]["action"], "login_success");
}
