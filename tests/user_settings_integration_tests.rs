mod common;

use axum::http::StatusCode;
use blog_cms::models::Role;
use common::{TEST_PASSWORD, TestApp, error_message};
use serde_json::json;

#[tokio::test]
async fn profile_update_round_trips_extension_fields() {
    let app = TestApp::new();
    let (user, token) = app.sign_in(Role::Reader).await;

    let (status, body) = app
        .put(
            "/api/users/profile",
            Some(&token),
            json!({
                "firstName": "Ada",
                "lastName": "Lovelace",
                "bio": "Writes about engines",
                "website": "https://ada.example.com",
                "socialLinks": { "github": "ada" }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["user"]["first_name"], "Ada");
    assert_eq!(body["user"]["website"], "https://ada.example.com");
    assert_eq!(body["user"]["social_links"]["github"], "ada");
    assert!(body["user"].get("password_hash").is_none());

    let (_, profile) = app.get("/api/users/profile", Some(&token)).await;
    assert_eq!(profile["user"]["id"], user.id.to_string());
    assert_eq!(profile["user"]["bio"], "Writes about engines");

    let (status, body) = app
        .put(
            "/api/users/profile",
            Some(&token),
            json!({ "firstName": "Ada", "lastName": "L", "website": "not a url" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_message(&body), "Invalid website URL");
}

#[tokio::test]
async fn change_password_checks_the_current_one() {
    let app = TestApp::new();
    let user = app.seed_user_with_password(Role::Reader).await;
    let token = app.token_for(&user).await;

    let (status, body) = app
        .post(
            "/api/users/change-password",
            Some(&token),
            json!({ "currentPassword": "not-it", "newPassword": "another-pass" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_message(&body), "Current password is incorrect");

    let (status, body) = app
        .post(
            "/api/users/change-password",
            Some(&token),
            json!({ "currentPassword": TEST_PASSWORD, "newPassword": "another-pass" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Password changed successfully");

    let (status, _) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": user.email, "password": "another-pass" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn sso_only_accounts_cannot_change_password() {
    let app = TestApp::new();
    let (_, token) = app.sign_in(Role::Reader).await;

    let (status, _) = app
        .post(
            "/api/users/change-password",
            Some(&token),
            json!({ "currentPassword": "anything", "newPassword": "another-pass" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn user_listing_is_admin_only() {
    let app = TestApp::new();
    let (_, admin_token) = app.sign_in(Role::Admin).await;
    let (_, editor_token) = app.sign_in(Role::Editor).await;
    let (_, reader_token) = app.sign_in(Role::Reader).await;

    let (status, body) = app.get("/api/users", Some(&admin_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 3);
    assert!(body["users"][0].get("password_hash").is_none());

    let (_, readers) = app.get("/api/users?role=reader", Some(&admin_token)).await;
    assert_eq!(readers["pagination"]["total"], 1);

    let (_, search) = app.get("/api/users?search=EDITOR_", Some(&admin_token)).await;
    assert_eq!(search["pagination"]["total"], 1);

    let (status, _) = app.get("/api/users", Some(&editor_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/api/users", Some(&reader_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn editors_manage_accounts_but_only_admins_grant_admin() {
    let app = TestApp::new();
    let (_, admin_token) = app.sign_in(Role::Admin).await;
    let (_, editor_token) = app.sign_in(Role::Editor).await;
    let target = app.seed_user(Role::Reader).await;
    let uri = format!("/api/users/{}", target.id);

    let (status, body) = app
        .put(
            &uri,
            Some(&editor_token),
            json!({ "firstName": "Promoted", "lastName": "Writer", "role": "author", "isActive": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["user"]["role"], "author");

    let (status, body) = app
        .put(
            &uri,
            Some(&editor_token),
            json!({ "firstName": "Promoted", "lastName": "Writer", "role": "admin", "isActive": true }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_message(&body), "Insufficient permissions");

    let (status, body) = app
        .put(
            &uri,
            Some(&admin_token),
            json!({ "firstName": "Promoted", "lastName": "Writer", "role": "admin", "isActive": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "admin");
}

#[tokio::test]
async fn editors_cannot_change_admin_accounts() {
    let app = TestApp::new();
    let (_, editor_token) = app.sign_in(Role::Editor).await;
    let (_, admin_token) = app.sign_in(Role::Admin).await;
    let admin = app.seed_user(Role::Admin).await;
    let uri = format!("/api/users/{}", admin.id);

    for change in [
        json!({ "firstName": "Demoted", "lastName": "Admin", "role": "reader", "isActive": true }),
        json!({ "firstName": "Locked", "lastName": "Out", "role": "admin", "isActive": false }),
    ] {
        let (status, body) = app.put(&uri, Some(&editor_token), change).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error_message(&body), "Insufficient permissions");
    }
    let (_, body) = app.get(&uri, Some(&admin_token)).await;
    assert_eq!(body["user"]["role"], "admin");
    assert_eq!(body["user"]["is_active"], true);

    let (status, body) = app
        .put(
            &uri,
            Some(&admin_token),
            json!({ "firstName": "Former", "lastName": "Admin", "role": "editor", "isActive": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "editor");
}

#[tokio::test]
async fn deactivation_ends_sessions() {
    let app = TestApp::new();
    let (_, editor_token) = app.sign_in(Role::Editor).await;
    let (target, target_token) = app.sign_in(Role::Author).await;
    assert_eq!(app.repo.session_count(target.id), 1);

    let (status, body) = app
        .put(
            &format!("/api/users/{}", target.id),
            Some(&editor_token),
            json!({ "firstName": "Gone", "lastName": "Away", "role": "author", "isActive": false }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["is_active"], false);
    assert_eq!(app.repo.session_count(target.id), 0);

    let (status, _) = app.get("/api/users/profile", Some(&target_token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admins_delete_others_but_not_themselves() {
    let app = TestApp::new();
    let (admin, admin_token) = app.sign_in(Role::Admin).await;
    let (_, editor_token) = app.sign_in(Role::Editor).await;
    let target = app.seed_user(Role::Reader).await;
    let uri = format!("/api/users/{}", target.id);

    let (status, _) = app.delete(&uri, Some(&editor_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .delete(&format!("/api/users/{}", admin.id), Some(&admin_token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_message(&body), "Cannot delete your own account");

    let (status, body) = app.delete(&uri, Some(&admin_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User deleted successfully");

    let (status, body) = app.get(&uri, Some(&admin_token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_message(&body), "User not found");
}

#[tokio::test]
async fn settings_have_defaults_and_admin_only_updates() {
    let app = TestApp::new();
    let (admin, admin_token) = app.sign_in(Role::Admin).await;
    let (_, editor_token) = app.sign_in(Role::Editor).await;

    let (status, body) = app.get("/api/blog-settings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settings"]["blog_title"], "My Blog");
    assert_eq!(body["settings"]["blog_description"], "Welcome to my blog");

    let (status, _) = app
        .put("/api/blog-settings", Some(&editor_token), json!({ "blogTitle": "Nope" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .put(
            "/api/blog-settings",
            Some(&admin_token),
            json!({ "blogTitle": "  Systems Notes  ", "blogDescription": "   " }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Blog settings updated successfully");
    assert_eq!(body["settings"]["blog_title"], "Systems Notes");
    assert!(body["settings"]["blog_description"].is_null());
    assert_eq!(body["settings"]["updated_by"], admin.id.to_string());

    let (status, body) = app
        .put("/api/blog-settings", Some(&admin_token), json!({ "blogTitle": "" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_message(&body), "Blog title must be 1-200 characters");

    let (_, body) = app.get("/api/blog-settings", None).await;
    assert_eq!(body["settings"]["blog_title"], "Systems Notes");
}

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::new();

    let (status, body) = app.get("/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["service"], "blog-cms");
    assert!(body["timestamp"].is_string());
}
