//! Integration tests for the account views.
//!
//! Each test spins up an Axum server on a random port with an in-memory
//! store and a stub identity verifier, then exercises the real HTTP
//! contract with reqwest (redirects off, cookies carried by hand so the
//! session flow is visible to assertions).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;

use handraise::auth::{IdentityVerifier, VerifiedIdentity};
use handraise::config::AppConfig;
use handraise::error::AuthError;
use handraise::pages;
use handraise::state::AppState;
use handraise::store::{Database, LibSqlBackend};
use handraise::tasks::model::{AttemptState, TaskAttempt};
use handraise::users::model::UserProfile;

/// Stub verifier: assertions of the form `ok:<email>` verify as that email,
/// everything else fails.
struct StubVerifier;

#[async_trait]
impl IdentityVerifier for StubVerifier {
    async fn verify(&self, assertion: &str) -> Result<VerifiedIdentity, AuthError> {
        match assertion.strip_prefix("ok:") {
            Some(email) => Ok(VerifiedIdentity {
                email: email.to_string(),
            }),
            None => Err(AuthError::VerificationFailed("bad assertion".to_string())),
        }
    }
}

/// Start a server on a random port, return (base_url, store handle).
async fn start_server() -> (String, Arc<dyn Database>) {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let verifier: Arc<dyn IdentityVerifier> = Arc::new(StubVerifier);
    let state = AppState::new(
        Arc::clone(&db),
        verifier,
        pages::templates().unwrap(),
        AppConfig::default(),
    );
    let app = handraise::app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://127.0.0.1:{port}"), db)
}

/// Minimal browser: carries the session cookie across requests and never
/// follows redirects, so every hop can be asserted on.
struct TestClient {
    http: reqwest::Client,
    base: String,
    cookie: Option<String>,
}

impl TestClient {
    fn new(base: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .unwrap(),
            base: base.to_string(),
            cookie: None,
        }
    }

    async fn get(&mut self, path: &str) -> reqwest::Response {
        let mut req = self.http.get(format!("{}{path}", self.base));
        if let Some(cookie) = &self.cookie {
            req = req.header("cookie", cookie);
        }
        let resp = req.send().await.unwrap();
        self.absorb_cookie(&resp);
        resp
    }

    async fn post_form(&mut self, path: &str, fields: &[(&str, &str)]) -> reqwest::Response {
        let mut req = self.http.post(format!("{}{path}", self.base)).form(fields);
        if let Some(cookie) = &self.cookie {
            req = req.header("cookie", cookie);
        }
        let resp = req.send().await.unwrap();
        self.absorb_cookie(&resp);
        resp
    }

    fn absorb_cookie(&mut self, resp: &reqwest::Response) {
        if let Some(set) = resp.headers().get("set-cookie") {
            let pair = set.to_str().unwrap().split(';').next().unwrap().to_string();
            self.cookie = Some(pair);
        }
    }

    /// Sign in through the real /verify flow.
    async fn sign_in(&mut self, email: &str) {
        let resp = self
            .post_form("/verify", &[("assertion", &format!("ok:{email}"))])
            .await;
        assert!(resp.status().is_redirection(), "sign-in should redirect");
    }
}

fn location(resp: &reqwest::Response) -> &str {
    resp.headers()
        .get("location")
        .expect("redirect without location")
        .to_str()
        .unwrap()
}

// ── Login & verify ──────────────────────────────────────────────────

#[tokio::test]
async fn login_page_renders() {
    let (base, _db) = start_server().await;
    let mut client = TestClient::new(&base);

    let resp = client.get("/login").await;
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains("Sign in"));
}

#[tokio::test]
async fn failed_verify_queues_one_flash_shown_once() {
    let (base, _db) = start_server().await;
    let mut client = TestClient::new(&base);

    let resp = client.post_form("/verify", &[("assertion", "garbage")]).await;
    assert!(resp.status().is_redirection());
    assert_eq!(location(&resp), "/login");

    // The one queued message appears on the next render...
    let body = client.get("/login").await.text().await.unwrap();
    assert_eq!(
        body.matches("There was a problem signing you in").count(),
        1
    );

    // ...and is gone after that.
    let body = client.get("/login").await.text().await.unwrap();
    assert!(!body.contains("There was a problem signing you in"));
}

#[tokio::test]
async fn successful_verify_queues_no_flash() {
    let (base, _db) = start_server().await;
    let mut client = TestClient::new(&base);

    client.sign_in("v@example.org").await;

    let body = client.get("/login").await.text().await.unwrap();
    assert!(!body.contains("There was a problem signing you in"));
}

#[tokio::test]
async fn successful_verify_provisions_user_and_redirects() {
    let (base, db) = start_server().await;
    let mut client = TestClient::new(&base);

    let resp = client
        .post_form("/verify", &[("assertion", "ok:v@example.org")])
        .await;
    assert_eq!(location(&resp), "/profile");
    let first = db.get_user_by_email("v@example.org").await.unwrap().unwrap();

    // Signing in again reuses the account.
    client.sign_in("v@example.org").await;
    let again = db.get_user_by_email("v@example.org").await.unwrap().unwrap();
    assert_eq!(again.id, first.id);
}

#[tokio::test]
async fn logout_clears_the_session() {
    let (base, db) = start_server().await;
    let mut client = TestClient::new(&base);
    client.sign_in("v@example.org").await;
    seed_profile(&db, "v@example.org").await;

    let resp = client.post_form("/logout", &[]).await;
    assert_eq!(location(&resp), "/login");

    // The cleared cookie no longer authenticates.
    let resp = client.get("/profile").await;
    assert_eq!(location(&resp), "/login");
}

// ── Guards ──────────────────────────────────────────────────────────

#[tokio::test]
async fn anonymous_requests_redirect_to_login() {
    let (base, _db) = start_server().await;
    let mut client = TestClient::new(&base);

    for path in ["/profile", "/profile/new", "/profile/edit"] {
        let resp = client.get(path).await;
        assert!(resp.status().is_redirection(), "{path}");
        assert_eq!(location(&resp), "/login", "{path}");
    }
}

#[tokio::test]
async fn profile_required_redirects_before_view_logic_any_method() {
    let (base, _db) = start_server().await;
    let mut client = TestClient::new(&base);
    client.sign_in("new@example.org").await;

    // No profile yet: detail and edit never reach their view logic.
    let resp = client.get("/profile").await;
    assert_eq!(location(&resp), "/profile/new");

    let resp = client.get("/profile/edit").await;
    assert_eq!(location(&resp), "/profile/new");

    let resp = client
        .post_form("/profile/edit", &[("name", "X"), ("username", "x")])
        .await;
    assert_eq!(location(&resp), "/profile/new");
}

// ── Create ──────────────────────────────────────────────────────────

#[tokio::test]
async fn create_profile_happy_path() {
    let (base, db) = start_server().await;
    let mut client = TestClient::new(&base);
    client.sign_in("v@example.org").await;

    let resp = client.get("/profile/new").await;
    assert_eq!(resp.status(), 200);

    let resp = client
        .post_form("/profile/new", &[("name", "Vol Unteer"), ("username", "vol")])
        .await;
    assert_eq!(location(&resp), "/profile");

    assert_eq!(db.count_profiles().await.unwrap(), 1);
    let user = db.get_user_by_email("v@example.org").await.unwrap().unwrap();
    let profile = db.get_profile(user.id).await.unwrap().unwrap();
    assert_eq!(profile.name, "Vol Unteer");
    assert_eq!(profile.username, "vol");
}

#[tokio::test]
async fn create_with_existing_profile_short_circuits() {
    let (base, db) = start_server().await;
    let mut client = TestClient::new(&base);
    client.sign_in("v@example.org").await;
    seed_profile(&db, "v@example.org").await;

    // GET and POST both redirect to detail and create nothing.
    let resp = client.get("/profile/new").await;
    assert_eq!(location(&resp), "/profile");

    let resp = client
        .post_form("/profile/new", &[("name", "Other"), ("username", "other")])
        .await;
    assert_eq!(location(&resp), "/profile");

    assert_eq!(db.count_profiles().await.unwrap(), 1);
}

#[tokio::test]
async fn invalid_create_rerenders_with_errors() {
    let (base, db) = start_server().await;
    let mut client = TestClient::new(&base);
    client.sign_in("v@example.org").await;

    let resp = client
        .post_form("/profile/new", &[("name", ""), ("username", "has space")])
        .await;
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("This field is required."));
    assert!(body.contains("letters, numbers, hyphens and underscores"));
    assert_eq!(db.count_profiles().await.unwrap(), 0);
}

#[tokio::test]
async fn duplicate_username_is_a_field_error() {
    let (base, db) = start_server().await;
    seed_profile(&db, "first@example.org").await;

    let mut client = TestClient::new(&base);
    client.sign_in("second@example.org").await;

    let resp = client
        .post_form("/profile/new", &[("name", "Second"), ("username", "vol")])
        .await;
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains("already taken"));
    assert_eq!(db.count_profiles().await.unwrap(), 1);
}

// ── Update ──────────────────────────────────────────────────────────

#[tokio::test]
async fn update_edits_own_profile_in_place() {
    let (base, db) = start_server().await;
    let mut client = TestClient::new(&base);
    client.sign_in("v@example.org").await;
    seed_profile(&db, "v@example.org").await;

    // The edit form comes pre-bound to the profile.
    let body = client.get("/profile/edit").await.text().await.unwrap();
    assert!(body.contains("Vol Unteer"));

    let resp = client
        .post_form("/profile/edit", &[("name", "Renamed"), ("username", "vol")])
        .await;
    assert_eq!(location(&resp), "/profile");

    let user = db.get_user_by_email("v@example.org").await.unwrap().unwrap();
    let profile = db.get_profile(user.id).await.unwrap().unwrap();
    assert_eq!(profile.name, "Renamed");
    assert_eq!(db.count_profiles().await.unwrap(), 1);
}

#[tokio::test]
async fn invalid_update_rerenders_without_saving() {
    let (base, db) = start_server().await;
    let mut client = TestClient::new(&base);
    client.sign_in("v@example.org").await;
    seed_profile(&db, "v@example.org").await;

    let resp = client
        .post_form("/profile/edit", &[("name", ""), ("username", "vol")])
        .await;
    assert_eq!(resp.status(), 200);

    let user = db.get_user_by_email("v@example.org").await.unwrap().unwrap();
    let profile = db.get_profile(user.id).await.unwrap().unwrap();
    assert_eq!(profile.name, "Vol Unteer");
}

// ── Detail ──────────────────────────────────────────────────────────

#[tokio::test]
async fn detail_lists_only_own_started_attempts() {
    let (base, db) = start_server().await;
    let mut client = TestClient::new(&base);
    client.sign_in("a@example.org").await;
    seed_profile(&db, "a@example.org").await;

    let a = db.get_user_by_email("a@example.org").await.unwrap().unwrap();
    let b = db.find_or_create_user("b@example.org").await.unwrap();

    db.insert_attempt(&TaskAttempt::new(a.id, "Translate release notes"))
        .await
        .unwrap();
    db.insert_attempt(&TaskAttempt::new(a.id, "Triage crash reports"))
        .await
        .unwrap();
    let mut finished = TaskAttempt::new(a.id, "Verify a fixed bug");
    finished.state = AttemptState::Finished;
    db.insert_attempt(&finished).await.unwrap();
    db.insert_attempt(&TaskAttempt::new(b.id, "Someone else's task"))
        .await
        .unwrap();

    let resp = client.get("/profile").await;
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Translate release notes"));
    assert!(body.contains("Triage crash reports"));
    assert!(!body.contains("Verify a fixed bug"));
    assert!(!body.contains("Someone else&#x27;s task") && !body.contains("Someone else's task"));
}

#[tokio::test]
async fn detail_with_no_attempts_renders_empty_state() {
    let (base, db) = start_server().await;
    let mut client = TestClient::new(&base);
    client.sign_in("v@example.org").await;
    seed_profile(&db, "v@example.org").await;

    let body = client.get("/profile").await.text().await.unwrap();
    assert!(body.contains("No tasks in progress"));
}

// ── Persistence across restarts ─────────────────────────────────────

#[tokio::test]
async fn on_disk_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("handraise.db");

    {
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let user = db.find_or_create_user("v@example.org").await.unwrap();
        db.insert_profile(&UserProfile::new(user.id, "Vol", "vol"))
            .await
            .unwrap();
    }

    // Reopen: migrations are idempotent and the data is still there.
    let db = LibSqlBackend::new_local(&path).await.unwrap();
    let user = db.get_user_by_email("v@example.org").await.unwrap().unwrap();
    assert!(db.get_profile(user.id).await.unwrap().is_some());
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Insert a profile for `email` directly, creating the user if needed.
async fn seed_profile(db: &Arc<dyn Database>, email: &str) {
    let user = db.find_or_create_user(email).await.unwrap();
    db.insert_profile(&UserProfile::new(user.id, "Vol Unteer", "vol"))
        .await
        .unwrap();
}
