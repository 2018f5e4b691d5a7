#![allow(dead_code)]

use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use videotube::blob_store::{BlobStore, UploadedAsset};
use videotube::configuration::{
    ApplicationSettings, BlobStoreSettings, CookieSettings, DatabaseSettings, JwtSettings,
    PasswordSettings, Settings,
};
use videotube::startup::run;
use videotube::store::InMemoryCredentialStore;

/// Blob store that accepts any spooled file that exists on disk
pub struct StubBlobStore {
    pub fail: AtomicBool,
}

#[async_trait]
impl BlobStore for StubBlobStore {
    async fn upload(&self, local_path: &Path) -> Option<UploadedAsset> {
        if self.fail.load(Ordering::SeqCst) || !local_path.exists() {
            return None;
        }
        let name = local_path.file_name()?.to_str()?.to_string();
        let _ = tokio::fs::remove_file(local_path).await;
        Some(UploadedAsset {
            url: format!("https://media.test/{}", name),
            id: name,
        })
    }
}

pub struct TestApp {
    pub address: String,
    pub store: Arc<InMemoryCredentialStore>,
    pub blob_store: Arc<StubBlobStore>,
    pub client: reqwest::Client,
}

pub fn test_settings() -> Settings {
    Settings {
        database: DatabaseSettings {
            username: "postgres".to_string(),
            password: "password".to_string(),
            port: 5432,
            host: "localhost".to_string(),
            database_name: "unused".to_string(),
        },
        application: ApplicationSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            upload_dir: std::env::temp_dir()
                .join(format!("videotube-{}", uuid::Uuid::new_v4()))
                .to_string_lossy()
                .to_string(),
            max_upload_bytes: 1024 * 1024,
        },
        jwt: JwtSettings {
            access_token_secret: "test-access-secret-key-at-least-32-chars".to_string(),
            access_token_expiry: 900,
            refresh_token_secret: "test-refresh-secret-key-at-least-32-chars".to_string(),
            refresh_token_expiry: 864000,
            issuer: "videotube-test".to_string(),
        },
        password: PasswordSettings { bcrypt_cost: 4 },
        blob_store: BlobStoreSettings {
            base_url: "http://127.0.0.1:9".to_string(),
            cloud_name: "test".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
        },
        cookies: CookieSettings { secure: false },
    }
}

pub async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let store = Arc::new(InMemoryCredentialStore::new());
    let blob_store = Arc::new(StubBlobStore {
        fail: AtomicBool::new(false),
    });

    let server = run(listener, store.clone(), blob_store.clone(), &test_settings())
        .expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        store,
        blob_store,
        client: reqwest::Client::new(),
    }
}

pub fn registration_form(username: &str, email: &str, password: &str, with_avatar: bool) -> Form {
    let form = Form::new()
        .text("username", username.to_string())
        .text("email", email.to_string())
        .text("fullname", "Abby".to_string())
        .text("password", password.to_string());
    if with_avatar {
        form.part(
            "avatar",
            Part::bytes(b"fake image bytes".to_vec()).file_name("avatar.png"),
        )
    } else {
        form
    }
}

/// Values of every `Set-Cookie` header
pub fn set_cookies(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1/users{}", self.address, path)
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(&self.url("/register"))
            .multipart(registration_form(username, email, password, true))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn login(&self, body: Value) -> reqwest::Response {
        self.client
            .post(&self.url("/login"))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Registers `abby` and logs in, returning the response body's `data`
    pub async fn abby_session(&self) -> Value {
        let response = self.register("abby", "a@x.com", "p1").await;
        assert_eq!(201, response.status().as_u16());

        let response = self.login(json!({"username": "abby", "password": "p1"})).await;
        assert_eq!(200, response.status().as_u16());
        let body: Value = response.json().await.expect("Failed to parse response");
        body["data"].clone()
    }

    pub async fn refresh_with_body(&self, refresh_token: &str) -> reqwest::Response {
        self.client
            .post(&self.url("/refresh-token"))
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .expect("Failed to execute request.")
    }
}
