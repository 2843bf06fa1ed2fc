//! Test helpers for HTTP API tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use tempfile::TempDir;

use storehouse::config::Config;
use storehouse::web::handlers::AppState;
use storehouse::web::router::create_router;

/// A test server with its own storage root.
pub struct TestContext {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub temp_dir: TempDir,
}

impl TestContext {
    /// Absolute path of the storage root.
    pub fn root(&self) -> &Path {
        self.state.storage.root().path()
    }

    /// Write a file directly into the storage root.
    pub fn seed(&self, relative: &str, content: &[u8]) {
        let path = self.root().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}

/// Create a test server with default configuration.
pub fn create_test_server() -> TestContext {
    create_test_server_with(|_| {})
}

/// Create a test server after adjusting the default configuration.
pub fn create_test_server_with(configure: impl FnOnce(&mut Config)) -> TestContext {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let mut config = Config::default();
    config.storage.root = temp_dir
        .path()
        .join("storage")
        .to_string_lossy()
        .into_owned();
    configure(&mut config);

    let state = Arc::new(AppState::from_config(&config).expect("Failed to create app state"));
    let router = create_router(state.clone(), &config.web.cors_origins);
    let server = TestServer::new(router).expect("Failed to create test server");

    TestContext {
        server,
        state,
        temp_dir,
    }
}

/// A multipart form with one file field.
pub fn file_form(field: &str, name: &str, content: &[u8], path: Option<&str>) -> MultipartForm {
    let form = MultipartForm::new();
    let form = match path {
        Some(path) => form.add_text("path", path.to_string()),
        None => form,
    };
    form.add_part(field, text_part(name, content))
}

/// A file part with a plain text content type.
pub fn text_part(name: &str, content: &[u8]) -> Part {
    Part::bytes(content.to_vec())
        .file_name(name.to_string())
        .mime_type("text/plain")
}

/// Every file under `root`, hidden partial uploads included.
pub fn files_on_disk(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for item in std::fs::read_dir(dir).unwrap() {
            let path = item.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}
