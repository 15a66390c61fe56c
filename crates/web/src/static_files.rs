//! Static file serving

use std::path::{Path, PathBuf};

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::debug;

/// Serves files from a single root directory
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

/// Where a request path resolved to
#[derive(Debug, PartialEq, Eq)]
pub enum Resolved {
    File(PathBuf),
    NotFound,
    Forbidden,
}

impl StaticFiles {
    /// `root` must exist; it is canonicalized once up front
    pub fn new(root: &Path) -> std::io::Result<Self> {
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a request path onto the filesystem.
    ///
    /// Directories resolve to their `index.html`. Anything that canonicalizes
    /// outside the root is forbidden.
    pub fn resolve(&self, rel: &str) -> Resolved {
        let rel = rel.trim_start_matches('/');
        let mut requested = self.root.join(rel);
        if requested.is_dir() {
            requested.push("index.html");
        }

        let Ok(canon) = requested.canonicalize() else {
            return Resolved::NotFound;
        };
        if !canon.starts_with(&self.root) {
            return Resolved::Forbidden;
        }
        if !canon.is_file() {
            return Resolved::NotFound;
        }
        Resolved::File(canon)
    }

    /// Serve a static file
    pub async fn serve(&self, rel: &str) -> Response {
        let path = match self.resolve(rel) {
            Resolved::File(path) => path,
            Resolved::NotFound => {
                debug!("static: not found: {}", rel);
                return (StatusCode::NOT_FOUND, "Not found").into_response();
            }
            Resolved::Forbidden => {
                debug!("static: refused path outside root: {}", rel);
                return (StatusCode::FORBIDDEN, "Forbidden").into_response();
            }
        };

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let mime = mime_guess::from_path(&path).first_or_octet_stream();
                (
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, mime.to_string()),
                        (header::CACHE_CONTROL, "no-store".to_string()),
                    ],
                    bytes,
                )
                    .into_response()
            }
            Err(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Read failed: {e}")).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> (tempfile::TempDir, StaticFiles) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("site");
        std::fs::create_dir_all(root.join("dev")).unwrap();
        std::fs::write(root.join("dev/mocha-runner.html"), "<html></html>").unwrap();
        std::fs::write(root.join("index.html"), "home").unwrap();
        std::fs::write(dir.path().join("secret.txt"), "nope").unwrap();
        let files = StaticFiles::new(&root).unwrap();
        (dir, files)
    }

    #[test]
    fn resolves_files_and_directory_index() {
        let (_dir, files) = site();
        assert!(matches!(files.resolve("/dev/mocha-runner.html"), Resolved::File(_)));
        match files.resolve("") {
            Resolved::File(p) => assert!(p.ends_with("index.html")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn refuses_paths_outside_root() {
        let (_dir, files) = site();
        assert_eq!(files.resolve("../secret.txt"), Resolved::Forbidden);
        assert_eq!(files.resolve("dev/../../secret.txt"), Resolved::Forbidden);
    }

    #[test]
    fn missing_files_are_not_found() {
        let (_dir, files) = site();
        assert_eq!(files.resolve("dev/missing.js"), Resolved::NotFound);
        assert_eq!(files.resolve("dev"), Resolved::NotFound);
    }
}
