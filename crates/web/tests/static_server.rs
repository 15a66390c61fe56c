//! Static server tests over a real socket

use std::net::{IpAddr, Ipv4Addr};

use mocharun_common::config::ServerConfig;
use mocharun_common::Error;
use mocharun_web::StaticServer;

fn site() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("dev")).unwrap();
    std::fs::write(
        dir.path().join("dev/mocha-runner.html"),
        "<!doctype html><title>harness</title>",
    )
    .unwrap();
    dir
}

fn config(root: &std::path::Path, port: u16) -> ServerConfig {
    ServerConfig {
        root: root.to_path_buf(),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port,
    }
}

#[tokio::test]
async fn serves_harness_page_over_http() {
    let dir = site();
    let server = StaticServer::bind(&config(dir.path(), 0)).await.expect("bind");
    assert_ne!(server.addr().port(), 0);

    let url = server.url_for("/dev/mocha-runner.html");
    assert!(url.starts_with("http://127.0.0.1:"));

    let resp = reqwest::get(&url).await.expect("request");
    assert!(resp.status().is_success());
    let body = resp.text().await.unwrap();
    assert!(body.contains("<title>harness</title>"));
}

#[tokio::test]
async fn occupied_port_is_a_bind_error() {
    let dir = site();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let result = StaticServer::bind(&config(dir.path(), port)).await;
    assert!(matches!(result, Err(Error::ServerBind { .. })));
}

#[tokio::test]
async fn missing_root_is_rejected() {
    let dir = site();
    let result = StaticServer::bind(&config(&dir.path().join("missing"), 0)).await;
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
