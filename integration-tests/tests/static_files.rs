use std::io::Write;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::OnceLock;
use std::time::Duration;

struct Server {
    child: Child,
    base_url: String,
    root: tempfile::TempDir,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn server() -> &'static Server {
    static SERVER: OnceLock<Server> = OnceLock::new();
    SERVER.get_or_init(spawn_server)
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn spawn_server() -> Server {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("hello.txt"), b"hello world").unwrap();
    std::fs::write(
        root.path().join("big.txt"),
        "the quick brown fox jumps over the lazy dog ".repeat(5000),
    )
    .unwrap();
    std::fs::create_dir(root.path().join("sub")).unwrap();
    std::fs::write(root.path().join("sub").join("nested.txt"), b"nested").unwrap();
    std::fs::create_dir(root.path().join("listing")).unwrap();
    std::fs::write(root.path().join("listing").join("a.txt"), b"a").unwrap();
    std::fs::write(root.path().join("listing").join("b.txt"), b"b").unwrap();

    let port = free_port();
    let config_path = root.path().join("static.toml");
    let mut config_file = std::fs::File::create(&config_path).unwrap();
    writeln!(
        config_file,
        r#"
listen = "127.0.0.1:{port}"
root = "{root}"
generate_index_pages = true
compress = true
accept_byte_range = true
"#,
        port = port,
        root = root.path().display(),
    )
    .unwrap();

    let bin = PathBuf::from(env!("CARGO_BIN_EXE_statserve"));
    let child = Command::new(bin)
        .args(["run", config_path.to_str().unwrap()])
        .spawn()
        .expect("failed to spawn statserve binary");

    let base_url = format!("http://127.0.0.1:{port}");
    wait_for_server(&base_url);

    Server { child, base_url, root }
}

fn wait_for_server(base_url: &str) {
    let client = reqwest::blocking::Client::new();
    for _ in 0..50 {
        if client.get(base_url).send().is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    panic!("server did not come up at {base_url}");
}

#[test]
fn serves_plain_file() {
    let server = server();
    let resp = reqwest::blocking::get(format!("{}/hello.txt", server.base_url)).unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.text().unwrap(), "hello world");
}

#[test]
fn serves_nested_file() {
    let server = server();
    let resp = reqwest::blocking::get(format!("{}/sub/nested.txt", server.base_url)).unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.text().unwrap(), "nested");
}

#[test]
fn range_request_returns_partial_content() {
    let server = server();
    let client = reqwest::blocking::Client::new();
    let resp = client
        .get(format!("{}/hello.txt", server.base_url))
        .header("Range", "bytes=0-4")
        .send()
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::PARTIAL_CONTENT);
    assert_eq!(resp.text().unwrap(), "hello");
}

#[test]
fn gzip_accepting_client_gets_compressed_response() {
    let server = server();
    let client = reqwest::blocking::Client::builder()
        .no_gzip()
        .build()
        .unwrap();
    let resp = client
        .get(format!("{}/big.txt", server.base_url))
        .header("Accept-Encoding", "gzip")
        .send()
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-encoding").unwrap(),
        "gzip"
    );
}

#[test]
fn missing_file_returns_404() {
    let server = server();
    let resp = reqwest::blocking::get(format!("{}/does-not-exist.txt", server.base_url)).unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}

#[test]
fn directory_without_index_renders_listing() {
    let server = server();
    let resp = reqwest::blocking::get(format!("{}/listing/", server.base_url)).unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body = resp.text().unwrap();
    assert!(body.contains("a.txt"));
    assert!(body.contains("b.txt"));
}

#[test]
fn head_request_has_no_body_but_reports_length() {
    let server = server();
    let client = reqwest::blocking::Client::new();
    let resp = client
        .head(format!("{}/hello.txt", server.base_url))
        .send()
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.headers().get("content-length").unwrap(), "11");
    let body = resp.bytes().unwrap();
    assert!(body.is_empty());
}
