use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use statserve_core::cache::FileReader;
use statserve_core::config::{FileServConfig, FileServConfigSpec};
use statserve_core::handler::{RequestContext, Server};

struct Ctx {
    path: String,
    range: Option<String>,
    status: StatusCode,
    body_len: Option<u64>,
}

impl Ctx {
    fn new(path: &str) -> Self {
        Ctx {
            path: path.to_string(),
            range: None,
            status: StatusCode::OK,
            body_len: None,
        }
    }
}

impl RequestContext for Ctx {
    fn raw_path(&self) -> &str {
        &self.path
    }
    fn is_head(&self) -> bool {
        false
    }
    fn accepts_gzip(&self) -> bool {
        false
    }
    fn range_header(&self) -> Option<&str> {
        self.range.as_deref()
    }
    fn if_modified_since(&self) -> Option<&str> {
        None
    }
    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }
    fn set_header(&mut self, _name: &'static str, _value: String) {}
    fn set_body_reader(&mut self, _reader: FileReader, length: u64) {
        self.body_len = Some(length);
    }
    fn set_body_bytes(&mut self, bytes: Vec<u8>) {
        self.body_len = Some(bytes.len() as u64);
    }
}

fn server_with_short_cache(root: std::path::PathBuf, cache_secs: u64) -> Arc<Server> {
    let spec = FileServConfigSpec {
        root,
        cache_duration_secs: cache_secs,
        ..FileServConfigSpec::default()
    };
    Server::new(FileServConfig::from_spec(spec))
}

#[tokio::test]
async fn cache_entry_is_evicted_after_idle_period_and_refetched_transparently() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
    let server = server_with_short_cache(dir.path().to_path_buf(), 1);

    let mut ctx = Ctx::new("/a.txt");
    server.handle(&mut ctx).await.unwrap();
    assert_eq!(ctx.body_len, Some(5));

    // Wait past the janitor's sweep interval (cache_duration / 2) plus
    // the full cache_duration so the entry is genuinely idle.
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let mut ctx2 = Ctx::new("/a.txt");
    server.handle(&mut ctx2).await.unwrap();
    assert_eq!(ctx2.body_len, Some(5));
}

#[tokio::test]
async fn many_concurrent_readers_share_one_cache_entry_safely() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"hello world".repeat(1000)).unwrap();
    let server = server_with_short_cache(dir.path().to_path_buf(), 10);

    let mut handles = Vec::new();
    for _ in 0..32 {
        let server = server.clone();
        handles.push(tokio::spawn(async move {
            let mut ctx = Ctx::new("/a.txt");
            server.handle(&mut ctx).await.unwrap();
            ctx.body_len
        }));
    }

    for h in handles {
        let len = h.await.unwrap();
        assert_eq!(len, Some(11000));
    }
}

#[tokio::test]
async fn conditional_and_range_requests_compose_correctly() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"0123456789").unwrap();
    let server = server_with_short_cache(dir.path().to_path_buf(), 10);

    let mut ctx = Ctx::new("/a.txt");
    ctx.range = Some("bytes=2-5".to_string());
    server.handle(&mut ctx).await.unwrap();
    assert_eq!(ctx.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(ctx.body_len, Some(4));
}

#[tokio::test]
async fn directory_listing_then_plain_file_share_the_same_server() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("docs")).unwrap();
    std::fs::write(dir.path().join("docs").join("readme.txt"), b"docs").unwrap();
    let spec = FileServConfigSpec {
        root: dir.path().to_path_buf(),
        generate_index_pages: true,
        ..FileServConfigSpec::default()
    };
    let server = Server::new(FileServConfig::from_spec(spec));

    let mut listing_ctx = Ctx::new("/docs/");
    server.handle(&mut listing_ctx).await.unwrap();
    assert_eq!(listing_ctx.status, StatusCode::OK);

    let mut file_ctx = Ctx::new("/docs/readme.txt");
    server.handle(&mut file_ctx).await.unwrap();
    assert_eq!(file_ctx.body_len, Some(4));
}
