use std::sync::Arc;

use http::StatusCode;

use crate::cache::{Cache, EntryBody, FileEntry, FileReader};
use crate::config::FileServConfig;
use crate::dirindex;
use crate::error::{Result, StaticFileError};
use crate::fsopen::build_file_entry;
use crate::pathlock::PathLockRegistry;
use crate::range::ByteRangeParser;

/// Abstracts the HTTP request/response objects this crate never owns.
/// A binary wiring a real HTTP stack (hyper, pingora, ...) implements
/// this once and the request handler stays framework-agnostic.
pub trait RequestContext {
    /// The path portion of the request, before any rewrite.
    fn raw_path(&self) -> &str;
    fn is_head(&self) -> bool;
    fn accepts_gzip(&self) -> bool;
    fn range_header(&self) -> Option<&str>;
    fn if_modified_since(&self) -> Option<&str>;

    fn set_status(&mut self, status: StatusCode);
    fn set_header(&mut self, name: &'static str, value: String);
    fn set_body_reader(&mut self, reader: FileReader, length: u64);
    fn set_body_bytes(&mut self, bytes: Vec<u8>);
}

/// Everything the handler needs that outlives a single request.
pub struct Server {
    pub config: FileServConfig,
    pub cache: Arc<Cache>,
    pub path_locks: PathLockRegistry,
}

impl Server {
    pub fn new(config: FileServConfig) -> Arc<Self> {
        let cache = Cache::new(config.cache_duration);
        cache.clone().spawn_janitor();
        Arc::new(Server {
            config,
            cache,
            path_locks: PathLockRegistry::new(),
        })
    }

    pub async fn handle<C: RequestContext>(&self, ctx: &mut C) -> Result<()> {
        let request_path = self.resolve_path(ctx)?;
        let fs_path = self.config.root.join(request_path.trim_start_matches('/'));

        let wants_range = ctx.range_header().is_some();
        let must_compress = self.config.compress && !wants_range && ctx.accepts_gzip();

        let entry = match self.lookup_or_build(&fs_path, &request_path, must_compress).await {
            Ok(entry) => entry,
            Err(err) if is_not_found(&err) => {
                return self.respond_not_found(ctx, &request_path);
            }
            Err(err) => return Err(err),
        };

        if let Some(since) = ctx.if_modified_since() {
            if !modified_since(entry.last_modified, since) {
                self.cache.release_reader(&entry);
                ctx.set_status(StatusCode::NOT_MODIFIED);
                return Ok(());
            }
        }

        let mut reader = self.cache.reader_for(entry.clone()).await?;

        let mut status = StatusCode::OK;
        let mut length = entry.content_length;

        if self.config.accept_byte_range {
            ctx.set_header("Accept-Ranges", "bytes".to_string());

            if let Some(header) = ctx.range_header() {
                match ByteRangeParser::parse(header, entry.content_length) {
                    Ok(range) => {
                        reader.update_byte_range(range.start, range.end);
                        length = range.len();
                        status = StatusCode::PARTIAL_CONTENT;
                        ctx.set_header(
                            "Content-Range",
                            format!(
                                "bytes {}-{}/{}",
                                range.start, range.end, entry.content_length
                            ),
                        );
                    }
                    Err(err) => {
                        reader.close().await;
                        return Err(StaticFileError::Range(err));
                    }
                }
            }
        }

        if entry.compressed {
            ctx.set_header("Content-Encoding", "gzip".to_string());
        }
        ctx.set_header("Content-Type", entry.content_type.clone());
        ctx.set_header("Content-Length", length.to_string());
        ctx.set_header("Last-Modified", entry.last_modified_http.clone());
        ctx.set_status(status);

        if ctx.is_head() {
            reader.close().await;
        } else {
            ctx.set_body_reader(reader, length);
        }

        Ok(())
    }

    /// Produces the 404 response for a missing path: the configured
    /// `path_not_found` callback's body if one is set, otherwise the
    /// default empty-bodied 404 carried by [`StaticFileError::NotFound`].
    fn respond_not_found<C: RequestContext>(&self, ctx: &mut C, request_path: &str) -> Result<()> {
        match &self.config.path_not_found {
            Some(f) => {
                let body = f(request_path);
                ctx.set_status(StatusCode::NOT_FOUND);
                ctx.set_header("Content-Type", "text/plain; charset=utf-8".to_string());
                ctx.set_header("Content-Length", body.len().to_string());
                ctx.set_body_bytes(body);
                Ok(())
            }
            None => Err(StaticFileError::NotFound),
        }
    }

    fn resolve_path(&self, ctx: &impl RequestContext) -> Result<String> {
        let rewritten = self
            .config
            .path_rewrite
            .as_ref()
            .map(|f| f(ctx.raw_path()));

        let path = rewritten.as_deref().unwrap_or_else(|| ctx.raw_path());

        if path.as_bytes().contains(&0) {
            return Err(StaticFileError::NulByte);
        }
        if rewritten.is_some() && path.contains("/../") {
            return Err(StaticFileError::PathTraversal);
        }

        let trimmed = path.strip_suffix('/').unwrap_or(path);
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed };
        Ok(trimmed.to_string())
    }

    async fn lookup_or_build(
        &self,
        fs_path: &std::path::Path,
        request_path: &str,
        must_compress: bool,
    ) -> Result<Arc<FileEntry>> {
        if let Some(entry) = self.cache.lookup(fs_path, must_compress) {
            return Ok(entry);
        }

        let entry = self.build_entry(fs_path, request_path, must_compress).await?;
        // Keyed by the requested encoding (`must_compress`), not the
        // entry's resulting `compressed` flag: a file the compressibility
        // probe judges not worth gzipping still builds a plain entry, and
        // that entry must land in the same map `lookup` above consulted
        // or every future gzip-accepting request would miss the cache and
        // re-run the probe from scratch.
        Ok(self
            .cache
            .insert_or_reuse(fs_path.to_path_buf(), must_compress, Arc::new(entry)))
    }

    async fn build_entry(
        &self,
        fs_path: &std::path::Path,
        request_path: &str,
        must_compress: bool,
    ) -> Result<FileEntry> {
        if must_compress {
            let sidecar = self.config.sidecar_path(fs_path);
            match crate::compress::ensure_compressed(fs_path, &sidecar, &self.path_locks).await {
                Ok(Some(sidecar_path)) => {
                    return build_file_entry(sidecar_path, fs_path.to_path_buf(), true).await;
                }
                Ok(None) => {
                    // Not worth compressing; fall through to plain serving.
                }
                Err(StaticFileError::NoCreatePermission) => {
                    tracing::warn!(path = %fs_path.display(), "sidecar creation denied, serving uncompressed");
                }
                Err(err) => return Err(err),
            }
        }

        match build_file_entry(fs_path.to_path_buf(), fs_path.to_path_buf(), false).await {
            Ok(entry) => Ok(entry),
            Err(StaticFileError::DirectoryIndexRequired) => {
                self.build_directory_entry(fs_path, request_path, must_compress).await
            }
            Err(err) => Err(err),
        }
    }

    async fn build_directory_entry(
        &self,
        fs_path: &std::path::Path,
        request_path: &str,
        must_compress: bool,
    ) -> Result<FileEntry> {
        for name in &self.config.index_names {
            let candidate = fs_path.join(name);
            match build_file_entry(candidate.clone(), candidate, false).await {
                Ok(entry) => return Ok(entry),
                Err(StaticFileError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        if !self.config.generate_index_pages {
            return Err(StaticFileError::Forbidden);
        }

        let fs_path_owned = fs_path.to_path_buf();
        let request_path_owned = request_path.to_string();
        let suffix = self.config.compressed_file_suffix.clone();
        let html = tokio::task::spawn_blocking(move || {
            dirindex::render(&fs_path_owned, &request_path_owned, &suffix)
        })
        .await
        .expect("dirindex render task panicked")?;

        let html = if must_compress {
            gzip_bytes(&html)
        } else {
            html
        };

        let meta = tokio::fs::metadata(fs_path).await?;
        Ok(FileEntry::new(
            fs_path.to_path_buf(),
            EntryBody::DirIndex(html.clone()),
            "text/html; charset=utf-8".to_string(),
            html.len() as u64,
            must_compress,
            meta.modified()?,
        ))
    }
}

fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("in-memory gzip write cannot fail");
    encoder.finish().expect("in-memory gzip finish cannot fail")
}

/// Whether `err` represents a missing-file outcome, as opposed to a
/// permission/traversal/range rejection that should surface as its own
/// status rather than be rewritten through `path_not_found`.
fn is_not_found(err: &StaticFileError) -> bool {
    matches!(err, StaticFileError::NotFound)
        || matches!(err, StaticFileError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
}

fn modified_since(file_modified: std::time::SystemTime, header: &str) -> bool {
    let since = match httpdate::parse_http_date(header) {
        Ok(t) => t,
        Err(_) => return true,
    };
    match file_modified.duration_since(since) {
        Ok(delta) => delta.as_secs() >= 1,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileServConfigSpec;

    struct TestCtx {
        path: String,
        head: bool,
        gzip: bool,
        range: Option<String>,
        ims: Option<String>,
        status: StatusCode,
        headers: Vec<(&'static str, String)>,
        body_len: Option<u64>,
        body_bytes: Option<Vec<u8>>,
    }

    impl TestCtx {
        fn new(path: &str) -> Self {
            TestCtx {
                path: path.to_string(),
                head: false,
                gzip: false,
                range: None,
                ims: None,
                status: StatusCode::OK,
                headers: Vec::new(),
                body_len: None,
                body_bytes: None,
            }
        }

        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.as_str())
        }
    }

    impl RequestContext for TestCtx {
        fn raw_path(&self) -> &str {
            &self.path
        }
        fn is_head(&self) -> bool {
            self.head
        }
        fn accepts_gzip(&self) -> bool {
            self.gzip
        }
        fn range_header(&self) -> Option<&str> {
            self.range.as_deref()
        }
        fn if_modified_since(&self) -> Option<&str> {
            self.ims.as_deref()
        }
        fn set_status(&mut self, status: StatusCode) {
            self.status = status;
        }
        fn set_header(&mut self, name: &'static str, value: String) {
            self.headers.push((name, value));
        }
        fn set_body_reader(&mut self, _reader: FileReader, length: u64) {
            self.body_len = Some(length);
        }
        fn set_body_bytes(&mut self, bytes: Vec<u8>) {
            self.body_bytes = Some(bytes);
        }
    }

    fn make_server(root: std::path::PathBuf) -> Arc<Server> {
        let mut spec = FileServConfigSpec::default();
        spec.root = root;
        spec.compress = true;
        spec.generate_index_pages = true;
        Server::new(FileServConfig::from_spec(spec))
    }

    #[tokio::test]
    async fn serves_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let server = make_server(dir.path().to_path_buf());

        let mut ctx = TestCtx::new("/a.txt");
        server.handle(&mut ctx).await.unwrap();

        assert_eq!(ctx.status, StatusCode::OK);
        assert_eq!(ctx.header("Content-Length"), Some("5"));
        assert_eq!(ctx.body_len, Some(5));
    }

    #[tokio::test]
    async fn range_request_returns_206() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello world").unwrap();
        let server = make_server(dir.path().to_path_buf());

        let mut ctx = TestCtx::new("/a.txt");
        ctx.range = Some("bytes=1-3".to_string());
        server.handle(&mut ctx).await.unwrap();

        assert_eq!(ctx.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(ctx.header("Content-Range"), Some("bytes 1-3/11"));
        assert_eq!(ctx.body_len, Some(3));
    }

    #[tokio::test]
    async fn malformed_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello world").unwrap();
        let server = make_server(dir.path().to_path_buf());

        let mut ctx = TestCtx::new("/a.txt");
        ctx.range = Some("bytes=100-200".to_string());
        let err = server.handle(&mut ctx).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::RANGE_NOT_SATISFIABLE);
    }

    #[tokio::test]
    async fn gzip_accepting_client_gets_compressed_body() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello world ".repeat(200)).unwrap();
        let server = make_server(dir.path().to_path_buf());

        let mut ctx = TestCtx::new("/a.txt");
        ctx.gzip = true;
        server.handle(&mut ctx).await.unwrap();

        assert_eq!(ctx.header("Content-Encoding"), Some("gzip"));
        assert!(dir.path().join("a.txt.gz").exists());
    }

    #[tokio::test]
    async fn nul_byte_in_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(dir.path().to_path_buf());

        let mut ctx = TestCtx::new("/a\0b.txt");
        let err = server.handle(&mut ctx).await.unwrap_err();
        assert!(matches!(err, StaticFileError::NulByte));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let server = make_server(dir.path().to_path_buf());

        let mut ctx = TestCtx::new("/missing.txt");
        let err = server.handle(&mut ctx).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_file_uses_configured_not_found_callback() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = FileServConfigSpec::default();
        spec.root = dir.path().to_path_buf();
        let config = FileServConfig::from_spec(spec).with_path_not_found(std::sync::Arc::new(|path: &str| {
            format!("nothing at {path}").into_bytes()
        }));
        let server = Server::new(config);

        let mut ctx = TestCtx::new("/missing.txt");
        server.handle(&mut ctx).await.unwrap();

        assert_eq!(ctx.status, StatusCode::NOT_FOUND);
        assert_eq!(
            ctx.body_bytes.as_deref(),
            Some(b"nothing at /missing.txt".as_slice())
        );
    }

    #[tokio::test]
    async fn incompressible_file_is_cached_under_the_requested_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 256) as u8).collect();
        std::fs::write(dir.path().join("r.bin"), &data).unwrap();
        let server = make_server(dir.path().to_path_buf());

        let mut ctx = TestCtx::new("/r.bin");
        ctx.gzip = true;
        server.handle(&mut ctx).await.unwrap();

        assert_eq!(ctx.header("Content-Encoding"), None);
        let fs_path = dir.path().join("r.bin");
        // The built entry is plain (not worth compressing), but it must
        // still be cached under the gzip map `must_compress` consulted,
        // or every subsequent gzip-accepting request would miss and
        // re-run the compressibility probe from scratch.
        assert!(server.cache.lookup(&fs_path, true).is_some());
    }

    #[tokio::test]
    async fn directory_without_index_renders_listing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("a.txt"), b"x").unwrap();
        let server = make_server(dir.path().to_path_buf());

        let mut ctx = TestCtx::new("/sub/");
        server.handle(&mut ctx).await.unwrap();
        assert_eq!(ctx.status, StatusCode::OK);
        assert_eq!(ctx.header("Content-Type"), Some("text/html; charset=utf-8"));
    }

    #[tokio::test]
    async fn head_request_has_no_body() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let server = make_server(dir.path().to_path_buf());

        let mut ctx = TestCtx::new("/a.txt");
        ctx.head = true;
        server.handle(&mut ctx).await.unwrap();

        assert_eq!(ctx.header("Content-Length"), Some("5"));
        assert!(ctx.body_len.is_none());
    }

    #[tokio::test]
    async fn path_traversal_literal_is_rejected_when_rewriter_present() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = FileServConfigSpec::default();
        spec.root = dir.path().to_path_buf();
        let config = FileServConfig::from_spec(spec)
            .with_path_rewrite(std::sync::Arc::new(|p: &str| p.to_string()));
        let ctx = TestCtx::new("/a/../../etc/passwd");
        let server = Server::new(config);
        let result = server.resolve_path(&ctx);
        assert!(matches!(result, Err(StaticFileError::PathTraversal)));
    }
}
