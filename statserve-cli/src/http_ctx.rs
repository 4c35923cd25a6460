use http::{HeaderMap, StatusCode};
use statserve_core::cache::FileReader;
use statserve_core::RequestContext;

pub enum ResponseBody {
    Empty,
    Bytes(Vec<u8>),
    Reader(FileReader, u64),
}

/// Bridges a `hyper::Request`'s parts and an in-progress response to
/// [`statserve_core::RequestContext`].
pub struct HyperCtx {
    path: String,
    head: bool,
    accepts_gzip: bool,
    range: Option<String>,
    if_modified_since: Option<String>,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl HyperCtx {
    pub fn new<B>(req: &http::Request<B>) -> Self {
        let headers = req.headers();
        let accepts_gzip = headers
            .get(http::header::ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').any(|part| part.split(';').next().unwrap_or("").trim() == "gzip"))
            .unwrap_or(false);
        let range = headers
            .get(http::header::RANGE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let if_modified_since = headers
            .get(http::header::IF_MODIFIED_SINCE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        HyperCtx {
            path: req.uri().path().to_string(),
            head: req.method() == http::Method::HEAD,
            accepts_gzip,
            range,
            if_modified_since,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }
}

impl RequestContext for HyperCtx {
    fn raw_path(&self) -> &str {
        &self.path
    }

    fn is_head(&self) -> bool {
        self.head
    }

    fn accepts_gzip(&self) -> bool {
        self.accepts_gzip
    }

    fn range_header(&self) -> Option<&str> {
        self.range.as_deref()
    }

    fn if_modified_since(&self) -> Option<&str> {
        self.if_modified_since.as_deref()
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn set_header(&mut self, name: &'static str, value: String) {
        if let Ok(header_value) = http::HeaderValue::from_str(&value) {
            self.headers.insert(name, header_value);
        }
    }

    fn set_body_reader(&mut self, reader: FileReader, length: u64) {
        self.body = ResponseBody::Reader(reader, length);
    }

    fn set_body_bytes(&mut self, bytes: Vec<u8>) {
        self.body = ResponseBody::Bytes(bytes);
    }
}
