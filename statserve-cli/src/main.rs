mod body;
mod config;
mod http_ctx;
mod logging;

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use statserve_core::StaticFileError;
use statserve_core::handler::Server;
use tokio::net::TcpListener;

use body::ReaderBody;
use http_ctx::{HyperCtx, ResponseBody};
use logging::{LogMode, default_log_mode, init_logging};

#[derive(Parser)]
#[command(name = "statserve", about = "Static-file serving demo server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the static-file server using the given TOML config.
    Run {
        config: PathBuf,
        #[arg(long)]
        pretty: bool,
        #[arg(long)]
        raw: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, pretty, raw } => {
            let mode = if raw {
                LogMode::Raw
            } else if pretty {
                LogMode::Pretty
            } else {
                default_log_mode()
            };
            let _log_guard = init_logging(mode);
            run(config).await
        }
    }
}

async fn run(config_path: PathBuf) -> anyhow::Result<()> {
    let run_config = config::load(&config_path)?;

    let mut core_config = statserve_core::FileServConfig::from_spec(run_config.static_files);
    if run_config.strip_segments > 0 || run_config.virtual_host.is_some() {
        core_config = match run_config.virtual_host {
            Some(host) => core_config.with_path_rewrite(statserve_core::config::virtual_host_prepend(
                run_config.strip_segments,
                &host,
            )),
            None => core_config.with_path_rewrite(statserve_core::config::strip_leading_segments(
                run_config.strip_segments,
            )),
        };
    }

    let server = Server::new(core_config);
    let listener = TcpListener::bind(&run_config.listen).await?;
    tracing::info!(addr = %run_config.listen, "statserve listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let server = server.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(server.clone(), req));
            if let Err(err) = AutoBuilder::new(hyper_util::rt::TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                tracing::warn!(%peer, error = %err, "connection error");
            }
        });
    }
}

type BoxBody = http_body_util::combinators::BoxBody<Bytes, std::io::Error>;

async fn handle(
    server: Arc<Server>,
    req: http::Request<Incoming>,
) -> Result<http::Response<BoxBody>, Infallible> {
    let mut ctx = HyperCtx::new(&req);

    match server.handle(&mut ctx).await {
        Ok(()) => Ok(build_response(ctx)),
        Err(err) => {
            log_request_error(req.uri().path(), &err);
            let status = err.status_code();
            let body = full_body(err.to_string().into_bytes());
            Ok(http::Response::builder()
                .status(status)
                .body(body)
                .expect("static error response is well-formed"))
        }
    }
}

/// Logs a failed request at the level its kind warrants: `error!` only
/// for path rejections and unexpected filesystem/sidecar failures,
/// `debug!`/`warn!` for the routine 4xx outcomes a static file server
/// sees constantly (missing files, unsatisfiable ranges).
fn log_request_error(path: &str, err: &StaticFileError) {
    match err {
        StaticFileError::NulByte | StaticFileError::PathTraversal => {
            tracing::error!(path, error = %err, "request rejected");
        }
        StaticFileError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                tracing::debug!(path, error = %err, "request failed");
            }
            _ => tracing::error!(path, error = %err, "sidecar or filesystem I/O failure"),
        },
        StaticFileError::NotFound
        | StaticFileError::Range(_)
        | StaticFileError::Forbidden
        | StaticFileError::DirectoryIndexRequired => {
            tracing::debug!(path, error = %err, "request failed");
        }
        StaticFileError::NoCreatePermission => {
            tracing::warn!(path, error = %err, "request failed");
        }
    }
}

fn build_response(ctx: HyperCtx) -> http::Response<BoxBody> {
    let mut builder = http::Response::builder().status(ctx.status);
    *builder.headers_mut().expect("fresh builder has headers") = ctx.headers;

    let body = match ctx.body {
        ResponseBody::Empty => full_body(Vec::new()),
        ResponseBody::Bytes(bytes) => full_body(bytes),
        ResponseBody::Reader(reader, length) => ReaderBody::new(reader, length).boxed(),
    };

    builder.body(body).expect("response is well-formed")
}

fn full_body(bytes: Vec<u8>) -> BoxBody {
    Full::new(Bytes::from(bytes))
        .map_err(|never: Infallible| match never {})
        .boxed()
}
