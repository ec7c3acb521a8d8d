//! Git smart HTTP endpoints for passthrough-prefixed requests.
//!
//! Sub-paths under a registered passthrough prefix:
//! - `GET  <prefix>info/refs?service=git-upload-pack` - reference advertisement
//! - `POST <prefix>git-upload-pack`                   - pack negotiation
//! - `GET  <prefix>HEAD`                              - raw reference-pointer fetch
//!
//! Serving is read-only: `git-receive-pack` (push) is rejected.  Protocol
//! failures surface as truncated or empty responses rather than structured
//! error bodies -- the wire format has no error envelope at this layer, and
//! the pack's own checksum lets clients detect a short transfer.

use std::path::Path;
use std::time::SystemTime;

use axum::{
    body::Body,
    extract::{Query, Request},
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use flate2::read::GzDecoder;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, warn};

use crate::content::site::PassthroughPrefix;
use crate::git::{commands, pkt_line};

// ---------------------------------------------------------------------------
// Wire constants
// ---------------------------------------------------------------------------

const UPLOAD_PACK_SERVICE: &str = "git-upload-pack";
const RECEIVE_PACK_SERVICE: &str = "git-receive-pack";

const ADVERTISEMENT_CONTENT_TYPE: &str = "application/x-git-upload-pack-advertisement";
const RESULT_CONTENT_TYPE: &str = "application/x-git-upload-pack-result";

const INFO_REFS_PATH: &str = "info/refs";
const REF_POINTER_FILE: &str = "HEAD";

const GZIP_ENCODING: &str = "gzip";

const NEVER_EXPIRE: &str = "Fri, 01 Jan 1980 00:00:00 GMT";
const NO_CACHE_PRAGMA: &str = "no-cache";
const NO_CACHE_CONTROL: &str = "no-cache, max-age=0, must-revalidate";

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ServiceQuery {
    service: Option<String>,
}

/// Route a request that falls under a passthrough prefix to the matching
/// smart HTTP operation.
pub async fn dispatch(passthrough: &PassthroughPrefix, req: Request) -> Response {
    let rest = req.uri().path()[passthrough.prefix.len()..].to_owned();
    let method = req.method().clone();

    match rest.as_str() {
        INFO_REFS_PATH if method == Method::GET => {
            handle_info_refs(&passthrough.dir, req.uri()).await
        }
        UPLOAD_PACK_SERVICE if method == Method::POST => {
            handle_upload_pack(&passthrough.dir, req).await
        }
        REF_POINTER_FILE if method == Method::GET => {
            serve_ref_pointer(&passthrough.dir.join(REF_POINTER_FILE)).await
        }
        _ => {
            debug!(path = %req.uri().path(), "no git endpoint for path");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Reference advertisement
// ---------------------------------------------------------------------------

/// `GET <prefix>info/refs?service=git-upload-pack`
async fn handle_info_refs(repo_dir: &Path, uri: &Uri) -> Response {
    let service = Query::<ServiceQuery>::try_from_uri(uri)
        .map(|q| q.0.service.unwrap_or_default())
        .unwrap_or_default();

    if service == RECEIVE_PACK_SERVICE {
        return (
            StatusCode::FORBIDDEN,
            "Push (git-receive-pack) is not supported",
        )
            .into_response();
    }
    if service != UPLOAD_PACK_SERVICE {
        return (
            StatusCode::BAD_REQUEST,
            format!("Unsupported service: {service}"),
        )
            .into_response();
    }

    let refs = match commands::advertise_refs(repo_dir).await {
        Ok(refs) => refs,
        Err(e) => {
            error!(error = %e, repo = %repo_dir.display(), "ref advertisement failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let body = frame_advertisement(UPLOAD_PACK_SERVICE, &refs);
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, ADVERTISEMENT_CONTENT_TYPE),
            (header::EXPIRES, NEVER_EXPIRE),
            (header::PRAGMA, NO_CACHE_PRAGMA),
            (header::CACHE_CONTROL, NO_CACHE_CONTROL),
        ],
        body,
    )
        .into_response()
}

/// Prepend the smart HTTP service header to a raw reference advertisement:
/// one packet line naming the service, a flush packet, then the captured
/// subprocess output verbatim.
pub(crate) fn frame_advertisement(service: &str, refs: &[u8]) -> Vec<u8> {
    let mut body = pkt_line::encode(format!("# service={service}\n").as_bytes());
    body.extend_from_slice(pkt_line::FLUSH);
    body.extend_from_slice(refs);
    body
}

// ---------------------------------------------------------------------------
// Pack negotiation
// ---------------------------------------------------------------------------

/// `POST <prefix>git-upload-pack`
///
/// Pipes the (possibly gzip-encoded) negotiation body into a fresh
/// `git upload-pack --stateless-rpc` process and streams its stdout as the
/// response body.
async fn handle_upload_pack(repo_dir: &Path, req: Request) -> Response {
    let gzipped = req
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == GZIP_ENCODING);

    let body = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "failed to read upload-pack request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let body = if gzipped {
        match gunzip(&body) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "malformed gzip negotiation body");
                return StatusCode::BAD_REQUEST.into_response();
            }
        }
    } else {
        body
    };

    let mut child = match commands::upload_pack_streamed(repo_dir).await {
        Ok(child) => child,
        Err(e) => {
            error!(error = %e, repo = %repo_dir.display(), "failed to start git upload-pack");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Write the negotiation body, then drop stdin to signal EOF.
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(&body).await.ok();
    }

    let Some(stdout) = child.stdout.take() else {
        error!("git upload-pack stdout was not captured");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    // Stream stdout as the response body and reap the child in the
    // background so we don't leak processes.  A non-zero exit leaves the
    // response short; the client's pack checksum catches it.
    let stream = ReaderStream::new(stdout);
    let body = Body::from_stream(stream);

    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if !status.success() => {
                warn!(%status, "git upload-pack exited with non-zero status");
            }
            Err(e) => {
                error!(error = %e, "failed to wait on git upload-pack");
            }
            _ => {}
        }
    });

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, RESULT_CONTENT_TYPE)],
        body,
    )
        .into_response()
}

/// Decompress a gzip-encoded negotiation body in full.
fn gunzip(data: &[u8]) -> std::io::Result<Bytes> {
    use std::io::Read;
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(Bytes::from(out))
}

// ---------------------------------------------------------------------------
// Raw reference-pointer fetch
// ---------------------------------------------------------------------------

/// `GET <prefix>HEAD` -- stream the file with content metadata from the
/// filesystem, bypassing the subprocess entirely.
async fn serve_ref_pointer(path: &Path) -> Response {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) => {
            debug!(error = %e, path = %path.display(), "reference-pointer file unavailable");
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            error!(error = %e, path = %path.display(), "failed to open reference-pointer file");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
    headers.insert(header::CONTENT_LENGTH, meta.len().into());
    if let Ok(modified) = meta.modified() {
        if let Ok(value) = http_date(modified).parse() {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
    headers.insert(header::EXPIRES, NEVER_EXPIRE.parse().unwrap());
    headers.insert(header::PRAGMA, NO_CACHE_PRAGMA.parse().unwrap());
    headers.insert(header::CACHE_CONTROL, NO_CACHE_CONTROL.parse().unwrap());
    response
}

/// RFC 7231 HTTP-date formatting.
fn http_date(t: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(t)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertisement_starts_with_service_header_and_flush() {
        let body = frame_advertisement(UPLOAD_PACK_SERVICE, b"abc123 refs/heads/main\n");
        assert!(body.starts_with(b"001e# service=git-upload-pack\n0000"));
        assert!(body.ends_with(b"abc123 refs/heads/main\n"));
    }

    #[test]
    fn advertisement_frames_decode_cleanly() {
        let body = frame_advertisement(UPLOAD_PACK_SERVICE, b"");
        let packets = pkt_line::decode(&body);
        assert_eq!(
            packets,
            vec![
                pkt_line::PktLine::Data(b"# service=git-upload-pack\n".to_vec()),
                pkt_line::PktLine::Flush,
            ]
        );
    }

    #[test]
    fn gunzip_roundtrip() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"0032want abc123\n00000009done\n").unwrap();
        let compressed = encoder.finish().unwrap();

        let decoded = gunzip(&compressed).unwrap();
        assert_eq!(decoded.as_ref(), b"0032want abc123\n00000009done\n");
    }

    #[test]
    fn gunzip_rejects_garbage() {
        assert!(gunzip(b"definitely not gzip").is_err());
    }

    #[test]
    fn http_date_formats_epoch() {
        assert_eq!(
            http_date(SystemTime::UNIX_EPOCH),
            "Thu, 01 Jan 1970 00:00:00 GMT"
        );
    }
}
