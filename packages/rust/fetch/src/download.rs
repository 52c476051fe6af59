//! Streaming downloads.
//!
//! The body is written to disk chunk by chunk. When the caller allows it and
//! the server answers with `Content-Encoding: gzip`, chunks are inflated on the
//! fly before they hit the file. A failed download may leave a partial file
//! behind; callers own cleanup of the work directory.

use std::io::Write;
use std::path::Path;

use flate2::write::GzDecoder;
use nzbrelay_shared::{RelayError, Result};
use reqwest::Client;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

/// Download `url` into `dest`, returning the number of bytes written.
///
/// With `allow_decompress`, gzip is requested and a gzip-encoded body is
/// decoded while streaming. Every failure is a [`RelayError::Download`].
#[instrument(skip(client, dest), fields(dest = %dest.display()))]
pub async fn fetch_to_file(
    client: &Client,
    url: &str,
    dest: &Path,
    allow_decompress: bool,
) -> Result<u64> {
    let mut request = client.get(url);
    if allow_decompress {
        request = request.header(ACCEPT_ENCODING, "gzip");
    }

    let mut response = request
        .send()
        .await
        .map_err(|e| RelayError::download(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RelayError::download(url, format!("HTTP {status}")));
    }

    let gzipped = allow_decompress
        && response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RelayError::download(url, e))?;
        }
    }
    let mut file = File::create(dest)
        .await
        .map_err(|e| RelayError::download(url, e))?;

    let mut decoder = gzipped.then(|| GzDecoder::new(Vec::new()));
    let mut written: u64 = 0;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| RelayError::download(url, e))?
    {
        let bytes = match decoder.as_mut() {
            Some(decoder) => {
                decoder
                    .write_all(&chunk)
                    .map_err(|e| RelayError::download(url, e))?;
                std::mem::take(decoder.get_mut())
            }
            None => chunk.to_vec(),
        };
        file.write_all(&bytes)
            .await
            .map_err(|e| RelayError::download(url, e))?;
        written += bytes.len() as u64;
    }

    if let Some(decoder) = decoder {
        let tail = decoder
            .finish()
            .map_err(|e| RelayError::download(url, e))?;
        file.write_all(&tail)
            .await
            .map_err(|e| RelayError::download(url, e))?;
        written += tail.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| RelayError::download(url, e))?;

    debug!(bytes = written, gzipped, "download complete");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn plain_body_is_written_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cover.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"JPEGDATA".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("cover.jpg");
        let n = fetch_to_file(
            &Client::new(),
            &format!("{}/cover.jpg", server.uri()),
            &dest,
            false,
        )
        .await
        .unwrap();

        assert_eq!(n, 8);
        assert_eq!(std::fs::read(&dest).unwrap(), b"JPEGDATA");
    }

    #[tokio::test]
    async fn gzip_body_is_decoded_when_allowed() {
        let server = MockServer::start().await;
        let payload = b"<nzb>segments</nzb>".repeat(200);
        Mock::given(method("GET"))
            .and(path("/nzb"))
            .and(header("accept-encoding", "gzip"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-encoding", "gzip")
                    .set_body_bytes(gzip(&payload)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("release.nzb");
        let n = fetch_to_file(&Client::new(), &format!("{}/nzb", server.uri()), &dest, true)
            .await
            .unwrap();

        assert_eq!(n, payload.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), payload);
    }

    #[tokio::test]
    async fn uncompressed_response_passes_through_when_decompress_allowed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<nzb/>"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.nzb");
        fetch_to_file(&Client::new(), &server.uri(), &dest, true)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "<nzb/>");
    }

    #[tokio::test]
    async fn http_error_is_download_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.jpg");
        let err = fetch_to_file(&Client::new(), &server.uri(), &dest, false)
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Download { .. }));
        assert!(err.to_string().contains("404"));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn corrupt_gzip_is_download_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-encoding", "gzip")
                    .set_body_bytes(b"definitely not gzip".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("bad.nzb");
        let err = fetch_to_file(&Client::new(), &server.uri(), &dest, true)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Download { .. }));
        assert!(dest.exists(), "partial file is left in place");
    }

    #[tokio::test]
    async fn checksum_failure_leaves_partial_file() {
        let server = MockServer::start().await;
        let mut body = gzip(&b"<nzb>segments</nzb>".repeat(50));
        let crc_at = body.len() - 8;
        body[crc_at] ^= 0xff;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-encoding", "gzip")
                    .set_body_bytes(body),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("partial.nzb");
        let err = fetch_to_file(&Client::new(), &server.uri(), &dest, true)
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Download { .. }));
        assert!(err.to_string().contains(&server.uri()));
        assert!(dest.exists());
    }
}
