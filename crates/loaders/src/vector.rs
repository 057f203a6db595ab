//! Vector graphic (SVG) loader
//!
//! Inline `data:` URIs are decoded, screened, sanitized and validated with
//! an offscreen render probe, falling back to a structural check when the
//! probe cannot draw. Remote documents are fetched, sanitized and checked
//! structurally.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use media_preload_scheduler::{CancellationToken, MediaError, MediaResult};
use url::Url;

use crate::platform::MediaPlatform;

/// Markup sanitizer supplied by the embedding application
pub trait MarkupSanitizer: Send + Sync {
    /// Strip anything unsafe from `input`
    fn sanitize(&self, input: &str) -> String;

    /// Whether `input` should be rejected outright
    fn looks_suspicious(&self, input: &str) -> bool;
}

/// Loads and validates SVG markup
pub struct VectorLoader {
    platform: Arc<dyn MediaPlatform>,
    sanitizer: Arc<dyn MarkupSanitizer>,
    timeout: Duration,
}

impl VectorLoader {
    pub fn new(
        platform: Arc<dyn MediaPlatform>,
        sanitizer: Arc<dyn MarkupSanitizer>,
        timeout: Duration,
    ) -> Self {
        Self {
            platform,
            sanitizer,
            timeout,
        }
    }

    /// Load `url`, returning sanitized markup
    pub async fn load(&self, url: &str, token: &CancellationToken) -> MediaResult<String> {
        if token.is_cancelled() {
            return Err(MediaError::Aborted);
        }

        if url.starts_with("data:") {
            self.load_inline(url, token).await
        } else {
            self.load_remote(url, token).await
        }
    }

    async fn load_inline(&self, url: &str, token: &CancellationToken) -> MediaResult<String> {
        let markup = decode_data_uri(url)?;
        let clean = self.screen(&markup)?;

        let probe = self.platform.render_probe(&clean);
        let rendered = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(MediaError::Aborted),
            rendered = tokio::time::timeout(self.timeout, probe) => rendered.unwrap_or(false),
        };

        if rendered || is_structurally_valid(&clean) {
            Ok(clean)
        } else {
            Err(MediaError::NetworkOrDecode(
                "inline svg failed to render".to_string(),
            ))
        }
    }

    async fn load_remote(&self, url: &str, token: &CancellationToken) -> MediaResult<String> {
        let parsed = Url::parse(url).map_err(|err| MediaError::InvalidUrl(format!("{url}: {err}")))?;
        if !matches!(parsed.scheme(), "https" | "http") {
            return Err(MediaError::InvalidUrl(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        let fetch = self.platform.fetch_text(parsed.as_str());
        let markup = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(MediaError::Aborted),
            fetched = tokio::time::timeout(self.timeout, fetch) => match fetched {
                Ok(body) => body?,
                Err(_) => return Err(MediaError::Timeout(self.timeout)),
            },
        };

        let clean = self.screen(&markup)?;
        if is_structurally_valid(&clean) {
            Ok(clean)
        } else {
            Err(MediaError::NetworkOrDecode(format!(
                "{url} is not an svg document"
            )))
        }
    }

    fn screen(&self, markup: &str) -> MediaResult<String> {
        if self.sanitizer.looks_suspicious(markup) {
            tracing::warn!("rejected suspicious svg markup");
            return Err(MediaError::InvalidUrl("suspicious svg content".to_string()));
        }
        Ok(self.sanitizer.sanitize(markup))
    }
}

/// Structural fallback: an opening and a closing `svg` tag
pub fn is_structurally_valid(markup: &str) -> bool {
    markup.contains("<svg") && markup.contains("</svg>")
}

/// Decode the payload of a `data:` URI as UTF-8 text
pub fn decode_data_uri(uri: &str) -> MediaResult<String> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| MediaError::InvalidUrl("not a data uri".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| MediaError::InvalidUrl("data uri without payload".to_string()))?;

    let bytes = if header.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|err| MediaError::InvalidUrl(format!("bad base64 payload: {err}")))?
    } else {
        percent_decode(payload)
    };

    String::from_utf8(bytes).map_err(|_| MediaError::InvalidUrl("payload is not utf-8".to_string()))
}

fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(byte) = hex {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePlatform, PassthroughSanitizer};

    const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg"><circle r="4"/></svg>"#;

    fn loader(platform: &Arc<FakePlatform>) -> VectorLoader {
        VectorLoader::new(
            platform.clone(),
            Arc::new(PassthroughSanitizer),
            Duration::from_secs(15),
        )
    }

    fn base64_uri(markup: &str) -> String {
        format!(
            "data:image/svg+xml;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(markup)
        )
    }

    #[test]
    fn test_percent_decoding() {
        let decoded =
            decode_data_uri("data:image/svg+xml,%3Csvg%3E%3C/svg%3E").unwrap();
        assert_eq!(decoded, "<svg></svg>");

        // Truncated escapes pass through
        assert_eq!(percent_decode("100%"), b"100%");
        assert_eq!(percent_decode("%4"), b"%4");
    }

    #[test]
    fn test_base64_decoding() {
        assert_eq!(decode_data_uri(&base64_uri(SVG)).unwrap(), SVG);
        assert!(decode_data_uri("data:image/svg+xml;base64,@@@").is_err());
        assert!(decode_data_uri("data:image/svg+xml").is_err());
    }

    #[tokio::test]
    async fn test_inline_svg_passes_probe() {
        let platform = Arc::new(FakePlatform::new());

        let markup = loader(&platform)
            .load(&base64_uri(SVG), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(markup, SVG);
    }

    #[tokio::test]
    async fn test_structural_fallback_when_probe_fails() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_render_probe(false);

        let ok = loader(&platform)
            .load(&base64_uri(SVG), &CancellationToken::new())
            .await;
        assert!(ok.is_ok());

        let broken = loader(&platform)
            .load(&base64_uri("<svg><circle/>"), &CancellationToken::new())
            .await;
        assert!(matches!(broken, Err(MediaError::NetworkOrDecode(_))));
    }

    #[tokio::test]
    async fn test_suspicious_inline_svg_is_invalid() {
        let platform = Arc::new(FakePlatform::new());
        let evil = base64_uri("<svg><script>alert(1)</script></svg>");

        let err = loader(&platform)
            .load(&evil, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::InvalidUrl(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_svg_is_fetched() {
        let platform = Arc::new(FakePlatform::new());
        let url = "https://cdn.test/ornament.svg";
        platform.respond_text(url, Duration::from_millis(20), Ok(SVG.to_string()));

        let markup = loader(&platform)
            .load(url, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(markup, SVG);
        assert_eq!(platform.fetch_requests(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_fetch_times_out() {
        let platform = Arc::new(FakePlatform::new());
        let url = "https://cdn.test/slow.svg";
        platform.respond_text(url, Duration::from_secs(60), Ok(SVG.to_string()));

        let err = loader(&platform)
            .load(url, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, MediaError::Timeout(Duration::from_secs(15)));
    }

    #[tokio::test]
    async fn test_unsupported_scheme_never_fetches() {
        let platform = Arc::new(FakePlatform::new());

        let err = loader(&platform)
            .load("ftp://cdn.test/a.svg", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::InvalidUrl(_)));
        assert_eq!(platform.fetch_requests(), 0);
    }
}
