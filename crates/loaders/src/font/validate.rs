//! Font URL allow-list and family name sanitizing

use std::net::IpAddr;

use media_preload_scheduler::{MediaError, MediaResult};
use url::{Host, Url};

/// File extensions accepted for remote fonts
pub const FONT_EXTENSIONS: &[&str] = &["woff", "woff2", "ttf", "otf", "eot"];

/// MIME types accepted for inline fonts
pub const FONT_MIME_TYPES: &[&str] = &[
    "font/woff",
    "font/woff2",
    "font/ttf",
    "font/otf",
    "font/sfnt",
    "application/font-woff",
    "application/font-woff2",
    "application/x-font-woff",
    "application/x-font-ttf",
    "application/x-font-otf",
    "application/font-sfnt",
    "application/vnd.ms-fontobject",
];

/// Longest family name kept after sanitizing
pub const MAX_FAMILY_LEN: usize = 64;

/// Family used when nothing survives sanitizing
pub const FALLBACK_FAMILY: &str = "custom-font";

/// Check a font URL before anything is fetched
///
/// Accepts `https:` URLs with a public host and a font file extension, and
/// `data:` URLs carrying a font MIME type.
pub fn validate_font_url(url: &str) -> MediaResult<()> {
    if let Some(rest) = url.strip_prefix("data:") {
        return validate_data_url(rest);
    }

    let parsed = Url::parse(url).map_err(|err| MediaError::InvalidUrl(format!("{url}: {err}")))?;
    if parsed.scheme() != "https" {
        return Err(MediaError::InvalidUrl(format!(
            "font urls must use https, got {}",
            parsed.scheme()
        )));
    }

    match parsed.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                return Err(MediaError::InvalidUrl(format!("local font host {domain}")));
            }
        }
        Some(Host::Ipv4(ip)) => reject_local_ip(IpAddr::V4(ip))?,
        Some(Host::Ipv6(ip)) => reject_local_ip(IpAddr::V6(ip))?,
        None => return Err(MediaError::InvalidUrl("font url without host".to_string())),
    }

    let extension = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|file| file.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension {
        Some(ext) if FONT_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(MediaError::InvalidUrl(format!(
            "{} is not a font file",
            parsed.path()
        ))),
    }
}

fn validate_data_url(rest: &str) -> MediaResult<()> {
    let header = rest.split(',').next().unwrap_or_default();
    let mime = header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if rest.contains(',') && FONT_MIME_TYPES.contains(&mime.as_str()) {
        Ok(())
    } else {
        Err(MediaError::InvalidUrl(format!(
            "data url with non-font type {mime:?}"
        )))
    }
}

fn reject_local_ip(ip: IpAddr) -> MediaResult<()> {
    if ip.is_loopback() || ip.is_unspecified() {
        Err(MediaError::InvalidUrl(format!("local font host {ip}")))
    } else {
        Ok(())
    }
}

/// Keep `[A-Za-z0-9 _-]`, truncated to [`MAX_FAMILY_LEN`] characters
pub fn sanitize_font_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .take(MAX_FAMILY_LEN)
        .collect();

    let trimmed = kept.trim();
    if trimmed.is_empty() {
        FALLBACK_FAMILY.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_public_https_fonts() {
        for url in [
            "https://fonts.test/great-vibes.woff2",
            "https://fonts.test/a/b/Serif.TTF",
            "https://fonts.test/x.otf?v=3",
            "https://203.0.113.7/x.eot",
        ] {
            assert!(validate_font_url(url).is_ok(), "{url}");
        }
    }

    #[test]
    fn test_rejects_non_font_and_local_urls() {
        for url in [
            "http://fonts.test/a.woff2",
            "https://fonts.test/a.css",
            "https://fonts.test/woff2",
            "https://localhost/a.woff",
            "https://cdn.localhost/a.woff",
            "https://127.0.0.1/a.woff",
            "https://[::1]/a.woff",
            "https://0.0.0.0/a.woff",
            "ftp://fonts.test/a.woff",
            "not a url",
        ] {
            assert!(
                matches!(validate_font_url(url), Err(MediaError::InvalidUrl(_))),
                "{url}"
            );
        }
    }

    #[test]
    fn test_data_urls_need_font_mime() {
        assert!(validate_font_url("data:font/woff2;base64,d09GMgABAAAAA").is_ok());
        assert!(validate_font_url("data:application/x-font-ttf;base64,AAEAAA").is_ok());
        assert!(validate_font_url("data:text/css;base64,Ym9keXt9").is_err());
        assert!(validate_font_url("data:font/woff2").is_err());
    }

    #[test]
    fn test_sanitize_font_name() {
        assert_eq!(sanitize_font_name("Great Vibes"), "Great Vibes");
        assert_eq!(sanitize_font_name("Evil'; }<style>"), "Evil style");
        assert_eq!(sanitize_font_name("Noto_Sans-JP"), "Noto_Sans-JP");
        assert_eq!(sanitize_font_name("'\"<>"), FALLBACK_FAMILY);
        assert_eq!(sanitize_font_name(&"a".repeat(100)).len(), MAX_FAMILY_LEN);
    }
}
