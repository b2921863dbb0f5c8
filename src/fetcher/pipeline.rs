use std::sync::LazyLock;

use bytes::Bytes;
use chrono::Utc;
use encoding_rs::Encoding;
use regex::Regex;
use reqwest::{StatusCode, header::HeaderMap};
use tracing::debug;
use url::Url;

use crate::fetcher::types::{Charset, PageResponse};

static CHARSET_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)charset\s*=\s*["']?([^"'\s;]+)"#).expect("charset regex compiles")
});

static META_CHARSET_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta\s+[^>]*?charset\s*=\s*["']?([^"'\s/>]+)"#)
        .expect("meta charset regex compiles")
});

static META_HTTP_EQUIV_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta\s+[^>]*?http-equiv\s*=\s*["']?content-type["']?[^>]*?content\s*=\s*["']?[^"'>]*?charset\s*=\s*([^"'\s;/>]+)"#)
        .expect("http-equiv regex compiles")
});

static XML_DECL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<\?xml\s+[^>]*?encoding\s*=\s*["']([^"']+)["']"#)
        .expect("xml declaration regex compiles")
});

const SNIFF_BYTES: usize = 4096;

pub fn process_response(
    url_final: Url,
    status: StatusCode,
    headers: HeaderMap,
    body_bytes: Bytes,
    content_type: &str,
) -> PageResponse {
    let charset = detect_charset(content_type, &body_bytes);
    let body_utf8 = decode_to_utf8(&body_bytes, &charset);

    PageResponse {
        url_final,
        status,
        headers,
        content_type: content_type.to_string(),
        body_raw: body_bytes,
        body_utf8,
        charset,
        fetched_at: Utc::now(),
    }
}

fn charset_from(regex: &Regex, haystack: &str) -> Option<Charset> {
    let label = regex.captures(haystack)?.get(1)?.as_str().to_lowercase();
    Encoding::for_label(label.as_bytes()).map(Charset::from_encoding)
}

/// Header first, then in-document declarations, then statistical sniffing.
pub fn detect_charset(content_type: &str, body_bytes: &[u8]) -> Charset {
    if let Some(charset) = charset_from(&CHARSET_REGEX, content_type) {
        return charset;
    }

    let search_bytes = &body_bytes[..body_bytes.len().min(SNIFF_BYTES)];
    let search_str = String::from_utf8_lossy(search_bytes);

    for regex in [&*XML_DECL_REGEX, &*META_CHARSET_REGEX, &*META_HTTP_EQUIV_REGEX] {
        if let Some(charset) = charset_from(regex, &search_str) {
            return charset;
        }
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(search_bytes, search_bytes.len() == body_bytes.len());
    Charset::from_encoding(detector.guess(None, true))
}

/// Decode with replacement; malformed sequences become U+FFFD and are
/// removed later by the cleaner.
pub fn decode_to_utf8(body_bytes: &[u8], charset: &Charset) -> String {
    let encoding = charset.encoding();
    let (decoded, used, had_errors) = encoding.decode(body_bytes);
    if had_errors {
        debug!(encoding = used.name(), "body contained malformed sequences");
    }
    decoded.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_charset_from_content_type() {
        let content_type = "text/html; charset=utf-8";
        let body = b"<html><head><title>Test</title></head></html>";

        assert_eq!(detect_charset(content_type, body), Charset::Utf8);
    }

    #[test]
    fn test_detect_charset_from_meta_tag() {
        let body = b"<html><head><meta charset=\"iso-8859-1\"><title>Test</title></head></html>";
        // encoding_rs maps ISO-8859-1 to its windows-1252 superset
        assert_eq!(detect_charset("text/html", body), Charset::Windows1252);
    }

    #[test]
    fn test_detect_charset_from_meta_http_equiv() {
        let body = b"<html><head><meta http-equiv=\"Content-Type\" content=\"text/html; charset=shift_jis\"><title>Test</title></head></html>";
        assert_eq!(detect_charset("text/html", body), Charset::ShiftJis);
    }

    #[test]
    fn test_detect_charset_from_xml_declaration() {
        let body = b"<?xml version=\"1.0\" encoding=\"GB2312\"?><rss version=\"2.0\"></rss>";
        assert_eq!(detect_charset("application/rss+xml", body), Charset::Gbk);
    }

    #[test]
    fn test_decode_gbk_feed() {
        let (encoded, _, _) = encoding_rs::GBK.encode("新闻标题");
        assert_eq!(decode_to_utf8(&encoded, &Charset::Gbk), "新闻标题");
    }

    #[test]
    fn test_decode_utf8() {
        let body = "Hello, 世界!".as_bytes();
        assert_eq!(decode_to_utf8(body, &Charset::Utf8), "Hello, 世界!");
    }

    #[test]
    fn test_decode_malformed_bytes_is_lossy() {
        let body = b"caf\xff ok";
        assert_eq!(decode_to_utf8(body, &Charset::Utf8), "caf\u{FFFD} ok");
    }
}
