use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

/// Characters escaped inside one path segment of a video URL.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Server-relative locator of a video file: `/{category}/{encoded file name}`.
pub fn video_url(category: &str, file_name: &str) -> String {
    format!(
        "/{}/{}",
        utf8_percent_encode(category, SEGMENT),
        utf8_percent_encode(file_name, SEGMENT)
    )
}

pub fn is_valid_http_url(url: &str) -> bool {
    if let Ok(parsed) = Url::parse(url) {
        let scheme = parsed.scheme();
        let host = parsed.host_str().unwrap_or("");
        (scheme == "http" || scheme == "https") && !host.is_empty()
    } else {
        false
    }
}

/// Parses the backend base address, making sure relative joins keep its path.
pub fn parse_base_url(raw: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(raw)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}
