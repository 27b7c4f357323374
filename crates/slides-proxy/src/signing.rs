//! URL signing for the campus video CDN.

use chrono::Utc;

/// Shared client secret used by both signatures.
pub const MAGIC: &str = "1138b69dfef641d9d7ba49137d2d4875";

const CLIENT_VERSION: &str = "v1";
const PLATFORM: &str = "yhkt_user";

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Path segment inserted before the file name of recorded media URLs.
pub fn path_hash() -> String {
    md5_hex(&format!("{}_100", MAGIC))
}

/// Insert the path hash before the last path component.
pub fn encrypt_url(url: &str) -> String {
    let hash = path_hash();
    match url.rsplit_once('/') {
        Some((head, last)) => format!("{}/{}/{}", head, hash, last),
        None => format!("{}/{}", hash, url),
    }
}

/// Request signature for a unix timestamp in seconds.
pub fn signature(timestamp: i64) -> String {
    md5_hex(&format!("{}_{}_{}", MAGIC, CLIENT_VERSION, timestamp))
}

/// Timestamp and signature pair, renewed periodically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub timestamp: i64,
    pub value: String,
}

impl Signature {
    pub fn at(timestamp: i64) -> Self {
        Self {
            timestamp,
            value: signature(timestamp),
        }
    }

    pub fn now() -> Self {
        Self::at(Utc::now().timestamp())
    }
}

/// Append the signing query to a URL.
pub fn sign_url(url: &str, video_token: &str, sig: &Signature) -> String {
    format!(
        "{}?Xvideo_Token={}&Xclient_Timestamp={}&Xclient_Signature={}&Xclient_Version={}&Platform={}",
        url, video_token, sig.timestamp, sig.value, CLIENT_VERSION, PLATFORM
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_hash_is_fixed() {
        assert_eq!(path_hash(), "c3d47d7b3aa8caf2983b313cb6cd142f");
    }

    #[test]
    fn test_encrypt_inserts_before_file_name() {
        assert_eq!(
            encrypt_url("https://cvideo.example/v/2024/abc.m3u8"),
            "https://cvideo.example/v/2024/c3d47d7b3aa8caf2983b313cb6cd142f/abc.m3u8"
        );
        assert_eq!(encrypt_url("seg.ts"), "c3d47d7b3aa8caf2983b313cb6cd142f/seg.ts");
    }

    #[test]
    fn test_signature_vector() {
        let sig = Signature::at(1_700_000_000);
        assert_eq!(sig.value, "7882ae7978cdaf9984063677dde90b24");
    }

    #[test]
    fn test_sign_url_query() {
        let signed = sign_url("https://h/a.ts", "tok", &Signature::at(1_700_000_000));
        assert_eq!(
            signed,
            "https://h/a.ts?Xvideo_Token=tok&Xclient_Timestamp=1700000000\
             &Xclient_Signature=7882ae7978cdaf9984063677dde90b24&Xclient_Version=v1&Platform=yhkt_user"
        );
    }
}
