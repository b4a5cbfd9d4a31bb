use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use portcullis_common::uri::Uri;
use rand::{CryptoRng, RngCore, rngs::ThreadRng};
use smol_str::{SmolStr, format_smolstr};

use crate::error::{OAuthError, Result};

/// Random `oauth_nonce`. URL-safe base64 stays inside the unreserved set.
pub fn generate_nonce() -> SmolStr {
    URL_SAFE_NO_PAD
        .encode(get_random_values::<_, 16>(&mut ThreadRng::default()))
        .into()
}

/// Random OAuth2 anti-forgery `state`.
pub fn generate_state() -> SmolStr {
    URL_SAFE_NO_PAD
        .encode(get_random_values::<_, 24>(&mut ThreadRng::default()))
        .into()
}

/// Seconds since the Unix epoch, as `oauth_timestamp` wants it.
pub fn timestamp() -> SmolStr {
    format_smolstr!("{}", Utc::now().timestamp())
}

/// Absolute URLs are used as-is; anything else is joined onto `base`.
pub fn resolve_api_uri(base: Option<&Uri>, path: &str) -> Result<Uri> {
    if let Ok(absolute) = Uri::parse(path) {
        return Ok(absolute);
    }
    match base {
        Some(base) => Ok(base.join(path.trim_start_matches('/'))?),
        None => Err(OAuthError::invalid_request(format_smolstr!(
            "relative path {path:?} needs a base API URI"
        ))
        .with_help("pass an absolute URL or configure the service base API URI")),
    }
}

pub fn get_random_values<R, const LEN: usize>(rng: &mut R) -> [u8; LEN]
where
    R: RngCore + CryptoRng,
{
    let mut bytes = [0u8; LEN];
    rng.fill_bytes(&mut bytes);
    bytes
}
