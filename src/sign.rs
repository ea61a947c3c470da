//! Bounded-lifetime URL access tokens.
//!
//! Playlist generation signs every URL it emits; the segment endpoint
//! verifies before serving. Tokens are HMAC-SHA256 over the unsigned URL
//! plus an expiry timestamp, so a leaked segment URL stops working once it
//! expires and cannot be re-pointed at other media.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use cadenza_core::config::SigningConfig;
use cadenza_core::{Error, Result};
use cadenza_media::hls::UrlSigner;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 URL signer/verifier.
pub struct HmacSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl HmacSigner {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
            ttl,
        }
    }

    /// Build from config. Without a configured secret a random per-process
    /// key is used; outstanding URLs stop verifying after a restart, and
    /// clients simply re-request the playlist.
    pub fn from_config(config: &SigningConfig) -> Self {
        let key = match &config.secret {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                use rand::RngCore;
                let mut key = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut key);
                tracing::info!("No signing secret configured; using a per-process random key");
                key
            }
        };
        Self {
            key,
            ttl: Duration::from_secs(config.token_ttl_secs),
        }
    }

    fn mac(&self, url: &str, expires: u64) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(url.as_bytes());
        mac.update(b"|");
        mac.update(expires.to_string().as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Verify a token for the canonical unsigned URL.
    ///
    /// # Errors
    ///
    /// [`Error::Forbidden`] on an expired or mismatched token.
    pub fn verify(&self, url: &str, expires: u64, token: &str) -> Result<()> {
        if expires < now_secs() {
            return Err(Error::Forbidden("access token expired".into()));
        }

        let expected = self.mac(url, expires);
        // HMAC output comparison; the MAC itself is what resists forgery.
        if expected != token {
            return Err(Error::Forbidden("access token mismatch".into()));
        }
        Ok(())
    }
}

impl UrlSigner for HmacSigner {
    fn sign(&self, url: &str) -> String {
        let expires = now_secs() + self.ttl.as_secs();
        let token = self.mac(url, expires);
        format!("{url}&expires={expires}&auth={token}")
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> HmacSigner {
        HmacSigner::new("test-secret", Duration::from_secs(60))
    }

    fn split_signed(signed: &str) -> (String, u64, String) {
        let (base, rest) = signed.split_once("&expires=").unwrap();
        let (expires, token) = rest.split_once("&auth=").unwrap();
        (base.to_string(), expires.parse().unwrap(), token.to_string())
    }

    #[test]
    fn sign_then_verify_roundtrip() {
        let s = signer();
        let signed = s.sign("segment/0.ts?id=abc&player=p1&maxBitRate=1200");
        let (base, expires, token) = split_signed(&signed);
        assert!(s.verify(&base, expires, &token).is_ok());
    }

    #[test]
    fn tampered_url_is_rejected() {
        let s = signer();
        let signed = s.sign("segment/0.ts?id=abc&player=p1&maxBitRate=1200");
        let (_, expires, token) = split_signed(&signed);
        let err = s
            .verify("segment/1.ts?id=abc&player=p1&maxBitRate=1200", expires, &token)
            .unwrap_err();
        assert_eq!(err.http_status(), 403);
    }

    #[test]
    fn expired_token_is_rejected() {
        let s = signer();
        let url = "hls.m3u8?id=abc";
        let expired = now_secs() - 10;
        let token = s.mac(url, expired);
        let err = s.verify(url, expired, &token).unwrap_err();
        assert_eq!(err.http_status(), 403);
    }

    #[test]
    fn different_keys_do_not_cross_verify() {
        let a = HmacSigner::new("key-a", Duration::from_secs(60));
        let b = HmacSigner::new("key-b", Duration::from_secs(60));
        let signed = a.sign("hls.m3u8?id=abc");
        let (base, expires, token) = split_signed(&signed);
        assert!(b.verify(&base, expires, &token).is_err());
    }
}
