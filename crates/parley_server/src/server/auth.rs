#![forbid(unsafe_code)]

use anyhow::{Context, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use parley_domain::{Identity, SecretString, UserId};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use crate::util::time::unix_secs_now;

/// Claims carried by a `v1.<payload>.<sig>` access token.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthClaims {
	/// Subject: the user id, as issued by the out-of-scope token service.
	pub sub: String,
	pub exp: u64,
}

pub fn verify_hmac_token(token: &str, secret: &str) -> anyhow::Result<AuthClaims> {
	let parts = token.split('.').collect::<Vec<_>>();
	if parts.len() != 3 || parts[0] != "v1" {
		return Err(anyhow!("invalid token format"));
	}

	let payload_b64 = parts[1];
	let sig_b64 = parts[2];

	let payload = URL_SAFE_NO_PAD.decode(payload_b64).context("decode token payload")?;
	let expected_sig = sign(payload_b64.as_bytes(), secret.as_bytes());
	let provided_sig = URL_SAFE_NO_PAD.decode(sig_b64).context("decode token signature")?;

	if !constant_time_eq(&expected_sig, &provided_sig) {
		return Err(anyhow!("invalid token signature"));
	}

	let claims: AuthClaims = serde_json::from_slice(&payload).context("parse token claims")?;
	if claims.exp <= unix_secs_now() {
		return Err(anyhow!("token expired"));
	}

	Ok(claims)
}

/// Resolve a bearer credential to an identity.
///
/// Every failure mode collapses to `Anonymous`: missing or malformed token,
/// bad signature, expiry, a non-numeric subject, or no configured secret.
/// Callers decide whether anonymous is acceptable for their surface.
pub fn resolve_identity(token: Option<&str>, secret: Option<&SecretString>) -> Identity {
	let (Some(token), Some(secret)) = (token, secret) else {
		return Identity::Anonymous;
	};

	match verify_hmac_token(token, secret.expose()) {
		Ok(claims) => match claims.sub.parse::<UserId>() {
			Ok(user) => Identity::User(user),
			Err(e) => {
				debug!(error = %e, "token subject is not a user id");
				Identity::Anonymous
			}
		},
		Err(e) => {
			debug!(error = %e, "token verification failed");
			Identity::Anonymous
		}
	}
}

fn sign(payload_b64: &[u8], secret: &[u8]) -> Vec<u8> {
	let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("hmac key");
	mac.update(payload_b64);
	mac.finalize().into_bytes().to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	if a.len() != b.len() {
		return false;
	}

	let mut diff = 0u8;
	for (x, y) in a.iter().zip(b.iter()) {
		diff |= x ^ y;
	}

	diff == 0
}

/// Mint a token the way the out-of-scope issuer does. Test-only.
#[cfg(test)]
pub fn mint_token(sub: &str, exp: u64, secret: &str) -> String {
	let payload = serde_json::json!({ "sub": sub, "exp": exp }).to_string();
	let payload_b64 = URL_SAFE_NO_PAD.encode(payload.as_bytes());
	let sig = sign(payload_b64.as_bytes(), secret.as_bytes());
	format!("v1.{payload_b64}.{}", URL_SAFE_NO_PAD.encode(sig))
}
