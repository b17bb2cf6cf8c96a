// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, auth::OidcClaims};

/// Tolerated clock skew when checking `exp`.
const CLOCK_SKEW: Duration = Duration::seconds(60);

/// Decodes the claims segment of a compact JWS ID token.
///
/// The signature is not verified. The claims are only as trustworthy as the channel to the token
/// endpoint: an `https` `token_url` authenticates them, a plain `http` one does not, and such
/// specs must not be relied on for identity. Expiry, issuer, and audience are checked by
/// [`verify_claims`].
pub(crate) fn decode_id_token(id_token: &str) -> Result<OidcClaims, String> {
	let mut segments = id_token.trim().split('.');
	let (Some(_header), Some(payload), Some(_signature), None) =
		(segments.next(), segments.next(), segments.next(), segments.next())
	else {
		return Err("expected three dot-separated segments".into());
	};
	let bytes = URL_SAFE_NO_PAD
		.decode(payload.trim_end_matches('='))
		.map_err(|e| format!("claims segment is not base64url: {e}"))?;

	serde_json::from_slice(&bytes).map_err(|e| format!("claims segment is not a JSON object: {e}"))
}

/// Rejects expired tokens, then checks issuer and audience when an issuer is configured.
pub(crate) fn verify_claims(
	claims: &OidcClaims,
	issuer: Option<&str>,
	client_id: &str,
) -> Result<(), String> {
	verify_expiry(claims, OffsetDateTime::now_utc())?;

	let Some(issuer) = issuer else {
		return Ok(());
	};

	if claims.iss.as_deref().map(|iss| iss.trim_end_matches('/')) != Some(issuer.trim_end_matches('/'))
	{
		return Err(format!("issuer {:?} does not match {issuer}", claims.iss));
	}
	if !claims.aud.iter().any(|aud| aud == client_id) {
		return Err(format!("audience does not include {client_id}"));
	}

	Ok(())
}

fn verify_expiry(claims: &OidcClaims, now: OffsetDateTime) -> Result<(), String> {
	let Some(exp) = claims.exp else {
		return Ok(());
	};
	let expires_at = OffsetDateTime::from_unix_timestamp(exp)
		.map_err(|e| format!("exp {exp} is not a valid timestamp: {e}"))?;

	if expires_at + CLOCK_SKEW <= now {
		return Err(format!("token expired at {exp}"));
	}

	Ok(())
}

#[cfg(test)]
pub(crate) fn encode_id_token(claims: &Value) -> String {
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
	let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

	format!("{header}.{payload}.sig")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn decode_reads_claims_segment() {
		let token = encode_id_token(&serde_json::json!({
			"iss": "https://login.example/",
			"sub": "user-1",
			"aud": ["client-1", "other"],
			"email": "a@example.com"
		}));
		let claims = decode_id_token(&token).expect("ID token should decode.");

		assert_eq!(claims.sub.as_deref(), Some("user-1"));
		assert_eq!(claims.email.as_deref(), Some("a@example.com"));
		assert!(verify_claims(&claims, Some("https://login.example"), "client-1").is_ok());
		assert!(verify_claims(&claims, Some("https://other.example"), "client-1").is_err());
		assert!(verify_claims(&claims, Some("https://login.example"), "client-2").is_err());
		assert!(verify_claims(&claims, None, "client-2").is_ok());
	}

	#[test]
	fn expired_tokens_are_rejected() {
		let now = OffsetDateTime::now_utc().unix_timestamp();
		let claims = |exp: i64| {
			decode_id_token(&encode_id_token(&serde_json::json!({
				"iss": "https://login.example",
				"aud": "client-1",
				"exp": exp
			})))
			.expect("ID token should decode.")
		};

		assert!(verify_claims(&claims(now + 600), Some("https://login.example"), "client-1").is_ok());
		assert!(verify_claims(&claims(now - 30), None, "client-1").is_ok());

		let err = verify_claims(&claims(now - 3_600), Some("https://login.example"), "client-1")
			.expect_err("Expired token should be rejected.");

		assert!(err.contains("expired"));
		assert!(verify_claims(&claims(now - 3_600), None, "client-1").is_err());
		assert!(verify_claims(&claims(i64::MAX), None, "client-1").is_err());
	}

	#[test]
	fn decode_rejects_malformed_tokens() {
		assert!(decode_id_token("not-a-jwt").is_err());
		assert!(decode_id_token("a.b.c.d").is_err());
		assert!(decode_id_token("a.%%%.c").is_err());
	}
}
