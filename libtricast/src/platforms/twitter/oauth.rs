//! OAuth 1.0a request signing (HMAC-SHA1)
//!
//! Query and form parameters are part of the signature base string; JSON
//! bodies are not.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha1::Sha1;

use crate::config::Secret;
use crate::error::{PlatformError, PlatformResult};
use crate::http::{HttpRequest, Method};

type HmacSha1 = Hmac<Sha1>;

/// The four values that give user context
#[derive(Debug, Clone)]
pub struct OAuth1Credentials {
    pub consumer_key: Secret,
    pub consumer_secret: Secret,
    pub token: Secret,
    pub token_secret: Secret,
}

fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

fn nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Sign a request, adding its `Authorization` header
pub fn sign(credentials: &OAuth1Credentials, request: HttpRequest) -> PlatformResult<HttpRequest> {
    let params: Vec<(String, String)> = request
        .query
        .iter()
        .chain(request.form_fields())
        .cloned()
        .collect();

    let header = authorization_header_with(
        credentials,
        request.method,
        &request.url,
        &params,
        &nonce(),
        chrono::Utc::now().timestamp(),
    )?;

    Ok(request.header("Authorization", header))
}

/// Build the `Authorization` header with a fixed nonce and timestamp
pub fn authorization_header_with(
    credentials: &OAuth1Credentials,
    method: Method,
    url: &str,
    params: &[(String, String)],
    nonce: &str,
    timestamp: i64,
) -> PlatformResult<String> {
    let timestamp = timestamp.to_string();
    let oauth_params = [
        ("oauth_consumer_key", credentials.consumer_key.expose()),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", timestamp.as_str()),
        ("oauth_token", credentials.token.expose()),
        ("oauth_version", "1.0"),
    ];

    let mut pairs: Vec<(String, String)> = oauth_params
        .iter()
        .map(|(k, v)| (encode(k), encode(v)))
        .chain(params.iter().map(|(k, v)| (encode(k), encode(v))))
        .collect();
    pairs.sort();

    let parameter_string = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let base_string = format!(
        "{}&{}&{}",
        method.as_str(),
        encode(url),
        encode(&parameter_string)
    );
    let signing_key = format!(
        "{}&{}",
        encode(credentials.consumer_secret.expose()),
        encode(credentials.token_secret.expose())
    );

    let mut mac = HmacSha1::new_from_slice(signing_key.as_bytes()).map_err(|e| {
        PlatformError::AuthenticationFailed(format!("Failed to initialise request signing: {}", e))
    })?;
    mac.update(base_string.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    let header = oauth_params
        .iter()
        .map(|(k, v)| (*k, *v))
        .chain(std::iter::once(("oauth_signature", signature.as_str())))
        .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!("OAuth {}", header))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> OAuth1Credentials {
        OAuth1Credentials {
            consumer_key: "xvz1evFS4wEEPTGEFPHBog".into(),
            consumer_secret: "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw".into(),
            token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".into(),
            token_secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE".into(),
        }
    }

    #[test]
    fn test_known_signature() {
        // Worked example from the vendor's signing documentation
        let params = vec![
            ("include_entities".to_string(), "true".to_string()),
            (
                "status".to_string(),
                "Hello Ladies + Gentlemen, a signed OAuth request!".to_string(),
            ),
        ];

        let header = authorization_header_with(
            &credentials(),
            Method::Post,
            "https://api.twitter.com/1.1/statuses/update.json",
            &params,
            "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg",
            1318622958,
        )
        .unwrap();

        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""));
        assert!(header.contains("oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\""));
        assert!(header.contains("oauth_timestamp=\"1318622958\""));
        // Request parameters are signed but not repeated in the header
        assert!(!header.contains("include_entities"));
    }

    #[test]
    fn test_sign_adds_header() {
        let request = HttpRequest::get("https://api.twitter.com/2/users/me")
            .query("user.fields", "id,username");
        let signed = sign(&credentials(), request).unwrap();

        let header = signed.header_value("Authorization").unwrap();
        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_nonce=\""));
        assert!(header.contains("oauth_signature_method=\"HMAC-SHA1\""));
    }

    #[test]
    fn test_nonce_is_alphanumeric() {
        let value = nonce();
        assert_eq!(value.len(), 32);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(value, nonce());
    }
}
