use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use tracing::info;

use crate::error::ConfigurationError;

/// RSA signing credential for tokens, published through the JWKS endpoint.
pub struct SigningCredential {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    /// Base64url-encoded RSA modulus (for JWKS).
    n: String,
    /// Base64url-encoded RSA public exponent (for JWKS).
    e: String,
    kid: String,
}

impl SigningCredential {
    /// Generate an ephemeral RSA-2048 credential.
    pub fn generate(kid: &str) -> Result<Self, ConfigurationError> {
        Self::from_private_key(&generate_key()?, kid)
    }

    /// Developer credential: load a PKCS#8 PEM key from `path`, or generate
    /// one and persist it there so tokens survive restarts.
    pub fn load_or_create(path: &Path, kid: &str) -> Result<Self, ConfigurationError> {
        if path.exists() {
            let pem = std::fs::read_to_string(path).map_err(|e| {
                ConfigurationError::SigningKey(format!("cannot read {}: {e}", path.display()))
            })?;
            let private_key = RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| {
                ConfigurationError::SigningKey(format!(
                    "{} is not a PKCS#8 RSA key: {e}",
                    path.display()
                ))
            })?;
            info!(path = %path.display(), kid, "Loaded signing credential");
            return Self::from_private_key(&private_key, kid);
        }

        let private_key = generate_key()?;
        let pem = export_pem(&private_key)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigurationError::SigningKey(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        std::fs::write(path, pem.as_bytes()).map_err(|e| {
            ConfigurationError::SigningKey(format!("cannot write {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), kid, "Created developer signing credential");
        Self::from_private_key(&private_key, kid)
    }

    fn from_private_key(private_key: &RsaPrivateKey, kid: &str) -> Result<Self, ConfigurationError> {
        let public_key = RsaPublicKey::from(private_key);

        let pem = export_pem(private_key)?;
        let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
            ConfigurationError::SigningKey(format!("failed to create EncodingKey: {e}"))
        })?;

        let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());
        let decoding_key = DecodingKey::from_rsa_components(&n, &e).map_err(|err| {
            ConfigurationError::SigningKey(format!("failed to create DecodingKey: {err}"))
        })?;

        Ok(Self {
            encoding_key,
            decoding_key,
            n,
            e,
            kid: kid.to_string(),
        })
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// JWKS document listing the public key.
    pub fn jwks(&self) -> JwksResponse<'_> {
        JwksResponse {
            keys: vec![JwkEntry {
                kty: "RSA",
                alg: "RS256",
                r#use: "sig",
                kid: &self.kid,
                n: &self.n,
                e: &self.e,
            }],
        }
    }
}

impl std::fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredential")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

fn generate_key() -> Result<RsaPrivateKey, ConfigurationError> {
    RsaPrivateKey::new(&mut OsRng, 2048).map_err(|e| {
        ConfigurationError::SigningKey(format!("failed to generate RSA-2048 key: {e}"))
    })
}

fn export_pem(private_key: &RsaPrivateKey) -> Result<String, ConfigurationError> {
    private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map(|pem| pem.to_string())
        .map_err(|e| ConfigurationError::SigningKey(format!("failed to export PKCS#8 PEM: {e}")))
}

/// JWKS response body.
#[derive(Serialize)]
pub struct JwksResponse<'a> {
    pub keys: Vec<JwkEntry<'a>>,
}

/// A single JWK entry in a JWKS response.
#[derive(Serialize)]
pub struct JwkEntry<'a> {
    pub kty: &'a str,
    pub alg: &'a str,
    #[serde(rename = "use")]
    pub r#use: &'a str,
    pub kid: &'a str,
    pub n: &'a str,
    pub e: &'a str,
}
