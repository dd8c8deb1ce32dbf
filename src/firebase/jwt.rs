//! RS256 JSON Web Tokens: signing service-account assertions and verifying
//! provider-issued session cookies.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::{
    errors::Error as RsaError,
    pkcs1::DecodeRsaPrivateKey,
    pkcs1v15::{Signature, SigningKey, VerifyingKey},
    pkcs8::DecodePrivateKey,
    signature::{SignatureEncoding, Signer, Verifier},
    RsaPrivateKey,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use super::jwks::Jwks;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("missing key id")]
    MissingKid,
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("failed to parse RSA key")]
    KeyParse,
    #[error("rsa error")]
    Rsa(#[from] RsaError),
    #[error("invalid signature")]
    InvalidSignature,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JwtHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, JwtError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: DeserializeOwned>(s: &str) -> Result<T, JwtError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| JwtError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Service-account keys are PKCS#8 PEM; PKCS#1 is accepted too.
fn decode_private_key(pem: &str) -> Result<RsaPrivateKey, JwtError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|_| JwtError::KeyParse)
}

/// Sign `claims` with RS256.
///
/// # Errors
/// Returns an error if the private key cannot be parsed or the claims cannot be encoded.
pub fn sign_rs256<C: Serialize>(
    private_key_pem: &str,
    kid: Option<&str>,
    claims: &C,
) -> Result<String, JwtError> {
    let header = JwtHeader {
        alg: "RS256".to_string(),
        typ: Some("JWT".to_string()),
        kid: kid.map(str::to_string),
    };
    let signing_input = format!("{}.{}", b64e_json(&header)?, b64e_json(claims)?);

    let signing_key = SigningKey::<Sha256>::new(decode_private_key(private_key_pem)?);
    let signature: Signature = signing_key.sign(signing_input.as_bytes());
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature.to_vec());

    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Read the header without checking anything, to pick the verification key.
///
/// # Errors
/// Returns an error if the token is not three dot-separated base64url parts.
pub fn peek_header(token: &str) -> Result<JwtHeader, JwtError> {
    let (header_b64, _, _) = split(token)?;
    b64d_json(header_b64)
}

/// Check the RS256 signature of `token` against `jwks` and decode its claims.
///
/// Claim validation (issuer, audience, expiry) is left to the caller.
///
/// # Errors
/// Returns an error if the token is malformed, the `kid` is missing or unknown,
/// or the signature does not verify.
pub fn verify_rs256<C: DeserializeOwned>(token: &str, jwks: &Jwks) -> Result<C, JwtError> {
    let (header_b64, claims_b64, sig_b64) = split(token)?;

    let header: JwtHeader = b64d_json(header_b64)?;
    if header.alg != "RS256" {
        return Err(JwtError::UnsupportedAlg(header.alg));
    }
    let kid = header.kid.ok_or(JwtError::MissingKid)?;
    let jwk = jwks
        .find_by_kid(&kid)
        .ok_or_else(|| JwtError::UnknownKid(kid.clone()))?;

    let verifying_key = VerifyingKey::<Sha256>::new(jwk.to_rsa_public_key()?);
    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature_bytes = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| JwtError::Base64)?;
    let signature =
        Signature::try_from(signature_bytes.as_slice()).map_err(|_| JwtError::InvalidSignature)?;
    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| JwtError::InvalidSignature)?;

    b64d_json(claims_b64)
}

fn split(token: &str) -> Result<(&str, &str, &str), JwtError> {
    let mut parts = token.split('.');
    let header = parts.next().ok_or(JwtError::TokenFormat)?;
    let claims = parts.next().ok_or(JwtError::TokenFormat)?;
    let signature = parts.next().ok_or(JwtError::TokenFormat)?;
    if parts.next().is_some() || header.is_empty() || claims.is_empty() {
        return Err(JwtError::TokenFormat);
    }
    Ok((header, claims, signature))
}
