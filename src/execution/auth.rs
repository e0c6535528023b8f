use alloy_primitives::{keccak256, Address, B256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use anyhow::Result;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info, warn};

/// CLOB credential management.
///
/// Two auth levels. L1 signs a one-off wallet attestation (EIP-712) and
/// is only used to bootstrap an API credential triple. L2 signs every
/// authenticated request with HMAC-SHA256 keyed by the derived secret,
/// which keeps the hot path free of wallet signatures.
pub struct AuthManager {
    signer: PrivateKeySigner,
    address: Address,
    chain_id: u64,
    creds: Option<ApiCredentials>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCredentials {
    #[serde(alias = "apiKey")]
    pub api_key: String,
    #[serde(alias = "secret")]
    pub api_secret: String,
    #[serde(alias = "passphrase")]
    pub api_passphrase: String,
}

/// Header name/value pairs for one authenticated request.
pub type HeaderSet = Vec<(&'static str, String)>;

pub fn with_headers(
    mut req: reqwest::RequestBuilder,
    headers: &HeaderSet,
) -> reqwest::RequestBuilder {
    for (name, value) in headers {
        req = req.header(*name, value.as_str());
    }
    req
}

const EIP712_DOMAIN_TYPE: &str = "EIP712Domain(string name,string version,uint256 chainId)";
const CLOB_AUTH_TYPE: &str =
    "ClobAuth(address address,string timestamp,uint256 nonce,string message)";
const DOMAIN_NAME: &str = "ClobAuthDomain";
const DOMAIN_VERSION: &str = "1";
const ATTEST_TEXT: &str = "This message attests that I control the given wallet";
const AUTH_NONCE: u64 = 0;

impl AuthManager {
    /// An empty key yields a random signer: requests will sign but the
    /// venue will reject them, which is the useful failure mode for
    /// dry runs.
    pub fn new(private_key: &str, chain_id: u64, creds: Option<ApiCredentials>) -> Self {
        let signer = if private_key.is_empty() {
            warn!("no private key configured, signing with a random key");
            PrivateKeySigner::random()
        } else {
            let key_hex = private_key.strip_prefix("0x").unwrap_or(private_key);
            key_hex.parse::<PrivateKeySigner>().unwrap_or_else(|_| {
                warn!("private key unparsable, signing with a random key");
                PrivateKeySigner::random()
            })
        };
        let address = signer.address();
        Self {
            signer,
            address,
            chain_id,
            creds,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn is_l2_ready(&self) -> bool {
        self.creds.is_some()
    }

    pub fn credentials(&self) -> Option<ApiCredentials> {
        self.creds.clone()
    }

    /// L1 wallet-attestation headers. Only the credential bootstrap
    /// endpoints accept these.
    pub async fn login_headers(&self) -> Result<HeaderSet> {
        let stamp = Utc::now().timestamp().to_string();
        let signature = self.signer.sign_hash(&self.login_digest(&stamp)).await?;

        let mut raw = signature.as_bytes();
        // Recovery byte arrives as 0/1; the venue checks for legacy 27/28.
        if raw[64] < 27 {
            raw[64] += 27;
        }

        Ok(vec![
            ("POLY_ADDRESS", format!("{:?}", self.address)),
            ("POLY_SIGNATURE", format!("0x{}", hex::encode(raw))),
            ("POLY_TIMESTAMP", stamp),
            ("POLY_NONCE", AUTH_NONCE.to_string()),
        ])
    }

    /// L2 headers for an authenticated REST call. The MAC covers the
    /// timestamp, upper-cased method, route (query string excluded), and
    /// body, in that order.
    pub fn request_headers(&self, method: &str, path: &str, body: &str) -> Result<HeaderSet> {
        let creds = self
            .creds
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("L2 credentials missing, bootstrap them first"))?;

        let stamp = Utc::now().timestamp().to_string();
        let secret = URL_SAFE.decode(&creds.api_secret)?;
        let signature = sign_payload(&secret, &stamp, method, route_of(path), body);

        Ok(vec![
            ("POLY_ADDRESS", format!("{:?}", self.address)),
            ("POLY_API_KEY", creds.api_key.clone()),
            ("POLY_PASSPHRASE", creds.api_passphrase.clone()),
            ("POLY_TIMESTAMP", stamp),
            ("POLY_SIGNATURE", signature),
        ])
    }

    /// Obtain the credential triple from the venue. A fresh wallet gets a
    /// key created; a wallet that already has one derives it back. Both
    /// endpoints want a fresh L1 attestation.
    pub async fn bootstrap_credentials(
        &mut self,
        http: &reqwest::Client,
        clob_host: &str,
    ) -> Result<ApiCredentials> {
        for (method, endpoint) in [
            (Method::POST, "/auth/api-key"),
            (Method::GET, "/auth/derive-api-key"),
        ] {
            let login = self.login_headers().await?;
            let req = with_headers(http.request(method, format!("{clob_host}{endpoint}")), &login);

            let resp = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    debug!("credential endpoint {endpoint} unreachable: {e}");
                    continue;
                }
            };
            if !resp.status().is_success() {
                debug!("credential endpoint {endpoint} returned {}", resp.status());
                continue;
            }

            if let Ok(creds) = resp.json::<ApiCredentials>().await {
                if !creds.api_key.is_empty() {
                    info!("CLOB credentials ready via {endpoint}");
                    self.creds = Some(creds.clone());
                    return Ok(creds);
                }
            }
        }

        anyhow::bail!("could not obtain CLOB API credentials for {}", self.address)
    }

    /// EIP-712 digest of the attestation struct under the CLOB auth
    /// domain. Dynamic fields (strings) enter as keccak of their bytes,
    /// static ones as left-padded 32-byte words.
    fn login_digest(&self, timestamp: &str) -> B256 {
        let domain = hash_words(&[
            keccak256(EIP712_DOMAIN_TYPE).0,
            keccak256(DOMAIN_NAME).0,
            keccak256(DOMAIN_VERSION).0,
            pad32(&self.chain_id.to_be_bytes()),
        ]);

        let attestation = hash_words(&[
            keccak256(CLOB_AUTH_TYPE).0,
            pad32(self.address.as_slice()),
            keccak256(timestamp.as_bytes()).0,
            pad32(&AUTH_NONCE.to_be_bytes()),
            keccak256(ATTEST_TEXT).0,
        ]);

        let mut preimage = vec![0x19, 0x01];
        preimage.extend_from_slice(domain.as_slice());
        preimage.extend_from_slice(attestation.as_slice());
        keccak256(&preimage)
    }
}

/// Streaming HMAC-SHA256 over the request parts, URL-safe base64 output.
fn sign_payload(secret: &[u8], stamp: &str, method: &str, route: &str, body: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(stamp.as_bytes());
    mac.update(method.to_uppercase().as_bytes());
    mac.update(route.as_bytes());
    mac.update(body.as_bytes());
    URL_SAFE.encode(mac.finalize().into_bytes())
}

fn route_of(path: &str) -> &str {
    path.split('?').next().unwrap_or(path)
}

/// Left-pad into one ABI word.
fn pad32(tail: &[u8]) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[32 - tail.len()..].copy_from_slice(tail);
    word
}

fn hash_words(words: &[[u8; 32]]) -> B256 {
    let mut encoded = Vec::with_capacity(words.len() * 32);
    for word in words {
        encoded.extend_from_slice(word);
    }
    keccak256(&encoded)
}
