//! Object storage for distributed artifacts.
//!
//! [`ObjectStore`] is the seam the lifecycle passes upload through. Both
//! operations are idempotent: putting an object twice overwrites it and
//! removing a missing object succeeds.
//!
//! [`S3ObjectStore`] talks to S3 or any S3-compatible service with plain
//! REST calls signed with
//! [AWS Signature Version 4](https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-auth-using-authorization-header.html)
//! (`hmac` + `sha2`). Objects are uploaded with `x-amz-acl: public-read`
//! so the bucket URL can serve them directly.
//!
//! With a custom `endpoint_url` requests are path-style
//! (`<endpoint>/<bucket>/<key>`); otherwise virtual-hosted
//! (`https://<bucket>.s3.<region>.amazonaws.com/<key>`).

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

use crate::config::StorageConfig;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `local` as object `name`.
    async fn put_object(&self, local: &Path, name: &str) -> Result<()>;

    /// Delete object `name`. Missing objects are not an error.
    async fn remove_object(&self, name: &str) -> Result<()>;
}

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
    creds: AwsCredentials,
}

impl S3ObjectStore {
    /// Build a store from config. Keys missing from the config are read
    /// from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.
    pub fn from_config(client: Client, cfg: &StorageConfig) -> Result<Self> {
        let access_key_id = match &cfg.access_key_id {
            Some(k) => k.clone(),
            None => std::env::var("AWS_ACCESS_KEY_ID")
                .context("storage.access_key_id not set and AWS_ACCESS_KEY_ID missing")?,
        };
        let secret_access_key = match &cfg.secret_access_key {
            Some(k) => k.clone(),
            None => std::env::var("AWS_SECRET_ACCESS_KEY")
                .context("storage.secret_access_key not set and AWS_SECRET_ACCESS_KEY missing")?,
        };
        Ok(Self {
            client,
            bucket: cfg.bucket.clone(),
            region: cfg.region.clone(),
            endpoint: cfg.endpoint_url.clone(),
            creds: AwsCredentials {
                access_key_id,
                secret_access_key,
                session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
            },
        })
    }

    /// `(scheme, host, canonical URI)` for an object key.
    fn locate(&self, key: &str) -> (String, String, String) {
        let encoded_key = key.split('/').map(encode_segment).collect::<Vec<_>>().join("/");
        match &self.endpoint {
            Some(endpoint) => {
                let (scheme, rest) = endpoint.split_once("://").unwrap_or(("https", endpoint.as_str()));
                (
                    scheme.to_string(),
                    rest.trim_end_matches('/').to_string(),
                    format!("/{}/{}", self.bucket, encoded_key),
                )
            }
            None => (
                "https".to_string(),
                format!("{}.s3.{}.amazonaws.com", self.bucket, self.region),
                format!("/{}", encoded_key),
            ),
        }
    }

    async fn send_signed(
        &self,
        method: Method,
        key: &str,
        body: Vec<u8>,
        extra_headers: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        let (scheme, host, canonical_uri) = self.locate(key);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = sha256_hex(&body);

        let mut headers: Vec<(String, String)> = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        for (k, v) in extra_headers {
            headers.push((k.to_lowercase(), v.to_string()));
        }
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers = headers.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>().join(";");
        let canonical_headers: String = headers.iter().map(|(k, v)| format!("{}:{}\n", k, v)).collect();
        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method.as_str(),
            canonical_uri,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            sha256_hex(canonical_request.as_bytes())
        );
        let signature = SigningKey::derive(&self.creds.secret_access_key, &date_stamp, &self.region, "s3")?
            .sign(&string_to_sign)?;
        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let url = format!("{}://{}{}", scheme, host, canonical_uri);
        let mut req = self
            .client
            .request(method, &url)
            .header("Authorization", &authorization);
        for (k, v) in &headers {
            if k != "host" {
                req = req.header(k.as_str(), v.as_str());
            }
        }
        req.body(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach s3://{}/{}", self.bucket, key))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, local: &Path, name: &str) -> Result<()> {
        let body = tokio::fs::read(local)
            .await
            .with_context(|| format!("Failed to read {}", local.display()))?;
        let resp = self
            .send_signed(
                Method::PUT,
                name,
                body,
                &[("content-type", "application/javascript"), ("x-amz-acl", "public-read")],
            )
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for key '{}': {}",
                status,
                name,
                body.chars().take(500).collect::<String>()
            );
        }
        debug!(bucket = %self.bucket, key = name, "uploaded object");
        Ok(())
    }

    async fn remove_object(&self, name: &str) -> Result<()> {
        let resp = self.send_signed(Method::DELETE, name, Vec::new(), &[]).await?;
        let status = resp.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            bail!("S3 DeleteObject failed (HTTP {}) for key '{}'", status, name);
        }
        debug!(bucket = %self.bucket, key = name, "removed object");
        Ok(())
    }
}

// ============ SigV4 ============

/// Final key of the SigV4 derivation chain for one date, region and
/// service.
struct SigningKey(Vec<u8>);

impl SigningKey {
    /// `AWS4<secret>` keyed over date, region, service, `aws4_request`.
    fn derive(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Result<Self> {
        let mut key = format!("AWS4{}", secret_key).into_bytes();
        for part in [date_stamp, region, service, "aws4_request"] {
            key = mac(&key, part.as_bytes())?;
        }
        Ok(Self(key))
    }

    fn sign(&self, string_to_sign: &str) -> Result<String> {
        Ok(hex::encode(mac(&self.0, string_to_sign.as_bytes())?))
    }
}

fn mac(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut m = HmacSha256::new_from_slice(key).map_err(|e| anyhow!("HMAC key rejected: {}", e))?;
    m.update(data);
    Ok(m.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Percent-encode one key segment. Unreserved bytes stay as they are.
fn encode_segment(segment: &str) -> String {
    segment
        .bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || b"-_.~".contains(&b) {
                (b as char).to_string()
            } else {
                format!("%{:02X}", b)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(endpoint: Option<&str>) -> S3ObjectStore {
        let cfg = StorageConfig {
            enabled: true,
            endpoint_url: endpoint.map(str::to_string),
            region: "us-east-1".to_string(),
            bucket: "docs".to_string(),
            bucket_url: "https://docs.example.com/".to_string(),
            access_key_id: Some("AKID".to_string()),
            secret_access_key: Some("SECRET".to_string()),
        };
        S3ObjectStore::from_config(Client::new(), &cfg).unwrap()
    }

    #[test]
    fn test_signing_key_matches_aws_example() {
        let key = SigningKey::derive("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY", "20120215", "us-east-1", "iam").unwrap();
        assert_eq!(
            hex::encode(key.0),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(encode_segment("x y+z"), "x%20y%2Bz");
    }

    #[test]
    fn test_virtual_hosted_location() {
        let (scheme, host, uri) = store(None).locate("github.com/u/r-abc.js");
        assert_eq!(scheme, "https");
        assert_eq!(host, "docs.s3.us-east-1.amazonaws.com");
        assert_eq!(uri, "/github.com/u/r-abc.js");
    }

    #[test]
    fn test_path_style_location() {
        let (scheme, host, uri) = store(Some("http://127.0.0.1:9000/")).locate("a b/c.js");
        assert_eq!(scheme, "http");
        assert_eq!(host, "127.0.0.1:9000");
        assert_eq!(uri, "/docs/a%20b/c.js");
    }
}
