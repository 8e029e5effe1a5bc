// # Alibaba Cloud DNS Provider
//
// This crate provides the Alibaba Cloud DNS (Alidns) provider for the
// reconciler.
//
// ## Scope
//
// - ✅ One HTTP request per call (listing may page through several)
// - ✅ Mutations return the provider's HTTP status untouched
// - ✅ HTTP timeout configured (30 seconds)
// - ✅ Dry-run mode for safe testing
// - ❌ NO retry or backoff (the next cycle is the retry)
// - ❌ NO caching of listings between calls
// - ❌ NO decision making (owned by `RecordReconciler`)
//
// ## Security Requirements
//
// - The access key secret NEVER appears in logs or `Debug` output
// - Credentials MUST come from configuration, never from code
//
// ## API Reference
//
// - RPC style, `GET https://alidns.aliyuncs.com/?<signed query>`
// - DescribeDomainRecords: `DomainName`, `PageNumber`, `PageSize`
// - AddDomainRecord: `DomainName`, `RR`, `Type`, `Value`
// - UpdateDomainRecord: `RecordId`, `RR`, `Type`, `Value`

pub mod signature;

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use stunddns_core::traits::{Mutation, MutationAction, ProviderClient};
use stunddns_core::{Error, ProviderConfig, ProviderRecord, Result};

/// Public API endpoint
pub const ALIDNS_ENDPOINT: &str = "https://alidns.aliyuncs.com";

/// API version the request parameters follow
const API_VERSION: &str = "2015-01-09";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest page DescribeDomainRecords accepts
const PAGE_SIZE: u64 = 500;

/// Alibaba Cloud DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform listing requests as usual
/// - Log the intended create/update
/// - Report the mutation as accepted (200) without sending it
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the access key secret.
pub struct AlidnsProvider {
    access_key_id: String,

    /// ⚠️ NEVER log this value
    access_key_secret: String,

    /// Base URL requests are sent to
    endpoint: String,

    client: reqwest::Client,

    dry_run: bool,
}

impl std::fmt::Debug for AlidnsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlidnsProvider")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<REDACTED>")
            .field("endpoint", &self.endpoint)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl AlidnsProvider {
    /// Create a provider from validated configuration
    ///
    /// # Errors
    ///
    /// - `Error::Config` if credentials are missing or the endpoint is not HTTP(S)
    /// - `Error::Http` if the HTTP client cannot be built
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        let endpoint = config
            .endpoint
            .as_deref()
            .unwrap_or(ALIDNS_ENDPOINT)
            .trim_end_matches('/')
            .to_string();

        if config.dry_run {
            tracing::warn!("Alidns provider running in DRY-RUN mode - no changes will be made");
        }

        Ok(Self {
            access_key_id: config.access_key_id.clone(),
            access_key_secret: config.access_key_secret.clone(),
            endpoint,
            client,
            dry_run: config.dry_run,
        })
    }

    /// Whether mutations are only logged
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Common parameters plus the action-specific ones
    fn request_params(&self, action: &str, extra: &[(&str, String)]) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("Action".to_string(), action.to_string());
        params.insert("Format".to_string(), "JSON".to_string());
        params.insert("Version".to_string(), API_VERSION.to_string());
        params.insert("AccessKeyId".to_string(), self.access_key_id.clone());
        params.insert("SignatureMethod".to_string(), "HMAC-SHA1".to_string());
        params.insert("SignatureVersion".to_string(), "1.0".to_string());
        params.insert(
            "SignatureNonce".to_string(),
            format!("{:032x}", rand::random::<u128>()),
        );
        params.insert(
            "Timestamp".to_string(),
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        );
        for (k, v) in extra {
            params.insert((*k).to_string(), v.clone());
        }
        params
    }

    /// Sign and send one RPC call
    async fn send(&self, params: &BTreeMap<String, String>) -> Result<reqwest::Response> {
        let query = signature::signed_query(params, &self.access_key_secret)?;
        let url = format!("{}/?{}", self.endpoint, query);

        self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::http(format!("HTTP request failed: {}", e)))
    }

    /// Fetch one page of DescribeDomainRecords
    async fn describe_page(&self, domain: &str, page: u64) -> Result<DescribeDomainRecordsResponse> {
        let params = self.request_params(
            "DescribeDomainRecords",
            &[
                ("DomainName", domain.to_string()),
                ("PageNumber", page.to_string()),
                ("PageSize", PAGE_SIZE.to_string()),
            ],
        );

        let response = self.send(&params).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(match status.as_u16() {
                400 | 401 | 403 => Error::provider(
                    "alidns",
                    format!(
                        "Authentication failed: invalid access key or insufficient permissions. Status: {} - {}",
                        status, body
                    ),
                ),
                429 => Error::provider(
                    "alidns",
                    format!("Rate limit exceeded. Status: {}", status),
                ),
                500..=599 => Error::provider(
                    "alidns",
                    format!("Alidns server error (transient): {} - {}", status, body),
                ),
                _ => Error::provider(
                    "alidns",
                    format!("Record listing failed: {} - {}", status, body),
                ),
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::malformed(format!("Unreadable DescribeDomainRecords body: {}", e)))
    }
}

#[async_trait]
impl ProviderClient for AlidnsProvider {
    /// List every record of `domain`, paging until `TotalCount` is reached
    async fn list_records(&self, domain: &str) -> Result<Vec<ProviderRecord>> {
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            let response = self.describe_page(domain, page).await?;
            let batch = response
                .domain_records
                .and_then(|d| d.record)
                .ok_or_else(|| Error::malformed("response has no DomainRecords.Record collection"))?;

            let fetched = batch.len();
            records.extend(batch.into_iter().map(ProviderRecord::from));

            let total = response.total_count.unwrap_or(records.len() as u64);
            if fetched == 0 || records.len() as u64 >= total {
                break;
            }
            page += 1;
        }

        tracing::debug!("Listed {} records for {}", records.len(), domain);
        Ok(records)
    }

    async fn mutate(&self, mutation: &Mutation) -> Result<u16> {
        let (action, mut extra) = match &mutation.action {
            MutationAction::Create => (
                "AddDomainRecord",
                vec![("DomainName", mutation.domain.clone())],
            ),
            MutationAction::Update { record_id } => {
                ("UpdateDomainRecord", vec![("RecordId", record_id.clone())])
            }
        };
        extra.push(("RR", mutation.rr.clone()));
        extra.push(("Type", mutation.record_type.to_string()));
        extra.push(("Value", mutation.value.clone()));

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send {} for {}.{} -> {}",
                action,
                mutation.rr,
                mutation.domain,
                mutation.value
            );
            return Ok(200);
        }

        let params = self.request_params(action, &extra);
        let response = self.send(&params).await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            tracing::warn!("{} answered {}: {}", action, status, error_text);
        }

        Ok(status.as_u16())
    }

    fn provider_name(&self) -> &'static str {
        "alidns"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeDomainRecordsResponse {
    #[serde(default)]
    total_count: Option<u64>,
    #[serde(default)]
    domain_records: Option<DomainRecords>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DomainRecords {
    #[serde(default)]
    record: Option<Vec<AlidnsRecord>>,
}

#[derive(Debug, Deserialize)]
struct AlidnsRecord {
    #[serde(rename = "RecordId")]
    record_id: String,
    #[serde(rename = "RR")]
    rr: String,
    #[serde(rename = "Type")]
    record_type: String,
    #[serde(rename = "Value")]
    value: String,
}

impl From<AlidnsRecord> for ProviderRecord {
    fn from(r: AlidnsRecord) -> Self {
        ProviderRecord {
            record_id: r.record_id,
            rr: r.rr,
            record_type: r.record_type,
            value: r.value,
        }
    }
}
