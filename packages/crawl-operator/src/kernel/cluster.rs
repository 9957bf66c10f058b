//! Minimal Kubernetes API client for the deletes the operator issues itself.
//!
//! Everything else (creating and updating children) is applied by the
//! controller from the sync responses.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use std::path::Path;
use tracing::{debug, info};

use crate::kernel::BaseClusterClient;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

pub struct KubeClusterClient {
    http: reqwest::Client,
    api_url: String,
    namespace: String,
    token: Option<String>,
}

impl KubeClusterClient {
    /// Build a client from the pod's service account, when one is mounted.
    pub fn in_cluster(api_url: &str, namespace: &str) -> Result<Self> {
        let account = Path::new(SERVICE_ACCOUNT_DIR);
        let mut builder = reqwest::Client::builder();

        let ca_path = account.join("ca.crt");
        if ca_path.exists() {
            let pem = std::fs::read(&ca_path).context("Failed to read cluster CA")?;
            let cert = reqwest::Certificate::from_pem(&pem).context("Invalid cluster CA")?;
            builder = builder.add_root_certificate(cert);
        }

        let token = std::fs::read_to_string(account.join("token"))
            .ok()
            .map(|t| t.trim().to_string());

        Ok(Self {
            http: builder.build().context("Failed to build HTTP client")?,
            api_url: api_url.trim_end_matches('/').to_string(),
            namespace: namespace.to_string(),
            token,
        })
    }

    async fn delete(&self, path: &str, query: &[(&str, &str)]) -> Result<()> {
        let url = format!("{}{}", self.api_url, path);
        let mut request = self.http.request(Method::DELETE, &url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("DELETE {} failed", path))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!(path = %path, "already deleted");
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                bail!("DELETE {} returned {}: {}", path, status, body)
            }
        }
    }
}

#[async_trait]
impl BaseClusterClient for KubeClusterClient {
    async fn delete_crawl_job(&self, crawl_id: &str) -> Result<()> {
        info!(crawl_id = %crawl_id, "deleting crawl job");
        let path = format!(
            "/apis/btrix.cloud/v1/namespaces/{}/crawljobs/crawljob-{}",
            self.namespace, crawl_id
        );
        self.delete(
            &path,
            &[("propagationPolicy", "Foreground"), ("gracePeriodSeconds", "0")],
        )
        .await
    }

    async fn delete_pvcs(&self, crawl_id: &str) -> Result<()> {
        info!(crawl_id = %crawl_id, "deleting crawl volume claims");
        let path = format!(
            "/api/v1/namespaces/{}/persistentvolumeclaims",
            self.namespace
        );
        let selector = format!("crawl={}", crawl_id);
        self.delete(&path, &[("labelSelector", selector.as_str())])
            .await
    }

    async fn delete_profile_browser(&self, browser_id: &str) -> Result<()> {
        info!(browser_id = %browser_id, "deleting profile browser");
        let path = format!(
            "/apis/btrix.cloud/v1/namespaces/{}/profilejobs/profilejob-{}",
            self.namespace, browser_id
        );
        self.delete(
            &path,
            &[("propagationPolicy", "Foreground"), ("gracePeriodSeconds", "0")],
        )
        .await
    }
}
