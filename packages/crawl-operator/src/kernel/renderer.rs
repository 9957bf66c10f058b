//! Child resource templates.
//!
//! The reconcilers only decide which children should exist; the renderer
//! turns a parameter set into the concrete resource bodies.

use anyhow::Result;
use serde_json::{json, Value};
use typed_builder::TypedBuilder;

use crate::config::OperatorParams;
use crate::kernel::BaseResourceRenderer;

/// Parameters for the crawler and progress-store children of one crawl.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct CrawlerParams {
    #[builder(setter(into))]
    pub id: String,
    #[builder(setter(into))]
    pub cid: String,
    #[builder(setter(into))]
    pub userid: String,
    #[builder(setter(into))]
    pub storage_name: String,
    #[builder(setter(into))]
    pub store_path: String,
    #[builder(setter(into))]
    pub store_filename: String,
    #[builder(setter(into), default)]
    pub profile_filename: String,
    #[builder(default = 1)]
    pub scale: u32,
    #[builder(default)]
    pub force_restart: Option<String>,
    #[builder(setter(into))]
    pub redis_url: String,
}

#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct ProfileBrowserParams {
    #[builder(setter(into))]
    pub id: String,
    #[builder(setter(into))]
    pub userid: String,
    #[builder(setter(into))]
    pub storage_name: String,
    #[builder(setter(into))]
    pub storage_path: String,
    #[builder(setter(into), default)]
    pub profile_filename: String,
    #[builder(setter(into), default = "about:blank".to_string())]
    pub url: String,
    #[builder(default)]
    pub vnc_password: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderRequest {
    /// Crawler StatefulSet, its ConfigMap and its headless Service
    Crawler(CrawlerParams),
    /// Progress-store StatefulSet and Service
    Redis(CrawlerParams),
    ProfileBrowser(ProfileBrowserParams),
}

pub fn crawler_name(crawl_id: &str) -> String {
    format!("crawl-{}", crawl_id)
}

pub fn redis_name(crawl_id: &str) -> String {
    format!("redis-{}", crawl_id)
}

pub fn browser_name(browser_id: &str) -> String {
    format!("browser-{}", browser_id)
}

/// Renders children from the operator's startup parameters.
pub struct DefaultResourceRenderer {
    params: OperatorParams,
}

impl DefaultResourceRenderer {
    pub fn new(params: OperatorParams) -> Self {
        Self { params }
    }

    fn volume_claim(&self, name: &str, storage: &str) -> Value {
        let mut spec = json!({
            "accessModes": ["ReadWriteOnce"],
            "resources": {"requests": {"storage": storage}},
        });
        if let Some(class) = &self.params.storage_class {
            spec["storageClassName"] = json!(class);
        }
        json!({"metadata": {"name": name}, "spec": spec})
    }

    fn crawler(&self, p: &CrawlerParams) -> Vec<Value> {
        let name = crawler_name(&p.id);
        let labels = json!({"crawl": p.id, "role": "crawler", "btrix.crawlconfig": p.cid});

        let mut annotations = json!({});
        if let Some(force_restart) = &p.force_restart {
            annotations["btrix.forceRestart"] = json!(force_restart);
        }

        let stateful_set = json!({
            "apiVersion": "apps/v1",
            "kind": "StatefulSet",
            "metadata": {"name": name, "namespace": self.params.namespace, "labels": labels},
            "spec": {
                "replicas": p.scale,
                "serviceName": name,
                "podManagementPolicy": "Parallel",
                "selector": {"matchLabels": {"crawl": p.id, "role": "crawler"}},
                "template": {
                    "metadata": {"labels": labels, "annotations": annotations},
                    "spec": {
                        "terminationGracePeriodSeconds": 600,
                        "containers": [{
                            "name": "crawler",
                            "image": self.params.crawler_image,
                            "imagePullPolicy": self.params.crawler_pull_policy,
                            "envFrom": [{"configMapRef": {"name": name}}],
                            "volumeMounts": [{"name": "crawl-data", "mountPath": "/crawls"}],
                            "resources": {
                                "limits": {"memory": self.params.crawler_memory},
                                "requests": {
                                    "cpu": self.params.crawler_cpu,
                                    "memory": self.params.crawler_memory,
                                },
                            },
                        }],
                    },
                },
                "volumeClaimTemplates": [
                    self.volume_claim("crawl-data", &self.params.crawler_storage)
                ],
            },
        });

        let config_map = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": name, "namespace": self.params.namespace, "labels": labels},
            "data": {
                "CRAWL_ID": p.id,
                "CRAWL_CONFIG_ID": p.cid,
                "USER_ID": p.userid,
                "STORAGE_NAME": p.storage_name,
                "STORE_PATH": p.store_path,
                "STORE_FILENAME": p.store_filename,
                "PROFILE_FILENAME": p.profile_filename,
                "REDIS_URL": p.redis_url,
            },
        });

        let service = json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": name, "namespace": self.params.namespace, "labels": labels},
            "spec": {
                "clusterIP": "None",
                "selector": {"crawl": p.id, "role": "crawler"},
                "ports": [{"name": "screencast", "port": 9037}],
            },
        });

        vec![stateful_set, config_map, service]
    }

    fn redis(&self, p: &CrawlerParams) -> Vec<Value> {
        let name = redis_name(&p.id);
        let labels = json!({"crawl": p.id, "role": "redis"});

        let stateful_set = json!({
            "apiVersion": "apps/v1",
            "kind": "StatefulSet",
            "metadata": {"name": name, "namespace": self.params.namespace, "labels": labels},
            "spec": {
                "replicas": 1,
                "serviceName": name,
                "selector": {"matchLabels": labels},
                "template": {
                    "metadata": {"labels": labels},
                    "spec": {
                        "containers": [{
                            "name": "redis",
                            "image": self.params.redis_image,
                            "args": ["redis-server", "--appendonly", "yes"],
                            "volumeMounts": [{"name": "redis-data", "mountPath": "/data"}],
                            "ports": [{"containerPort": 6379}],
                        }],
                    },
                },
                "volumeClaimTemplates": [
                    self.volume_claim("redis-data", &self.params.redis_storage)
                ],
            },
        });

        let service = json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": name, "namespace": self.params.namespace, "labels": labels},
            "spec": {
                "clusterIP": "None",
                "selector": labels,
                "ports": [{"name": "redis", "port": 6379}],
            },
        });

        vec![stateful_set, service]
    }

    fn profile_browser(&self, p: &ProfileBrowserParams) -> Vec<Value> {
        let name = browser_name(&p.id);
        let labels = json!({"browser": p.id, "role": "browser"});

        let pod = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": self.params.namespace, "labels": labels},
            "spec": {
                "containers": [{
                    "name": "browser",
                    "image": self.params.profile_browser_image,
                    "args": ["create-login-profile", "--interactive", "--url", p.url],
                    "env": [
                        {"name": "USER_ID", "value": p.userid},
                        {"name": "STORAGE_NAME", "value": p.storage_name},
                        {"name": "STORE_PATH", "value": p.storage_path},
                        {"name": "PROFILE_FILENAME", "value": p.profile_filename},
                        {"name": "VNC_PASS", "value": p.vnc_password.clone().unwrap_or_default()},
                    ],
                }],
            },
        });

        let service = json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": name, "namespace": self.params.namespace, "labels": labels},
            "spec": {
                "selector": labels,
                "ports": [{"name": "vnc", "port": 6080}, {"name": "browser", "port": 9223}],
            },
        });

        vec![pod, service]
    }
}

impl BaseResourceRenderer for DefaultResourceRenderer {
    fn render(&self, request: &RenderRequest) -> Result<Vec<Value>> {
        Ok(match request {
            RenderRequest::Crawler(params) => self.crawler(params),
            RenderRequest::Redis(params) => self.redis(params),
            RenderRequest::ProfileBrowser(params) => self.profile_browser(params),
        })
    }
}
