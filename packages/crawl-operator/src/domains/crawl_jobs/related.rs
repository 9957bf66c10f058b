//! Resources the controller must fetch before syncing a crawl job.

use std::collections::BTreeMap;

use crate::common::OperatorError;
use crate::domains::crawl_jobs::models::{
    CrawlJobObject, CustomizeResponse, LabelSelector, RelatedResourceRule,
};

fn rule(api_version: &str, resource: &str, labels: &[(&str, &str)]) -> RelatedResourceRule {
    RelatedResourceRule {
        api_version: api_version.to_string(),
        resource: resource.to_string(),
        label_selector: LabelSelector {
            match_labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        },
    }
}

/// The crawl-config map, the crawl's volume claims and crawler pods, and
/// every crawl job of the same org (for admission ranking).
pub fn related_resources(parent: &CrawlJobObject) -> Result<CustomizeResponse, OperatorError> {
    let spec = &parent.spec;
    if spec.id.is_empty() {
        return Err(OperatorError::MissingField("spec.id"));
    }
    if spec.cid.is_empty() {
        return Err(OperatorError::MissingField("spec.cid"));
    }

    let mut related_resources = vec![
        rule("v1", "configmaps", &[("btrix.crawlconfig", spec.cid.as_str())]),
        rule("v1", "persistentvolumeclaims", &[("crawl", spec.id.as_str())]),
        rule(
            "v1",
            "pods",
            &[("crawl", spec.id.as_str()), ("role", "crawler")],
        ),
    ];

    if !spec.oid.is_empty() {
        related_resources.push(rule(
            "btrix.cloud/v1",
            "crawljobs",
            &[("oid", spec.oid.as_str())],
        ));
    }

    Ok(CustomizeResponse { related_resources })
}
