//! Transition graphs written by `crm_simulate -G`.

use crate::error::{Error, Result};

/// Ids of every `primitive` scheduled anywhere under `<transition_graph>`.
pub fn scheduled_ids(xml: &str) -> Result<Vec<String>> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| Error::Xml {
        origin: "crm_simulate transition graph".to_string(),
        source: e,
    })?;

    let root = doc.root_element();
    if !root.has_tag_name("transition_graph") {
        return Ok(Vec::new());
    }

    Ok(root
        .descendants()
        .filter(|n| n.has_tag_name("primitive"))
        .filter_map(|n| n.attribute("id"))
        .map(str::to_string)
        .collect())
}

/// Scheduled ids that refer to `resource_id`.
///
/// Bundles schedule one instance per replica (`foo-0`, `foo-1`, ...), so
/// composite resources match on prefix; everything else needs an exact match.
pub fn matching_ids(ids: &[String], resource_id: &str, composite: bool) -> Vec<String> {
    ids.iter()
        .filter(|id| {
            if composite {
                id.starts_with(resource_id)
            } else {
                id.as_str() == resource_id
            }
        })
        .cloned()
        .collect()
}
