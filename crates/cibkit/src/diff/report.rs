//! Change reports printed by `crm_diff`.

use crate::error::{Error, Result};

/// One `<change>` entry of a format-2 diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    /// `create`, `modify`, `delete` or `move`
    pub operation: String,
    /// XPath of the element the change applies to
    pub path: String,
    /// Whether the entry carries a `<change-result>`; moves do not
    pub has_result: bool,
}

/// Top-level `<change>` entries of a `<diff>` document that carry an
/// operation.
pub fn parse_changes(xml: &str) -> Result<Vec<ChangeEntry>> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| Error::Xml {
        origin: "crm_diff".to_string(),
        source: e,
    })?;

    let root = doc.root_element();
    if !root.has_tag_name("diff") {
        return Ok(Vec::new());
    }

    Ok(root
        .children()
        .filter(|n| n.has_tag_name("change"))
        .filter_map(|n| {
            let operation = n.attribute("operation")?;
            Some(ChangeEntry {
                operation: operation.to_string(),
                path: n.attribute("path").unwrap_or_default().to_string(),
                has_result: n.children().any(|c| c.has_tag_name("change-result")),
            })
        })
        .collect())
}

/// Changes with a result whose path mentions `resource_id`.
///
/// Entries without a `<change-result>` only reposition an element, which is
/// what an offline delete and recreate does to an unchanged resource.
pub fn touching<'a>(changes: &'a [ChangeEntry], resource_id: &str) -> Vec<&'a ChangeEntry> {
    changes
        .iter()
        .filter(|c| c.has_result && c.path.contains(resource_id))
        .collect()
}
