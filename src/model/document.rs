use crate::model::{generate_id, AttachmentBlob, AttachmentMeta, Id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Project,
    Installation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    New,    // Created locally, never persisted through a save
    Saved,  // Has been persisted at least once
}

/// Per-document metadata bag. Attachment entries are keyed by the same
/// attachment paths as the binary map on [`Document`]; `errors` is the shadow
/// tree maintained by `logic::validate` and mirrors the branching shape of the
/// fields that have been written through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
    pub status: DocumentStatus,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attachments: BTreeMap<String, AttachmentMeta>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub errors: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_title: Option<String>,
    /// Free-form metadata fields edited field-by-field through the path
    /// engine (installer notes, workflow state, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    fn new(name: String) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_modified_at: now,
            status: DocumentStatus::New,
            name,
            attachments: BTreeMap::new(),
            errors: Value::Null,
            template_name: None,
            template_title: None,
            extra: Map::new(),
        }
    }
}

/// The Base persisted shape. Projects and installations share it; an
/// installation additionally records the workflow template that produced it
/// and is always listed in exactly one project's `children`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Id,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Id>,
    #[serde(default)]
    pub data_: Value,
    pub metadata_: Metadata,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attachments_: BTreeMap<String, AttachmentBlob>,
}

impl Document {
    pub fn new_project(name: impl Into<String>) -> Self {
        Self::new_project_with_id(generate_id(), name)
    }

    pub fn new_project_with_id(id: Id, name: impl Into<String>) -> Self {
        Self {
            id,
            doc_type: DocumentType::Project,
            children: Vec::new(),
            data_: Value::Object(Map::new()),
            metadata_: Metadata::new(name.into()),
            attachments_: BTreeMap::new(),
        }
    }

    pub fn new_installation(
        name: impl Into<String>,
        template_name: impl Into<String>,
        template_title: impl Into<String>,
    ) -> Self {
        Self::new_installation_with_id(generate_id(), name, template_name, template_title)
    }

    pub fn new_installation_with_id(
        id: Id,
        name: impl Into<String>,
        template_name: impl Into<String>,
        template_title: impl Into<String>,
    ) -> Self {
        let mut metadata = Metadata::new(name.into());
        metadata.template_name = Some(template_name.into());
        metadata.template_title = Some(template_title.into());
        Self {
            id,
            doc_type: DocumentType::Installation,
            children: Vec::new(),
            data_: Value::Object(Map::new()),
            metadata_: metadata,
            attachments_: BTreeMap::new(),
        }
    }

    pub fn is_project(&self) -> bool {
        self.doc_type == DocumentType::Project
    }

    /// Refresh the last-modified timestamp.
    pub fn touch(&mut self) {
        self.metadata_.last_modified_at = Utc::now();
    }

    /// Flip the status after a successful persist.
    pub fn mark_saved(&mut self) {
        self.metadata_.status = DocumentStatus::Saved;
    }

    /// Store an attachment under `path`, writing the binary map and the
    /// metadata map together. Every key present in one map must be present in
    /// the other; routing all writes through here keeps that invariant.
    pub fn set_attachment(&mut self, path: impl Into<String>, blob: AttachmentBlob, meta: AttachmentMeta) {
        let path = path.into();
        self.attachments_.insert(path.clone(), blob);
        self.metadata_.attachments.insert(path, meta);
    }

    /// Remove an attachment from both maps. Returns false if `path` was absent.
    pub fn remove_attachment(&mut self, path: &str) -> bool {
        let had_blob = self.attachments_.remove(path).is_some();
        let had_meta = self.metadata_.attachments.remove(path).is_some();
        had_blob || had_meta
    }

    pub fn attachment(&self, path: &str) -> Option<(&AttachmentBlob, &AttachmentMeta)> {
        match (self.attachments_.get(path), self.metadata_.attachments.get(path)) {
            (Some(blob), Some(meta)) => Some((blob, meta)),
            _ => None,
        }
    }

    /// Attachment paths under a given data field prefix, e.g. all keys below
    /// `combustion_safety_tests`.
    pub fn attachment_paths_under<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> {
        let prefix = format!("{}.", field);
        self.attachments_
            .keys()
            .filter(move |k| k.starts_with(&prefix))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project_shape() {
        let project = Document::new_project("12 Oak St");
        assert!(project.is_project());
        assert_eq!(project.metadata_.name, "12 Oak St");
        assert_eq!(project.metadata_.status, DocumentStatus::New);
        assert!(project.children.is_empty());
        assert_eq!(project.data_, serde_json::json!({}));
        assert!(project.metadata_.errors.is_null());
    }

    #[test]
    fn test_new_installation_records_template() {
        let installation =
            Document::new_installation("12 Oak St", "combustion_safety", "Combustion Safety");
        assert!(!installation.is_project());
        assert_eq!(
            installation.metadata_.template_name.as_deref(),
            Some("combustion_safety")
        );
        assert_eq!(
            installation.metadata_.template_title.as_deref(),
            Some("Combustion Safety")
        );
    }

    #[test]
    fn test_attachment_maps_stay_in_lockstep() {
        let mut doc = Document::new_project("p");
        doc.set_attachment(
            "combustion_safety_tests.A1.attachment_0",
            AttachmentBlob::new("image/jpeg", vec![1, 2, 3]),
            AttachmentMeta::new("image/jpeg"),
        );
        assert!(doc.attachment("combustion_safety_tests.A1.attachment_0").is_some());
        assert_eq!(doc.attachments_.len(), doc.metadata_.attachments.len());

        assert!(doc.remove_attachment("combustion_safety_tests.A1.attachment_0"));
        assert!(doc.attachments_.is_empty());
        assert!(doc.metadata_.attachments.is_empty());
        assert!(!doc.remove_attachment("combustion_safety_tests.A1.attachment_0"));
    }

    #[test]
    fn test_attachment_paths_under_filters_by_field() {
        let mut doc = Document::new_project("p");
        doc.set_attachment(
            "combustion_safety_tests.A1.attachment_0",
            AttachmentBlob::new("image/jpeg", vec![1]),
            AttachmentMeta::new("image/jpeg"),
        );
        doc.set_attachment(
            "site_photos.0",
            AttachmentBlob::new("image/png", vec![2]),
            AttachmentMeta::new("image/png"),
        );
        let under: Vec<&str> = doc.attachment_paths_under("combustion_safety_tests").collect();
        assert_eq!(under, vec!["combustion_safety_tests.A1.attachment_0"]);
    }

    #[test]
    fn test_document_json_round_trip() {
        let mut doc = Document::new_installation("n", "combustion_safety", "Combustion Safety");
        doc.metadata_
            .extra
            .insert("installer".to_string(), serde_json::json!("Sam"));
        doc.data_ = serde_json::json!({"a": {"b": [1, 2]}});

        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"type\":\"installation\""));
        let parsed: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, doc);
    }
}
