use crate::migrate::Migration;
use crate::model::{derived_child_id, Document, DocumentType};
use crate::store::{DocumentFilter, DocumentStore};
use log::{debug, warn};
use serde_json::{Map, Value};

pub const COMBUSTION_TESTS_FIELD: &str = "combustion_safety_tests";
const TEMPLATE_NAME: &str = "combustion_safety";
const TEMPLATE_TITLE: &str = "Combustion Safety";

/// Early app versions stored combustion safety tests inline on the project,
/// as an object keyed by appliance id. This migration splits that data out
/// into a child installation holding the tests as an array, and moves each
/// test's photo attachments along with it.
///
/// Write order is load-bearing: the child installation is written before the
/// project is stripped, so a crash between the two writes leaves redundant
/// data rather than lost data. The child id is derived deterministically from
/// the project id, so a re-run after such a crash overwrites the same child
/// instead of minting a duplicate.
pub struct CombustionTestsToInstallations;

#[async_trait::async_trait]
impl Migration for CombustionTestsToInstallations {
    fn name(&self) -> &'static str {
        "combustion-tests-to-installations"
    }

    async fn run(&self, docs: &dyn DocumentStore) -> anyhow::Result<()> {
        let projects = docs
            .all_docs(Some(DocumentFilter::of_type(DocumentType::Project)))
            .await?;

        for versioned in projects {
            let project = versioned.doc;
            let by_appliance = match project.data_.get(COMBUSTION_TESTS_FIELD) {
                Some(Value::Object(map)) => map.clone(),
                Some(other) => {
                    warn!(
                        "project '{}': {} is {} rather than an appliance map, leaving as-is",
                        project.id,
                        COMBUSTION_TESTS_FIELD,
                        if other.is_array() { "already an array" } else { "not an object" }
                    );
                    continue;
                }
                None => continue,
            };

            let child_id = derived_child_id(&project.id, TEMPLATE_NAME);
            debug!(
                "project '{}': moving {} appliance test(s) to installation '{}'",
                project.id,
                by_appliance.len(),
                child_id
            );

            // Appliance keys in sorted order fix each test's array index.
            let mut appliance_keys: Vec<String> = by_appliance.keys().cloned().collect();
            appliance_keys.sort();
            let tests: Vec<Value> = appliance_keys
                .iter()
                .map(|key| by_appliance[key].clone())
                .collect();

            let mut installation = Document::new_installation_with_id(
                child_id.clone(),
                project.metadata_.name.clone(),
                TEMPLATE_NAME,
                TEMPLATE_TITLE,
            );
            let mut data = Map::new();
            data.insert(COMBUSTION_TESTS_FIELD.to_string(), Value::Array(tests));
            installation.data_ = Value::Object(data);

            // Each attachment moves as a unit: binary entry, metadata entry,
            // and the appliance index embedded in its path.
            let mut moved_paths = Vec::new();
            for source_path in project
                .attachment_paths_under(COMBUSTION_TESTS_FIELD)
                .map(str::to_string)
                .collect::<Vec<_>>()
            {
                let Some(target_path) = rekey_attachment_path(&source_path, &appliance_keys) else {
                    warn!(
                        "project '{}': attachment '{}' references no known appliance, leaving on project",
                        project.id, source_path
                    );
                    continue;
                };
                if let Some((blob, meta)) = project.attachment(&source_path) {
                    installation.set_attachment(target_path, blob.clone(), meta.clone());
                    moved_paths.push(source_path);
                }
            }

            // New document first. A crash before the project write below is
            // recoverable: the re-run overwrites this child in place.
            let existing_child_rev = docs.get(&child_id).await?.map(|v| v.rev);
            docs.put(installation, existing_child_rev).await?;

            // Then strip the source project in a single write.
            let mut parent = project;
            if let Some(data) = parent.data_.as_object_mut() {
                data.remove(COMBUSTION_TESTS_FIELD);
            }
            for path in &moved_paths {
                parent.remove_attachment(path);
            }
            if !parent.children.contains(&child_id) {
                parent.children.push(child_id);
            }
            parent.touch();
            docs.put(parent, Some(versioned.rev)).await?;
        }

        Ok(())
    }
}

/// Translate a parent attachment path `combustion_safety_tests.<appliance>.<rest>`
/// into the child's `combustion_safety_tests.<index>.<rest>`, where the index
/// is the appliance's position in the sorted key order used to build the
/// tests array. Returns None for paths outside the field or naming an unknown
/// appliance.
fn rekey_attachment_path(source: &str, appliance_keys: &[String]) -> Option<String> {
    let mut parts = source.splitn(3, '.');
    if parts.next()? != COMBUSTION_TESTS_FIELD {
        return None;
    }
    let appliance = parts.next()?;
    let index = appliance_keys.iter().position(|key| key == appliance)?;
    match parts.next() {
        Some(rest) => Some(format!("{}.{}.{}", COMBUSTION_TESTS_FIELD, index, rest)),
        None => Some(format!("{}.{}", COMBUSTION_TESTS_FIELD, index)),
    }
}
