//! Recursive folder expansion.
//!
//! Turns a set of selected target ids (files and/or folders) into a flat
//! list of file references. Folders are listed one remote call at a time and
//! expanded depth-first in place, so the output follows the store's
//! newest-first listing order with subfolder contents spliced where the
//! subfolder appeared. Folders are never returned as leaves.
//!
//! The remote hierarchy is acyclic by contract, but the recursion depth is
//! capped anyway so an unexpected cycle fails with
//! [`PipelineError::TraversalLimit`] instead of hanging.

use std::collections::HashSet;

use futures::future::BoxFuture;

use crate::error::PipelineError;
use crate::models::{DocumentReference, MimeType};
use crate::store::FileStore;

/// Default recursion depth cap.
pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Which document types the expansion admits. Folders are always excluded
/// from the results regardless of the filter.
#[derive(Debug, Clone)]
pub struct MimeFilter {
    allowed: Option<Vec<MimeType>>,
}

impl MimeFilter {
    /// Admit every non-folder type. Unsupported documents then surface at
    /// extraction, where the failure policy decides their fate.
    pub fn any() -> Self {
        Self { allowed: None }
    }

    /// Admit only the given types.
    pub fn only(types: Vec<MimeType>) -> Self {
        Self {
            allowed: Some(types),
        }
    }

    /// Admit the four extractable document types.
    pub fn supported_documents() -> Self {
        Self::only(vec![
            MimeType::Pdf,
            MimeType::Docx,
            MimeType::Text,
            MimeType::Pptx,
        ])
    }

    pub fn allows(&self, mime_type: &MimeType) -> bool {
        if *mime_type == MimeType::Folder {
            return false;
        }
        match &self.allowed {
            None => true,
            Some(types) => types.contains(mime_type),
        }
    }
}

/// Expand `target_ids` into the flat list of files they denote.
///
/// File targets passing the filter are included directly; folder targets are
/// listed and recursed into. Results are deduplicated by id (first
/// occurrence wins) so a file reachable through two targets appears once.
pub async fn expand(
    store: &dyn FileStore,
    target_ids: &[String],
    filter: &MimeFilter,
    max_depth: usize,
) -> Result<Vec<DocumentReference>, PipelineError> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for id in target_ids {
        let reference = store.metadata(id).await?;
        if reference.is_folder {
            walk_folder(store, reference.id.clone(), filter, 1, max_depth, &mut seen, &mut out)
                .await?;
        } else if filter.allows(&reference.mime_type) && seen.insert(reference.id.clone()) {
            out.push(reference);
        }
    }

    Ok(out)
}

/// Depth-first descent into one folder. Boxed because async fns cannot
/// recurse directly.
fn walk_folder<'a>(
    store: &'a dyn FileStore,
    folder_id: String,
    filter: &'a MimeFilter,
    depth: usize,
    max_depth: usize,
    seen: &'a mut HashSet<String>,
    out: &'a mut Vec<DocumentReference>,
) -> BoxFuture<'a, Result<(), PipelineError>> {
    Box::pin(async move {
        if depth > max_depth {
            return Err(PipelineError::TraversalLimit(max_depth));
        }

        let children = store.list_children(&folder_id).await?;
        for child in children {
            if child.is_folder {
                walk_folder(store, child.id, filter, depth + 1, max_depth, seen, out).await?;
            } else if filter.allows(&child.mime_type) && seen.insert(child.id.clone()) {
                out.push(child);
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;

    /// Fixture store backed by maps; listing order is insertion order.
    struct StubStore {
        items: HashMap<String, DocumentReference>,
        children: HashMap<String, Vec<String>>,
    }

    impl StubStore {
        fn new() -> Self {
            Self {
                items: HashMap::new(),
                children: HashMap::new(),
            }
        }

        fn file(&mut self, id: &str, mime_type: MimeType, parent: Option<&str>) {
            self.add(id, mime_type, false, parent);
        }

        fn folder(&mut self, id: &str, parent: Option<&str>) {
            self.add(id, MimeType::Folder, true, parent);
        }

        fn add(&mut self, id: &str, mime_type: MimeType, is_folder: bool, parent: Option<&str>) {
            self.items.insert(
                id.to_string(),
                DocumentReference {
                    id: id.to_string(),
                    name: format!("{}.item", id),
                    mime_type,
                    modified_time: Utc::now(),
                    is_folder,
                    parent_id: parent.map(|p| p.to_string()),
                },
            );
            if let Some(parent) = parent {
                self.children
                    .entry(parent.to_string())
                    .or_default()
                    .push(id.to_string());
            }
        }
    }

    #[async_trait]
    impl FileStore for StubStore {
        async fn metadata(&self, id: &str) -> Result<DocumentReference, PipelineError> {
            self.items
                .get(id)
                .cloned()
                .ok_or_else(|| PipelineError::RemoteCall(format!("not found: {}", id)))
        }

        async fn list_children_matching(
            &self,
            folder_id: &str,
            _name_query: Option<&str>,
        ) -> Result<Vec<DocumentReference>, PipelineError> {
            let ids = self.children.get(folder_id).cloned().unwrap_or_default();
            Ok(ids
                .iter()
                .map(|id| self.items.get(id).cloned().unwrap())
                .collect())
        }

        async fn download(&self, _file_id: &str) -> Result<Vec<u8>, PipelineError> {
            Ok(Vec::new())
        }
    }

    fn ids(refs: &[DocumentReference]) -> Vec<&str> {
        refs.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn file_targets_pass_through_unchanged() {
        let mut store = StubStore::new();
        store.file("a", MimeType::Pdf, None);
        store.file("b", MimeType::Text, None);

        let files = expand(
            &store,
            &["a".to_string(), "b".to_string()],
            &MimeFilter::supported_documents(),
            DEFAULT_MAX_DEPTH,
        )
        .await
        .unwrap();
        assert_eq!(ids(&files), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn filtered_out_file_targets_are_excluded() {
        let mut store = StubStore::new();
        store.file("a", MimeType::Pdf, None);
        store.file("b", MimeType::Other("image/png".into()), None);

        let files = expand(
            &store,
            &["a".to_string(), "b".to_string()],
            &MimeFilter::supported_documents(),
            DEFAULT_MAX_DEPTH,
        )
        .await
        .unwrap();
        assert_eq!(ids(&files), vec!["a"]);
    }

    #[tokio::test]
    async fn permissive_filter_admits_unknown_types_but_not_folders() {
        let filter = MimeFilter::any();
        assert!(filter.allows(&MimeType::Other("image/png".into())));
        assert!(filter.allows(&MimeType::Pdf));
        assert!(!filter.allows(&MimeType::Folder));
    }

    #[tokio::test]
    async fn folders_expand_recursively_each_file_once() {
        let mut store = StubStore::new();
        store.folder("root", None);
        store.file("f1", MimeType::Pdf, Some("root"));
        store.folder("sub", Some("root"));
        store.file("f2", MimeType::Text, Some("sub"));
        store.folder("subsub", Some("sub"));
        store.file("f3", MimeType::Docx, Some("subsub"));
        store.file("f4", MimeType::Pptx, Some("root"));

        let files = expand(
            &store,
            &["root".to_string()],
            &MimeFilter::supported_documents(),
            DEFAULT_MAX_DEPTH,
        )
        .await
        .unwrap();
        // Pre-order: subfolder contents spliced where the subfolder appears.
        assert_eq!(ids(&files), vec!["f1", "f2", "f3", "f4"]);
    }

    #[tokio::test]
    async fn folders_are_never_leaves() {
        let mut store = StubStore::new();
        store.folder("root", None);
        store.folder("empty", Some("root"));

        let files = expand(
            &store,
            &["root".to_string()],
            &MimeFilter::any(),
            DEFAULT_MAX_DEPTH,
        )
        .await
        .unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn duplicate_reachability_is_deduplicated() {
        let mut store = StubStore::new();
        store.folder("root", None);
        store.file("shared", MimeType::Pdf, Some("root"));

        let files = expand(
            &store,
            &["root".to_string(), "shared".to_string()],
            &MimeFilter::supported_documents(),
            DEFAULT_MAX_DEPTH,
        )
        .await
        .unwrap();
        assert_eq!(ids(&files), vec!["shared"]);
    }

    #[tokio::test]
    async fn cyclic_hierarchy_hits_the_depth_cap() {
        let mut store = StubStore::new();
        store.folder("a", None);
        // A folder that lists itself as its own child.
        store.children.insert("a".to_string(), vec!["a".to_string()]);

        let err = expand(&store, &["a".to_string()], &MimeFilter::any(), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TraversalLimit(5)));
    }

    #[tokio::test]
    async fn unknown_target_is_a_remote_error() {
        let store = StubStore::new();
        let err = expand(
            &store,
            &["ghost".to_string()],
            &MimeFilter::any(),
            DEFAULT_MAX_DEPTH,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::RemoteCall(_)));
    }
}
