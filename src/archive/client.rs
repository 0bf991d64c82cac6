//! HTTP client for the archive REST API.
//!
//! All mutations of a document go through [`ArchiveClient::update_document`]:
//! one PATCH carrying metadata, the full tag set and all custom field values
//! together. Sequential partial updates are deliberately not offered — they
//! open a window where a concurrent writer resurrects stale tag state.

use std::sync::Mutex;

use serde::Serialize;

use super::models::{
    Correspondent, CustomFieldDefinition, Document, DocumentPatch, DocumentType, Paginated,
    StoragePath, Tag,
};
use super::ArchiveError;

/// Abstract archive operations used by the pipeline and the review API.
pub trait ArchiveClient: Send + Sync {
    fn find_documents_by_tag(&self, tag_id: i64) -> Result<Vec<Document>, ArchiveError>;
    fn get_document(&self, id: i64) -> Result<Document, ArchiveError>;
    /// Original file content (not the archived derivative), so stamps and
    /// scan artifacts stay visible to the reasoning service.
    fn download_original(&self, id: i64) -> Result<Vec<u8>, ArchiveError>;
    fn update_document(&self, id: i64, patch: &DocumentPatch) -> Result<Document, ArchiveError>;

    fn list_correspondents(&self) -> Result<Vec<Correspondent>, ArchiveError>;
    fn list_document_types(&self) -> Result<Vec<DocumentType>, ArchiveError>;
    fn list_tags(&self) -> Result<Vec<Tag>, ArchiveError>;
    fn list_storage_paths(&self) -> Result<Vec<StoragePath>, ArchiveError>;
    fn list_custom_fields(&self) -> Result<Vec<CustomFieldDefinition>, ArchiveError>;

    fn create_correspondent(&self, name: &str) -> Result<i64, ArchiveError>;
    fn create_document_type(&self, name: &str) -> Result<i64, ArchiveError>;
    fn create_tag(&self, name: &str) -> Result<i64, ArchiveError>;
    fn create_storage_path(&self, name: &str, path: &str) -> Result<i64, ArchiveError>;
}

// ──────────────────────────────────────────────
// HTTP implementation
// ──────────────────────────────────────────────

pub struct HttpArchiveClient {
    base_url: String,
    token: String,
    client: reqwest::blocking::Client,
}

impl HttpArchiveClient {
    pub fn new(base_url: &str, token: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ArchiveError> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .map_err(|e| self.map_send_error(e))?;
        Self::parse_json(response)
    }

    /// Follow `next` links until the listing is exhausted.
    fn get_all_pages<T: serde::de::DeserializeOwned>(
        &self,
        first_url: String,
    ) -> Result<Vec<T>, ArchiveError> {
        let mut items = Vec::new();
        let mut url = Some(first_url);
        while let Some(current) = url.take() {
            let page: Paginated<T> = self.get_json(&current)?;
            items.extend(page.results);
            url = page.next;
        }
        Ok(items)
    }

    fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ArchiveError> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Token {}", self.token))
            .json(body)
            .send()
            .map_err(|e| self.map_send_error(e))?;
        Self::parse_json(response)
    }

    fn map_send_error(&self, e: reqwest::Error) -> ArchiveError {
        if e.is_connect() {
            ArchiveError::Connection(self.base_url.clone())
        } else {
            ArchiveError::Http(e.to_string())
        }
    }

    fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::blocking::Response,
    ) -> Result<T, ArchiveError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ArchiveError::Api {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .map_err(|e| ArchiveError::ResponseParsing(e.to_string()))
    }

    fn create_named(&self, endpoint: &str, name: &str) -> Result<i64, ArchiveError> {
        #[derive(Serialize)]
        struct Body<'a> {
            name: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct Created {
            id: i64,
        }
        let url = format!("{}/api/{endpoint}/", self.base_url);
        let created: Created = self.post_json(&url, &Body { name })?;
        Ok(created.id)
    }
}

impl ArchiveClient for HttpArchiveClient {
    fn find_documents_by_tag(&self, tag_id: i64) -> Result<Vec<Document>, ArchiveError> {
        let url = format!(
            "{}/api/documents/?tags__id__all={tag_id}&ordering=added",
            self.base_url
        );
        self.get_all_pages(url)
    }

    fn get_document(&self, id: i64) -> Result<Document, ArchiveError> {
        self.get_json(&format!("{}/api/documents/{id}/", self.base_url))
    }

    fn download_original(&self, id: i64) -> Result<Vec<u8>, ArchiveError> {
        let url = format!("{}/api/documents/{id}/download/?original=true", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .map_err(|e| self.map_send_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ArchiveError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response
            .bytes()
            .map_err(|e| ArchiveError::Http(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn update_document(&self, id: i64, patch: &DocumentPatch) -> Result<Document, ArchiveError> {
        let url = format!("{}/api/documents/{id}/", self.base_url);
        let response = self
            .client
            .patch(&url)
            .header("Authorization", format!("Token {}", self.token))
            .json(patch)
            .send()
            .map_err(|e| self.map_send_error(e))?;
        Self::parse_json(response)
    }

    fn list_correspondents(&self) -> Result<Vec<Correspondent>, ArchiveError> {
        self.get_all_pages(format!("{}/api/correspondents/", self.base_url))
    }

    fn list_document_types(&self) -> Result<Vec<DocumentType>, ArchiveError> {
        self.get_all_pages(format!("{}/api/document_types/", self.base_url))
    }

    fn list_tags(&self) -> Result<Vec<Tag>, ArchiveError> {
        self.get_all_pages(format!("{}/api/tags/", self.base_url))
    }

    fn list_storage_paths(&self) -> Result<Vec<StoragePath>, ArchiveError> {
        self.get_all_pages(format!("{}/api/storage_paths/", self.base_url))
    }

    fn list_custom_fields(&self) -> Result<Vec<CustomFieldDefinition>, ArchiveError> {
        self.get_all_pages(format!("{}/api/custom_fields/", self.base_url))
    }

    fn create_correspondent(&self, name: &str) -> Result<i64, ArchiveError> {
        self.create_named("correspondents", name)
    }

    fn create_document_type(&self, name: &str) -> Result<i64, ArchiveError> {
        self.create_named("document_types", name)
    }

    fn create_tag(&self, name: &str) -> Result<i64, ArchiveError> {
        self.create_named("tags", name)
    }

    fn create_storage_path(&self, name: &str, path: &str) -> Result<i64, ArchiveError> {
        #[derive(Serialize)]
        struct Body<'a> {
            name: &'a str,
            path: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct Created {
            id: i64,
        }
        let url = format!("{}/api/storage_paths/", self.base_url);
        let created: Created = self.post_json(&url, &Body { name, path })?;
        Ok(created.id)
    }
}

// ──────────────────────────────────────────────
// Mock for tests
// ──────────────────────────────────────────────

/// In-memory archive for tests: serves configured documents, records
/// every PATCH it receives, and can fail downloads on demand.
#[derive(Default)]
pub struct MockArchiveClient {
    pub documents: Mutex<Vec<Document>>,
    pub originals: Mutex<std::collections::HashMap<i64, Vec<u8>>>,
    pub patches: Mutex<Vec<(i64, DocumentPatch)>>,
    pub fail_updates: Mutex<bool>,
    next_id: Mutex<i64>,
}

impl MockArchiveClient {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1000),
            ..Default::default()
        }
    }

    pub fn with_documents(documents: Vec<Document>) -> Self {
        let mock = Self::new();
        *mock.documents.lock().unwrap() = documents;
        mock
    }

    pub fn set_original(&self, id: i64, bytes: Vec<u8>) {
        self.originals.lock().unwrap().insert(id, bytes);
    }

    pub fn recorded_patches(&self) -> Vec<(i64, DocumentPatch)> {
        self.patches.lock().unwrap().clone()
    }

    fn alloc_id(&self) -> i64 {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        *next
    }
}

impl ArchiveClient for MockArchiveClient {
    fn find_documents_by_tag(&self, tag_id: i64) -> Result<Vec<Document>, ArchiveError> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.tags.contains(&tag_id))
            .cloned()
            .collect())
    }

    fn get_document(&self, id: i64) -> Result<Document, ArchiveError> {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or(ArchiveError::Api {
                status: 404,
                body: format!("document {id} not found"),
            })
    }

    fn download_original(&self, id: i64) -> Result<Vec<u8>, ArchiveError> {
        self.originals
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(ArchiveError::Api {
                status: 404,
                body: format!("no original for document {id}"),
            })
    }

    fn update_document(&self, id: i64, patch: &DocumentPatch) -> Result<Document, ArchiveError> {
        if *self.fail_updates.lock().unwrap() {
            return Err(ArchiveError::Api {
                status: 500,
                body: "update rejected".into(),
            });
        }
        self.patches.lock().unwrap().push((id, patch.clone()));

        let mut documents = self.documents.lock().unwrap();
        let doc = documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(ArchiveError::Api {
                status: 404,
                body: format!("document {id} not found"),
            })?;
        if let Some(title) = &patch.title {
            doc.title = title.clone();
        }
        if let Some(correspondent) = patch.correspondent {
            doc.correspondent = correspondent;
        }
        if let Some(document_type) = patch.document_type {
            doc.document_type = document_type;
        }
        if let Some(storage_path) = patch.storage_path {
            doc.storage_path = storage_path;
        }
        if let Some(tags) = &patch.tags {
            doc.tags = tags.clone();
        }
        if let Some(custom_fields) = &patch.custom_fields {
            doc.custom_fields = custom_fields.clone();
        }
        Ok(doc.clone())
    }

    fn list_correspondents(&self) -> Result<Vec<Correspondent>, ArchiveError> {
        Ok(Vec::new())
    }

    fn list_document_types(&self) -> Result<Vec<DocumentType>, ArchiveError> {
        Ok(Vec::new())
    }

    fn list_tags(&self) -> Result<Vec<Tag>, ArchiveError> {
        Ok(Vec::new())
    }

    fn list_storage_paths(&self) -> Result<Vec<StoragePath>, ArchiveError> {
        Ok(Vec::new())
    }

    fn list_custom_fields(&self) -> Result<Vec<CustomFieldDefinition>, ArchiveError> {
        Ok(Vec::new())
    }

    fn create_correspondent(&self, _name: &str) -> Result<i64, ArchiveError> {
        Ok(self.alloc_id())
    }

    fn create_document_type(&self, _name: &str) -> Result<i64, ArchiveError> {
        Ok(self.alloc_id())
    }

    fn create_tag(&self, _name: &str) -> Result<i64, ArchiveError> {
        Ok(self.alloc_id())
    }

    fn create_storage_path(&self, _name: &str, _path: &str) -> Result<i64, ArchiveError> {
        Ok(self.alloc_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_doc(id: i64, tags: Vec<i64>) -> Document {
        Document {
            id,
            title: format!("Document {id}"),
            correspondent: None,
            document_type: None,
            storage_path: None,
            tags,
            created_date: None,
            custom_fields: vec![],
        }
    }

    #[test]
    fn mock_filters_by_tag() {
        let mock = MockArchiveClient::with_documents(vec![
            make_doc(1, vec![12]),
            make_doc(2, vec![20]),
            make_doc(3, vec![12, 20]),
        ]);
        let found = mock.find_documents_by_tag(12).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, 1);
        assert_eq!(found[1].id, 3);
    }

    #[test]
    fn mock_records_patches_and_applies_them() {
        let mock = MockArchiveClient::with_documents(vec![make_doc(1, vec![12])]);
        let patch = DocumentPatch {
            tags: Some(vec![20]),
            correspondent: Some(Some(5)),
            ..Default::default()
        };
        let updated = mock.update_document(1, &patch).unwrap();
        assert_eq!(updated.tags, vec![20]);
        assert_eq!(updated.correspondent, Some(5));
        assert_eq!(mock.recorded_patches().len(), 1);
    }

    #[test]
    fn mock_update_can_fail() {
        let mock = MockArchiveClient::with_documents(vec![make_doc(1, vec![])]);
        *mock.fail_updates.lock().unwrap() = true;
        let err = mock
            .update_document(1, &DocumentPatch::default())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Api { status: 500, .. }));
        assert!(mock.recorded_patches().is_empty());
    }

    #[test]
    fn unknown_document_is_api_404() {
        let mock = MockArchiveClient::new();
        let err = mock.get_document(99).unwrap_err();
        assert!(matches!(err, ArchiveError::Api { status: 404, .. }));
    }
}
