// src/export/merger.rs
//! Page-level concatenation of PDF documents.

use lopdf::{Dictionary, Document, Object, ObjectId};
use thiserror::Error;

/// Attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];
const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("not a readable PDF: {0}")]
    Parse(String),
    #[error("document has no pages")]
    NoPages,
    #[error("failed to serialize merged PDF: {0}")]
    Write(String),
}

/// Appends whole documents into a single page tree.
pub struct PdfMerger {
    merged: Document,
    pages_id: ObjectId,
    pages: Vec<ObjectId>,
}

impl Default for PdfMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfMerger {
    pub fn new() -> Self {
        let mut merged = Document::with_version("1.5");
        let pages_id = merged.new_object_id();
        Self {
            merged,
            pages_id,
            pages: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Append every page of `bytes`. On error nothing is added.
    pub fn append(&mut self, bytes: &[u8]) -> Result<usize, MergeError> {
        let mut doc = Document::load_mem(bytes).map_err(|e| MergeError::Parse(e.to_string()))?;
        if doc.get_pages().is_empty() {
            return Err(MergeError::NoPages);
        }

        doc.renumber_objects_with(self.merged.max_id + 1);
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

        let inherited: Vec<(ObjectId, Vec<(&'static [u8], Object)>)> = page_ids
            .iter()
            .map(|id| (*id, inherited_attributes(&doc, *id)))
            .collect();

        let max_id = doc.max_id;
        for (id, object) in doc.objects {
            match type_of(&object) {
                Some(b"Catalog") | Some(b"Pages") => continue,
                _ => {
                    self.merged.objects.insert(id, object);
                }
            }
        }

        for (page_id, attributes) in inherited {
            if let Some(Object::Dictionary(page)) = self.merged.objects.get_mut(&page_id) {
                page.set("Parent", Object::Reference(self.pages_id));
                for (key, value) in attributes {
                    page.set(key.to_vec(), value);
                }
            }
        }

        self.merged.max_id = self.merged.max_id.max(max_id);
        self.pages.extend_from_slice(&page_ids);
        Ok(page_ids.len())
    }

    pub fn finish(mut self) -> Result<Vec<u8>, MergeError> {
        if self.pages.is_empty() {
            return Err(MergeError::NoPages);
        }

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set(
            "Kids",
            Object::Array(self.pages.iter().map(|id| Object::Reference(*id)).collect()),
        );
        pages.set("Count", Object::Integer(self.pages.len() as i64));
        self.merged
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(self.pages_id));
        let catalog_id = self.merged.add_object(Object::Dictionary(catalog));
        self.merged.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        self.merged
            .save_to(&mut buffer)
            .map_err(|e| MergeError::Write(e.to_string()))?;
        Ok(buffer)
    }
}

/// Number of pages in a PDF.
pub fn page_count(bytes: &[u8]) -> Result<usize, MergeError> {
    let doc = Document::load_mem(bytes).map_err(|e| MergeError::Parse(e.to_string()))?;
    Ok(doc.get_pages().len())
}

fn dictionary_of(object: &Object) -> Option<&Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

fn type_of(object: &Object) -> Option<&[u8]> {
    match dictionary_of(object)?.get(b"Type") {
        Ok(Object::Name(name)) => Some(name.as_slice()),
        _ => None,
    }
}

fn parent_of(dict: &Dictionary) -> Option<ObjectId> {
    match dict.get(b"Parent") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    }
}

/// Inheritable attributes missing on the page itself, taken from the nearest ancestor.
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Vec<(&'static [u8], Object)> {
    let mut found: Vec<(&'static [u8], Object)> = Vec::new();
    let Some(page) = doc.objects.get(&page_id).and_then(dictionary_of) else {
        return found;
    };

    let mut parent = parent_of(page);
    let mut depth = 0;
    while let Some(parent_id) = parent {
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        let Some(node) = doc.objects.get(&parent_id).and_then(dictionary_of) else {
            break;
        };

        for key in INHERITABLE {
            let missing = page.get(key).is_err() && !found.iter().any(|(k, _)| *k == key);
            if missing {
                if let Ok(value) = node.get(key) {
                    found.push((key, value.clone()));
                }
            }
        }
        parent = parent_of(node);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures::{blank_pdf, labeled_pdf, page_labels};

    #[test]
    fn test_concatenates_in_order() {
        let mut merger = PdfMerger::new();
        assert_eq!(merger.append(&blank_pdf(2)).unwrap(), 2);
        assert_eq!(merger.append(&blank_pdf(3)).unwrap(), 3);
        assert_eq!(merger.page_count(), 5);

        let merged = merger.finish().unwrap();
        assert_eq!(page_count(&merged).unwrap(), 5);
    }

    #[test]
    fn test_documents_keep_their_page_sequence() {
        let mut merger = PdfMerger::new();
        merger.append(&labeled_pdf("cv", 2)).unwrap();
        merger.append(&labeled_pdf("experience", 1)).unwrap();
        merger.append(&labeled_pdf("course", 2)).unwrap();
        merger.append(&labeled_pdf("recommendation", 1)).unwrap();

        assert_eq!(
            page_labels(&merger.finish().unwrap()),
            vec![
                "cv 1",
                "cv 2",
                "experience 1",
                "course 1",
                "course 2",
                "recommendation 1"
            ]
        );
    }

    #[test]
    fn test_pages_keep_inherited_attributes() {
        let mut merger = PdfMerger::new();
        merger.append(&blank_pdf(1)).unwrap();
        merger.append(&blank_pdf(1)).unwrap();
        let merged = Document::load_mem(&merger.finish().unwrap()).unwrap();

        for page_id in merged.get_pages().into_values() {
            let page = merged.objects.get(&page_id).and_then(dictionary_of).unwrap();
            assert!(page.get(b"MediaBox").is_ok());
            assert!(page.get(b"Resources").is_ok());
        }
    }

    #[test]
    fn test_bad_input_leaves_merger_untouched() {
        let mut merger = PdfMerger::new();
        merger.append(&blank_pdf(1)).unwrap();

        assert!(matches!(
            merger.append(b"%PDF-1.4 garbage"),
            Err(MergeError::Parse(_))
        ));
        assert!(matches!(merger.append(&blank_pdf(0)), Err(MergeError::NoPages)));
        assert_eq!(merger.page_count(), 1);
        assert_eq!(page_count(&merger.finish().unwrap()).unwrap(), 1);
    }

    #[test]
    fn test_empty_merger_cannot_finish() {
        assert!(matches!(PdfMerger::new().finish(), Err(MergeError::NoPages)));
    }
}
