//! Page-level PDF assembly on top of `lopdf`.
//!
//! [`PdfAssembler`] builds a fresh document from pages of other documents.
//! Each appended page is deep-cloned together with everything it
//! references, so the result never shares objects with (or depends on) its
//! sources. Attributes a page inherits from its page-tree ancestors
//! (`Resources`, `MediaBox`, `CropBox`, `Rotate`) are materialised on the
//! cloned page, because the source tree is not carried over.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;
use tracing::warn;

const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

const INFO_KEYS: [&[u8]; 7] = [
    b"Title",
    b"Author",
    b"Subject",
    b"Creator",
    b"Producer",
    b"CreationDate",
    b"ModDate",
];

/// Upper bound on page-tree depth when resolving inherited attributes.
const MAX_TREE_DEPTH: usize = 32;

/// Source object id → cloned object id, scoped to one source document.
type CloneMemo = HashMap<ObjectId, ObjectId>;

pub(crate) struct PdfAssembler {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfAssembler {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append `page_id` of `source` as the last page.
    pub fn append_page(&mut self, source: &Document, page_id: ObjectId) -> Result<(), lopdf::Error> {
        let page = source.get_dictionary(page_id)?;
        let mut memo = CloneMemo::new();
        let new_id = self.doc.new_object_id();
        memo.insert(page_id, new_id);

        let mut cloned = self.clone_dictionary(source, page, &mut memo);
        for key in INHERITABLE {
            if cloned.has(key) {
                continue;
            }
            if let Some(value) = inherited(source, page, key) {
                let value = self.clone_object(source, value, &mut memo);
                cloned.set(key.to_vec(), value);
            }
        }
        cloned.set("Parent", Object::Reference(self.pages_id));

        self.doc.objects.insert(new_id, Object::Dictionary(cloned));
        self.kids.push(Object::Reference(new_id));
        Ok(())
    }

    /// Copy the document information entries that exist in `source`.
    pub fn copy_info(&mut self, source: &Document) {
        let info = match source.trailer.get(b"Info") {
            Ok(Object::Reference(id)) => source.get_dictionary(*id).ok(),
            Ok(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        };
        let Some(info) = info else {
            return;
        };

        let mut memo = CloneMemo::new();
        let mut copied = Dictionary::new();
        for key in INFO_KEYS {
            if let Ok(value) = info.get(key) {
                let value = self.clone_object(source, value, &mut memo);
                copied.set(key.to_vec(), value);
            }
        }
        if !copied.is_empty() {
            let info_id = self.doc.add_object(copied);
            self.doc.trailer.set("Info", info_id);
        }
    }

    /// Close the page tree and serialise.
    pub fn finish(mut self) -> Result<Vec<u8>, lopdf::Error> {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes)?;
        Ok(bytes)
    }

    fn clone_reference(&mut self, source: &Document, id: ObjectId, memo: &mut CloneMemo) -> Object {
        if let Some(&cloned) = memo.get(&id) {
            return Object::Reference(cloned);
        }
        let new_id = self.doc.new_object_id();
        memo.insert(id, new_id);

        let cloned = match source.get_object(id) {
            Ok(object) => self.clone_object(source, object, memo),
            Err(err) => {
                warn!(?id, %err, "Unresolvable reference replaced with null");
                Object::Null
            }
        };
        self.doc.objects.insert(new_id, cloned);
        Object::Reference(new_id)
    }

    fn clone_dictionary(&mut self, source: &Document, dict: &Dictionary, memo: &mut CloneMemo) -> Dictionary {
        let mut cloned = Dictionary::new();
        for (key, value) in dict.iter() {
            // Re-linked by `append_page`.
            if key == b"Parent" {
                continue;
            }
            let value = self.clone_object(source, value, memo);
            cloned.set(key.clone(), value);
        }
        cloned
    }

    fn clone_object(&mut self, source: &Document, object: &Object, memo: &mut CloneMemo) -> Object {
        match object {
            Object::Reference(id) => self.clone_reference(source, *id, memo),
            Object::Dictionary(dict) => Object::Dictionary(self.clone_dictionary(source, dict, memo)),
            Object::Array(items) => {
                let mut cloned = Vec::with_capacity(items.len());
                for item in items {
                    cloned.push(self.clone_object(source, item, memo));
                }
                Object::Array(cloned)
            }
            Object::Stream(stream) => {
                let dict = self.clone_dictionary(source, &stream.dict, memo);
                Object::Stream(Stream::new(dict, stream.content.clone()))
            }
            other => other.clone(),
        }
    }
}

/// Nearest ancestor value of an inheritable page attribute.
fn inherited<'a>(source: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut node = page;
    for _ in 0..MAX_TREE_DEPTH {
        let parent_id = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = source.get_dictionary(parent_id).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
    }
    None
}

/// Pages of `doc` in page order, as `(1-based index, object id)`.
pub(crate) fn ordered_pages(doc: &Document) -> Vec<(u32, ObjectId)> {
    // `get_pages` is a BTreeMap keyed by page number.
    doc.get_pages().into_iter().collect()
}
