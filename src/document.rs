//! Signed-document loader.
//!
//! [`PdfDocument`] reads a whole PDF into memory and indexes it the way incremental
//! updates define it: every `N G obj` definition in the file is scanned in order and
//! the one written last wins, object streams included. Cross-reference tables are not
//! trusted for lookup because signing tools append updates whose tables are often
//! inconsistent; a full scan gives the same answer for well-formed files and a usable
//! one for the rest.
//!
//! On top of the object index the loader records where each incremental update ends
//! (`%%EOF` markers) and discovers signature fields in the AcroForm tree.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::{find_subslice, parse_indirect_object, parse_trailer, to_parse_error};
use crate::parser_config::ParserOptions;
use bytes::Bytes;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::bytes::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;

lazy_static! {
    static ref RE_OBJ_HEADER: Regex =
        Regex::new(r"(?-u)[0-9]{1,10}[\x00\t\n\x0C\r ]+[0-9]{1,5}[\x00\t\n\x0C\r ]+obj").unwrap();
    static ref RE_TRAILER: Regex = Regex::new(r"(?-u)trailer[\x00\t\n\x0C\r ]*<<").unwrap();
    static ref RE_EOF: Regex = Regex::new(r"(?-u)%%EOF").unwrap();
}

#[derive(Debug, Clone)]
struct IndexedObject {
    /// Offset of the definition (of the containing object stream for compressed objects)
    offset: usize,
    generation: u16,
    object: Object,
}

/// A signature field found in the AcroForm tree whose value is a signature dictionary.
#[derive(Debug, Clone)]
pub struct SignatureField {
    /// Fully qualified field name (`parent.child`)
    pub name: String,
    /// The field's own object, when it is indirect
    pub field: Option<ObjectRef>,
    /// The `/V` signature dictionary
    pub dictionary: Dictionary,
}

/// An in-memory PDF indexed for signature verification.
#[derive(Debug)]
pub struct PdfDocument {
    data: Bytes,
    version: String,
    objects: HashMap<u32, IndexedObject>,
    trailer: Dictionary,
    revision_ends: Vec<usize>,
    options: ParserOptions,
}

impl PdfDocument {
    /// Read and index a PDF file.
    pub fn open(path: impl AsRef<Path>, options: ParserOptions) -> Result<Self> {
        let path = path.as_ref();
        let size = std::fs::metadata(path)?.len();
        if options.max_file_size > 0 && size > options.max_file_size as u64 {
            return Err(Error::InvalidPdf(format!(
                "file size {} bytes exceeds limit {} bytes",
                size, options.max_file_size
            )));
        }
        let data = std::fs::read(path)?;
        log::debug!("Read {} bytes from {}", data.len(), path.display());
        Self::from_bytes(data, options)
    }

    /// Index a PDF held in memory.
    pub fn from_bytes(data: impl Into<Bytes>, options: ParserOptions) -> Result<Self> {
        let data: Bytes = data.into();
        if options.max_file_size > 0 && data.len() > options.max_file_size {
            return Err(Error::InvalidPdf(format!(
                "document size {} bytes exceeds limit {} bytes",
                data.len(),
                options.max_file_size
            )));
        }

        let version = read_header(&data, &options)?;
        let (objects, xref_streams) = scan_objects(&data, &options);
        if objects.is_empty() {
            return Err(Error::InvalidPdf("no indirect objects found".to_string()));
        }
        log::info!("Indexed {} objects (PDF {})", objects.len(), version);

        let revision_ends = find_revision_ends(&data);
        let mut document = Self {
            data,
            version,
            objects,
            trailer: Dictionary::new(),
            revision_ends,
            options,
        };
        document.trailer = document.locate_trailer(xref_streams)?;
        Ok(document)
    }

    /// Raw bytes of the whole file.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// File length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for an empty buffer (never the case for a loaded document).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Version string from the header, e.g. "1.7".
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Number of distinct object numbers defined.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Newest trailer dictionary.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// End offsets of every incremental update, ascending.
    ///
    /// Each end is just past a `%%EOF` marker and its end-of-line.
    pub fn revision_ends(&self) -> &[usize] {
        &self.revision_ends
    }

    /// Latest definition of an object.
    pub fn get(&self, reference: ObjectRef) -> Result<&Object> {
        let entry = self
            .objects
            .get(&reference.id)
            .ok_or(Error::ObjectNotFound(reference.id, reference.gen))?;
        if entry.generation != reference.gen {
            log::debug!(
                "Reference {} resolved to generation {} definition",
                reference,
                entry.generation
            );
        }
        Ok(&entry.object)
    }

    /// Follow indirect references until a direct object is reached.
    pub fn resolve<'a>(&'a self, obj: &'a Object) -> Result<&'a Object> {
        let mut current = obj;
        let mut seen = HashSet::new();
        while let Object::Reference(reference) = current {
            if !seen.insert(reference.id) {
                return Err(Error::CircularReference(*reference));
            }
            if seen.len() as u32 > self.options.max_reference_depth {
                return Err(Error::RecursionLimitExceeded(self.options.max_reference_depth));
            }
            current = self.get(*reference)?;
        }
        Ok(current)
    }

    /// The document catalog (`/Root`).
    pub fn catalog(&self) -> Result<&Dictionary> {
        let root = self
            .trailer
            .get("Root")
            .ok_or_else(|| Error::InvalidPdf("trailer has no /Root".to_string()))?;
        self.resolve(root)?.expect_dict()
    }

    /// Signature fields with a signature value, in AcroForm order.
    ///
    /// A document without an AcroForm simply has no signatures.
    pub fn signature_fields(&self) -> Result<Vec<SignatureField>> {
        let catalog = self.catalog()?;
        let Some(acro_form) = catalog.get("AcroForm") else {
            log::debug!("Catalog has no /AcroForm");
            return Ok(Vec::new());
        };
        let acro_form = self.resolve(acro_form)?.expect_dict()?;
        let Some(fields) = acro_form.get("Fields") else {
            return Ok(Vec::new());
        };
        let fields = self.resolve(fields)?.as_array().ok_or_else(|| Error::InvalidObjectType {
            expected: "Array".to_string(),
            found: "non-array /Fields".to_string(),
        })?;

        let mut found = IndexMap::new();
        let mut visited = HashSet::new();
        for field in fields {
            self.walk_field(field, "", None, 0, &mut visited, &mut found)?;
        }
        Ok(found.into_values().collect())
    }

    fn walk_field<'a>(
        &'a self,
        node: &'a Object,
        parent_name: &str,
        inherited_type: Option<&'a str>,
        depth: usize,
        visited: &mut HashSet<ObjectRef>,
        found: &mut IndexMap<String, SignatureField>,
    ) -> Result<()> {
        if depth > self.options.max_nesting {
            return Err(Error::RecursionLimitExceeded(self.options.max_nesting as u32));
        }
        let field_ref = node.as_reference();
        if let Some(reference) = field_ref {
            if !visited.insert(reference) {
                log::warn!("Field {} appears twice in the form tree", reference);
                return Ok(());
            }
        }

        let dict = match self.resolve(node) {
            Ok(obj) => match obj.as_dict() {
                Some(dict) => dict,
                None => return Ok(()),
            },
            Err(e) => {
                log::warn!("Skipping unresolvable form field: {}", e);
                return Ok(());
            },
        };

        let partial = dict
            .get("T")
            .and_then(|t| self.resolve(t).ok())
            .and_then(|t| t.as_text());
        let name = match partial {
            Some(partial) if parent_name.is_empty() => partial,
            Some(partial) => format!("{}.{}", parent_name, partial),
            None => parent_name.to_string(),
        };
        let field_type = dict.get("FT").and_then(|t| t.as_name()).or(inherited_type);

        if field_type == Some("Sig") && !name.is_empty() && !found.contains_key(&name) {
            if let Some(value) = dict.get("V") {
                match self.resolve(value).map(|v| v.as_dict()) {
                    Ok(Some(sig)) if sig.contains_key("ByteRange") && sig.contains_key("Contents") => {
                        found.insert(
                            name.clone(),
                            SignatureField {
                                name: name.clone(),
                                field: field_ref,
                                dictionary: sig.clone(),
                            },
                        );
                    },
                    Ok(_) => log::debug!("{}: signature value lacks /ByteRange or /Contents", name),
                    Err(e) => log::warn!("{}: cannot resolve signature value: {}", name, e),
                }
            }
        }

        if let Some(kids) = dict
            .get("Kids")
            .and_then(|k| self.resolve(k).ok())
            .and_then(|k| k.as_array())
        {
            for kid in kids {
                self.walk_field(kid, &name, field_type, depth + 1, visited, found)?;
            }
        }
        Ok(())
    }

    /// Pick the newest trailer with a `/Root`, falling back to the newest catalog object.
    fn locate_trailer(&self, xref_streams: Vec<(usize, Dictionary)>) -> Result<Dictionary> {
        let mut candidates: Vec<(usize, Dictionary)> = RE_TRAILER
            .find_iter(&self.data)
            .filter_map(|m| {
                parse_trailer(&self.data[m.start()..])
                    .ok()
                    .map(|(_, dict)| (m.start(), dict))
            })
            .collect();
        candidates.extend(xref_streams);
        candidates.sort_by_key(|(offset, _)| std::cmp::Reverse(*offset));

        if let Some((offset, dict)) = candidates.into_iter().find(|(_, d)| d.contains_key("Root")) {
            log::debug!("Using trailer at offset {}", offset);
            return Ok(dict);
        }

        let catalog = self
            .objects
            .iter()
            .filter(|(_, entry)| {
                entry
                    .object
                    .as_dict()
                    .and_then(|d| d.get("Type"))
                    .and_then(|t| t.as_name())
                    == Some("Catalog")
            })
            .max_by_key(|(_, entry)| entry.offset);
        match catalog {
            Some((&id, entry)) => {
                log::warn!("No trailer with /Root, using catalog object {}", id);
                let mut dict = Dictionary::new();
                dict.insert("Root".to_string(), Object::Reference(ObjectRef::new(id, entry.generation)));
                Ok(dict)
            },
            None => Err(Error::InvalidPdf("no trailer and no document catalog".to_string())),
        }
    }
}

fn read_header(data: &[u8], options: &ParserOptions) -> Result<String> {
    let limit = (options.header_search_window() + 5).min(data.len());
    let Some(start) = find_subslice(&data[..limit], b"%PDF-") else {
        let preview = String::from_utf8_lossy(&data[..data.len().min(8)]).into_owned();
        return Err(Error::InvalidHeader(preview));
    };
    let version: String = data[start + 5..]
        .iter()
        .take(8)
        .take_while(|c| c.is_ascii_digit() || **c == b'.')
        .map(|&c| c as char)
        .collect();
    if start > 0 {
        log::warn!("PDF header found at offset {} instead of 0", start);
    }
    Ok(version)
}

/// Scan every indirect object definition; later definitions replace earlier ones.
///
/// Returns the object index and the dictionaries of cross-reference streams, which
/// carry the trailer entries in PDF 1.5+ files.
fn scan_objects(data: &[u8], options: &ParserOptions) -> (HashMap<u32, IndexedObject>, Vec<(usize, Dictionary)>) {
    let mut objects: HashMap<u32, IndexedObject> = HashMap::new();
    let mut object_streams = Vec::new();
    let mut xref_streams = Vec::new();
    let mut pos = 0;

    while let Some(m) = RE_OBJ_HEADER.find_at(data, pos) {
        if m.start() > 0 && data[m.start() - 1].is_ascii_digit() {
            pos = m.end();
            continue;
        }
        let input = &data[m.start()..];
        match parse_indirect_object(input, options) {
            Ok((rest, (reference, object))) => {
                pos = data.len() - rest.len();
                let kind = object
                    .as_dict()
                    .and_then(|d| d.get("Type"))
                    .and_then(|t| t.as_name())
                    .map(str::to_string);
                match (kind.as_deref(), &object) {
                    (Some("ObjStm"), Object::Stream { .. }) => object_streams.push((m.start(), object.clone())),
                    (Some("XRef"), Object::Stream { dict, .. }) => xref_streams.push((m.start(), dict.clone())),
                    _ => {},
                }
                insert_latest(&mut objects, reference.id, reference.gen, m.start(), object);
            },
            Err(e) => {
                log::debug!("Ignoring unparsable object header: {}", to_parse_error(input, e));
                pos = m.end();
            },
        }
    }

    for (offset, stream) in object_streams {
        match parse_object_stream(&stream, options) {
            Ok(members) => {
                for (id, object) in members {
                    insert_latest(&mut objects, id, 0, offset, object);
                }
            },
            Err(e) => log::warn!("Object stream at offset {} unusable: {}", offset, e),
        }
    }

    (objects, xref_streams)
}

fn insert_latest(objects: &mut HashMap<u32, IndexedObject>, id: u32, generation: u16, offset: usize, object: Object) {
    match objects.get(&id) {
        Some(existing) if existing.offset > offset => {},
        _ => {
            objects.insert(id, IndexedObject {
                offset,
                generation,
                object,
            });
        },
    }
}

fn find_revision_ends(data: &[u8]) -> Vec<usize> {
    RE_EOF
        .find_iter(data)
        .map(|m| {
            let rest = &data[m.end()..];
            if rest.starts_with(b"\r\n") {
                m.end() + 2
            } else if rest.starts_with(b"\n") || rest.starts_with(b"\r") {
                m.end() + 1
            } else {
                m.end()
            }
        })
        .collect()
}
