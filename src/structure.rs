//! Structural encodings sent when an upload session is opened.
//!
//! The server needs to know the shape of the document (title, page count,
//! file names, checksums) before the first page arrives. Two encodings are
//! supported:
//!
//! * **METS**: a minimal METS XML file with one `IMG` and one `PAGEXML`
//!   file group and a physical struct map, one `div` per page.
//! * **JSON**: a flat [`DocumentUploadDescriptor`].
//!
//! `NoStructure` is declared for API completeness; selecting it is an error.

use crate::document::{Document, DocumentMetadata, Page};
use crate::error::UploadError;
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

/// Which structural encoding to send with the session-open request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UploadType {
    /// METS XML (default).
    #[default]
    Mets,
    /// JSON upload descriptor.
    Json,
    /// No structure at all. Not implemented.
    NoStructure,
}

impl fmt::Display for UploadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadType::Mets => "METS",
            UploadType::Json => "JSON",
            UploadType::NoStructure => "NoStructure",
        };
        f.write_str(s)
    }
}

/// One page entry of the JSON descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageUploadDescriptor {
    pub page_nr: u32,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_xml_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img_checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_xml_checksum: Option<String>,
}

/// The JSON structural encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploadDescriptor {
    pub md: DocumentMetadata,
    pub page_list: Vec<PageUploadDescriptor>,
}

/// A built structural encoding, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureDescriptor {
    Mets(String),
    Json(DocumentUploadDescriptor),
}

impl StructureDescriptor {
    pub fn upload_type(&self) -> UploadType {
        match self {
            StructureDescriptor::Mets(_) => UploadType::Mets,
            StructureDescriptor::Json(_) => UploadType::Json,
        }
    }
}

/// Build the structural encoding of `doc` for the requested upload type.
pub fn build_structure(doc: &Document, upload_type: UploadType) -> Result<StructureDescriptor, UploadError> {
    match upload_type {
        UploadType::Mets => build_mets(doc).map(StructureDescriptor::Mets),
        UploadType::Json => Ok(StructureDescriptor::Json(build_descriptor(doc))),
        UploadType::NoStructure => Err(UploadError::UnsupportedUploadType { upload_type }),
    }
}

/// Build the JSON upload descriptor.
pub fn build_descriptor(doc: &Document) -> DocumentUploadDescriptor {
    DocumentUploadDescriptor {
        md: doc.metadata.clone(),
        page_list: doc.pages().iter().map(page_descriptor).collect(),
    }
}

fn page_descriptor(page: &Page) -> PageUploadDescriptor {
    let transcript = page.current_transcript();
    PageUploadDescriptor {
        page_nr: page.page_nr,
        file_name: image_file_name(page),
        page_xml_name: transcript.and_then(|t| t.resource.file_name()),
        img_checksum: page.checksum.clone(),
        page_xml_checksum: transcript.and_then(|t| t.checksum.clone()),
    }
}

/// File name the server will know the page image by.
pub fn image_file_name(page: &Page) -> String {
    page.image
        .file_name()
        .unwrap_or_else(|| format!("page_{:04}", page.page_nr))
}

// ── METS ─────────────────────────────────────────────────────────────────

const METS_NS: &str = "http://www.loc.gov/METS/";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// Serialise a minimal METS document.
pub fn build_mets(doc: &Document) -> Result<String, UploadError> {
    let bytes = write_mets(doc).map_err(|e| UploadError::StructureEncoding(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| UploadError::StructureEncoding(e.to_string()))
}

fn write_mets(doc: &Document) -> Result<Vec<u8>, quick_xml::Error> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

    let mut root = BytesStart::new("mets:mets");
    root.push_attribute(("xmlns:mets", METS_NS));
    root.push_attribute(("xmlns:xlink", XLINK_NS));
    root.push_attribute(("TYPE", "TRP_DOC"));
    writer.write_event(Event::Start(root))?;

    // Descriptive metadata
    let mut dmd = BytesStart::new("mets:dmdSec");
    dmd.push_attribute(("ID", "MD_ORIG"));
    writer.write_event(Event::Start(dmd))?;
    writer.write_event(Event::Start(BytesStart::new("mets:mdWrap")))?;
    writer.write_event(Event::Start(BytesStart::new("mets:xmlData")))?;
    write_simple_element(&mut writer, "title", &doc.metadata.title)?;
    if let Some(ref author) = doc.metadata.author {
        write_simple_element(&mut writer, "author", author)?;
    }
    if let Some(ref desc) = doc.metadata.description {
        write_simple_element(&mut writer, "desc", desc)?;
    }
    if let Some(ref lang) = doc.metadata.language {
        write_simple_element(&mut writer, "language", lang)?;
    }
    writer.write_event(Event::End(BytesEnd::new("mets:xmlData")))?;
    writer.write_event(Event::End(BytesEnd::new("mets:mdWrap")))?;
    writer.write_event(Event::End(BytesEnd::new("mets:dmdSec")))?;

    // Files
    writer.write_event(Event::Start(BytesStart::new("mets:fileSec")))?;
    write_file_group(&mut writer, "IMG", doc, |p| {
        Some((image_file_name(p), p.checksum.clone()))
    })?;
    write_file_group(&mut writer, "PAGEXML", doc, |p| {
        p.current_transcript()
            .and_then(|t| t.resource.file_name().map(|n| (n, t.checksum.clone())))
    })?;
    writer.write_event(Event::End(BytesEnd::new("mets:fileSec")))?;

    // Physical structure
    let mut struct_map = BytesStart::new("mets:structMap");
    struct_map.push_attribute(("TYPE", "PHYSICAL"));
    writer.write_event(Event::Start(struct_map))?;
    let mut seq = BytesStart::new("mets:div");
    seq.push_attribute(("TYPE", "physSequence"));
    writer.write_event(Event::Start(seq))?;
    for page in doc.pages() {
        let order = page.page_nr.to_string();
        let id = format!("PHYS_{:04}", page.page_nr);
        let mut div = BytesStart::new("mets:div");
        div.push_attribute(("ID", id.as_str()));
        div.push_attribute(("ORDER", order.as_str()));
        div.push_attribute(("TYPE", "SINGLE_PAGE"));
        writer.write_event(Event::Start(div))?;
        write_fptr(&mut writer, &format!("IMG_{:04}", page.page_nr))?;
        if page
            .current_transcript()
            .and_then(|t| t.resource.file_name())
            .is_some()
        {
            write_fptr(&mut writer, &format!("PAGEXML_{:04}", page.page_nr))?;
        }
        writer.write_event(Event::End(BytesEnd::new("mets:div")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("mets:div")))?;
    writer.write_event(Event::End(BytesEnd::new("mets:structMap")))?;

    writer.write_event(Event::End(BytesEnd::new("mets:mets")))?;

    Ok(writer.into_inner().into_inner())
}

fn write_file_group<W, F>(
    writer: &mut Writer<W>,
    group: &str,
    doc: &Document,
    file_of: F,
) -> Result<(), quick_xml::Error>
where
    W: std::io::Write,
    F: Fn(&Page) -> Option<(String, Option<String>)>,
{
    let mut grp = BytesStart::new("mets:fileGrp");
    grp.push_attribute(("ID", group));
    writer.write_event(Event::Start(grp))?;

    for page in doc.pages() {
        let Some((name, checksum)) = file_of(page) else {
            continue;
        };
        let id = format!("{}_{:04}", group, page.page_nr);
        let seq = page.page_nr.to_string();
        let mut file = BytesStart::new("mets:file");
        file.push_attribute(("ID", id.as_str()));
        file.push_attribute(("SEQ", seq.as_str()));
        file.push_attribute(("MIMETYPE", mime_type_for(&name)));
        if let Some(ref sum) = checksum {
            file.push_attribute(("CHECKSUM", sum.as_str()));
            file.push_attribute(("CHECKSUMTYPE", "MD5"));
        }
        writer.write_event(Event::Start(file))?;

        let mut locat = BytesStart::new("mets:FLocat");
        locat.push_attribute(("LOCTYPE", "OTHER"));
        locat.push_attribute(("OTHERLOCTYPE", "FILE"));
        locat.push_attribute(("xlink:type", "simple"));
        locat.push_attribute(("xlink:href", name.as_str()));
        writer.write_event(Event::Empty(locat))?;

        writer.write_event(Event::End(BytesEnd::new("mets:file")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("mets:fileGrp")))?;
    Ok(())
}

fn write_fptr<W: std::io::Write>(writer: &mut Writer<W>, file_id: &str) -> Result<(), quick_xml::Error> {
    let mut fptr = BytesStart::new("mets:fptr");
    fptr.push_attribute(("FILEID", file_id));
    writer.write_event(Event::Empty(fptr))?;
    Ok(())
}

fn write_simple_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// MIME type guessed from a file extension.
pub fn mime_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "tif" | "tiff" => "image/tiff",
        "jp2" => "image/jp2",
        "gif" => "image/gif",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
