mod export;
mod flag;
mod header;
mod import;
mod name;
mod reference;
pub mod version;

use std::ops::Range;

use indexmap::IndexSet;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::cursor::ByteCursor;
use crate::error::{Result, UpkError};
use crate::object::ExportObject;

pub use export::*;
pub use flag::*;
pub use header::*;
pub use import::*;
pub use name::*;
pub use reference::*;

/// How the package was stored before it was loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PackageOrigin {
    pub encrypted: bool,
    pub compression: CompressionFlags,
}

/// Byte ranges of the header and the three tables inside the package body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableLayout {
    pub header: Range<usize>,
    pub names: Range<usize>,
    pub imports: Range<usize>,
    pub exports: Range<usize>,
}

impl TableLayout {
    /// Fails if any two non-empty regions overlap.
    pub fn validate(&self) -> Result<()> {
        let mut regions: Vec<(&str, &Range<usize>)> = [
            ("header", &self.header),
            ("name table", &self.names),
            ("import table", &self.imports),
            ("export table", &self.exports),
        ]
        .into_iter()
        .filter(|(_, range)| !range.is_empty())
        .collect();
        regions.sort_by_key(|(_, range)| (range.start, range.end));

        for pair in regions.windows(2) {
            let (first, a) = pair[0];
            let (second, b) = pair[1];
            if a.end > b.start {
                return Err(UpkError::corrupt(format!(
                    "{first} {a:?} overlaps {second} {b:?}"
                )));
            }
        }
        Ok(())
    }
}

/// A parsed package: header, tables and the decrypted, decompressed body they index into.
#[derive(derive_more::Debug)]
pub struct Package {
    header: Header,
    names: Vec<NameEntry>,
    imports: Vec<ImportEntry>,
    exports: Vec<ExportEntry>,
    layout: TableLayout,
    origin: PackageOrigin,
    #[debug(skip)]
    cursor: ByteCursor,
    #[debug(skip)]
    export_lookup: FxHashMap<String, Vec<usize>>,
}

impl Package {
    /// Parse a package from raw file bytes, decrypting and decompressing as needed.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        crate::read::read_package(bytes)
    }

    pub(crate) fn new(
        header: Header,
        names: Vec<NameEntry>,
        imports: Vec<ImportEntry>,
        exports: Vec<ExportEntry>,
        layout: TableLayout,
        cursor: ByteCursor,
    ) -> Self {
        let mut package = Self {
            header,
            names,
            imports,
            exports,
            layout,
            origin: PackageOrigin::default(),
            cursor,
            export_lookup: FxHashMap::default(),
        };

        let mut lookup: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (index, export) in package.exports.iter().enumerate() {
            let name = package.name(export.object_name()).unwrap_or_default();
            lookup.entry(name.to_lowercase()).or_default().push(index);
        }
        package.export_lookup = lookup;
        package
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn names(&self) -> &[NameEntry] {
        &self.names
    }

    pub fn imports(&self) -> &[ImportEntry] {
        &self.imports
    }

    pub fn exports(&self) -> &[ExportEntry] {
        &self.exports
    }

    pub(crate) fn exports_mut(&mut self) -> &mut [ExportEntry] {
        &mut self.exports
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    pub fn origin(&self) -> PackageOrigin {
        self.origin
    }

    pub(crate) fn set_origin(&mut self, origin: PackageOrigin) {
        self.origin = origin;
    }

    /// The decrypted, decompressed package body.
    pub fn data(&self) -> &[u8] {
        self.cursor.as_slice()
    }

    pub fn cursor(&self) -> &ByteCursor {
        &self.cursor
    }

    pub fn export(&self, index: usize) -> Result<&ExportEntry> {
        self.exports.get(index).ok_or(UpkError::ExportIndexOutOfBounds(index))
    }

    /// Serialized payload of an export, as stored in the body.
    pub fn export_data(&self, index: usize) -> Result<&[u8]> {
        let export = self.export(index)?;
        let start = export.serial_offset();
        self.data()
            .get(start..start + export.serial_size())
            .ok_or_else(|| UpkError::corrupt(format!("export {index} payload outside package body")))
    }

    /// Base string of a name reference, without the instance number.
    pub fn name_str(&self, name: NameRef) -> Option<&str> {
        usize::try_from(name.index)
            .ok()
            .and_then(|index| self.names.get(index))
            .map(NameEntry::name)
    }

    /// Display form of a name reference, `Name` or `Name_N`.
    pub fn name(&self, name: NameRef) -> Option<String> {
        let base = self.name_str(name)?;
        Some(if name.number > 0 {
            format!("{base}_{}", name.number - 1)
        } else {
            base.to_string()
        })
    }

    pub fn object_name(&self, object: ObjectRef) -> Option<String> {
        match object.resolve() {
            ObjectIndex::Null => None,
            ObjectIndex::Export(index) => self.name(self.exports.get(index)?.object_name()),
            ObjectIndex::Import(index) => self.name(self.imports.get(index)?.object_name()),
        }
    }

    /// Dotted path of an object through its outers, outermost first.
    pub fn object_path(&self, object: ObjectRef) -> Option<String> {
        let mut parts = Vec::new();
        let mut current = object;
        // outer chains are acyclic in valid packages; the bound stops corrupt ones
        for _ in 0..=self.exports.len() + self.imports.len() {
            if current.is_null() {
                break;
            }
            parts.push(self.object_name(current)?);
            current = match current.resolve() {
                ObjectIndex::Export(index) => self.exports.get(index)?.outer(),
                ObjectIndex::Import(index) => self.imports.get(index)?.outer(),
                ObjectIndex::Null => ObjectRef::NULL,
            };
        }
        parts.reverse();
        Some(parts.join("."))
    }

    /// Class name of an export. A null class reference means the export is itself a class.
    pub fn class_name(&self, index: usize) -> Result<String> {
        let class = self.export(index)?.class();
        if class.is_null() {
            return Ok("Class".to_string());
        }
        self.object_name(class)
            .ok_or_else(|| UpkError::corrupt(format!("export {index} has unresolved class {class:?}")))
    }

    /// Indices of exports whose name matches, ignoring case.
    pub fn find_exports(&self, name: &str) -> &[usize] {
        self.export_lookup
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn find_export(&self, name: &str) -> Option<usize> {
        self.find_exports(name).first().copied()
    }

    /// Distinct export class names, in first-seen order.
    pub fn export_types(&self) -> Vec<String> {
        let types: IndexSet<String> = (0..self.exports.len())
            .filter_map(|index| self.class_name(index).ok())
            .collect();
        types.into_iter().collect()
    }

    /// Parsed object of an export, deserialized on first access and cached on the entry.
    pub fn object(&self, index: usize) -> Result<&ExportObject> {
        self.export(index)?
            .object_cell()
            .get_or_try_init(|| ExportObject::parse(self, index))
    }

    /// Parse every export in parallel.
    pub fn parse_all(&self) -> Result<()> {
        (0..self.exports.len())
            .into_par_iter()
            .try_for_each(|index| self.object(index).map(|_| ()))
    }
}
