//! Regenerating a package after export payloads are replaced.
//!
//! Every region whose bytes are regenerated (header, the three tables, each replaced export)
//! is a span of the old body. Bytes between spans are copied unchanged, and any stored
//! position is moved by the size change of the spans that end at or before it.

use std::collections::BTreeMap;
use std::ops::Range;

use byteorder::{ByteOrder, LE};

use crate::cursor::ByteCursor;
use crate::error::{Result, UpkError};
use crate::object::ExportObject;
use crate::read::read_body;
use crate::upk::{ExportEntry, Package, UString};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpanKind {
    Header,
    Names,
    Imports,
    Exports,
    Export(usize),
}

#[derive(Debug, Clone)]
struct Span {
    kind: SpanKind,
    old: Range<usize>,
    new_len: usize,
    new_start: usize,
}

/// Maps positions in the old body to positions in the rebuilt one.
#[derive(Debug, Clone, Default)]
pub(crate) struct Relocation {
    /// `(old end, cumulative size change)` per span, ordered by end.
    shifts: Vec<(usize, i64)>,
}

impl Relocation {
    /// `spans` are `(old range, new length)` pairs, sorted and non-overlapping.
    pub(crate) fn new<'a>(spans: impl IntoIterator<Item = (&'a Range<usize>, usize)>) -> Self {
        let mut total = 0i64;
        let shifts = spans
            .into_iter()
            .map(|(old, new_len)| {
                total += new_len as i64 - old.len() as i64;
                (old.end, total)
            })
            .collect();
        Self { shifts }
    }

    pub(crate) fn apply(&self, position: usize) -> usize {
        let passed = self.shifts.partition_point(|(end, _)| *end <= position);
        match passed {
            0 => position,
            n => (position as i64 + self.shifts[n - 1].1) as usize,
        }
    }
}

impl Package {
    /// Rebuild the package with the given export objects substituted for their stored payloads.
    ///
    /// Replacements are applied in payload order whatever order they arrive in; a repeated index
    /// keeps its last object. Rebuilding with no replacements reproduces the current body
    /// byte for byte. On error the package is left untouched.
    pub fn rebuild<I>(&mut self, replacements: I) -> Result<&[u8]>
    where
        I: IntoIterator<Item = (usize, ExportObject)>,
    {
        let mut replaced: BTreeMap<usize, (ExportObject, Vec<u8>)> = BTreeMap::new();
        for (index, object) in replacements {
            self.export(index)?;
            let bytes = object.to_bytes()?;
            replaced.insert(index, (object, bytes));
        }

        let file_version = self.header().version();
        let old = self.data();

        let mut header = self.header().clone();
        if header.is_compressed() {
            header.clear_compression();
        }

        let mut name_table = Vec::with_capacity(self.layout().names.len());
        for name in self.names() {
            name.write_to(&mut name_table)?;
        }
        let mut import_table = Vec::with_capacity(self.layout().imports.len());
        for import in self.imports() {
            import.write_to(&mut import_table)?;
        }
        // entry sizes do not depend on the offsets they hold
        let mut export_table = Vec::new();
        for export in self.exports() {
            export.write_to(&mut export_table, file_version)?;
        }

        let layout = self.layout();
        let mut spans = vec![
            Span {
                kind: SpanKind::Header,
                old: layout.header.clone(),
                new_len: header.encoded_len()?,
                new_start: 0,
            },
            Span {
                kind: SpanKind::Names,
                old: layout.names.clone(),
                new_len: name_table.len(),
                new_start: 0,
            },
            Span {
                kind: SpanKind::Imports,
                old: layout.imports.clone(),
                new_len: import_table.len(),
                new_start: 0,
            },
            Span {
                kind: SpanKind::Exports,
                old: layout.exports.clone(),
                new_len: export_table.len(),
                new_start: 0,
            },
        ];
        // empty tables have nothing to regenerate
        spans.retain(|span| span.kind == SpanKind::Header || !span.old.is_empty());
        for (&index, (_, bytes)) in &replaced {
            let export = &self.exports()[index];
            let start = export.serial_offset();
            spans.push(Span {
                kind: SpanKind::Export(index),
                old: start..start + export.serial_size(),
                new_len: bytes.len(),
                new_start: 0,
            });
        }

        spans.sort_by_key(|span| (span.old.start, span.old.end));
        for pair in spans.windows(2) {
            if pair[0].old.end > pair[1].old.start {
                return Err(UpkError::corrupt(format!(
                    "{:?} {:?} overlaps {:?} {:?}",
                    pair[0].kind, pair[0].old, pair[1].kind, pair[1].old
                )));
            }
        }

        let thumbnails = match self.header().thumbnail_table_offset() {
            offset if offset > 0 => Some(ThumbnailTable::read(self.cursor(), offset as usize)?),
            _ => None,
        };
        if let Some(table) = &thumbnails {
            if let Some(span) = spans.iter().find(|span| overlaps(&span.old, &table.range)) {
                return Err(UpkError::corrupt(format!(
                    "thumbnail table {:?} overlaps {:?} {:?}",
                    table.range, span.kind, span.old
                )));
            }
        }

        let mut delta = 0i64;
        for span in &mut spans {
            span.new_start = (span.old.start as i64 + delta) as usize;
            delta += span.new_len as i64 - span.old.len() as i64;
        }
        let relocation = Relocation::new(spans.iter().map(|span| (&span.old, span.new_len)));

        let new_starts: BTreeMap<usize, usize> = spans
            .iter()
            .filter_map(|span| match span.kind {
                SpanKind::Export(index) => Some((index, span.new_start)),
                _ => None,
            })
            .collect();
        let exports: Vec<ExportEntry> = self
            .exports()
            .iter()
            .enumerate()
            .map(|(index, export)| match replaced.get(&index) {
                Some((_, bytes)) => export.relocated(new_starts[&index], bytes.len()),
                None => export.relocated(relocation.apply(export.serial_offset()), export.serial_size()),
            })
            .collect();

        header.relocate(|position| relocation.apply(position));

        let mut out = Vec::with_capacity((old.len() as i64 + delta).max(0) as usize);
        let mut position = 0;
        for span in &spans {
            out.extend_from_slice(&old[position..span.old.start]);
            let before = out.len();
            match span.kind {
                SpanKind::Header => header.write_to(&mut out)?,
                SpanKind::Names => out.extend_from_slice(&name_table),
                SpanKind::Imports => out.extend_from_slice(&import_table),
                SpanKind::Exports => {
                    for export in &exports {
                        export.write_to(&mut out, file_version)?;
                    }
                }
                SpanKind::Export(index) => out.extend_from_slice(&replaced[&index].1),
            }
            if out.len() - before != span.new_len || before != span.new_start {
                return Err(UpkError::corrupt(format!(
                    "{:?} was written as {} bytes at {before}, expected {} at {}",
                    span.kind,
                    out.len() - before,
                    span.new_len,
                    span.new_start
                )));
            }
            position = span.old.end;
        }
        out.extend_from_slice(&old[position..]);

        if let Some(table) = &thumbnails {
            for &(field, offset) in &table.data_offsets {
                let at = relocation.apply(field);
                LE::write_i32(&mut out[at..at + 4], relocation.apply(offset) as i32);
            }
        }

        tracing::debug!(
            spans = spans.len(),
            replaced = replaced.len(),
            old_size = old.len(),
            new_size = out.len(),
            "rebuilt package body"
        );

        let mut rebuilt = read_body(ByteCursor::new(out))?;
        rebuilt.set_origin(self.origin());

        let mut replaced: BTreeMap<usize, ExportObject> =
            replaced.into_iter().map(|(index, (object, _))| (index, object)).collect();
        for (index, export) in self.exports_mut().iter_mut().enumerate() {
            let object = replaced.remove(&index).or_else(|| export.take_object());
            if let Some(object) = object {
                // freshly parsed entries have empty cells
                let _ = rebuilt.exports()[index].object_cell().set(object);
            }
        }

        *self = rebuilt;
        tracing::trace!("committed rebuilt package");
        Ok(self.data())
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Editor thumbnail table: class name, object path and absolute data offset per entry.
#[derive(Debug)]
struct ThumbnailTable {
    range: Range<usize>,
    /// `(position of the offset field, offset)` for every entry with data.
    data_offsets: Vec<(usize, usize)>,
}

impl ThumbnailTable {
    /// Two empty strings and an offset.
    const MIN_ENTRY_SIZE: usize = 12;

    fn read(body: &ByteCursor, offset: usize) -> Result<Self> {
        Self::read_entries(body, offset).map_err(|e| match e {
            UpkError::OutOfBounds { .. } => UpkError::corrupt(format!("thumbnail table at {offset}: {e}")),
            other => other,
        })
    }

    fn read_entries(body: &ByteCursor, offset: usize) -> Result<Self> {
        let mut reader = body.branch(offset)?;
        let count = reader.read_i32()?;
        if count < 0 || (count as usize).saturating_mul(Self::MIN_ENTRY_SIZE) > reader.remaining() {
            return Err(UpkError::corrupt(format!("invalid thumbnail count {count}")));
        }

        let mut data_offsets = Vec::with_capacity(count as usize);
        for _ in 0..count {
            UString::read(&mut reader)?;
            UString::read(&mut reader)?;
            let field = reader.position();
            let data_offset = reader.read_i32()?;
            if data_offset < 0 {
                return Err(UpkError::corrupt(format!("negative thumbnail data offset {data_offset}")));
            }
            if data_offset > 0 {
                data_offsets.push((field, data_offset as usize));
            }
        }

        Ok(Self {
            range: offset..reader.position(),
            data_offsets,
        })
    }
}
