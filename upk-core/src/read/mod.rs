use std::ops::Range;

use byteorder::{ByteOrder, LE};

use crate::cursor::{ByteCursor, XOR_KEY};
use crate::error::{Result, UpkError};
use crate::upk::{
    ExportEntry, Header, ImportEntry, NameEntry, NameRef, ObjectIndex, ObjectRef, PACKAGE_SIGNATURE, Package,
    PackageOrigin, TableLayout,
};

pub mod chunks;

/// Smallest on-disk size of each table entry, used to reject absurd counts early.
const MIN_NAME_SIZE: usize = 12;
const MIN_EXPORT_SIZE: usize = 64;

/// Read a package from raw file bytes.
///
/// Encrypted files are recognized by a first word that is not the signature but becomes it
/// once decrypted. Compressed bodies are expanded before the tables are parsed, and the
/// resulting package carries an uncompressed header.
pub fn read_package(bytes: Vec<u8>) -> Result<Package> {
    let mut cursor = ByteCursor::new(bytes);

    let encrypted = is_encrypted(&cursor);
    if encrypted {
        tracing::debug!(size = cursor.len(), "decrypting package");
        cursor.decrypt();
    }

    let header = Header::read(&mut cursor.branch(0)?)?;
    let compression = header.compression_flags();
    if header.is_compressed() {
        tracing::debug!(
            ?compression,
            chunks = header.compressed_chunks().len(),
            "decompressing package body"
        );
        cursor = chunks::decompress_body(&cursor, &header)?;
    }

    let mut package = read_body(cursor)?;
    package.set_origin(PackageOrigin { encrypted, compression });
    if header.is_compressed() {
        // the stored header still lists the chunk table; rewrite it for the expanded body
        package.rebuild(std::iter::empty())?;
    }
    Ok(package)
}

/// Whether the buffer holds an encrypted package.
pub fn is_encrypted(cursor: &ByteCursor) -> bool {
    if cursor.len() < XOR_KEY.len() {
        return false;
    }
    let first = LE::read_u32(&cursor.as_slice()[..4]);
    first != PACKAGE_SIGNATURE && first ^ LE::read_u32(&XOR_KEY[..4]) == PACKAGE_SIGNATURE
}

/// Parse a decrypted, uncompressed package body.
pub fn read_body(cursor: ByteCursor) -> Result<Package> {
    let mut reader = cursor.branch(0)?;
    let header = Header::read(&mut reader)?;
    let header_range = 0..reader.position();
    let file_version = header.version();

    let (names, names_range) = read_table(
        &cursor,
        "name",
        header.name_offset(),
        header.name_count(),
        MIN_NAME_SIZE,
        NameEntry::read,
    )?;
    let (imports, imports_range) = read_table(
        &cursor,
        "import",
        header.import_offset(),
        header.import_count(),
        ImportEntry::SIZE,
        ImportEntry::read,
    )?;
    let (exports, exports_range) = read_table(
        &cursor,
        "export",
        header.export_offset(),
        header.export_count(),
        MIN_EXPORT_SIZE,
        |c| ExportEntry::read(c, file_version),
    )?;

    let layout = TableLayout {
        header: header_range,
        names: names_range,
        imports: imports_range,
        exports: exports_range,
    };
    layout.validate()?;
    validate_references(&names, &imports, &exports, cursor.len())?;

    tracing::debug!(
        version = file_version,
        names = names.len(),
        imports = imports.len(),
        exports = exports.len(),
        "parsed package tables"
    );

    Ok(Package::new(header, names, imports, exports, layout, cursor))
}

fn read_table<T>(
    cursor: &ByteCursor,
    what: &str,
    offset: i32,
    count: i32,
    min_entry_size: usize,
    mut read: impl FnMut(&mut ByteCursor) -> Result<T>,
) -> Result<(Vec<T>, Range<usize>)> {
    if offset < 0 || count < 0 {
        return Err(UpkError::corrupt(format!("{what} table at {offset} with count {count}")));
    }
    let (offset, count) = (offset as usize, count as usize);
    if count == 0 {
        return Ok((Vec::new(), offset..offset));
    }
    if offset > cursor.len() || count.saturating_mul(min_entry_size) > cursor.len() - offset {
        return Err(UpkError::corrupt(format!(
            "{what} table of {count} entries at {offset} exceeds package size {}",
            cursor.len()
        )));
    }

    let mut branch = cursor.branch(offset)?;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(read(&mut branch)?);
    }

    Ok((entries, offset..branch.position()))
}

fn validate_references(
    names: &[NameEntry],
    imports: &[ImportEntry],
    exports: &[ExportEntry],
    body_size: usize,
) -> Result<()> {
    let check_name = |name: NameRef| {
        if name.index < 0 || name.index as usize >= names.len() {
            return Err(UpkError::corrupt(format!("name index {} out of range", name.index)));
        }
        Ok(())
    };
    let check_object = |object: ObjectRef| {
        let valid = match object.resolve() {
            ObjectIndex::Null => true,
            ObjectIndex::Export(index) => index < exports.len(),
            ObjectIndex::Import(index) => index < imports.len(),
        };
        if !valid {
            return Err(UpkError::corrupt(format!("object reference {} out of range", object.0)));
        }
        Ok(())
    };

    for import in imports {
        import.name_refs().into_iter().try_for_each(check_name)?;
        check_object(import.outer())?;
    }

    for (index, export) in exports.iter().enumerate() {
        check_name(export.object_name())?;
        export.references().into_iter().try_for_each(check_object)?;
        if export.serial_offset() + export.serial_size() > body_size {
            return Err(UpkError::corrupt(format!(
                "export {index} payload {}+{} exceeds package size {body_size}",
                export.serial_offset(),
                export.serial_size()
            )));
        }
    }

    Ok(())
}
