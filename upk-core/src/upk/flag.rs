use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// Package-wide flags stored in the header. Unknown bits are kept as read.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct PackageFlags: u32 {
        const ALLOW_DOWNLOAD = 1 << 0;
        const CLIENT_OPTIONAL = 1 << 1;
        const SERVER_SIDE_ONLY = 1 << 2;
        const COOKED = 1 << 3;
        const UNSECURE = 1 << 4;
        const SAVED_WITH_NEWER_VERSION = 1 << 5;
        const NEED = 1 << 15;
        const COMPILING = 1 << 16;
        const CONTAINS_MAP = 1 << 17;
        const TRASH = 1 << 18;
        const DISALLOW_LAZY_LOADING = 1 << 19;
        const PLAY_IN_EDITOR = 1 << 20;
        const CONTAINS_SCRIPT = 1 << 21;
        const CONTAINS_DEBUG_INFO = 1 << 22;
        const REQUIRE_IMPORTS_ALREADY_LOADED = 1 << 23;
        const SELF_CONTAINED_LIGHTING = 1 << 24;
        const STORE_COMPRESSED = 1 << 25;
        const STORE_FULLY_COMPRESSED = 1 << 26;
        const CONTAINS_INLINED_SHADERS = 1 << 27;
        const CONTAINS_FACEFX_DATA = 1 << 28;
        const NO_EXPORT_ALL_FLAGS = 1 << 29;
        const STRIP_FINAL = 1 << 30;
        const FILTER_EDITOR_ONLY = 1 << 31;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct CompressionFlags: u32 {
        const ZLIB = 1 << 0;
        const LZO = 1 << 1;
        const LZX = 1 << 2;
    }
}

bitflags! {
    /// Per-object flags, shared by name table entries and exports.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ObjectFlags: u64 {
        const TRANSACTIONAL = 1 << 0;
        const IN_SINGULAR_FUNC = 1 << 1;
        const PUBLIC = 1 << 2;
        const PRIVATE = 1 << 7;
        const AUTOMATED = 1 << 8;
        const TRANSIENT = 1 << 14;
        const LOAD_FOR_CLIENT = 1 << 16;
        const LOAD_FOR_SERVER = 1 << 17;
        const LOAD_FOR_EDIT = 1 << 18;
        const STANDALONE = 1 << 19;
        const NOT_FOR_CLIENT = 1 << 20;
        const NOT_FOR_SERVER = 1 << 21;
        const NOT_FOR_EDIT = 1 << 22;
        const NEED_POST_LOAD = 1 << 24;
        const HAS_STACK = 1 << 25;
        const NATIVE = 1 << 26;
        const MARKED = 1 << 27;
        const ERRORS_HAVE_BEEN_SHOWN = 1 << 28;
        const ARCHETYPE_OBJECT = 1 << 33;
        const CLASS_DEFAULT_OBJECT = 1 << 41;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ExportFlags: u32 {
        const FORCED_EXPORT = 1 << 0;
    }
}

impl Serialize for PackageFlags {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.bits())
    }
}

impl Serialize for CompressionFlags {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.bits())
    }
}

impl Serialize for ObjectFlags {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.bits())
    }
}

impl Serialize for ExportFlags {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.bits())
    }
}
