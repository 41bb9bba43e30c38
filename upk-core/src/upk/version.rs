//! File versions at which package structures changed.

pub const ENGINE_VERSION: u16 = 245;
pub const TOTAL_HEADER_SIZE: u16 = 249;
pub const FOLDER_NAME: u16 = 269;
pub const COOKER_VERSION: u16 = 277;
pub const NET_OBJECT_COUNT: u16 = 322;
pub const COMPRESSION: u16 = 334;
pub const DEPENDS_OFFSET: u16 = 415;
pub const PACKAGE_SOURCE: u16 = 482;
pub const ADDITIONAL_PACKAGES: u16 = 516;
/// Exports stopped carrying a component map.
pub const COMPONENT_MAP_REMOVED: u16 = 543;
pub const THUMBNAIL_TABLE: u16 = 584;
pub const IMPORT_EXPORT_GUIDS: u16 = 623;
/// Byte property tags name their enum.
pub const BYTE_PROPERTY_ENUM: u16 = 633;
/// Bool property values shrank from four bytes to one.
pub const BOOL_PROPERTY_BYTE: u16 = 673;
pub const TEXTURE_ALLOCATIONS: u16 = 767;
