use byteorder::LE;

use crate::cursor::ByteCursor;
use crate::errors::ParseError;

/// Little-endian tag at the start of every package file.
pub const PACKAGE_TAG: u32 = 0x9E2A83C1;

const PKG_FILTER_EDITOR_ONLY: u32 = 0x8000_0000;

const VER_UE4_NAME_HASHES_SERIALIZED: i32 = 504;
const VER_UE4_ADDED_PACKAGE_SUMMARY_LOCALIZATION_ID: i32 = 516;
const VER_UE4_SERIALIZE_TEXT_IN_PACKAGES: i32 = 459;
const VER_UE4_NON_OUTER_PACKAGE_IMPORT: i32 = 520;
const VER_UE4_TEMPLATE_INDEX_IN_COOKED_EXPORTS: i32 = 508;
const VER_UE4_64BIT_EXPORTMAP_SERIALSIZES: i32 = 511;
const VER_UE4_LOAD_FOR_EDITOR_GAME: i32 = 365;
const VER_UE4_COOKED_ASSETS_IN_EDITOR_SUPPORT: i32 = 485;
const VER_UE4_PRELOAD_DEPENDENCIES_IN_COOKED_EXPORTS: i32 = 507;

/// Settings for [`UAsset::parse_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UAssetOptions {
    /// Object version assumed for unversioned packages, which store 0.
    pub ue4_version: i32,
}

impl Default for UAssetOptions {
    fn default() -> Self {
        Self { ue4_version: 522 }
    }
}

/// Reference into the name table with an instance number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FName {
    pub index: i32,
    pub number: i32,
}

/// 0 is null, positive values are exports `i - 1`, negative are imports
/// `-i - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackageIndex(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRef {
    Null,
    Import(usize),
    Export(usize),
}

impl PackageIndex {
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn resolve(self) -> ObjectRef {
        match self.0 {
            0 => ObjectRef::Null,
            i if i > 0 => ObjectRef::Export(i as usize - 1),
            i => ObjectRef::Import((-(i as i64) - 1) as usize),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomVersion {
    pub guid: [u8; 16],
    pub version: i32,
}

/// Fixed-layout package summary at the start of a `.uasset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UAssetHeader {
    pub legacy_file_version: i32,
    pub legacy_ue3_version: Option<i32>,
    /// As stored; 0 for unversioned packages.
    pub file_version_ue4: i32,
    pub file_version_ue5: Option<i32>,
    pub file_version_licensee_ue4: i32,
    pub custom_versions: Vec<CustomVersion>,
    pub total_header_size: i32,
    pub folder_name: String,
    pub package_flags: u32,
    pub name_count: i32,
    pub name_offset: i32,
    pub localization_id: Option<String>,
    pub gatherable_text_data_count: i32,
    pub gatherable_text_data_offset: i32,
    pub export_count: i32,
    pub export_offset: i32,
    pub import_count: i32,
    pub import_offset: i32,
}

impl UAssetHeader {
    pub fn is_filter_editor_only(&self) -> bool {
        self.package_flags & PKG_FILTER_EDITOR_ONLY != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub class_package: FName,
    pub class_name: FName,
    pub outer_index: PackageIndex,
    pub object_name: FName,
    pub package_name: Option<FName>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub class_index: PackageIndex,
    pub super_index: PackageIndex,
    pub template_index: PackageIndex,
    pub outer_index: PackageIndex,
    pub object_name: FName,
    pub object_flags: u32,
    pub serial_size: i64,
    /// Offset from the start of the package, counting the `.uasset` header.
    pub serial_offset: i64,
    pub forced_export: bool,
    pub not_for_client: bool,
    pub not_for_server: bool,
    pub package_guid: [u8; 16],
    pub package_flags: u32,
    pub not_always_loaded_for_editor_game: bool,
    pub is_asset: bool,
    /// First export dependency followed by the four dependency counts.
    pub preload_dependencies: [i32; 5],
}

/// A parsed package: summary, name table, imports and exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UAsset {
    pub header: UAssetHeader,
    pub names: Vec<String>,
    pub imports: Vec<Import>,
    pub exports: Vec<Export>,
    ue4_version: i32,
}

impl UAsset {
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        Self::parse_with(bytes, &UAssetOptions::default())
    }

    pub fn parse_with(bytes: &[u8], options: &UAssetOptions) -> Result<Self, ParseError> {
        let mut reader = ByteCursor::new(bytes);
        let header = read_header(&mut reader, options)?;
        let ue4_version = match header.file_version_ue4 {
            0 => options.ue4_version,
            version => version,
        };
        log::debug!(
            "package summary: legacy {}, ue4 {ue4_version}, {} names, {} imports, {} exports",
            header.legacy_file_version,
            header.name_count,
            header.import_count,
            header.export_count
        );

        let filter_editor_only = header.is_filter_editor_only();

        seek_table(&mut reader, header.name_offset, header.name_count, "name")?;
        let mut names = Vec::with_capacity(table_capacity(header.name_count, &reader));
        for _ in 0..header.name_count {
            names.push(reader.read_fstring()?);
            if ue4_version >= VER_UE4_NAME_HASHES_SERIALIZED {
                reader.skip(4)?; // case-insensitive and case-preserving hashes
            }
        }

        seek_table(&mut reader, header.import_offset, header.import_count, "import")?;
        let mut imports = Vec::with_capacity(table_capacity(header.import_count, &reader));
        for _ in 0..header.import_count {
            imports.push(read_import(&mut reader, ue4_version, filter_editor_only)?);
        }

        seek_table(&mut reader, header.export_offset, header.export_count, "export")?;
        let mut exports = Vec::with_capacity(table_capacity(header.export_count, &reader));
        for _ in 0..header.export_count {
            exports.push(read_export(&mut reader, ue4_version)?);
        }

        let asset = UAsset {
            header,
            names,
            imports,
            exports,
            ue4_version,
        };
        asset.validate()?;
        Ok(asset)
    }

    /// Object version used to decode the tables.
    pub fn ue4_version(&self) -> i32 {
        self.ue4_version
    }

    /// Resolves a name, appending `_{number - 1}` for numbered instances.
    pub fn name(&self, name: &FName) -> Option<String> {
        let base = self.names.get(usize::try_from(name.index).ok()?)?;
        Some(match name.number {
            0 => base.clone(),
            number => format!("{base}_{}", number - 1),
        })
    }

    /// Payload of `export` inside the companion `.uexp` blob, which holds
    /// everything after the `.uasset` header.
    pub fn export_data<'a>(&self, export: &Export, uexp: &'a [u8]) -> Result<&'a [u8], ParseError> {
        let start = export
            .serial_offset
            .checked_sub(self.header.total_header_size.into())
            .and_then(|start| usize::try_from(start).ok());
        let size = usize::try_from(export.serial_size).ok();
        start
            .zip(size)
            .and_then(|(start, size)| uexp.get(start..start.checked_add(size)?))
            .ok_or_else(|| {
                ParseError::MalformedAsset(format!(
                    "export payload at {} ({} bytes) lies outside the {} byte export file",
                    export.serial_offset,
                    export.serial_size,
                    uexp.len()
                ))
            })
    }

    fn validate(&self) -> Result<(), ParseError> {
        for import in &self.imports {
            self.check_name(&import.class_package)?;
            self.check_name(&import.class_name)?;
            self.check_name(&import.object_name)?;
            if let Some(package_name) = &import.package_name {
                self.check_name(package_name)?;
            }
            self.check_index(import.outer_index)?;
        }
        for export in &self.exports {
            self.check_name(&export.object_name)?;
            for index in [
                export.class_index,
                export.super_index,
                export.template_index,
                export.outer_index,
            ] {
                self.check_index(index)?;
            }
            if export.serial_size < 0 || export.serial_offset < 0 {
                return Err(ParseError::MalformedAsset(format!(
                    "export has negative serial range {} + {}",
                    export.serial_offset, export.serial_size
                )));
            }
        }
        Ok(())
    }

    fn check_name(&self, name: &FName) -> Result<(), ParseError> {
        match usize::try_from(name.index) {
            Ok(index) if index < self.names.len() => Ok(()),
            _ => Err(ParseError::MalformedAsset(format!(
                "name index {} out of range for a table of {}",
                name.index,
                self.names.len()
            ))),
        }
    }

    fn check_index(&self, index: PackageIndex) -> Result<(), ParseError> {
        let in_range = match index.resolve() {
            ObjectRef::Null => true,
            ObjectRef::Import(i) => i < self.imports.len(),
            ObjectRef::Export(i) => i < self.exports.len(),
        };
        if in_range {
            Ok(())
        } else {
            Err(ParseError::MalformedAsset(format!(
                "package index {} resolves outside {} imports and {} exports",
                index.0,
                self.imports.len(),
                self.exports.len()
            )))
        }
    }
}

fn read_header(
    reader: &mut ByteCursor<'_>,
    options: &UAssetOptions,
) -> Result<UAssetHeader, ParseError> {
    let tag = reader.read_u32::<LE>()?;
    if tag != PACKAGE_TAG {
        return Err(ParseError::MalformedAsset(format!(
            "package tag {tag:#010x} does not match {PACKAGE_TAG:#010x}"
        )));
    }

    let legacy_file_version = reader.read_i32::<LE>()?;
    if !(-8..=-2).contains(&legacy_file_version) {
        return Err(ParseError::UnsupportedVersion(legacy_file_version));
    }
    let legacy_ue3_version = match legacy_file_version {
        -4 => None,
        _ => Some(reader.read_i32::<LE>()?),
    };
    let file_version_ue4 = reader.read_i32::<LE>()?;
    let file_version_ue5 = match legacy_file_version <= -8 {
        true => Some(reader.read_i32::<LE>()?),
        false => None,
    };
    let file_version_licensee_ue4 = reader.read_i32::<LE>()?;
    let custom_versions = reader.read_array(|reader| {
        Ok(CustomVersion {
            guid: reader.read_guid()?,
            version: reader.read_i32::<LE>()?,
        })
    })?;

    let ue4_version = match file_version_ue4 {
        0 => options.ue4_version,
        version => version,
    };

    let total_header_size = reader.read_i32::<LE>()?;
    let folder_name = reader.read_fstring()?;
    let package_flags = reader.read_u32::<LE>()?;
    let name_count = reader.read_i32::<LE>()?;
    let name_offset = reader.read_i32::<LE>()?;

    let localization_id = match ue4_version >= VER_UE4_ADDED_PACKAGE_SUMMARY_LOCALIZATION_ID
        && package_flags & PKG_FILTER_EDITOR_ONLY == 0
    {
        true => Some(reader.read_fstring()?),
        false => None,
    };

    let (gatherable_text_data_count, gatherable_text_data_offset) =
        match ue4_version >= VER_UE4_SERIALIZE_TEXT_IN_PACKAGES {
            true => (reader.read_i32::<LE>()?, reader.read_i32::<LE>()?),
            false => (0, 0),
        };

    let export_count = reader.read_i32::<LE>()?;
    let export_offset = reader.read_i32::<LE>()?;
    let import_count = reader.read_i32::<LE>()?;
    let import_offset = reader.read_i32::<LE>()?;

    if total_header_size < 0 {
        return Err(ParseError::MalformedAsset(format!(
            "negative total header size {total_header_size}"
        )));
    }

    Ok(UAssetHeader {
        legacy_file_version,
        legacy_ue3_version,
        file_version_ue4,
        file_version_ue5,
        file_version_licensee_ue4,
        custom_versions,
        total_header_size,
        folder_name,
        package_flags,
        name_count,
        name_offset,
        localization_id,
        gatherable_text_data_count,
        gatherable_text_data_offset,
        export_count,
        export_offset,
        import_count,
        import_offset,
    })
}

fn seek_table(
    reader: &mut ByteCursor<'_>,
    offset: i32,
    count: i32,
    what: &str,
) -> Result<(), ParseError> {
    if count < 0 || offset < 0 {
        return Err(ParseError::MalformedAsset(format!(
            "{what} table has count {count} at offset {offset}"
        )));
    }
    if count == 0 {
        return Ok(());
    }
    reader.seek(offset as u64).map_err(|_| {
        ParseError::MalformedAsset(format!(
            "{what} table offset {offset} is beyond the {} byte package",
            reader.len()
        ))
    })
}

fn table_capacity(count: i32, reader: &ByteCursor<'_>) -> usize {
    (count.max(0) as usize).min(reader.remaining())
}

fn read_fname(reader: &mut ByteCursor<'_>) -> Result<FName, ParseError> {
    Ok(FName {
        index: reader.read_i32::<LE>()?,
        number: reader.read_i32::<LE>()?,
    })
}

fn read_package_index(reader: &mut ByteCursor<'_>) -> Result<PackageIndex, ParseError> {
    Ok(PackageIndex(reader.read_i32::<LE>()?))
}

fn read_import(
    reader: &mut ByteCursor<'_>,
    ue4_version: i32,
    filter_editor_only: bool,
) -> Result<Import, ParseError> {
    let class_package = read_fname(reader)?;
    let class_name = read_fname(reader)?;
    let outer_index = read_package_index(reader)?;
    let object_name = read_fname(reader)?;
    let package_name =
        match ue4_version >= VER_UE4_NON_OUTER_PACKAGE_IMPORT && !filter_editor_only {
            true => Some(read_fname(reader)?),
            false => None,
        };
    Ok(Import {
        class_package,
        class_name,
        outer_index,
        object_name,
        package_name,
    })
}

fn read_export(reader: &mut ByteCursor<'_>, ue4_version: i32) -> Result<Export, ParseError> {
    let class_index = read_package_index(reader)?;
    let super_index = read_package_index(reader)?;
    let template_index = match ue4_version >= VER_UE4_TEMPLATE_INDEX_IN_COOKED_EXPORTS {
        true => read_package_index(reader)?,
        false => PackageIndex(0),
    };
    let outer_index = read_package_index(reader)?;
    let object_name = read_fname(reader)?;
    let object_flags = reader.read_u32::<LE>()?;

    let (serial_size, serial_offset) = match ue4_version >= VER_UE4_64BIT_EXPORTMAP_SERIALSIZES {
        true => (reader.read_i64::<LE>()?, reader.read_i64::<LE>()?),
        false => (
            reader.read_i32::<LE>()?.into(),
            reader.read_i32::<LE>()?.into(),
        ),
    };

    let forced_export = reader.read_bool32()?;
    let not_for_client = reader.read_bool32()?;
    let not_for_server = reader.read_bool32()?;
    let package_guid = reader.read_guid()?;
    let package_flags = reader.read_u32::<LE>()?;

    let not_always_loaded_for_editor_game = match ue4_version >= VER_UE4_LOAD_FOR_EDITOR_GAME {
        true => reader.read_bool32()?,
        false => false,
    };
    let is_asset = match ue4_version >= VER_UE4_COOKED_ASSETS_IN_EDITOR_SUPPORT {
        true => reader.read_bool32()?,
        false => false,
    };

    let mut preload_dependencies = [0; 5];
    if ue4_version >= VER_UE4_PRELOAD_DEPENDENCIES_IN_COOKED_EXPORTS {
        for dependency in &mut preload_dependencies {
            *dependency = reader.read_i32::<LE>()?;
        }
    }

    Ok(Export {
        class_index,
        super_index,
        template_index,
        outer_index,
        object_name,
        object_flags,
        serial_size,
        serial_offset,
        forced_export,
        not_for_client,
        not_for_server,
        package_guid,
        package_flags,
        not_always_loaded_for_editor_game,
        is_asset,
        preload_dependencies,
    })
}
