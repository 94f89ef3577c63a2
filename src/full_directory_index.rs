use crate::cursor::ByteCursor;
use crate::errors::DecodeError;
use byteorder::LE;
use std::collections::BTreeMap;

/// Map<DirectoryName, Map<FileName, EntryLocation>>
#[derive(Debug, PartialEq)]
pub(crate) struct FullDirectoryIndex(pub(crate) BTreeMap<String, BTreeMap<String, i32>>);

impl FullDirectoryIndex {
    /// Iterates `(path, location)` pairs with the directory joined onto the
    /// file name. The root directory is spelled `/` and contributes nothing.
    pub(crate) fn files(&self) -> impl Iterator<Item = (String, i32)> + '_ {
        self.0.iter().flat_map(|(directory, files)| {
            files.iter().map(move |(filename, location)| {
                let directory = directory.trim_start_matches('/');
                (format!("{directory}{filename}"), *location)
            })
        })
    }
}

pub(crate) fn read_full_directory_index(
    reader: &mut ByteCursor<'_>,
) -> Result<FullDirectoryIndex, DecodeError> {
    let dir_count = reader.read_u32::<LE>()?;
    let mut directories = BTreeMap::new();
    for _ in 0..dir_count {
        let dir_name = reader.read_fstring()?;
        let file_count = reader.read_u32::<LE>()?;
        let mut files = BTreeMap::new();
        for _ in 0..file_count {
            let file_name = reader.read_fstring()?;
            files.insert(file_name, reader.read_i32::<LE>()?);
        }
        directories.insert(dir_name, files);
    }

    Ok(FullDirectoryIndex(directories))
}
