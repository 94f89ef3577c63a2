use crate::cursor::ByteCursor;
use crate::errors::DecodeError;
use byteorder::LE;

/// Path hash and entry location pairs.
#[derive(Debug, PartialEq)]
pub(crate) struct PathHashIndex(pub(crate) Vec<(u64, i32)>);

pub(crate) fn read_path_hash_index(
    reader: &mut ByteCursor<'_>,
) -> Result<PathHashIndex, DecodeError> {
    let phi = reader.read_array(|reader| {
        let hash = reader.read_u64::<LE>()?;
        let location = reader.read_i32::<LE>()?;
        Ok((hash, location))
    })?;
    Ok(PathHashIndex(phi))
}
