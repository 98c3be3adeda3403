use std::io::{Cursor, Read};

use super::EndpointError;

/// Extract the first file from an in-memory ZIP archive, decrypting it with
/// `password` when the entry is encrypted.
pub(crate) fn extract_first(contents: &[u8], password: &[u8]) -> Result<Vec<u8>, EndpointError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(contents))?;

    for index in 0..archive.len() {
        let (is_file, encrypted) = {
            let raw = archive.by_index_raw(index)?;
            (raw.is_file(), raw.encrypted())
        };
        if !is_file {
            continue;
        }

        let mut entry = if encrypted {
            archive.by_index_decrypt(index, password)?
        } else {
            archive.by_index(index)?
        };
        // The declared size comes from the remote archive, let the buffer grow instead
        let mut sample = Vec::new();
        entry.read_to_end(&mut sample)?;
        return Ok(sample);
    }

    Err(EndpointError::NotFound)
}

#[cfg(test)]
pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, SimpleFileOptions::default())
                .unwrap();
        } else {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}
