//! Single-entry tar packing for artifact layers.

use std::io::Read;

use tar::{Archive, Builder, Header};

use crate::{Error, Result};

/// Packs the given data as a tar archive holding exactly one regular file.
pub fn tar_content(name: &str, data: &[u8]) -> Result<Vec<u8>> {
    let mut builder = Builder::new(Vec::new());
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o600);
    header.set_cksum();
    builder
        .append_data(&mut header, name, data)
        .map_err(|e| Error::Internal(format!("tar write failed: {e}")))?;
    builder
        .into_inner()
        .map_err(|e| Error::Internal(format!("tar finish failed: {e}")))
}

/// Extracts the concatenated content of every regular file in the archive.
/// Artifact layers carry exactly one.
pub fn untar_content(data: &[u8]) -> Result<Vec<u8>> {
    let mut archive = Archive::new(data);
    let mut content = Vec::new();
    for entry in archive
        .entries()
        .map_err(|e| Error::Internal(format!("tar read failed: {e}")))?
    {
        let mut entry = entry.map_err(|e| Error::Internal(format!("tar entry failed: {e}")))?;
        if entry.header().entry_type().is_file() {
            entry
                .read_to_end(&mut content)
                .map_err(|e| Error::Internal(format!("tar extract failed: {e}")))?;
        }
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_content() {
        let data = b"apiVersion: v1\nkind: ConfigMap\n";
        let tarred = tar_content("all.yaml", data).unwrap();
        assert_eq!(untar_content(&tarred).unwrap(), data);
    }

    #[test]
    fn empty_archive_yields_empty_content() {
        let tarred = tar_content("all.yaml", b"").unwrap();
        assert!(untar_content(&tarred).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(untar_content(b"definitely not a tar").is_err());
    }
}
