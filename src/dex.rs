use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use zip::ZipArchive;

// DEX header layout: 4-byte magic "dex\n", class_defs count as a
// little-endian u32 at offset 96. Anything shorter is ignored.
const DEX_MAGIC: &[u8; 4] = b"dex\n";
const CLASS_DEFS_OFFSET: usize = 96;

/// Counts the classes declared by all DEX containers inside an APK/XAPK,
/// recursing one level into nested `.apk` entries.
///
/// The count is only a progress denominator; any unreadable container
/// degrades to zero rather than failing the pipeline step.
pub fn expected_class_count(artifact: &Path) -> u64 {
    let file = match File::open(artifact) {
        Ok(file) => file,
        Err(_) => return 0,
    };
    let mut archive = match ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(_) => return 0,
    };
    count_in_archive(&mut archive, true)
}

fn count_in_archive<R: Read + Seek>(archive: &mut ZipArchive<R>, recurse: bool) -> u64 {
    let mut total = 0u64;
    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        let name = entry.name().to_string();

        if name.ends_with(".dex") {
            let mut data = Vec::new();
            if entry.read_to_end(&mut data).is_ok() {
                total += dex_class_defs(&data).unwrap_or(0);
            }
        } else if recurse && name.ends_with(".apk") {
            let mut data = Vec::new();
            if entry.read_to_end(&mut data).is_ok() {
                if let Ok(mut nested) = ZipArchive::new(Cursor::new(data)) {
                    total += count_in_archive(&mut nested, false);
                }
            }
        }
    }
    total
}

fn dex_class_defs(data: &[u8]) -> Option<u64> {
    if data.len() < CLASS_DEFS_OFFSET + 4 || &data[..4] != DEX_MAGIC {
        return None;
    }
    let raw: [u8; 4] = data[CLASS_DEFS_OFFSET..CLASS_DEFS_OFFSET + 4]
        .try_into()
        .ok()?;
    Some(u32::from_le_bytes(raw) as u64)
}
