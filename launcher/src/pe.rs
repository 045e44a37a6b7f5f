use std::fs::File;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;

use crate::strategy::ImageKind;

const PE_OFFSET_FIELD: u64 = 0x3C;
const PE_SIGNATURE: [u8; 4] = *b"PE\0\0";
const COFF_HEADER_LEN: u64 = 20;
const SUBSYSTEM_OFFSET: u64 = 68;
const IMAGE_SUBSYSTEM_WINDOWS_GUI: u16 = 2;

/// Reads the subsystem from the optional header of a PE image.
pub(crate) fn read_image_kind(path: &Path) -> io::Result<ImageKind> {
    let mut file = File::open(path)?;
    let mut mz = [0u8; 2];
    file.read_exact(&mut mz)?;
    if &mz != b"MZ" {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "missing MZ header"));
    }

    file.seek(SeekFrom::Start(PE_OFFSET_FIELD))?;
    let mut e_lfanew = [0u8; 4];
    file.read_exact(&mut e_lfanew)?;
    let pe_offset = u64::from(u32::from_le_bytes(e_lfanew));

    file.seek(SeekFrom::Start(pe_offset))?;
    let mut signature = [0u8; 4];
    file.read_exact(&mut signature)?;
    if signature != PE_SIGNATURE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "missing PE signature"));
    }

    file.seek(SeekFrom::Start(
        pe_offset + 4 + COFF_HEADER_LEN + SUBSYSTEM_OFFSET,
    ))?;
    let mut subsystem = [0u8; 2];
    file.read_exact(&mut subsystem)?;
    Ok(match u16::from_le_bytes(subsystem) {
        IMAGE_SUBSYSTEM_WINDOWS_GUI => ImageKind::Gui,
        _ => ImageKind::Console,
    })
}

/// Decides the image kind, guessing from the request when the file cannot be
/// read as a PE image.
pub(crate) fn detect_image_kind(
    path: &Path,
    create_no_window: bool,
    use_shell_execute: bool,
) -> ImageKind {
    match read_image_kind(path) {
        Ok(kind) => kind,
        Err(err) => {
            tracing::debug!(path = %path.display(), "subsystem unknown: {err}");
            let script = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    ["com", "bat", "cmd"]
                        .iter()
                        .any(|known| ext.eq_ignore_ascii_case(known))
                });
            if script || create_no_window || !use_shell_execute {
                ImageKind::Console
            } else {
                ImageKind::Gui
            }
        }
    }
}
