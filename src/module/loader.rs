//! Module Loader
//!
//! Opens PE/ELF/Mach-O executables using goblin and extracts what the
//! resolver and cache need to decide "is this the binary we want":
//! - Content fingerprint (LC_UUID, GNU build-id, CodeView GUID)
//! - Architecture and bitness
//! - Entry point

use std::fs;
use std::path::{Path, PathBuf};

use goblin::mach::load_command::CommandVariant;

use super::fingerprint::ContentFingerprint;
use crate::error::ModuleError;

/// Opens and parses binaries on behalf of the resolver and the cache.
///
/// The fingerprint is only a hint: implementations may use it to pick a
/// slice out of a universal binary, but must not reject a mismatch. The
/// caller compares [`LoadedModule::fingerprint`] itself.
pub trait ModuleLoader: Send + Sync {
    fn load(
        &self,
        path: &Path,
        expected: Option<&ContentFingerprint>,
    ) -> Result<LoadedModule, ModuleError>;
}

/// Default loader backed by goblin
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectFileLoader;

impl ModuleLoader for ObjectFileLoader {
    fn load(
        &self,
        path: &Path,
        expected: Option<&ContentFingerprint>,
    ) -> Result<LoadedModule, ModuleError> {
        LoadedModule::from_file(path, expected)
    }
}

/// An opened, parsed binary image
#[derive(Debug)]
pub struct LoadedModule {
    /// File the image was read from
    pub path: PathBuf,
    /// Raw bytes of the file
    pub data: Vec<u8>,
    /// Binary format (PE, ELF, Mach-O)
    pub format: &'static str,
    /// Architecture name (e.g., "x86_64", "arm64")
    pub arch: &'static str,
    /// Is this a 64-bit binary?
    pub is_64bit: bool,
    /// Entry point address (0 for kexts and other images without one)
    pub entry_point: u64,
    fingerprint: Option<ContentFingerprint>,
}

/// Facts extracted from one image before the bytes are moved into place
struct ImageFacts {
    format: &'static str,
    arch: &'static str,
    is_64bit: bool,
    entry_point: u64,
    fingerprint: Option<ContentFingerprint>,
}

impl LoadedModule {
    /// Load and parse a binary file
    pub fn from_file(
        path: impl AsRef<Path>,
        expected: Option<&ContentFingerprint>,
    ) -> Result<Self, ModuleError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| ModuleError::io(path, e))?;
        Self::from_bytes(data, path.to_path_buf(), expected)
    }

    /// Parse binary from bytes
    pub fn from_bytes(
        data: Vec<u8>,
        path: PathBuf,
        expected: Option<&ContentFingerprint>,
    ) -> Result<Self, ModuleError> {
        if data.len() < 4 {
            return Err(ModuleError::invalid(&path, "File too small"));
        }

        let facts = if data[0..2] == [0x4D, 0x5A] {
            parse_pe(&data, &path)?
        } else if data[0..4] == [0x7F, b'E', b'L', b'F'] {
            parse_elf(&data, &path)?
        } else if is_macho_magic(&data) {
            parse_macho(&data, &path, expected)?
        } else {
            return Err(ModuleError::invalid(&path, "Unknown binary format"));
        };

        log::trace!(
            "Parsed {} {} image {} (fingerprint: {})",
            facts.arch,
            facts.format,
            path.display(),
            facts
                .fingerprint
                .as_ref()
                .map_or_else(|| "none".to_string(), |fp| fp.to_string())
        );

        Ok(Self {
            path,
            data,
            format: facts.format,
            arch: facts.arch,
            is_64bit: facts.is_64bit,
            entry_point: facts.entry_point,
            fingerprint: facts.fingerprint,
        })
    }

    /// Build identity of the image, if it carries one
    pub fn fingerprint(&self) -> Option<&ContentFingerprint> {
        self.fingerprint.as_ref()
    }

    /// True when the image carries exactly the given fingerprint
    pub fn matches(&self, expected: &ContentFingerprint) -> bool {
        self.fingerprint.as_ref() == Some(expected)
    }

    /// Get summary string
    pub fn summary(&self) -> String {
        format!(
            "{} {} {} binary\n\
             Path: {}\n\
             Entry: 0x{:x}\n\
             Size: {} bytes\n\
             UUID: {}",
            if self.is_64bit { "64-bit" } else { "32-bit" },
            self.arch,
            self.format,
            self.path.display(),
            self.entry_point,
            self.data.len(),
            self.fingerprint
                .as_ref()
                .map_or_else(|| "<none>".to_string(), |fp| fp.to_string())
        )
    }
}

fn is_macho_magic(data: &[u8]) -> bool {
    let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    matches!(
        magic,
        0xFEEDFACE | 0xFEEDFACF | 0xCEFAEDFE | 0xCFFAEDFE | 0xBEBAFECA
    )
}

/// Parse PE (Windows executable)
fn parse_pe(data: &[u8], path: &Path) -> Result<ImageFacts, ModuleError> {
    use goblin::pe::header::{COFF_MACHINE_ARM64, COFF_MACHINE_X86, COFF_MACHINE_X86_64};

    let pe = goblin::pe::PE::parse(data).map_err(|e| ModuleError::invalid(path, e.to_string()))?;

    let arch = match pe.header.coff_header.machine {
        COFF_MACHINE_X86_64 => "x86_64",
        COFF_MACHINE_X86 => "i386",
        COFF_MACHINE_ARM64 => "arm64",
        _ => "unknown",
    };

    let fingerprint = pe
        .debug_data
        .as_ref()
        .and_then(|debug| debug.codeview_pdb70_debug_info.as_ref())
        .and_then(|cv| ContentFingerprint::from_bytes(&cv.signature));

    Ok(ImageFacts {
        format: "PE",
        arch,
        is_64bit: pe.is_64,
        entry_point: (pe.image_base as u64).wrapping_add(pe.entry as u64),
        fingerprint,
    })
}

/// Parse ELF (Linux executable)
fn parse_elf(data: &[u8], path: &Path) -> Result<ImageFacts, ModuleError> {
    use goblin::elf::header::{EM_386, EM_AARCH64, EM_ARM, EM_X86_64};
    use goblin::elf::note::NT_GNU_BUILD_ID;

    let elf = goblin::elf::Elf::parse(data).map_err(|e| ModuleError::invalid(path, e.to_string()))?;

    let arch = match elf.header.e_machine {
        EM_X86_64 => "x86_64",
        EM_386 => "i386",
        EM_ARM => "arm",
        EM_AARCH64 => "arm64",
        _ => "unknown",
    };

    // Program headers first, section headers for images without PT_NOTE
    let fingerprint = elf
        .iter_note_headers(data)
        .into_iter()
        .flatten()
        .chain(elf.iter_note_sections(data, None).into_iter().flatten())
        .filter_map(Result::ok)
        .find(|note| {
            note.n_type == NT_GNU_BUILD_ID && note.name.trim_end_matches('\0') == "GNU"
        })
        .and_then(|note| ContentFingerprint::from_bytes(note.desc));

    Ok(ImageFacts {
        format: "ELF",
        arch,
        is_64bit: elf.is_64,
        entry_point: elf.entry,
        fingerprint,
    })
}

/// Parse Mach-O (macOS executable or kext), thin or universal
fn parse_macho(
    data: &[u8],
    path: &Path,
    expected: Option<&ContentFingerprint>,
) -> Result<ImageFacts, ModuleError> {
    use goblin::mach::fat::{SIZEOF_FAT_ARCH, SIZEOF_FAT_HEADER};
    use goblin::mach::{Mach, SingleArch};

    let mach = Mach::parse(data).map_err(|e| ModuleError::invalid(path, e.to_string()))?;

    match mach {
        Mach::Binary(macho) => Ok(describe_macho(&macho)),
        Mach::Fat(multi) => {
            // The header's arch count is untrusted; never walk past the table
            let table_room = data.len().saturating_sub(SIZEOF_FAT_HEADER) / SIZEOF_FAT_ARCH;
            let mut slices = Vec::new();
            for index in 0..multi.narches.min(table_room) {
                match multi.get(index) {
                    Ok(SingleArch::MachO(macho)) => slices.push(describe_macho(&macho)),
                    Ok(SingleArch::Archive(_)) => continue,
                    Err(e) => {
                        log::debug!("Bad slice {} of {}: {}", index, path.display(), e);
                        break;
                    }
                }
            }

            let wanted = expected.and_then(|fp| {
                slices
                    .iter()
                    .position(|slice| slice.fingerprint.as_ref() == Some(fp))
            });
            let index = wanted.unwrap_or(0);
            if index >= slices.len() {
                return Err(ModuleError::invalid(path, "Universal binary has no Mach-O slices"));
            }
            Ok(slices.swap_remove(index))
        }
    }
}

fn describe_macho(macho: &goblin::mach::MachO) -> ImageFacts {
    use goblin::mach::cputype::{
        CPU_TYPE_ARM, CPU_TYPE_ARM64, CPU_TYPE_POWERPC, CPU_TYPE_POWERPC64, CPU_TYPE_X86,
        CPU_TYPE_X86_64,
    };

    let arch = match macho.header.cputype {
        CPU_TYPE_X86_64 => "x86_64",
        CPU_TYPE_X86 => "i386",
        CPU_TYPE_ARM64 => "arm64",
        CPU_TYPE_ARM => "arm",
        CPU_TYPE_POWERPC64 => "ppc64",
        CPU_TYPE_POWERPC => "ppc",
        _ => "unknown",
    };

    let fingerprint = macho.load_commands.iter().find_map(|lc| match &lc.command {
        CommandVariant::Uuid(cmd) => ContentFingerprint::from_bytes(&cmd.uuid),
        _ => None,
    });

    ImageFacts {
        format: "Mach-O",
        arch,
        is_64bit: macho.is_64,
        entry_point: macho.entry,
        fingerprint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fingerprint, macho_with_uuid};

    #[test]
    fn test_macho_uuid_is_fingerprint() {
        let fp = fingerprint(0x11);
        let module =
            LoadedModule::from_bytes(macho_with_uuid(&fp), PathBuf::from("/k/foo"), None).unwrap();

        println!("{}", module.summary());
        assert_eq!(module.format, "Mach-O");
        assert_eq!(module.arch, "x86_64");
        assert!(module.is_64bit);
        assert!(module.matches(&fp));
        assert!(!module.matches(&fingerprint(0x22)));
    }

    #[test]
    fn test_hint_does_not_reject() {
        let module = LoadedModule::from_bytes(
            macho_with_uuid(&fingerprint(0x11)),
            PathBuf::from("/k/foo"),
            Some(&fingerprint(0x22)),
        )
        .unwrap();
        assert_eq!(module.fingerprint(), Some(&fingerprint(0x11)));
    }

    #[test]
    fn test_rejects_junk() {
        let tiny = LoadedModule::from_bytes(vec![1, 2], PathBuf::from("tiny"), None);
        assert!(matches!(tiny, Err(ModuleError::Invalid { .. })));

        let text = LoadedModule::from_bytes(b"hello world".to_vec(), PathBuf::from("txt"), None);
        assert!(matches!(text, Err(ModuleError::Invalid { .. })));
    }

    /// Minimal PE32+ image: DOS header, COFF header, optional header with
    /// empty data directories and no sections
    fn pe64(image_base: u64, entry: u32) -> Vec<u8> {
        let mut image = vec![0u8; 0x40];
        image[0..2].copy_from_slice(b"MZ");
        image[0x3C..0x40].copy_from_slice(&0x40u32.to_le_bytes());
        image.extend_from_slice(b"PE\0\0");

        // COFF header
        image.extend_from_slice(&0x8664u16.to_le_bytes());
        image.extend_from_slice(&0u16.to_le_bytes());
        image.extend_from_slice(&[0; 12]);
        image.extend_from_slice(&240u16.to_le_bytes());
        image.extend_from_slice(&0x22u16.to_le_bytes());

        // Standard fields
        image.extend_from_slice(&0x20Bu16.to_le_bytes());
        image.extend_from_slice(&[0; 2 + 12]);
        image.extend_from_slice(&entry.to_le_bytes());
        image.extend_from_slice(&0u32.to_le_bytes());

        // Windows fields
        image.extend_from_slice(&image_base.to_le_bytes());
        image.extend_from_slice(&0x1000u32.to_le_bytes());
        image.extend_from_slice(&0x200u32.to_le_bytes());
        image.extend_from_slice(&[0; 12 + 16 + 4 + 32 + 4]);
        image.extend_from_slice(&16u32.to_le_bytes());

        // Data directories
        image.extend_from_slice(&[0; 16 * 8]);
        image
    }

    #[test]
    fn test_pe_entry_point() {
        let module = LoadedModule::from_bytes(pe64(0x1_4000_0000, 0x2000), PathBuf::from("a.exe"), None)
            .unwrap();
        println!("{}", module.summary());
        assert_eq!(module.format, "PE");
        assert_eq!(module.entry_point, 0x1_4000_2000);
        assert_eq!(module.fingerprint(), None);
    }

    #[test]
    fn test_pe_entry_point_wraps_near_top_of_address_space() {
        let module = LoadedModule::from_bytes(
            pe64(0xFFFF_FFFF_FFFF_F000, 0x2000),
            PathBuf::from("hostile.exe"),
            None,
        )
        .unwrap();
        assert_eq!(module.entry_point, 0x1000);
    }

    #[test]
    fn test_fat_header_with_inflated_arch_count() {
        let mut data = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x7F, 0xFF, 0xFF, 0xFF];
        data.extend_from_slice(&[0; 64]);

        let started = std::time::Instant::now();
        let result = LoadedModule::from_bytes(data, PathBuf::from("fat"), None);
        println!("fat header rejected in {:?}", started.elapsed());

        assert!(matches!(result, Err(ModuleError::Invalid { .. })));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ObjectFileLoader.load(&dir.path().join("absent"), None);
        assert!(matches!(result, Err(ModuleError::Io { .. })));
    }

    #[test]
    fn test_parse_self() {
        // Parse the test executable itself
        let exe_path = std::env::current_exe().unwrap();
        match LoadedModule::from_file(&exe_path, None) {
            Ok(module) => println!("{}", module.summary()),
            Err(e) => println!("Could not parse self: {}", e),
        }
    }
}
