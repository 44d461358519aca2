//! PE image loading and section mapping for CLI modules.
//!
//! [`PeImage`] owns the raw bytes of a loaded module (from disk or memory),
//! parses the PE container, and keeps two views of the section table: the
//! full list, used to locate the CLI metadata, and the code-section list,
//! used to translate method RVAs to file positions.
//!
//! # Example
//!
//! ```rust,no_run
//! use cilload::PeImage;
//! use std::path::Path;
//!
//! let image = PeImage::from_file(Path::new("module.dll"))?;
//! let (clr_rva, clr_size) = image.clr();
//! println!("CLR header at RVA {:#x}, {} bytes", clr_rva, clr_size);
//! # Ok::<(), cilload::Error>(())
//! ```

pub mod io;
pub mod parser;

mod memory;
mod physical;

use std::path::Path;

use crate::{Error::Empty, Result};
use goblin::pe::PE;
use log::debug;
use memory::Memory;
use physical::Physical;

/// Section contains executable code.
pub const CNT_CODE: u32 = 0x0000_0020;
/// Section can be executed as code.
pub const MEM_EXECUTE: u32 = 0x2000_0000;
/// Section can be read.
pub const MEM_READ: u32 = 0x4000_0000;

/// The exact characteristics a section must carry to be treated as a code
/// section. Matched by bit-equality, not by mask; sections with additional
/// bits set (writable code, debug-tagged code) are not retained.
pub const CODE_SECTION_CHARACTERISTICS: u32 = MEM_READ | CNT_CODE | MEM_EXECUTE;

const MACHINE_I386: u16 = 0x14C;

/// Backend trait for image data sources.
///
/// Abstracts over where the module bytes live: an owned buffer or a mapped
/// file. The image is strictly read-only once loaded.
pub trait Backend: Send + Sync {
    /// Bounds-checked slice of the data at `offset` with length `len`.
    ///
    /// # Errors
    /// Returns an error if the requested range leaves the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// The entire data buffer.
    fn data(&self) -> &[u8];

    /// Total length of the data buffer.
    fn len(&self) -> usize;
}

/// One entry of the PE section table, extracted into owned form at load.
#[derive(Debug, Clone)]
pub struct Section {
    /// Section name, null-padded ASCII.
    pub name: [u8; 8],
    /// Size of the section when loaded, in bytes.
    pub virtual_size: u32,
    /// RVA of the first byte of the section.
    pub virtual_address: u32,
    /// Size of the initialized data on disk.
    pub size_of_raw_data: u32,
    /// File position of the section's raw data.
    pub pointer_to_raw_data: u32,
    /// Section characteristics flags.
    pub characteristics: u32,
}

/// A code-bearing section, able to translate RVAs inside it to file positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeSection {
    /// File position of the section's raw data.
    pub file_pos: u32,
    /// RVA of the first byte of the section.
    pub rva: u32,
    /// Length of the section in the loaded image.
    pub length: u32,
}

impl CodeSection {
    /// Translate `rva` to a file position, or `None` if the RVA does not
    /// fall into this section.
    #[must_use]
    pub fn rva_to_file_pos(&self, rva: u32) -> Option<u32> {
        let end = self.rva.checked_add(self.length)?;
        if rva >= self.rva && rva < end {
            Some(self.file_pos + (rva - self.rva))
        } else {
            None
        }
    }
}

/// A loaded CLI module image.
///
/// Owns the module bytes, validated to be a PE file with a CLR runtime
/// header. Everything derived from the image (metadata scope, method bodies)
/// shares it through `Arc<PeImage>` and never outlives it.
pub struct PeImage {
    data: Box<dyn Backend>,
    machine: u16,
    sections: Vec<Section>,
    code_sections: Vec<CodeSection>,
    clr: (u32, u32),
}

impl PeImage {
    /// Load a module from a file on disk, memory-mapping it.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not a valid PE, or
    /// carries no CLR runtime header.
    pub fn from_file(path: &Path) -> Result<PeImage> {
        Self::load(Physical::new(path)?)
    }

    /// Load a module from an owned byte buffer.
    ///
    /// # Errors
    /// Returns an error if the buffer is empty, not a valid PE, or carries
    /// no CLR runtime header.
    pub fn from_mem(data: Vec<u8>) -> Result<PeImage> {
        Self::load(Memory::new(data))
    }

    fn load<T: Backend + 'static>(data: T) -> Result<PeImage> {
        if data.len() == 0 {
            return Err(Empty);
        }

        let (machine, sections, code_sections, clr) = {
            let pe = PE::parse(data.data())?;

            let Some(optional_header) = pe.header.optional_header else {
                return Err(malformed_error!("File does not have an OptionalHeader"));
            };

            let clr = match optional_header.data_directories.get_clr_runtime_header() {
                Some(clr_dir) if clr_dir.virtual_address != 0 => {
                    (clr_dir.virtual_address, clr_dir.size)
                }
                _ => {
                    return Err(malformed_error!(
                        "File does not have a CLR runtime header directory"
                    ))
                }
            };

            let machine = pe.header.coff_header.machine;
            if machine != MACHINE_I386 {
                debug!("unexpected machine {:#06x}, continuing", machine);
            }

            let sections: Vec<Section> = pe
                .sections
                .iter()
                .map(|section| Section {
                    name: section.name,
                    virtual_size: section.virtual_size,
                    virtual_address: section.virtual_address,
                    size_of_raw_data: section.size_of_raw_data,
                    pointer_to_raw_data: section.pointer_to_raw_data,
                    characteristics: section.characteristics,
                })
                .collect();

            let code_sections: Vec<CodeSection> = sections
                .iter()
                .filter(|section| section.characteristics == CODE_SECTION_CHARACTERISTICS)
                .map(|section| CodeSection {
                    file_pos: section.pointer_to_raw_data,
                    rva: section.virtual_address,
                    length: section.virtual_size,
                })
                .collect();

            (machine, sections, code_sections, clr)
        };

        debug!(
            "loaded image: {} sections, {} code sections",
            sections.len(),
            code_sections.len()
        );

        Ok(PeImage {
            data: Box::new(data),
            machine,
            sections,
            code_sections,
            clr,
        })
    }

    /// Total size of the loaded image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the image has a length of zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The COFF machine field of the image (0x14C for I386 / AnyCPU modules).
    #[must_use]
    pub fn machine(&self) -> u16 {
        self.machine
    }

    /// RVA and size of the CLR runtime header data directory.
    #[must_use]
    pub fn clr(&self) -> (u32, u32) {
        self.clr
    }

    /// All sections of the image.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// The retained code sections, in section-table order.
    #[must_use]
    pub fn code_sections(&self) -> &[CodeSection] {
        &self.code_sections
    }

    /// The raw bytes of the loaded image.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// Bounds-checked slice of the image at `offset` with length `len`.
    ///
    /// # Errors
    /// Returns an error if the requested range leaves the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }

    /// Translate an RVA through the code-section list.
    ///
    /// Tries each retained section in order and returns the first hit. A
    /// miss means the RVA does not point into code (native or abstract
    /// methods) and is reported as `None`, not as an error.
    #[must_use]
    pub fn rva_to_code_pos(&self, rva: u32) -> Option<usize> {
        self.code_sections
            .iter()
            .find_map(|section| section.rva_to_file_pos(rva))
            .map(|pos| pos as usize)
    }

    /// Translate an RVA to a file offset through the full section table.
    ///
    /// Used for data that lives outside code sections, such as the CLI
    /// metadata itself.
    ///
    /// # Errors
    /// Returns an error if no section contains the RVA.
    pub fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        for section in &self.sections {
            let Some(section_end) = section.virtual_address.checked_add(section.virtual_size)
            else {
                return Err(malformed_error!(
                    "Section malformed, causing integer overflow - {} + {}",
                    section.virtual_address,
                    section.virtual_size
                ));
            };

            if rva >= section.virtual_address && rva < section_end {
                return Ok((rva - section.virtual_address + section.pointer_to_raw_data) as usize);
            }
        }

        Err(malformed_error!(
            "RVA could not be converted to offset - {:#x}",
            rva
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::build_pe;

    fn two_section_image() -> Vec<u8> {
        build_pe(&[
            (
                b".text\0\0\0",
                0x100,
                0x1000,
                0x200,
                0x200,
                CODE_SECTION_CHARACTERISTICS,
            ),
            (b".rsrc\0\0\0", 0x100, 0x2000, 0x200, 0x400, 0x4000_0040),
        ])
    }

    #[test]
    fn load_and_filter() {
        let image = PeImage::from_mem(two_section_image()).unwrap();

        assert_eq!(image.machine(), 0x14C);
        assert_eq!(image.sections().len(), 2);
        assert_eq!(image.code_sections().len(), 1);
        assert_eq!(
            image.code_sections()[0],
            CodeSection {
                file_pos: 0x200,
                rva: 0x1000,
                length: 0x100
            }
        );
        assert_eq!(image.clr(), (0x2008, 0x48));
    }

    #[test]
    fn empty_input() {
        assert!(matches!(PeImage::from_mem(Vec::new()), Err(Empty)));
    }

    #[test]
    fn not_a_pe() {
        assert!(PeImage::from_mem(vec![0xCC; 128]).is_err());
    }

    #[test]
    fn code_rva_translation() {
        let image = PeImage::from_mem(two_section_image()).unwrap();

        // inside the code section, including its first and last byte
        assert_eq!(image.rva_to_code_pos(0x1000), Some(0x200));
        assert_eq!(image.rva_to_code_pos(0x1010), Some(0x210));
        assert_eq!(image.rva_to_code_pos(0x10FF), Some(0x2FF));

        // the data section is not code, even though it maps fine in general
        assert_eq!(image.rva_to_code_pos(0x2000), None);
        assert_eq!(image.rva_to_offset(0x2000).unwrap(), 0x400);

        // out of any section
        assert_eq!(image.rva_to_code_pos(0x1100), None);
        assert!(image.rva_to_offset(0x9000).is_err());
    }

    #[test]
    fn code_section_bijection() {
        let section = CodeSection {
            file_pos: 0x200,
            rva: 0x1000,
            length: 0x100,
        };

        for rva in 0x1000..0x1100_u32 {
            let pos = section.rva_to_file_pos(rva).unwrap();
            assert_eq!(pos - 0x200, rva - 0x1000);
        }
        assert_eq!(section.rva_to_file_pos(0xFFF), None);
        assert_eq!(section.rva_to_file_pos(0x1100), None);
    }
}
