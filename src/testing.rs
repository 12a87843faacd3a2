//! Synthetic loaded images for tests and benchmarks.
//!
//! [`ImageBuilder`] lays out a PE image the way the loader maps it: headers in
//! the first page, each section at its RVA, an export directory in the header
//! page. The [`x86`] helpers emit the handful of encodings tests need.

use crate::core::image::ImageView;
use crate::formats::pe::{
    IMAGE_SCN_CNT_CODE, IMAGE_SCN_CNT_INITIALIZED_DATA, IMAGE_SCN_MEM_EXECUTE, IMAGE_SCN_MEM_READ,
    IMAGE_SCN_MEM_WRITE, PE32PLUS_MAGIC, PE32_MAGIC,
};

const PAGE: u32 = 0x1000;
/// Export directory and its tables live here, inside the header page.
const EXPORT_RVA: u32 = 0xA00;

pub const CODE: u32 = IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE | IMAGE_SCN_MEM_READ;
pub const RODATA: u32 = IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ;
pub const DATA: u32 = IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ | IMAGE_SCN_MEM_WRITE;

#[derive(Debug, Clone)]
struct SectionSpec {
    name: String,
    rva: u32,
    virtual_size: u32,
    data: Vec<u8>,
    characteristics: u32,
}

/// Builder for a mapped PE image.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    bitness: u32,
    image_base: u64,
    e_lfanew: u32,
    dos_magic: u16,
    sections: Vec<SectionSpec>,
    exports: Vec<(String, u32)>,
}

impl ImageBuilder {
    /// 32-bit image mapped at `image_base`.
    pub fn new(image_base: u64) -> Self {
        Self {
            bitness: 32,
            image_base,
            e_lfanew: 0x80,
            dos_magic: 0x5A4D,
            sections: Vec::new(),
            exports: Vec::new(),
        }
    }

    /// 64-bit (PE32+) image mapped at `image_base`.
    pub fn new64(image_base: u64) -> Self {
        Self {
            bitness: 64,
            ..Self::new(image_base)
        }
    }

    /// Section whose in-memory size equals its data.
    pub fn section(self, name: &str, rva: u32, data: Vec<u8>, characteristics: u32) -> Self {
        let size = data.len() as u32;
        self.section_sized(name, rva, size, data, characteristics)
    }

    /// Section with an explicit `VirtualSize`.
    pub fn section_sized(
        mut self,
        name: &str,
        rva: u32,
        virtual_size: u32,
        data: Vec<u8>,
        characteristics: u32,
    ) -> Self {
        self.sections.push(SectionSpec {
            name: name.to_string(),
            rva,
            virtual_size,
            data,
            characteristics,
        });
        self
    }

    pub fn export(mut self, name: &str, rva: u32) -> Self {
        self.exports.push((name.to_string(), rva));
        self
    }

    pub fn e_lfanew(mut self, e_lfanew: u32) -> Self {
        self.e_lfanew = e_lfanew;
        self
    }

    pub fn dos_magic(mut self, magic: u16) -> Self {
        self.dos_magic = magic;
        self
    }

    fn size_of_image(&self) -> u32 {
        let end = self
            .sections
            .iter()
            .map(|s| s.rva + s.virtual_size.max(s.data.len() as u32))
            .max()
            .unwrap_or(PAGE);
        end.div_ceil(PAGE).max(1) * PAGE
    }

    /// Mapped image bytes.
    pub fn build(&self) -> Vec<u8> {
        let size = self.size_of_image();
        let mut image = vec![0u8; size as usize];

        put16(&mut image, 0, self.dos_magic);
        put32(&mut image, 60, self.e_lfanew);

        let nt = self.e_lfanew as usize;
        if nt + 0x200 > image.len() {
            // Headers do not fit; leave the rest for the parser to reject.
            return image;
        }
        let optional_size: u16 = if self.bitness == 64 { 0xF0 } else { 0xE0 };
        image[nt..nt + 4].copy_from_slice(b"PE\0\0");
        put16(&mut image, nt + 4, if self.bitness == 64 { 0x8664 } else { 0x14C });
        put16(&mut image, nt + 6, self.sections.len() as u16);
        put16(&mut image, nt + 20, optional_size);

        let opt = nt + 24;
        if self.bitness == 64 {
            put16(&mut image, opt, PE32PLUS_MAGIC);
            image[opt + 24..opt + 32].copy_from_slice(&self.image_base.to_le_bytes());
            put32(&mut image, opt + 108, 16);
        } else {
            put16(&mut image, opt, PE32_MAGIC);
            put32(&mut image, opt + 28, self.image_base as u32);
            put32(&mut image, opt + 92, 16);
        }
        put32(&mut image, opt + 32, PAGE);
        put32(&mut image, opt + 56, size);
        put32(&mut image, opt + 60, PAGE);

        let directories = opt + if self.bitness == 64 { 112 } else { 96 };
        if !self.exports.is_empty() {
            let export_size = self.write_exports(&mut image);
            put32(&mut image, directories, EXPORT_RVA);
            put32(&mut image, directories + 4, export_size);
        }

        let table = opt + optional_size as usize;
        for (i, section) in self.sections.iter().enumerate() {
            let at = table + i * 40;
            let name = section.name.as_bytes();
            let len = name.len().min(8);
            image[at..at + len].copy_from_slice(&name[..len]);
            put32(&mut image, at + 8, section.virtual_size);
            put32(&mut image, at + 12, section.rva);
            put32(&mut image, at + 16, section.data.len() as u32);
            put32(&mut image, at + 36, section.characteristics);

            let start = section.rva as usize;
            let end = (start + section.data.len()).min(image.len());
            if start < end {
                image[start..end].copy_from_slice(&section.data[..end - start]);
            }
        }

        image
    }

    /// Writes the export directory and returns its size.
    fn write_exports(&self, image: &mut [u8]) -> u32 {
        let dir = EXPORT_RVA as usize;
        let count = self.exports.len();
        let functions = dir + 40;
        let names = functions + count * 4;
        let ordinals = names + count * 4;
        let mut strings = ordinals + count * 2;

        put32(image, dir + 16, 1);
        put32(image, dir + 20, count as u32);
        put32(image, dir + 24, count as u32);
        put32(image, dir + 28, functions as u32);
        put32(image, dir + 32, names as u32);
        put32(image, dir + 36, ordinals as u32);

        for (i, (name, rva)) in self.exports.iter().enumerate() {
            put32(image, functions + i * 4, *rva);
            put32(image, names + i * 4, strings as u32);
            put16(image, ordinals + i * 2, i as u16);
            image[strings..strings + name.len()].copy_from_slice(name.as_bytes());
            strings += name.len() + 1;
        }

        (strings - dir) as u32
    }

    /// View mapped at the configured image base.
    pub fn build_view(&self) -> ImageView {
        ImageView::new(self.image_base, self.build())
    }
}

fn put16(image: &mut [u8], at: usize, value: u16) {
    image[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put32(image: &mut [u8], at: usize, value: u32) {
    image[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Encoders for the x86 instructions used by synthetic code.
pub mod x86 {
    pub const RET: u8 = 0xC3;
    pub const NOP: u8 = 0x90;
    pub const INT3: u8 = 0xCC;
    pub const PUSH_EBP: u8 = 0x55;
    pub const POP_EBP: u8 = 0x5D;

    fn rel32(at: u64, len: u64, target: u64) -> [u8; 4] {
        (target.wrapping_sub(at + len) as i32).to_le_bytes()
    }

    /// `call rel32` located at `at`.
    pub fn call(at: u64, target: u64) -> Vec<u8> {
        let mut out = vec![0xE8];
        out.extend_from_slice(&rel32(at, 5, target));
        out
    }

    /// `jmp rel32` located at `at`.
    pub fn jmp(at: u64, target: u64) -> Vec<u8> {
        let mut out = vec![0xE9];
        out.extend_from_slice(&rel32(at, 5, target));
        out
    }

    /// `jz rel32` located at `at`.
    pub fn jz(at: u64, target: u64) -> Vec<u8> {
        let mut out = vec![0x0F, 0x84];
        out.extend_from_slice(&rel32(at, 6, target));
        out
    }

    /// `push imm32`
    pub fn push_imm32(value: u32) -> Vec<u8> {
        let mut out = vec![0x68];
        out.extend_from_slice(&value.to_le_bytes());
        out
    }

    /// `mov eax, [abs32]`
    pub fn mov_eax_mem(address: u32) -> Vec<u8> {
        let mut out = vec![0xA1];
        out.extend_from_slice(&address.to_le_bytes());
        out
    }

    /// `cmp dword ptr [abs32], imm8`
    pub fn cmp_mem_imm8(address: u32, imm: u8) -> Vec<u8> {
        let mut out = vec![0x83, 0x3D];
        out.extend_from_slice(&address.to_le_bytes());
        out.push(imm);
        out
    }
}

/// Assembles code at a known address, tracking the current position.
#[derive(Debug, Clone)]
pub struct CodeBuffer {
    base: u64,
    bytes: Vec<u8>,
}

impl CodeBuffer {
    pub fn new(base: u64) -> Self {
        Self {
            base,
            bytes: Vec::new(),
        }
    }

    /// Address of the next emitted byte.
    pub fn here(&self) -> u64 {
        self.base + self.bytes.len() as u64
    }

    pub fn emit(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Emit an instruction produced from the current address.
    pub fn emit_at(&mut self, encode: impl FnOnce(u64) -> Vec<u8>) -> &mut Self {
        let bytes = encode(self.here());
        self.emit(&bytes)
    }

    /// Pad with `byte` up to the next multiple of `alignment`.
    pub fn align(&mut self, alignment: u64, byte: u8) -> &mut Self {
        while self.here() % alignment != 0 {
            self.bytes.push(byte);
        }
        self
    }

    /// Pad with `byte` up to `address`.
    pub fn pad_to(&mut self, address: u64, byte: u8) -> &mut Self {
        while self.here() < address {
            self.bytes.push(byte);
        }
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
