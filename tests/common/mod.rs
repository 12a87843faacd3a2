//! Common test utilities and helpers.
//!
//! [`HostImage`] lays out a small 32-bit host with everything the resolution
//! pipelines look for. Tests patch individual bytes to break one pipeline at
//! a time.

#![allow(dead_code)]

use sigresolve::config::{ModuleConfig, ResolverConfig};
use sigresolve::testing::{x86, CodeBuffer, ImageBuilder, CODE, DATA as RW_DATA, RODATA};
use sigresolve::{Module, Resolver};

/// Addresses of the synthetic host, mapped at 0x400000.
pub mod layout {
    pub const BASE: u64 = 0x400000;
    pub const TEXT: u64 = 0x401000;
    pub const RDATA: u64 = 0x402000;
    pub const DATA: u64 = 0x403000;

    pub const TEXT_SIZE: usize = 0x200;
    pub const RDATA_SIZE: usize = 0x100;
    pub const DATA_SIZE: usize = 0x100;

    pub const NOTIFY_TEXT: u64 = RDATA + 0x10;
    pub const FACTION_TEXT: u64 = RDATA + 0x40;
    pub const CVAR_TEXT: u64 = RDATA + 0x80;

    pub const GETTEXT: u64 = 0x401010;
    pub const STRING_CTOR: u64 = 0x401020;
    pub const NOTIFIER_INSTANCE: u64 = 0x401030;
    pub const NOTIFIER_NOTIFY: u64 = 0x401040;
    pub const ADD_RESOURCE: u64 = 0x401060;
    pub const LAUNCH_UPDATE: u64 = 0x401080;
    pub const SET_MESSAGE: u64 = 0x4010A0;
    pub const UNLOCK_FACTION: u64 = 0x4010B0;
    pub const CVAR_INDEX: u64 = 0x4010D0;
    pub const CVAR_HELPER: u64 = 0x4010E0;
    pub const CVAR_CTOR: u64 = 0x4010F0;

    pub const PLAYER: u64 = DATA + 0x10;
}

use layout::*;

pub const GETTEXT_EXPORT: &str = "?gettext_@@YAPBDPBD@Z";
pub const ADD_RESOURCE_EXPORT: &str = "?addResource@Block@@QAEMMU?$tvec2@M$0A@@glm@@@Z";
pub const LAUNCH_UPDATE_EXPORT: &str = "?launchUpdate@Block@@AAE_NI@Z";

/// Section contents of the synthetic host, open to patching.
#[derive(Debug, Clone)]
pub struct HostImage {
    pub text: Vec<u8>,
    pub rdata: Vec<u8>,
    pub data: Vec<u8>,
    pub exports: Vec<(String, u64)>,
}

impl HostImage {
    pub fn new() -> Self {
        Self {
            text: host_text(),
            rdata: host_rdata(),
            data: vec![0u8; DATA_SIZE],
            exports: vec![
                (GETTEXT_EXPORT.to_string(), GETTEXT),
                (ADD_RESOURCE_EXPORT.to_string(), ADD_RESOURCE),
                (LAUNCH_UPDATE_EXPORT.to_string(), LAUNCH_UPDATE),
            ],
        }
    }

    /// Overwrite code starting at `address`.
    pub fn patch_text(&mut self, address: u64, bytes: &[u8]) -> &mut Self {
        let at = (address - TEXT) as usize;
        self.text[at..at + bytes.len()].copy_from_slice(bytes);
        self
    }

    /// Overwrite read-only data starting at `address`.
    pub fn patch_rdata(&mut self, address: u64, bytes: &[u8]) -> &mut Self {
        let at = (address - RDATA) as usize;
        self.rdata[at..at + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn without_export(&mut self, name: &str) -> &mut Self {
        self.exports.retain(|(n, _)| n != name);
        self
    }

    pub fn builder(&self) -> ImageBuilder {
        let mut builder = ImageBuilder::new(BASE)
            .section(".text", (TEXT - BASE) as u32, self.text.clone(), CODE)
            .section(".rdata", (RDATA - BASE) as u32, self.rdata.clone(), RODATA)
            .section(".data", (DATA - BASE) as u32, self.data.clone(), RW_DATA);
        for (name, address) in &self.exports {
            builder = builder.export(name, (address - BASE) as u32);
        }
        builder
    }

    pub fn module(&self) -> Module {
        Module::open("host.exe", self.builder().build_view(), &ModuleConfig::default())
            .expect("synthetic host opens")
    }

    pub fn resolver(&self) -> Resolver {
        self.resolver_with(ResolverConfig::default())
    }

    pub fn resolver_with(&self, config: ResolverConfig) -> Resolver {
        Resolver::new(std::sync::Arc::new(self.module()), config).expect("valid config")
    }
}

impl Default for HostImage {
    fn default() -> Self {
        Self::new()
    }
}

fn host_rdata() -> Vec<u8> {
    let mut rdata = vec![0u8; RDATA_SIZE];
    for (address, text) in [
        (NOTIFY_TEXT, &b"Notifier::notify\0"[..]),
        (FACTION_TEXT, &b"Unlocked Faction %s\0"[..]),
        (CVAR_TEXT, &b"CVarBase::CVarBase\0"[..]),
    ] {
        let at = (address - RDATA) as usize;
        rdata[at..at + text.len()].copy_from_slice(text);
    }
    rdata
}

/// Functions on 16-byte boundaries, separated by int3 padding.
fn host_text() -> Vec<u8> {
    let mut code = CodeBuffer::new(TEXT);
    let next = |code: &mut CodeBuffer| {
        code.align(0x10, x86::INT3);
    };

    // Filler so no function sits at the segment base.
    code.emit(&[x86::RET]);
    next(&mut code);

    for stub in [GETTEXT, STRING_CTOR, NOTIFIER_INSTANCE] {
        assert_eq!(code.here(), stub);
        code.emit(&[x86::RET]);
        next(&mut code);
    }

    // Notifier::notify asserts with its own name.
    assert_eq!(code.here(), NOTIFIER_NOTIFY);
    code.emit(&[x86::PUSH_EBP])
        .emit(&x86::push_imm32(NOTIFY_TEXT as u32))
        .emit_at(|at| x86::call(at, GETTEXT))
        .emit(&[x86::POP_EBP, x86::RET]);
    code.pad_to(ADD_RESOURCE, x86::INT3);

    // Block::addResource: Notifier::instance()->notify(...)
    code.emit(&[x86::PUSH_EBP])
        .emit_at(|at| x86::call(at, NOTIFIER_INSTANCE))
        .emit_at(|at| x86::call(at, NOTIFIER_NOTIFY))
        .emit(&[x86::POP_EBP, x86::RET]);
    code.pad_to(LAUNCH_UPDATE, x86::INT3);

    // Block::launchUpdate: if (globals.player != 0) ...
    code.emit(&[x86::PUSH_EBP])
        .emit(&x86::mov_eax_mem(PLAYER as u32))
        .emit(&x86::cmp_mem_imm8(PLAYER as u32, 0));
    let branch = code.here();
    let done = branch + 6 + 1;
    code.emit(&x86::jz(branch, done))
        .emit(&[x86::NOP])
        .emit(&[x86::POP_EBP, x86::RET]);
    code.pad_to(SET_MESSAGE, x86::INT3);

    code.emit(&[x86::RET]);
    code.pad_to(UNLOCK_FACTION, x86::INT3);

    // player->setMessage(String(gettext_("Unlocked Faction %s")))
    code.emit(&[x86::PUSH_EBP])
        .emit(&x86::push_imm32(FACTION_TEXT as u32))
        .emit_at(|at| x86::call(at, GETTEXT))
        .emit_at(|at| x86::call(at, STRING_CTOR))
        .emit_at(|at| x86::call(at, SET_MESSAGE))
        .emit(&[x86::POP_EBP, x86::RET]);
    code.pad_to(CVAR_INDEX, x86::INT3);

    code.emit(&[x86::RET]);
    code.pad_to(CVAR_HELPER, x86::INT3);
    code.emit(&[x86::RET]);
    code.pad_to(CVAR_CTOR, x86::INT3);

    // CVarBase::CVarBase
    code.emit(&[x86::PUSH_EBP])
        .emit_at(|at| x86::call(at, CVAR_HELPER))
        .emit(&x86::push_imm32(CVAR_TEXT as u32))
        .emit_at(|at| x86::call(at, CVAR_INDEX))
        .emit(&[x86::POP_EBP, x86::RET]);
    code.pad_to(TEXT + TEXT_SIZE as u64, x86::INT3);

    code.into_bytes()
}
