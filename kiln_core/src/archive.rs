//! Module archives: a pool of modules plus an entry pointer.
//!
//! Archives key their modules pool by the FNV-1a/64 hash of the module
//! name, so link resolution is a re-hash away from the module bytes. The
//! entry pair names the offsets of the main module and, within it, the
//! main function constant.

use crate::codec::{read_u32, Decode, Encode};
use crate::constant::Const;
use crate::error::DecodeError;
use crate::module::Module;
use crate::pool::Pool;

/// FNV-1a 64-bit hash of a module name. Normative for archive keying
/// across implementations.
pub fn hash_name(name: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for byte in name.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// A serialized bundle of modules plus the entry pointer.
///
/// Wire form: `entry_mod: u32 | entry_const: u32 | modules: pool`.
#[derive(Debug, Clone, Default)]
pub struct Archive {
    pub modules: Pool,
    entry_mod: u32,
    entry_const: u32,
}

impl Archive {
    pub fn new() -> Archive {
        Archive::default()
    }

    /// Record the entry pointer: the main module's offset in the modules
    /// pool and the main function constant's offset in that module.
    pub fn set_entry(&mut self, module_offset: u32, const_offset: u32) {
        self.entry_mod = module_offset;
        self.entry_const = const_offset;
    }

    #[inline]
    pub fn entry(&self) -> (u32, u32) {
        (self.entry_mod, self.entry_const)
    }

    /// Decode the module at the entry offset.
    pub fn main_module(&self) -> Result<Module, DecodeError> {
        self.modules.get(self.entry_mod)
    }

    /// Decode the main function constant of the main module.
    ///
    /// The constant must carry the `fn` tag; callers extract the function
    /// value with a tag-checked accessor.
    pub fn main_fn(&self) -> Result<Const, DecodeError> {
        let module = self.main_module()?;
        module.consts.get(self.entry_const)
    }

    /// Serialize the archive.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 4 + self.modules.len());
        buf.extend_from_slice(&self.entry_mod.to_le_bytes());
        buf.extend_from_slice(&self.entry_const.to_le_bytes());
        self.modules
            .encode(&mut buf)
            .expect("pool encoding is total");
        buf
    }

    /// Reconstruct an archive from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Archive, DecodeError> {
        let entry_mod = read_u32(bytes)?;
        let entry_const = read_u32(&bytes[4..])?;
        let (modules, _) = Pool::decode(&bytes[8..])?;
        Ok(Archive {
            modules,
            entry_mod,
            entry_const,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Instructions, Opcode};
    use crate::constant::ConstTag;
    use crate::function::CompiledFn;
    use crate::version::Version;

    #[test]
    fn test_fnv1a_vectors() {
        // Reference values for FNV-1a/64.
        assert_eq!(hash_name(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(hash_name("a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(hash_name("foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn test_entry_lookup_roundtrip() {
        let mut module = Module::new("main", Version::new(0, 0, 1));
        module.consts.set(0, &Const::I64(7)).unwrap();

        let mut code = Instructions::new();
        code.push_op(Opcode::Halt, &[]);
        let main_fn = Const::Fn(CompiledFn::new("main.main", 0, code).into());
        let fn_offset = module.consts.set(1, &main_fn).unwrap();

        let mut archive = Archive::new();
        let mod_offset = archive
            .modules
            .set(hash_name("main"), &module)
            .unwrap();
        archive.set_entry(mod_offset, fn_offset);

        let bytes = archive.to_bytes();
        let decoded = Archive::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.entry(), (mod_offset, fn_offset));

        let main = decoded.main_module().unwrap();
        assert_eq!(main.name, "main");
        assert_eq!(main.version, Version::new(0, 0, 1));

        let entry = decoded.main_fn().unwrap();
        assert_eq!(entry.tag(), ConstTag::Fn);
        assert_eq!(entry, main_fn);
    }

    #[test]
    fn test_truncated_archive() {
        assert!(matches!(
            Archive::from_bytes(&[0, 0, 0, 0, 0, 0]),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
