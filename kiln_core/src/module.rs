//! Modules and inter-module links.
//!
//! A module is a name, a version and three independent pools: links to
//! imported modules, type descriptors and constants. Each pool is its own
//! key space of small integers chosen by the compiler.

use crate::codec::{read_u16, read_u32, take_slice, Decode, Encode};
use crate::error::{DecodeError, EncodeError};
use crate::pool::Pool;
use crate::version::Version;

/// A named import reference stored in a module's links pool.
///
/// Wire form: `len: u16 | name[len]`. Resolution re-hashes the name to find
/// the module in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link(String);

impl Link {
    pub fn new(name: impl Into<String>) -> Link {
        Link(name.into())
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Encode for Link {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.extend_from_slice(&(self.0.len() as u16).to_le_bytes());
        buf.extend_from_slice(self.0.as_bytes());
        Ok(())
    }
}

impl Decode for Link {
    fn decode(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
        let len = read_u16(bytes)? as usize;
        let name = String::from_utf8_lossy(take_slice(&bytes[2..], len)?).into_owned();
        Ok((Link(name), 2 + len))
    }
}

/// A compiled module: three pools behind a small header.
///
/// Wire form:
///
/// ```text
/// version: u32 | module_len: u32 | name_len: u16 | name
/// | links: pool | types: pool | consts: pool
/// ```
///
/// `module_len` is the full encoded size, allowing archive scans to skip a
/// module without decoding its pools.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    pub version: Version,
    pub links: Pool,
    pub types: Pool,
    pub consts: Pool,
}

impl Module {
    pub fn new(name: impl Into<String>, version: Version) -> Module {
        Module {
            name: name.into(),
            version,
            links: Pool::new(),
            types: Pool::new(),
            consts: Pool::new(),
        }
    }

    fn header_len(&self) -> usize {
        4 + 4 + 2 + self.name.len()
    }

    /// Total encoded size: header plus the three length-prefixed pools.
    pub fn encoded_len(&self) -> usize {
        self.header_len()
            + (4 + self.links.len())
            + (4 + self.types.len())
            + (4 + self.consts.len())
    }
}

impl Encode for Module {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.extend_from_slice(&self.version.bits().to_le_bytes());
        buf.extend_from_slice(&(self.encoded_len() as u32).to_le_bytes());
        buf.extend_from_slice(&(self.name.len() as u16).to_le_bytes());
        buf.extend_from_slice(self.name.as_bytes());
        self.links.encode(buf)?;
        self.types.encode(buf)?;
        self.consts.encode(buf)?;
        Ok(())
    }
}

impl Decode for Module {
    fn decode(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut off = 0;

        let version = Version::from_bits(read_u32(bytes)?);
        off += 4;
        // module_len is a skip hint for scans; decoding walks the pools.
        let _module_len = read_u32(&bytes[off..])?;
        off += 4;

        let name_len = read_u16(&bytes[off..])? as usize;
        off += 2;
        let name = String::from_utf8_lossy(take_slice(&bytes[off..], name_len)?).into_owned();
        off += name_len;

        let (links, used) = Pool::decode(&bytes[off..])?;
        off += used;
        let (types, used) = Pool::decode(&bytes[off..])?;
        off += used;
        let (consts, used) = Pool::decode(&bytes[off..])?;
        off += used;

        Ok((
            Module {
                name,
                version,
                links,
                types,
                consts,
            },
            off,
        ))
    }
}
